//! Implements the Root feature (ID `0x0000`) that every device supports by
//! default.

use std::sync::Arc;

use super::{CreatableFeature, FeatureId, FeatureType};
use crate::{
    channel::HidppChannel,
    nibble::U4,
    protocol::{
        ProtocolVersion,
        v20::{self, Hidpp20Error},
    },
};

/// Implements the `Root` / `0x0000` feature that every HID++2.0 device
/// supports at feature index 0.
#[derive(Clone)]
pub struct RootFeature {
    /// The underlying HID++ channel.
    chan: Arc<HidppChannel>,

    /// The index of the device to implement the feature for.
    device_index: u8,
}

impl CreatableFeature for RootFeature {
    const ID: FeatureId = FeatureId::Root;
    const STARTING_VERSION: u8 = 0;

    fn new(chan: Arc<HidppChannel>, device_index: u8, _: u8) -> Self {
        Self {
            chan,
            device_index,
        }
    }
}

impl RootFeature {
    pub fn device_index(&self) -> u8 {
        self.device_index
    }

    /// Retrieves information about a specific feature ID, including its index
    /// in the feature table, its type and its version.
    ///
    /// If the feature is not supported by the device, [`None`] is returned.
    /// A device signals this with an all-zero record, or with index 0 for any
    /// feature other than root.
    pub async fn get_feature(&self, id: FeatureId) -> Result<Option<FeatureInformation>, Hidpp20Error> {
        let [id_hi, id_lo] = u16::from(id).to_be_bytes();
        let response = self
            .chan
            .send_v20(v20::Message::Short(
                v20::MessageHeader {
                    device_index: self.device_index,
                    feature_index: 0,
                    function_id: U4::from_lo(0),
                    software_id: self.chan.get_sw_id(),
                },
                [id_hi, id_lo, 0x00],
            ))
            .await?;

        let payload = response.extend_payload();
        if payload[..3] == [0, 0, 0] || (payload[0] == 0 && id != FeatureId::Root) {
            return Ok(None);
        }

        Ok(Some(FeatureInformation {
            index: payload[0],
            typ: FeatureType::from(payload[1]),
            version: payload[2],
        }))
    }

    /// Retrieves the HID++ protocol version the device implements.
    ///
    /// The device echoes `ping` back, which is checked to make sure the reply
    /// belongs to this request.
    pub async fn get_protocol_version(&self, ping: u8) -> Result<ProtocolVersion, Hidpp20Error> {
        let response = self
            .chan
            .send_v20(v20::Message::Short(
                v20::MessageHeader {
                    device_index: self.device_index,
                    feature_index: 0,
                    function_id: U4::from_lo(1),
                    software_id: self.chan.get_sw_id(),
                },
                [0x00, 0x00, ping],
            ))
            .await?;

        let payload = response.extend_payload();
        if payload[2] != ping {
            return Err(Hidpp20Error::UnsupportedResponse);
        }

        Ok(ProtocolVersion {
            major: payload[0],
            minor: payload[1],
        })
    }
}

/// Represents information about a specific feature as returned by the
/// [`RootFeature::get_feature`] function.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct FeatureInformation {
    /// The index of the feature in the device's feature table.
    /// This is used for invocations of functions of that feature.
    pub index: u8,

    /// The type of the feature.
    pub typ: FeatureType,

    /// The latest supported version of the feature.
    pub version: u8,
}
