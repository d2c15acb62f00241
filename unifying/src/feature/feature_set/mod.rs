//! Implements the `FeatureSet` feature (ID `0x0001`), which enumerates every
//! feature a device supports.

use std::sync::Arc;

use crate::{
    channel::HidppChannel,
    feature::{CreatableFeature, Feature, FeatureId, FeatureType},
    nibble::U4,
    protocol::v20::{self, Hidpp20Error},
};

/// Implements the `FeatureSet` / `0x0001` feature.
///
/// Call [`Self::count`] to retrieve the amount of supported features
/// (excluding the root feature), then [`Self::get_feature`] for every
/// `i in 1..=count`.
#[derive(Clone)]
pub struct FeatureSetFeature {
    chan: Arc<HidppChannel>,
    device_index: u8,
    feature_index: u8,
}

impl CreatableFeature for FeatureSetFeature {
    const ID: FeatureId = FeatureId::FeatureSet;
    const STARTING_VERSION: u8 = 0;

    fn new(chan: Arc<HidppChannel>, device_index: u8, feature_index: u8) -> Self {
        Self {
            chan,
            device_index,
            feature_index,
        }
    }
}

impl FeatureSetFeature {
    fn header(&self, function: u8) -> v20::MessageHeader {
        v20::MessageHeader {
            device_index: self.device_index,
            feature_index: self.feature_index,
            function_id: U4::from_lo(function),
            software_id: self.chan.get_sw_id(),
        }
    }

    /// Retrieves the amount of features supported by the device, not including
    /// the root feature.
    pub async fn count(&self) -> Result<u8, Hidpp20Error> {
        let response = self
            .chan
            .send_v20(v20::Message::Short(self.header(0), [0x00, 0x00, 0x00]))
            .await?;

        Ok(response.extend_payload()[0])
    }

    /// Retrieves the feature stored at a specific index of the device's
    /// feature table.
    ///
    /// Feature index `0` for the root feature is not allowed.
    pub async fn get_feature(&self, index: u8) -> Result<Feature, Hidpp20Error> {
        let response = self
            .chan
            .send_v20(v20::Message::Short(self.header(1), [index, 0x00, 0x00]))
            .await?;

        let payload = response.extend_payload();

        Ok(Feature {
            id: FeatureId::from(u16::from_be_bytes([payload[0], payload[1]])),
            index,
            typ: FeatureType::from(payload[2]),
            version: payload[3],
        })
    }
}
