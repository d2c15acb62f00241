//! Implements the `DeviceInformation` feature (ID `0x0003`), which describes
//! the firmware of the entities a device consists of.

use std::{fmt, sync::Arc};

use num_enum::{FromPrimitive, IntoPrimitive};

use crate::{
    bcd,
    channel::HidppChannel,
    feature::{CreatableFeature, FeatureId},
    nibble::U4,
    protocol::v20::{self, Hidpp20Error},
};

/// Implements the `DeviceInformation` / `0x0003` feature.
#[derive(Clone)]
pub struct DeviceInformationFeature {
    chan: Arc<HidppChannel>,
    device_index: u8,
    feature_index: u8,
}

impl CreatableFeature for DeviceInformationFeature {
    const ID: FeatureId = FeatureId::Firmware;
    const STARTING_VERSION: u8 = 0;

    fn new(chan: Arc<HidppChannel>, device_index: u8, feature_index: u8) -> Self {
        Self {
            chan,
            device_index,
            feature_index,
        }
    }
}

impl DeviceInformationFeature {
    /// Retrieves the amount of entities whose firmware can be queried using
    /// [`Self::get_fw_info`].
    pub async fn get_entity_count(&self) -> Result<u8, Hidpp20Error> {
        let response = self
            .chan
            .send_v20(v20::Message::Short(
                v20::MessageHeader {
                    device_index: self.device_index,
                    feature_index: self.feature_index,
                    function_id: U4::from_lo(0),
                    software_id: self.chan.get_sw_id(),
                },
                [0x00, 0x00, 0x00],
            ))
            .await?;

        Ok(response.extend_payload()[0])
    }

    /// Retrieves information about the firmware of a specific entity.
    pub async fn get_fw_info(&self, entity_index: u8) -> Result<FirmwareInfo, Hidpp20Error> {
        let response = self
            .chan
            .send_v20(v20::Message::Short(
                v20::MessageHeader {
                    device_index: self.device_index,
                    feature_index: self.feature_index,
                    function_id: U4::from_lo(1),
                    software_id: self.chan.get_sw_id(),
                },
                [entity_index, 0x00, 0x00],
            ))
            .await?;

        FirmwareInfo::from_payload(&response.extend_payload())
            .ok_or(Hidpp20Error::UnsupportedResponse)
    }
}

/// Represents the firmware of one device entity.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FirmwareInfo {
    pub entity_type: EntityType,

    /// A 3-letter prefix for the firmware name.
    pub prefix: String,

    /// Decoded from packed BCD.
    pub number: u8,

    /// Decoded from packed BCD.
    pub revision: u8,

    /// Decoded from packed BCD.
    pub build: u16,

    /// Whether the entity is the active one that answered the request.
    pub active: bool,

    pub transport_pid: u16,
}

impl FirmwareInfo {
    fn from_payload(payload: &[u8; 16]) -> Option<Self> {
        Some(Self {
            entity_type: EntityType::from(payload[0]),
            prefix: String::from_utf8(payload[1..4].to_vec()).ok()?,
            number: bcd::decode_u8(payload[4])?,
            revision: bcd::decode_u8(payload[5])?,
            build: bcd::decode_u16(u16::from_be_bytes([payload[6], payload[7]]))?,
            active: payload[8] & 1 != 0,
            transport_pid: u16::from_be_bytes([payload[9], payload[10]]),
        })
    }
}

impl fmt::Display for FirmwareInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:02}.{:02}.B{:04}",
            self.prefix, self.number, self.revision, self.build
        )
    }
}

/// Represents the type of a device entity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, IntoPrimitive, FromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum EntityType {
    MainApplication = 0,
    Bootloader = 1,
    Hardware = 2,
    Touchpad = 3,
    OpticalSensor = 4,
    Softdevice = 5,
    RfCompanionMcu = 6,

    #[num_enum(catch_all)]
    Other(u8),
}
