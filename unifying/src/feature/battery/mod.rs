//! Implements the `BatteryLevelStatus` feature (ID `0x1000`).

use std::sync::Arc;

use num_enum::{FromPrimitive, IntoPrimitive};

use crate::{
    channel::HidppChannel,
    feature::{CreatableFeature, FeatureId},
    nibble::U4,
    protocol::v20::{self, Hidpp20Error},
};

/// Implements the `BatteryLevelStatus` / `0x1000` feature.
#[derive(Clone)]
pub struct BatteryFeature {
    chan: Arc<HidppChannel>,
    device_index: u8,
    feature_index: u8,
}

impl CreatableFeature for BatteryFeature {
    const ID: FeatureId = FeatureId::Battery;
    const STARTING_VERSION: u8 = 0;

    fn new(chan: Arc<HidppChannel>, device_index: u8, feature_index: u8) -> Self {
        Self {
            chan,
            device_index,
            feature_index,
        }
    }
}

impl BatteryFeature {
    /// Retrieves the current discharge level of the battery.
    pub async fn get_battery_level(&self) -> Result<BatteryLevel, Hidpp20Error> {
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

        let payload = response.extend_payload();
        if payload[0] > 100 || payload[1] > 100 {
            return Err(Hidpp20Error::UnsupportedResponse);
        }

        Ok(BatteryLevel {
            percentage: payload[0],
            next_percentage: payload[1],
            status: BatteryStatus::from(payload[2]),
        })
    }
}

/// The battery state reported by [`BatteryFeature::get_battery_level`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BatteryLevel {
    /// The current discharge level in percent. `0` means unknown.
    pub percentage: u8,

    /// The level the device will report next, in percent.
    pub next_percentage: u8,

    pub status: BatteryStatus,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, IntoPrimitive, FromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum BatteryStatus {
    Discharging = 0,
    Recharging = 1,
    AlmostFull = 2,
    Full = 3,
    SlowRecharge = 4,
    InvalidBattery = 5,
    ThermalError = 6,

    #[num_enum(catch_all)]
    Other(u8),
}
