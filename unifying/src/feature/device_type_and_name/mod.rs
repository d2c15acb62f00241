//! Implements the `DeviceTypeAndName` feature (ID `0x0005`).

use std::{fmt, sync::Arc};

use num_enum::{FromPrimitive, IntoPrimitive};

use crate::{
    channel::HidppChannel,
    feature::{CreatableFeature, FeatureId},
    nibble::U4,
    protocol::v20::{self, Hidpp20Error},
};

/// Implements the `DeviceTypeAndName` / `0x0005` feature.
#[derive(Clone)]
pub struct DeviceTypeAndNameFeature {
    /// The underlying HID++ channel.
    chan: Arc<HidppChannel>,

    /// The index of the device to implement the feature for.
    device_index: u8,

    /// The index of the feature in the feature table.
    feature_index: u8,
}

impl CreatableFeature for DeviceTypeAndNameFeature {
    const ID: FeatureId = FeatureId::NameType;
    const STARTING_VERSION: u8 = 0;

    fn new(chan: Arc<HidppChannel>, device_index: u8, feature_index: u8) -> Self {
        Self {
            chan,
            device_index,
            feature_index,
        }
    }
}

impl DeviceTypeAndNameFeature {
    fn request(&self, function: u8, params: [u8; 3]) -> v20::Message {
        v20::Message::Short(
            v20::MessageHeader {
                device_index: self.device_index,
                feature_index: self.feature_index,
                function_id: U4::from_lo(function),
                software_id: self.chan.get_sw_id(),
            },
            params,
        )
    }

    /// Retrieves the amount of bytes in the marketing name of the device.
    pub async fn get_device_name_count(&self) -> Result<u8, Hidpp20Error> {
        let response = self.chan.send_v20(self.request(0, [0x00, 0x00, 0x00])).await?;

        Ok(response.extend_payload()[0])
    }

    /// Retrieves a chunk of the marketing name of the device, starting at a
    /// specific byte offset.
    ///
    /// The chunk holds the whole reply payload, so at most 3 or 16 bytes
    /// depending on the reply kind. Bytes past the end of the name are
    /// padding.
    pub async fn get_device_name(&self, offset: u8) -> Result<Vec<u8>, Hidpp20Error> {
        let response = self.chan.send_v20(self.request(1, [offset, 0x00, 0x00])).await?;

        Ok(response.payload().to_vec())
    }

    /// Retrieves the whole marketing name of the device by first calling
    /// [`Self::get_device_name_count`] once and then repeatedly calling
    /// [`Self::get_device_name`] until all bytes were received.
    ///
    /// Bytes that are not valid UTF-8 are replaced with `U+FFFD`.
    pub async fn get_whole_device_name(&self) -> Result<String, Hidpp20Error> {
        let count = self.get_device_name_count().await? as usize;
        let mut name = Vec::with_capacity(count);

        while name.len() < count {
            let chunk = self.get_device_name(name.len() as u8).await?;
            let take = chunk.len().min(count - name.len());

            if take == 0 {
                return Err(Hidpp20Error::UnsupportedResponse);
            }
            name.extend_from_slice(&chunk[..take]);
        }

        Ok(String::from_utf8_lossy(&name).into_owned())
    }

    /// Retrieves the marketing type of the device.
    pub async fn get_device_type(&self) -> Result<DeviceType, Hidpp20Error> {
        let response = self.chan.send_v20(self.request(2, [0x00, 0x00, 0x00])).await?;

        Ok(DeviceType::from(response.extend_payload()[0]))
    }
}

/// Represents the marketing type of a device.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, IntoPrimitive, FromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[repr(u8)]
pub enum DeviceType {
    Keyboard = 0,
    RemoteControl = 1,
    Numpad = 2,
    Mouse = 3,
    Touchpad = 4,
    Trackball = 5,
    Presenter = 6,
    Receiver = 7,

    #[num_enum(catch_all)]
    Unknown(u8),
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeviceType::Keyboard => "keyboard",
            DeviceType::RemoteControl => "remote_control",
            DeviceType::Numpad => "numpad",
            DeviceType::Mouse => "mouse",
            DeviceType::Touchpad => "touchpad",
            DeviceType::Trackball => "trackball",
            DeviceType::Presenter => "presenter",
            DeviceType::Receiver => "receiver",
            DeviceType::Unknown(_) => "unknown",
        })
    }
}
