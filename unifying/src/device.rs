//! Implements the logical devices paired to a receiver.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    button::{Button, CidReporting, ControlId},
    channel::{ChannelError, HidppChannel},
    config::Config,
    feature::{
        CreatableFeature,
        Feature,
        FeatureId,
        FeatureTable,
        battery::{BatteryFeature, BatteryLevel},
        device_information::{DeviceInformationFeature, FirmwareInfo},
        device_type_and_name::{DeviceType, DeviceTypeAndNameFeature},
        feature_set::FeatureSetFeature,
        reprog_controls::ReprogControlsV4Feature,
        root::RootFeature,
    },
    protocol::{
        ProtocolVersion,
        v20::{ErrorType, Hidpp20Error},
    },
};

/// Echoed by the device when asked for its protocol version.
const PROTOCOL_PING: u8 = 0x5a;

/// Represents a mouse paired to a receiver, with everything discovered about
/// it.
///
/// All attributes are read once by [`Device::new`] and never change
/// afterwards. The `get_*` methods query the device again.
#[derive(Clone, Debug)]
pub struct Device {
    chan: Arc<HidppChannel>,
    device_index: u8,
    protocol_version: ProtocolVersion,
    kind: DeviceType,
    name: String,
    features: FeatureTable,
    buttons: Vec<Button>,
}

impl Device {
    /// Discovers the device at `device_index`.
    ///
    /// Looks up the device's features, protocol version, type, name and
    /// programmable controls, in that order, with every request serialized
    /// through the channel.
    ///
    /// Returns [`DeviceError::DeviceNotFound`] if no device answers at the
    /// index. Devices that are no mice, lack the reprogrammable controls
    /// feature or have no controls are rejected as well.
    pub async fn new(chan: Arc<HidppChannel>, device_index: u8) -> Result<Self, DeviceError> {
        let root = RootFeature::new(Arc::clone(&chan), device_index, 0);

        let features = FeatureTable::discover(&root)
            .await
            .map_err(DeviceError::from_discovery)?;
        let protocol_version = root
            .get_protocol_version(PROTOCOL_PING)
            .await
            .map_err(DeviceError::from_discovery)?;

        let mut device = Self {
            chan,
            device_index,
            protocol_version,
            kind: DeviceType::Unknown(0xff),
            name: String::new(),
            features,
            buttons: Vec::new(),
        };

        device.kind = device.get_type().await?;
        if device.kind != DeviceType::Mouse {
            return Err(DeviceError::UnsupportedType(device.kind));
        }

        device.name = device.get_name().await?;

        let count = device.get_button_count().await?;
        if count == 0 {
            return Err(DeviceError::NoButtons);
        }

        let mut buttons = Vec::with_capacity(count as usize);
        for index in 0..count {
            buttons.push(device.get_button(index).await?);
        }
        device.buttons = buttons;

        debug!(
            device_index,
            name = %device.name,
            protocol = %device.protocol_version,
            buttons = device.buttons.len(),
            "discovered device"
        );

        Ok(device)
    }

    pub fn device_index(&self) -> u8 {
        self.device_index
    }

    pub fn protocol_version(&self) -> ProtocolVersion {
        self.protocol_version
    }

    pub fn kind(&self) -> DeviceType {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The features found during discovery.
    pub fn features(&self) -> &FeatureTable {
        &self.features
    }

    /// The programmable controls, ordered by their index.
    pub fn buttons(&self) -> &[Button] {
        &self.buttons
    }

    pub fn button(&self, index: u8) -> Option<&Button> {
        self.buttons.get(index as usize)
    }

    pub fn find_button(&self, cid: ControlId) -> Option<&Button> {
        self.buttons.iter().find(|button| button.cid == cid)
    }

    /// Binds a feature implementation to this device.
    ///
    /// Returns [`None`] if the feature was not found during discovery or the
    /// device only supports an older version than the implementation.
    pub fn get_feature<F: CreatableFeature>(&self) -> Option<F> {
        let feature = self.features.get(F::ID)?;

        (feature.version >= F::STARTING_VERSION).then(|| {
            F::new(Arc::clone(&self.chan), self.device_index, feature.index)
        })
    }

    fn require_feature<F: CreatableFeature>(&self) -> Result<F, DeviceError> {
        self.get_feature::<F>()
            .ok_or(DeviceError::MissingFeature(F::ID))
    }

    /// Queries the HID++ protocol version of the device.
    pub async fn get_protocol_version(&self) -> Result<ProtocolVersion, DeviceError> {
        Ok(self
            .require_feature::<RootFeature>()?
            .get_protocol_version(PROTOCOL_PING)
            .await?)
    }

    /// Queries the marketing type of the device.
    pub async fn get_type(&self) -> Result<DeviceType, DeviceError> {
        Ok(self
            .require_feature::<DeviceTypeAndNameFeature>()?
            .get_device_type()
            .await?)
    }

    /// Queries the marketing name of the device.
    pub async fn get_name(&self) -> Result<String, DeviceError> {
        Ok(self
            .require_feature::<DeviceTypeAndNameFeature>()?
            .get_whole_device_name()
            .await?)
    }

    /// Queries the amount of programmable controls.
    pub async fn get_button_count(&self) -> Result<u8, DeviceError> {
        Ok(self
            .require_feature::<ReprogControlsV4Feature>()?
            .get_count()
            .await?)
    }

    /// Queries the programmable control at `index`.
    pub async fn get_button(&self, index: u8) -> Result<Button, DeviceError> {
        Ok(self
            .require_feature::<ReprogControlsV4Feature>()?
            .get_control_info(index)
            .await?)
    }

    /// Reads back how a control currently reports its events.
    pub async fn get_cid_reporting(&self, button: &Button) -> Result<CidReporting, DeviceError> {
        self.check_owned(button)?;

        Ok(self
            .require_feature::<ReprogControlsV4Feature>()?
            .get_cid_reporting(button.cid)
            .await?)
    }

    /// Makes `button` behave like the control `new_cid`, undoing any divert.
    ///
    /// A rejection by the device is returned as
    /// [`Hidpp20Error::Feature`] and leaves both the button and the device
    /// usable.
    pub async fn remap_button(
        &self,
        button: &Button,
        new_cid: ControlId,
    ) -> Result<CidReporting, DeviceError> {
        self.check_owned(button)?;

        let controls = self.require_feature::<ReprogControlsV4Feature>()?;
        let reporting = CidReporting {
            cid: button.cid,
            divert: false,
            persist: false,
            remap: new_cid,
        };

        match controls.set_cid_reporting(reporting).await {
            Ok(applied) => {
                debug!(device_index = self.device_index, cid = %button.cid, to = %new_cid, "remapped control");
                Ok(applied)
            },
            Err(err) => {
                warn!(device_index = self.device_index, cid = %button.cid, %err, "remap was rejected");
                Err(err.into())
            },
        }
    }

    /// Enumerates every feature the device supports, including ones not
    /// looked up during discovery.
    ///
    /// Returns `Ok(None)` if the device lacks the feature set feature.
    pub async fn enumerate_features(&self) -> Result<Option<Vec<Feature>>, Hidpp20Error> {
        let Some(feature_set) = self.get_feature::<FeatureSetFeature>() else {
            return Ok(None);
        };

        let count = feature_set.count().await?;
        let mut features = Vec::with_capacity(count as usize + 1);
        features.push(Feature::ROOT);
        for index in 1..=count {
            features.push(feature_set.get_feature(index).await?);
        }

        Ok(Some(features))
    }

    /// Queries the battery level, if the device reports one.
    pub async fn get_battery(&self) -> Result<Option<BatteryLevel>, Hidpp20Error> {
        match self.get_feature::<BatteryFeature>() {
            Some(battery) => Ok(Some(battery.get_battery_level().await?)),
            None => Ok(None),
        }
    }

    /// Queries the firmware of every entity of the device.
    ///
    /// Returns `Ok(None)` if the device lacks the firmware feature.
    pub async fn get_firmware(&self) -> Result<Option<Vec<FirmwareInfo>>, Hidpp20Error> {
        let Some(information) = self.get_feature::<DeviceInformationFeature>() else {
            return Ok(None);
        };

        let count = information.get_entity_count().await?;
        let mut firmware = Vec::with_capacity(count as usize);
        for entity in 0..count {
            firmware.push(information.get_fw_info(entity).await?);
        }

        Ok(Some(firmware))
    }

    /// Accepts button bindings for this device.
    ///
    /// Bindings are only checked against the device's controls; nothing is
    /// applied yet.
    pub fn set_config(&self, config: &Config) {
        for (name, entry) in config.entries() {
            let bound = name
                .parse::<ControlId>()
                .ok()
                .and_then(|cid| self.find_button(cid));

            match bound {
                Some(button) => debug!(
                    device_index = self.device_index,
                    binding = %name,
                    button = button.index,
                    enabled = entry.enabled,
                    "accepted button binding"
                ),
                None => warn!(
                    device_index = self.device_index,
                    binding = %name,
                    "binding names no control of this device"
                ),
            }
        }
    }

    fn check_owned(&self, button: &Button) -> Result<(), DeviceError> {
        if button.device_index != self.device_index || self.button(button.index) != Some(button) {
            return Err(DeviceError::UnknownButton(button.index));
        }

        Ok(())
    }
}

/// Represents a device-specific error.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DeviceError {
    /// Indicates that a feature call failed.
    #[error("a HID++2.0 feature call failed")]
    Protocol(#[from] Hidpp20Error),

    /// Indicates that the specified device index points to no device.
    #[error("there is no device with the specified device index")]
    DeviceNotFound,

    /// Indicates that the device lacks a feature required for the operation.
    #[error("the device does not support the {0} feature")]
    MissingFeature(FeatureId),

    /// Indicates that the device is not a mouse.
    #[error("unsupported device type {0}")]
    UnsupportedType(DeviceType),

    /// Indicates that the device has no programmable controls.
    #[error("the device has no programmable controls")]
    NoButtons,

    /// Indicates that a button does not belong to the device.
    #[error("button {0} does not belong to this device")]
    UnknownButton(u8),
}

impl DeviceError {
    /// Treats a missing reply or an unpaired index as "no device".
    fn from_discovery(err: Hidpp20Error) -> Self {
        match err {
            Hidpp20Error::Channel(ChannelError::Timeout(_))
            | Hidpp20Error::Feature(ErrorType::UnknownDevice | ErrorType::ResourceError) => {
                DeviceError::DeviceNotFound
            },
            other => DeviceError::Protocol(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        channel::ChannelConfig,
        mock::{MockChannel, SimulatedDevice},
    };

    async fn channel(devices: Vec<SimulatedDevice>) -> Arc<HidppChannel> {
        let config = ChannelConfig {
            timeout: Duration::from_millis(100),
            ..ChannelConfig::default()
        };

        Arc::new(
            HidppChannel::from_raw_channel(MockChannel::with_devices(devices), config)
                .await
                .unwrap(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn discovers_mouse_with_buttons() {
        let chan = channel(vec![SimulatedDevice::mouse(0x01, "Wireless Mouse M705", 5)]).await;

        let device = Device::new(chan, 0x01).await.unwrap();

        assert_eq!(device.kind(), DeviceType::Mouse);
        assert_eq!(device.name(), "Wireless Mouse M705");
        assert_eq!(device.protocol_version().to_string(), "4.5");
        assert_eq!(device.buttons().len(), 5);
        assert!(device.buttons().iter().enumerate().all(|(i, b)| b.index as usize == i));
        assert_eq!(device.buttons()[0].cid, ControlId::Left);
        assert_eq!(device.features().index_of(FeatureId::Root), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_index_is_not_found() {
        let chan = channel(vec![SimulatedDevice::mouse(0x02, "M705", 5).silent()]).await;

        assert!(matches!(
            Device::new(chan, 0x02).await,
            Err(DeviceError::DeviceNotFound)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn unpaired_index_is_not_found() {
        let chan = channel(vec![]).await;

        assert!(matches!(
            Device::new(chan, 0x04).await,
            Err(DeviceError::DeviceNotFound)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn keyboards_are_rejected() {
        let chan = channel(vec![SimulatedDevice::keyboard(0x01, "K270")]).await;

        assert!(matches!(
            Device::new(chan, 0x01).await,
            Err(DeviceError::UnsupportedType(DeviceType::Keyboard))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn mice_need_programmable_controls() {
        let chan = channel(vec![
            SimulatedDevice::mouse(0x01, "M185", 5).without_feature(FeatureId::ControlsV4),
            SimulatedDevice::mouse(0x02, "M185", 0),
        ])
        .await;

        assert!(matches!(
            Device::new(Arc::clone(&chan), 0x01).await,
            Err(DeviceError::MissingFeature(FeatureId::ControlsV4))
        ));
        assert!(matches!(
            Device::new(chan, 0x02).await,
            Err(DeviceError::NoButtons)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn optional_features_may_be_missing() {
        let chan = channel(vec![
            SimulatedDevice::mouse(0x01, "M705", 3)
                .without_feature(FeatureId::Battery)
                .without_feature(FeatureId::FeatureSet),
        ])
        .await;

        let device = Device::new(chan, 0x01).await.unwrap();

        assert_eq!(device.get_battery().await.unwrap(), None);
        assert_eq!(device.enumerate_features().await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_optional_lookup_keeps_the_device() {
        let chan = channel(vec![
            SimulatedDevice::mouse(0x01, "M705", 5).ignoring_lookup_of(FeatureId::Firmware),
        ])
        .await;

        let device = Device::new(chan, 0x01).await.unwrap();

        assert_eq!(device.name(), "M705");
        assert!(!device.features().contains(FeatureId::Firmware));
        assert_eq!(device.buttons().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn remap_is_applied() {
        let chan = channel(vec![SimulatedDevice::mouse(0x01, "M705", 5)]).await;
        let device = Device::new(chan, 0x01).await.unwrap();
        let back = *device.find_button(ControlId::Back).unwrap();

        let applied = device.remap_button(&back, ControlId::Middle).await.unwrap();

        assert_eq!(applied.cid, ControlId::Back);
        assert_eq!(applied.remap, ControlId::Middle);
        let reporting = device.get_cid_reporting(&back).await.unwrap();
        assert_eq!(reporting.remap, ControlId::Middle);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_remap_is_surfaced() {
        let chan = channel(vec![SimulatedDevice::mouse(0x01, "M705", 5)]).await;
        let device = Device::new(chan, 0x01).await.unwrap();
        let left = *device.find_button(ControlId::Left).unwrap();
        assert!(!left.reprogrammable);

        let err = device.remap_button(&left, ControlId::Back).await.unwrap_err();

        assert!(matches!(
            err,
            DeviceError::Protocol(Hidpp20Error::Feature(ErrorType::InvalidParameter))
        ));
        assert_eq!(device.get_name().await.unwrap(), "M705");
    }

    #[tokio::test(start_paused = true)]
    async fn foreign_buttons_are_refused() {
        let chan = channel(vec![
            SimulatedDevice::mouse(0x01, "M705", 5),
            SimulatedDevice::mouse(0x02, "M705", 5),
        ])
        .await;
        let first = Device::new(Arc::clone(&chan), 0x01).await.unwrap();
        let second = Device::new(chan, 0x02).await.unwrap();

        let err = first
            .remap_button(&second.buttons()[3], ControlId::Back)
            .await
            .unwrap_err();
        assert!(matches!(err, DeviceError::UnknownButton(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn enumerates_all_features() {
        let chan = channel(vec![SimulatedDevice::mouse(0x01, "M705", 5)]).await;
        let device = Device::new(chan, 0x01).await.unwrap();

        let features = device.enumerate_features().await.unwrap().unwrap();

        assert_eq!(features[0], Feature::ROOT);
        for feature in device.features().iter() {
            assert!(features.iter().any(|f| f.id == feature.id && f.index == feature.index));
        }
        assert!(device.get_battery().await.unwrap().is_some());
        assert_eq!(device.get_firmware().await.unwrap().unwrap().len(), 1);
    }
}
