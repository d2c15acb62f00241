//! Implements the `ReprogControlsV4` feature (ID `0x1b04`), used to enumerate
//! the programmable controls of a device and to change how they report.

use std::sync::Arc;

use crate::{
    button::{Button, CidReporting, ControlId},
    channel::{HidppChannel, ReportKind},
    feature::{CreatableFeature, FeatureId},
    nibble::U4,
    protocol::v20::{self, Hidpp20Error},
};

/// Implements the `ReprogControlsV4` / `0x1b04` feature.
#[derive(Clone)]
pub struct ReprogControlsV4Feature {
    /// The underlying HID++ channel.
    chan: Arc<HidppChannel>,

    /// The index of the device to implement the feature for.
    device_index: u8,

    /// The index of the feature in the feature table.
    feature_index: u8,
}

impl CreatableFeature for ReprogControlsV4Feature {
    const ID: FeatureId = FeatureId::ControlsV4;
    const STARTING_VERSION: u8 = 0;

    fn new(chan: Arc<HidppChannel>, device_index: u8, feature_index: u8) -> Self {
        Self {
            chan,
            device_index,
            feature_index,
        }
    }
}

impl ReprogControlsV4Feature {
    fn header(&self, function: u8) -> v20::MessageHeader {
        v20::MessageHeader {
            device_index: self.device_index,
            feature_index: self.feature_index,
            function_id: U4::from_lo(function),
            software_id: self.chan.get_sw_id(),
        }
    }

    /// Retrieves the amount of programmable controls of the device.
    pub async fn get_count(&self) -> Result<u8, Hidpp20Error> {
        let response = self
            .chan
            .send_v20(v20::Message::Short(self.header(0), [0x00, 0x00, 0x00]))
            .await?;

        Ok(response.extend_payload()[0])
    }

    /// Retrieves information about the control at `index`, which must be
    /// smaller than [`Self::get_count`].
    pub async fn get_control_info(&self, index: u8) -> Result<Button, Hidpp20Error> {
        let response = self
            .chan
            .send_v20(v20::Message::Short(self.header(1), [index, 0x00, 0x00]))
            .await?;

        Button::from_payload(self.device_index, index, response.payload())
            .ok_or(Hidpp20Error::UnsupportedResponse)
    }

    /// Reads back how a control currently reports its events.
    pub async fn get_cid_reporting(&self, cid: ControlId) -> Result<CidReporting, Hidpp20Error> {
        let [cid_hi, cid_lo] = u16::from(cid).to_be_bytes();
        let response = self
            .chan
            .send_v20(v20::Message::Short(self.header(2), [cid_hi, cid_lo, 0x00]))
            .await?;

        CidReporting::from_payload(&response.extend_payload()).ok_or(Hidpp20Error::UnsupportedResponse)
    }

    /// Changes how a control reports its events.
    ///
    /// Devices answer with an error reply if the control cannot be changed
    /// this way, for example because it is not reprogrammable.
    pub async fn set_cid_reporting(&self, reporting: CidReporting) -> Result<CidReporting, Hidpp20Error> {
        let response = self
            .chan
            .send_v20(v20::Message::with_params(
                ReportKind::Long,
                self.header(3),
                &reporting.to_params(),
            ))
            .await?;

        CidReporting::from_payload(response.payload()).ok_or(Hidpp20Error::UnsupportedResponse)
    }
}
