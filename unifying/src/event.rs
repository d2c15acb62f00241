//! Decodes the input reports a receiver forwards into button events.

use std::sync::{Mutex, PoisonError};

use tracing::{debug, trace};

use crate::{
    button::Button,
    channel::EVENT_REPORT_ID,
    device::Device,
    feature::device_type_and_name::DeviceType,
};

/// A simple event emitter sending every event to any number of listeners.
#[derive(Debug)]
pub struct EventEmitter<T: Clone> {
    senders: Mutex<Vec<flume::Sender<T>>>,
}

impl<T: Clone> Default for EventEmitter<T> {
    fn default() -> Self {
        Self {
            senders: Mutex::new(Vec::new()),
        }
    }
}

impl<T: Clone> EventEmitter<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new listener receiving every event emitted from now on.
    pub fn create_receiver(&self) -> flume::Receiver<T> {
        let (tx, rx) = flume::unbounded();
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Emits an event to all listeners. Listeners that were dropped are
    /// removed.
    pub fn emit(&self, event: T) {
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|sender| sender.send(event.clone()).is_ok());
    }
}

/// The set of buttons held down on a device, as of one input report.
///
/// An empty set means all buttons were released.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ButtonEvent {
    pub device_index: u8,
    pub pressed: Vec<Button>,
}

/// Picks the buttons of `device` whose bit is set in the button bitmask of a
/// mouse input report (byte 3).
pub fn pressed_buttons(device: &Device, report: &[u8]) -> Vec<Button> {
    let Some(&mask) = report.get(3) else {
        return Vec::new();
    };

    device
        .buttons()
        .iter()
        .filter(|button| button.cid.event_mask().is_some_and(|bit| mask & bit != 0))
        .copied()
        .collect()
}

/// Decodes an input report for whichever of `devices` sent it.
///
/// Returns [`None`] for reports of unknown devices, which may simply not have
/// been discovered yet.
pub fn dispatch(devices: &[Device], report: &[u8]) -> Option<ButtonEvent> {
    if report.first() != Some(&EVENT_REPORT_ID) || report.len() < 4 {
        trace!(report = ?report, "ignoring malformed input report");
        return None;
    }

    let device_index = report[1];
    let Some(device) = devices.iter().find(|device| device.device_index() == device_index) else {
        debug!(device_index, "received input report for an unknown device");
        return None;
    };

    if device.kind() != DeviceType::Mouse {
        return None;
    }

    let pressed = pressed_buttons(device, report);
    trace!(device_index, pressed = pressed.len(), "decoded input report");

    Some(ButtonEvent {
        device_index,
        pressed,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        button::ControlId,
        channel::{ChannelConfig, HidppChannel},
        mock::{MockChannel, SimulatedDevice},
    };

    async fn mouse() -> Device {
        let mock = MockChannel::with_devices(vec![SimulatedDevice::mouse(0x01, "M705", 5)]);
        let chan = HidppChannel::from_raw_channel(mock, ChannelConfig::default())
            .await
            .unwrap();

        Device::new(Arc::new(chan), 0x01).await.unwrap()
    }

    #[tokio::test]
    async fn decodes_pressed_buttons() {
        let devices = vec![mouse().await];
        let report = [0x20, 0x01, 0x02, 0x09, 0x00, 0x00, 0x00, 0x00];

        let event = dispatch(&devices, &report).unwrap();

        assert_eq!(event.device_index, 0x01);
        let cids: Vec<ControlId> = event.pressed.iter().map(|b| b.cid).collect();
        assert_eq!(cids, [ControlId::Left, ControlId::Back]);
    }

    #[tokio::test]
    async fn release_yields_empty_set() {
        let devices = vec![mouse().await];

        let event = dispatch(&devices, &[0x20, 0x01, 0x02, 0x00, 0x00]).unwrap();
        assert!(event.pressed.is_empty());
    }

    #[tokio::test]
    async fn unknown_devices_are_dropped() {
        let devices = vec![mouse().await];

        assert_eq!(dispatch(&devices, &[0x20, 0x03, 0x02, 0x01, 0x00]), None);
        assert_eq!(dispatch(&devices, &[0x20, 0x01]), None);
        assert_eq!(dispatch(&[], &[0x20, 0x01, 0x02, 0x01]), None);
    }

    #[test]
    fn emitter_skips_dropped_listeners() {
        let emitter = EventEmitter::new();
        let kept = emitter.create_receiver();
        drop(emitter.create_receiver());

        emitter.emit(7u8);
        emitter.emit(8u8);

        assert_eq!(kept.drain().collect::<Vec<_>>(), [7, 8]);
        assert_eq!(emitter.senders.lock().unwrap().len(), 1);
    }
}
