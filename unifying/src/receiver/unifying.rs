//! Implements the Logitech Unifying receiver.
//!
//! A Unifying receiver relays HID++ traffic for up to six paired devices and
//! forwards their input reports on the same HID channel. This implementation
//! discovers the mice among the paired devices and turns their input reports
//! into [`ButtonEvent`]s.

use std::sync::{Arc, PoisonError, RwLock};

use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::{DEVICE_INDICES, ReceiverError};
use crate::{
    channel::{ChannelConfig, ChannelError, HidppChannel, RawHidChannel},
    device::Device,
    event::{self, ButtonEvent, EventEmitter},
};

/// Contains all known USB vendor and product ID pairs representing Unifying
/// receivers.
pub const UNIFYING_VPID_PAIRS: &[(u16, u16)] = &[(0x046d, 0xc52b)];

type DeviceList = Arc<RwLock<Arc<Vec<Device>>>>;

/// Implements the Unifying wireless receiver.
pub struct UnifyingReceiver {
    /// The underlying HID++ channel.
    chan: Arc<HidppChannel>,

    /// The devices found by the last scan. Replaced as a whole on rescans, so
    /// event dispatch can work on a snapshot without locking.
    devices: DeviceList,

    /// The emitter used to emit button events.
    emitter: Arc<EventEmitter<ButtonEvent>>,

    /// Drains the channel's input reports.
    dispatcher: JoinHandle<()>,
}

impl UnifyingReceiver {
    /// Opens a receiver on a raw HID channel.
    ///
    /// Returns [`ReceiverError::UnknownReceiver`] without touching the channel
    /// if its vendor and product IDs don't match any known Unifying receiver.
    pub async fn open(raw: impl RawHidChannel, config: ChannelConfig) -> Result<Self, ReceiverError> {
        let info = raw.info();
        check_vpid(info.vendor_id, info.product_id)?;

        let chan = HidppChannel::from_raw_channel(raw, config).await?;
        Self::new(Arc::new(chan))
    }

    /// Tries to initialize a new [`UnifyingReceiver`] from an established
    /// HID++ channel and starts dispatching its input reports.
    ///
    /// If the vendor and product IDs don't match the ones of any known
    /// Unifying receiver, this function will return
    /// [`ReceiverError::UnknownReceiver`].
    pub fn new(chan: Arc<HidppChannel>) -> Result<Self, ReceiverError> {
        check_vpid(chan.info().vendor_id, chan.info().product_id)?;

        let devices = DeviceList::default();
        let emitter = Arc::new(EventEmitter::new());

        let dispatcher = tokio::spawn({
            let reports = chan.events();
            let devices = Arc::clone(&devices);
            let emitter = Arc::clone(&emitter);

            async move {
                while let Ok(report) = reports.recv_async().await {
                    let snapshot = Arc::clone(&*devices.read().unwrap_or_else(PoisonError::into_inner));
                    let emitter = Arc::clone(&emitter);

                    tokio::spawn(async move {
                        if let Some(event) = event::dispatch(&snapshot, &report) {
                            emitter.emit(event);
                        }
                    });
                }

                trace!("input report queue closed");
            }
        });

        Ok(Self {
            chan,
            devices,
            emitter,
            dispatcher,
        })
    }

    /// Discovers the devices at every index from 1 to 6, replacing the
    /// previously discovered ones.
    ///
    /// Indices without a usable mouse are skipped. The scan only fails if the
    /// channel itself was closed.
    pub async fn scan_devices(&self) -> Result<Arc<Vec<Device>>, ReceiverError> {
        let mut found = Vec::new();

        for device_index in DEVICE_INDICES {
            match Device::new(Arc::clone(&self.chan), device_index).await {
                Ok(device) => found.push(device),
                Err(err) => debug!(device_index, %err, "skipping device index"),
            }
        }

        if self.chan.is_closed() {
            return Err(ChannelError::Closed.into());
        }

        let found = Arc::new(found);
        *self.devices.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&found);

        Ok(found)
    }

    /// The devices found by the last scan.
    pub fn devices(&self) -> Arc<Vec<Device>> {
        Arc::clone(&self.devices.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// The device found at `device_index` by the last scan.
    pub fn device(&self, device_index: u8) -> Option<Device> {
        self.devices()
            .iter()
            .find(|device| device.device_index() == device_index)
            .cloned()
    }

    /// Creates a new listener for button events of the discovered devices.
    pub fn listen(&self) -> flume::Receiver<ButtonEvent> {
        self.emitter.create_receiver()
    }

    /// Stops the reader task and fails any in-flight request.
    pub fn close(&self) {
        self.chan.close();
    }

    pub fn channel(&self) -> &Arc<HidppChannel> {
        &self.chan
    }

    /// The path of the device node the receiver was opened from.
    pub fn path(&self) -> &str {
        &self.chan.info().path
    }

    pub fn vendor_id(&self) -> u16 {
        self.chan.info().vendor_id
    }

    pub fn product_id(&self) -> u16 {
        self.chan.info().product_id
    }

    pub fn name(&self) -> &str {
        &self.chan.info().name
    }

    /// The physical (bus topology) address of the receiver.
    pub fn address(&self) -> &str {
        &self.chan.info().address
    }
}

impl Drop for UnifyingReceiver {
    fn drop(&mut self) {
        self.chan.close();
        self.dispatcher.abort();
    }
}

fn check_vpid(vendor_id: u16, product_id: u16) -> Result<(), ReceiverError> {
    if !UNIFYING_VPID_PAIRS.contains(&(vendor_id, product_id)) {
        return Err(ReceiverError::UnknownReceiver {
            vendor_id,
            product_id,
        });
    }

    Ok(())
}
