//! Implements HID communication using the `async-hid` crate.

use std::{
    error::Error,
    fs::{self, File},
    io::Read,
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use async_hid::{
    AsyncHidRead,
    AsyncHidWrite,
    Device,
    DeviceId,
    DeviceInfo,
    DeviceReader,
    DeviceWriter,
    HidBackend,
};
use futures_lite::StreamExt;
use itertools::Itertools;
use tokio::sync::Mutex;
use tracing::debug;
use unifying::{
    async_trait,
    channel::{ChannelConfig, ChannelError, RawHidChannel, RawHidInfo},
    receiver::{
        ReceiverError,
        unifying::{UNIFYING_VPID_PAIRS, UnifyingReceiver},
    },
};

struct AsyncHidDevice {
    reader: Mutex<DeviceReader>,
    writer: Mutex<DeviceWriter>,
    device: DeviceInfo,
    info: RawHidInfo,
}

#[async_trait]
impl RawHidChannel for AsyncHidDevice {
    fn info(&self) -> RawHidInfo {
        self.info.clone()
    }

    async fn write_report(&self, src: &[u8]) -> Result<usize, Box<dyn Error + Sync + Send>> {
        let mut guard = self.writer.lock().await;
        guard.write_output_report(src).await?;
        Ok(src.len())
    }

    async fn read_report(&self, buf: &mut [u8]) -> Result<usize, Box<dyn Error + Sync + Send>> {
        let mut guard = self.reader.lock().await;
        Ok(guard.read_input_report(buf).await?)
    }

    fn supports_short_long_hidpp(&self) -> Option<(bool, bool)> {
        None
    }

    async fn get_report_descriptor(
        &self,
        buf: &mut [u8],
    ) -> Result<usize, Box<dyn Error + Sync + Send>> {
        let DeviceId::DevPath(ref path) = self.device.id else {
            return Err(
                anyhow!("report descriptors are currently only supported on Linux")
                    .into_boxed_dyn_error(),
            );
        };

        let descriptor_path = path.join("device/report_descriptor");
        let mut file = File::open(descriptor_path)?;
        Ok(file.read(buf)?)
    }
}

/// Reads the physical address of a hidraw node from the `HID_PHYS` line of
/// its parent's uevent file.
fn read_address(path: &Path) -> Option<String> {
    let uevent = fs::read_to_string(path.join("device/uevent")).ok()?;

    uevent
        .lines()
        .find_map(|line| line.strip_prefix("HID_PHYS="))
        .map(str::to_owned)
}

fn raw_info(device: &DeviceInfo) -> RawHidInfo {
    let (path, address) = match device.id {
        DeviceId::DevPath(ref path) => (
            path.display().to_string(),
            read_address(path).unwrap_or_default(),
        ),
        #[allow(unreachable_patterns)]
        ref other => (format!("{other:?}"), String::new()),
    };

    RawHidInfo {
        path,
        vendor_id: device.vendor_id,
        product_id: device.product_id,
        name: device.name.clone(),
        address,
    }
}

/// Opens every Unifying receiver on the local machine.
///
/// A receiver exposes several HID interfaces, of which only one speaks HID++.
/// The others are skipped.
pub async fn open_receivers(config: ChannelConfig) -> Result<Vec<UnifyingReceiver>> {
    let hid = HidBackend::default();
    let devices: Vec<Device> = hid
        .enumerate()
        .await?
        .collect::<Vec<Device>>()
        .await
        .into_iter()
        .filter(|dev| UNIFYING_VPID_PAIRS.contains(&(dev.vendor_id, dev.product_id)))
        .unique_by(|x| x.id.clone())
        .collect();

    let mut receivers = Vec::new();
    for dev in devices.into_iter() {
        let (reader, writer) = dev
            .open()
            .await
            .with_context(|| format!("could not open {}", dev.name))?;
        let name = dev.name.clone();
        let device = dev.to_device_info();
        let info = raw_info(&device);

        let raw = AsyncHidDevice {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            device,
            info,
        };

        match UnifyingReceiver::open(raw, config).await {
            Ok(receiver) => receivers.push(receiver),
            Err(ReceiverError::Channel(ChannelError::HidppNotSupported)) => {
                debug!(%name, "skipping HID interface without HID++");
            },
            Err(other) => {
                return Err(
                    anyhow::Error::new(other).context("could not initialize the HID++ channel")
                );
            },
        }
    }

    Ok(receivers)
}
