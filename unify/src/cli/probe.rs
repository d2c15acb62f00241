use std::io::{BufWriter, Write};

use anyhow::Result;
use clap::Args;
use owo_colors::OwoColorize;
use serde::Serialize;
use serde_json::json;
use tracing::warn;
use unifying::{
    button::Button,
    device::Device,
    feature::{
        Feature,
        battery::{BatteryLevel, BatteryStatus},
        device_information::FirmwareInfo,
        device_type_and_name::DeviceType,
    },
};

use super::Cli;

/// Detect receivers and view what is known about their mice.
#[derive(Args)]
pub struct ProbeCommand {}

impl ProbeCommand {
    pub async fn execute(&self, root: &Cli) -> Result<()> {
        let mut stdout = BufWriter::new(anstream::stdout());

        let receivers = probe_receivers(root).await?;

        if root.json {
            writeln!(stdout, "{}", json!(receivers))?;
            stdout.flush()?;
            return Ok(());
        }

        for (receiver_i, receiver) in receivers.into_iter().enumerate() {
            if receiver_i != 0 {
                writeln!(stdout)?;
            }

            writeln!(
                stdout,
                "{}: {} ({:#06x}:{:#06x})",
                receiver.path.bright_black(),
                receiver.name,
                receiver.vendor_id.bright_black(),
                receiver.product_id.bright_black()
            )?;
            writeln!(stdout, " │")?;

            if receiver.devices.is_empty() {
                writeln!(stdout, " ╰─ {}", "No mice were found.".bright_black().italic())?;
                continue;
            }

            let devices_len = receiver.devices.len();
            for (device_i, device) in receiver.devices.into_iter().enumerate() {
                let last = device_i == devices_len - 1;
                if device_i != 0 {
                    writeln!(stdout, " │")?;
                }

                writeln!(
                    stdout,
                    "{} {}: {} ({}) HID++ {}",
                    if last { " ╰─" } else { " ├─" },
                    device.index.bright_blue(),
                    device.name,
                    device.kind.green(),
                    device.protocol.bright_black(),
                )?;

                let properties = device.properties();
                let properties_len = properties.len();
                for (property_i, property) in properties.into_iter().enumerate() {
                    writeln!(
                        stdout,
                        "{}{} {}",
                        if last { "         " } else { " │       " },
                        if property_i == properties_len - 1 { "╰─" } else { "├─" },
                        property
                    )?;
                }
            }
        }

        stdout.flush()?;

        Ok(())
    }
}

async fn probe_receivers(root: &Cli) -> Result<Vec<ProbedReceiver>> {
    let receivers = root.scanned_receivers().await?;

    let mut probed = Vec::with_capacity(receivers.len());
    for receiver in receivers {
        let mut devices = Vec::new();
        for device in receiver.devices().iter() {
            devices.push(probe_device(device).await);
        }

        probed.push(ProbedReceiver {
            path: receiver.path().to_owned(),
            name: receiver.name().to_owned(),
            address: receiver.address().to_owned(),
            vendor_id: receiver.vendor_id(),
            product_id: receiver.product_id(),
            devices,
        });
    }

    Ok(probed)
}

/// Collects the optional properties of a device. Failing queries are logged
/// and left out.
async fn probe_device(device: &Device) -> ProbedDevice {
    let device_index = device.device_index();

    let features = match device.enumerate_features().await {
        Ok(Some(features)) => features,
        Ok(None) => device.features().iter().copied().collect(),
        Err(err) => {
            warn!(device_index, %err, "could not enumerate features");
            device.features().iter().copied().collect()
        },
    };

    let battery = device.get_battery().await.unwrap_or_else(|err| {
        warn!(device_index, %err, "could not read the battery level");
        None
    });

    let firmware = device.get_firmware().await.unwrap_or_else(|err| {
        warn!(device_index, %err, "could not read the firmware versions");
        None
    });

    ProbedDevice {
        index: device_index,
        name: device.name().to_owned(),
        kind: device.kind(),
        protocol: device.protocol_version().to_string(),
        battery,
        firmware: firmware.unwrap_or_default(),
        features,
        buttons: device.buttons().to_vec(),
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize)]
struct ProbedReceiver {
    path: String,
    name: String,
    address: String,
    vendor_id: u16,
    product_id: u16,
    devices: Vec<ProbedDevice>,
}

#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize)]
struct ProbedDevice {
    index: u8,
    name: String,
    kind: DeviceType,
    protocol: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    battery: Option<BatteryLevel>,

    firmware: Vec<FirmwareInfo>,
    features: Vec<Feature>,
    buttons: Vec<Button>,
}

impl ProbedDevice {
    fn properties(&self) -> Vec<String> {
        let mut properties = Vec::new();

        if let Some(battery) = self.battery {
            properties.push(format!(
                "BATTERY: {} ({:?})",
                match battery.percentage {
                    0..=10 => format!("{}%", battery.percentage).bright_red().to_string(),
                    11..=30 => format!("{}%", battery.percentage).yellow().to_string(),
                    _ => format!("{}%", battery.percentage).green().to_string(),
                },
                battery.status.bright_black(),
            ));
            if battery.status == BatteryStatus::InvalidBattery {
                properties.push(format!("{}", "BATTERY IS INVALID".bright_red()));
            }
        }

        for firmware in &self.firmware {
            properties.push(format!(
                "FIRMWARE: {} ({:?})",
                firmware,
                firmware.entity_type.bright_black()
            ));
        }

        properties.push(format!(
            "FEATURES: {}",
            self.features
                .iter()
                .map(|feature| format!("{}@{}", feature.id.name(), feature.index))
                .collect::<Vec<_>>()
                .join(", ")
                .bright_black()
        ));

        properties.push(format!(
            "BUTTONS: {}",
            self.buttons
                .iter()
                .map(|button| if button.reprogrammable {
                    format!("{}*", button.cid)
                } else {
                    button.cid.to_string()
                })
                .collect::<Vec<_>>()
                .join(", ")
        ));

        properties
    }
}
