//! A client for Logitech's HID++ protocol as spoken through a Unifying
//! receiver.
//!
//! A Unifying receiver is a USB dongle relaying up to six wireless devices.
//! Besides forwarding their regular input reports, it carries HID++ traffic
//! that lets the host query a device's features, its marketing name and
//! type, and its programmable controls, and change what those controls do.
//!
//! This crate implements the HID++2.0 side of that traffic for mice:
//!
//! - [`channel`] frames requests and replies and runs a reader task that
//!   splits incoming reports into input events and replies. At most one
//!   request is in flight per channel, as HID++ replies carry no correlation
//!   ID.
//! - [`feature`] resolves feature IDs to the indices a device assigned them
//!   and wraps the features this crate uses.
//! - [`device`] discovers a mouse and its buttons and remaps them.
//! - [`receiver`] scans all device indices of a receiver and turns input
//!   reports into [`event::ButtonEvent`]s.
//!
//! Logitech published a lot of documentation on HID++ in a [public Google Drive folder](https://drive.google.com/drive/folders/0BxbRzx7vEV7eWmgwazJ3NUFfQ28).
//!
//! # Quickstart
//!
//! The underlying HID communication is left to an external crate of your
//! choice. Bridge it to this crate by implementing [`channel::RawHidChannel`].
//! The trait defines async methods using [`mod@async_trait`], which is
//! re-exported for annotating your implementing type.
//!
//! ```ignore
//! use unifying::{
//!     button::ControlId,
//!     channel::ChannelConfig,
//!     receiver::unifying::UnifyingReceiver,
//! };
//!
//! // Fails with `ReceiverError::UnknownReceiver` for anything but a Unifying
//! // receiver and with `ChannelError::HidppNotSupported` if the channel does
//! // not speak HID++.
//! let receiver = UnifyingReceiver::open(my_hid_channel, ChannelConfig::default()).await?;
//!
//! // Looks at device indices 1 to 6. Only mice with programmable controls are
//! // kept.
//! for device in receiver.scan_devices().await?.iter() {
//!     println!("{} at index {}", device.name(), device.device_index());
//!
//!     if let Some(back) = device.find_button(ControlId::Back) {
//!         // Make the back button act as a middle click.
//!         device.remap_button(back, ControlId::Middle).await?;
//!     }
//! }
//!
//! let events = receiver.listen();
//! while let Ok(event) = events.recv_async().await {
//!     println!("device {} holds {:?}", event.device_index, event.pressed);
//! }
//! ```

pub use async_trait::async_trait;

mod bcd;
pub mod button;
pub mod channel;
pub mod config;
pub mod device;
pub mod event;
pub mod feature;
#[cfg(test)]
mod mock;
pub mod nibble;
pub mod protocol;
pub mod receiver;
