//! Implements the wireless receivers devices are paired to.

use std::ops::RangeInclusive;

use thiserror::Error;

use crate::channel::ChannelError;

pub mod unifying;

/// The index to use when communicating with the receiver on any HID++ channel.
pub const RECEIVER_DEVICE_INDEX: u8 = 0xff;

/// The indices paired devices are addressed by.
pub const DEVICE_INDICES: RangeInclusive<u8> = 1..=6;

/// Represents an error returned by a receiver.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReceiverError {
    /// Indicates that the HID device is no supported receiver.
    #[error("{vendor_id:#06x}:{product_id:#06x} is no supported receiver")]
    UnknownReceiver { vendor_id: u16, product_id: u16 },

    /// Indicates that the HID++ channel to the receiver failed.
    #[error("the HID++ channel returned an error")]
    Channel(#[from] ChannelError),
}
