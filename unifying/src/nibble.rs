//! Half-byte values used to pack the function and software IDs of a HID++
//! request into a single header byte.

/// An unsigned 4-bit value.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct U4(u8);

impl U4 {
    /// The largest value a nibble can hold.
    pub const MAX: U4 = U4(0x0f);

    /// Keeps the 4 low bits of `raw`.
    pub const fn from_lo(raw: u8) -> Self {
        Self(raw & 0x0f)
    }

    /// Keeps the 4 high bits of `raw`, shifted into the low position.
    pub const fn from_hi(raw: u8) -> Self {
        Self(raw >> 4)
    }

    /// Returns the nibble in the low 4 bits of a byte.
    pub const fn to_lo(self) -> u8 {
        self.0
    }

    /// Returns the nibble in the high 4 bits of a byte.
    pub const fn to_hi(self) -> u8 {
        self.0 << 4
    }
}

impl TryFrom<u8> for U4 {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value > Self::MAX.0 {
            return Err(value);
        }

        Ok(Self(value))
    }
}

/// Packs `hi` into the upper and `lo` into the lower half of a byte.
pub const fn combine(hi: U4, lo: U4) -> u8 {
    hi.to_hi() | lo.to_lo()
}

/// Splits a byte into its upper and lower halves.
pub const fn split(byte: u8) -> (U4, U4) {
    (U4::from_hi(byte), U4::from_lo(byte))
}
