//! Implements the protocol-specific parts of HID++.

use std::fmt;

pub mod v20;

/// The HID++ protocol version a device reports through the root feature.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[cfg(test)]
mod tests {
    use super::ProtocolVersion;

    #[test]
    fn formats_as_major_dot_minor() {
        assert_eq!(ProtocolVersion { major: 4, minor: 5 }.to_string(), "4.5");
        assert_eq!(ProtocolVersion::default().to_string(), "0.0");
    }
}
