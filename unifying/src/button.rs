//! Programmable controls (buttons) of a device as reported by the
//! reprogrammable controls feature.

use std::{fmt, str::FromStr};

use num_enum::{FromPrimitive, IntoPrimitive};
use thiserror::Error;

/// Identifies a physical or logical control of a device.
///
/// Control IDs are vendor-defined. Only the common mouse buttons are named,
/// everything else is kept as [`ControlId::Unknown`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, IntoPrimitive, FromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(into = "String"))]
#[repr(u16)]
pub enum ControlId {
    Left = 0x50,
    Right = 0x51,
    Middle = 0x52,
    Back = 0x53,
    Forward = 0x56,
    Thumb = 0xc3,
    Top = 0xc4,

    #[num_enum(catch_all)]
    Unknown(u16),
}

impl ControlId {
    const NAMED: [ControlId; 7] = [
        ControlId::Left,
        ControlId::Right,
        ControlId::Middle,
        ControlId::Back,
        ControlId::Forward,
        ControlId::Thumb,
        ControlId::Top,
    ];

    pub fn name(self) -> Option<&'static str> {
        Some(match self {
            ControlId::Left => "left",
            ControlId::Right => "right",
            ControlId::Middle => "middle",
            ControlId::Back => "back",
            ControlId::Forward => "forward",
            ControlId::Thumb => "thumb",
            ControlId::Top => "top",
            ControlId::Unknown(_) => return None,
        })
    }

    /// The bit representing the control in the button bitmask of a mouse
    /// input report.
    pub fn event_mask(self) -> Option<u8> {
        match self {
            ControlId::Left => Some(0x01),
            ControlId::Right => Some(0x02),
            ControlId::Middle => Some(0x04),
            ControlId::Back => Some(0x08),
            ControlId::Forward => Some(0x10),
            _ => None,
        }
    }
}

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "{:#06x}", u16::from(*self)),
        }
    }
}

impl From<ControlId> for String {
    fn from(value: ControlId) -> Self {
        value.to_string()
    }
}

/// Indicates that a string names no control.
#[derive(Clone, PartialEq, Eq, Debug, Error)]
#[error("`{0}` is neither a known control name nor a hexadecimal control ID")]
pub struct ParseControlIdError(String);

impl FromStr for ControlId {
    type Err = ParseControlIdError;

    /// Accepts control names like `back` as well as raw IDs like `0x00c3`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(named) = Self::NAMED
            .into_iter()
            .find(|cid| cid.name().is_some_and(|name| name.eq_ignore_ascii_case(s)))
        {
            return Ok(named);
        }

        s.strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .and_then(|hex| u16::from_str_radix(hex, 16).ok())
            .map(ControlId::from)
            .ok_or_else(|| ParseControlIdError(s.to_owned()))
    }
}

/// The kind of control, taken from the low nibble of the control flags.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, IntoPrimitive, FromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum ButtonType {
    Button = 0x01,
    Function = 0x02,
    Hotkey = 0x04,
    FunctionToggle = 0x08,

    #[num_enum(catch_all)]
    Unknown(u8),
}

/// Represents one programmable control of a device.
///
/// `device_index` identifies the owning device on its receiver.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Button {
    pub device_index: u8,

    /// The position of the control in the device's control table.
    pub index: u8,

    pub cid: ControlId,

    /// The action currently assigned to the control.
    pub task_id: u16,

    /// The raw flag byte the derived fields below are taken from.
    pub flags: u8,

    pub is_virtual: bool,
    pub persistent_divert: bool,
    pub temporary_divert: bool,
    pub reprogrammable: bool,
    pub typ: ButtonType,

    /// The position of the control on the F-key row, `0` if none.
    pub function_position: u8,

    pub group: u8,
    pub group_remap_mask: u8,

    /// Whether the control can be used for gestures.
    pub gesture: bool,
}

impl Button {
    const VIRTUAL: u8 = 1 << 7;
    const PERSISTENT_DIVERT: u8 = 1 << 6;
    const TEMPORARY_DIVERT: u8 = 1 << 5;
    const REPROGRAMMABLE: u8 = 1 << 4;

    /// Decodes the control information a device returns for one control.
    ///
    /// `payload` starts at report byte 4. Returns [`None`] if it is too short.
    pub fn from_payload(device_index: u8, index: u8, payload: &[u8]) -> Option<Self> {
        let &[cid_hi, cid_lo, task_hi, task_lo, flags, function_position, group, group_remap_mask, gesture, ..] =
            payload
        else {
            return None;
        };

        Some(Self {
            device_index,
            index,
            cid: ControlId::from(u16::from_be_bytes([cid_hi, cid_lo])),
            task_id: u16::from_be_bytes([task_hi, task_lo]),
            flags,
            is_virtual: flags & Self::VIRTUAL != 0,
            persistent_divert: flags & Self::PERSISTENT_DIVERT != 0,
            temporary_divert: flags & Self::TEMPORARY_DIVERT != 0,
            reprogrammable: flags & Self::REPROGRAMMABLE != 0,
            typ: ButtonType::from(flags & 0x0f),
            function_position,
            group,
            group_remap_mask,
            gesture: gesture != 0,
        })
    }
}

/// How a control's events are currently reported, as read back from or
/// written to the device.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CidReporting {
    pub cid: ControlId,

    /// Events are sent to the host protocol layer instead of being handled
    /// natively, until the device resets.
    pub divert: bool,

    /// Like [`Self::divert`], but survives resets.
    pub persist: bool,

    /// The control whose behavior this control takes over.
    pub remap: ControlId,
}

impl CidReporting {
    const DIVERT: u8 = 1 << 0;
    const DIVERT_VALID: u8 = 1 << 1;
    const PERSIST: u8 = 1 << 2;
    const PERSIST_VALID: u8 = 1 << 3;

    pub(crate) fn from_payload(payload: &[u8]) -> Option<Self> {
        let &[cid_hi, cid_lo, flags, remap_hi, remap_lo, ..] = payload else {
            return None;
        };

        Some(Self {
            cid: ControlId::from(u16::from_be_bytes([cid_hi, cid_lo])),
            divert: flags & Self::DIVERT != 0,
            persist: flags & Self::PERSIST != 0,
            remap: ControlId::from(u16::from_be_bytes([remap_hi, remap_lo])),
        })
    }

    /// Encodes the request parameters, marking both divert and persist as
    /// valid so the device applies them.
    pub(crate) fn to_params(self) -> [u8; 5] {
        let mut flags = Self::DIVERT_VALID | Self::PERSIST_VALID;
        if self.divert {
            flags |= Self::DIVERT;
        }
        if self.persist {
            flags |= Self::PERSIST;
        }

        let [cid_hi, cid_lo] = u16::from(self.cid).to_be_bytes();
        let [remap_hi, remap_lo] = u16::from(self.remap).to_be_bytes();

        [cid_hi, cid_lo, flags, remap_hi, remap_lo]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_control_info() {
        let payload = [0x04, 0xc3, 0x12, 0x34, 0xd0, 0x02, 0x05, 0x07, 0x01];
        let button = Button::from_payload(0x01, 3, &payload).unwrap();

        assert_eq!(button.cid, ControlId::Unknown(0x04c3));
        assert_eq!(button.task_id, 0x1234);
        assert_eq!(button.flags, 0xd0);
        assert!(button.is_virtual);
        assert!(button.persistent_divert);
        assert!(!button.temporary_divert);
        assert!(button.reprogrammable);
        assert_eq!(button.typ, ButtonType::Unknown(0x00));
        assert_eq!(button.function_position, 0x02);
        assert_eq!(button.group, 0x05);
        assert_eq!(button.group_remap_mask, 0x07);
        assert!(button.gesture);
        assert_eq!((button.device_index, button.index), (0x01, 3));
    }

    #[test]
    fn short_payload_is_rejected() {
        assert_eq!(Button::from_payload(0x01, 0, &[0x00, 0x50, 0x00]), None);
    }

    #[test]
    fn type_comes_from_low_nibble() {
        let payload = [0x00, 0x50, 0x00, 0x38, 0x21, 0x00, 0x00, 0x00, 0x00];
        let button = Button::from_payload(0x02, 0, &payload).unwrap();

        assert_eq!(button.cid, ControlId::Left);
        assert_eq!(button.typ, ButtonType::Button);
        assert!(button.temporary_divert);
        assert!(!button.gesture);
    }

    #[test]
    fn control_names_parse_and_print() {
        assert_eq!("back".parse::<ControlId>(), Ok(ControlId::Back));
        assert_eq!("Thumb".parse::<ControlId>(), Ok(ControlId::Thumb));
        assert_eq!("0x00c4".parse::<ControlId>(), Ok(ControlId::Top));
        assert_eq!("0x1234".parse::<ControlId>(), Ok(ControlId::Unknown(0x1234)));
        assert!("scroll_up".parse::<ControlId>().is_err());
        assert_eq!(ControlId::Unknown(0x1234).to_string(), "0x1234");
        assert_eq!(ControlId::Forward.to_string(), "forward");
    }

    #[test]
    fn reporting_flags_mark_fields_valid() {
        let reporting = CidReporting {
            cid: ControlId::Thumb,
            divert: false,
            persist: false,
            remap: ControlId::Back,
        };

        assert_eq!(reporting.to_params(), [0x00, 0xc3, 0x0a, 0x00, 0x53]);
        assert_eq!(
            CidReporting::from_payload(&[0x00, 0xc3, 0x05, 0x00, 0x53]),
            Some(CidReporting {
                divert: true,
                persist: true,
                ..reporting
            })
        );
    }
}
