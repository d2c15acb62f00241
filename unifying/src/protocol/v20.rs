//! Implements HID++2.0 requests and replies addressed by feature index.

use std::fmt;

use num_enum::{FromPrimitive, IntoPrimitive};
use thiserror::Error;

use crate::{
    channel::{ChannelError, HidppMessage, LONG_REPORT_LENGTH, ReportKind, SHORT_REPORT_LENGTH},
    nibble::{self, U4},
};

/// The feature index error replies are sent with.
///
/// The original feature index and function byte follow in the payload,
/// succeeded by the error code.
pub const ERROR_FEATURE_INDEX: u8 = 0x8f;

/// The feature index some devices use for error replies to long requests.
pub const LONG_ERROR_FEATURE_INDEX: u8 = 0xff;

/// Whether a feature index marks a reply as an error reply.
pub fn is_error_index(feature_index: u8) -> bool {
    feature_index == ERROR_FEATURE_INDEX || feature_index == LONG_ERROR_FEATURE_INDEX
}

/// Represents the header that every [`HidppMessage`] of HID++2.0 starts with.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct MessageHeader {
    /// The index of the device involved in the communication.
    pub device_index: u8,

    /// The index of the feature the message belongs to.
    ///
    /// This is not the same as the feature ID, but the index returned from a
    /// feature lookup via the root feature.
    pub feature_index: u8,

    /// The ID of the function involved in the communication.
    pub function_id: U4,

    /// The ID of the software communicating with the device.
    pub software_id: U4,
}

/// Represents a HID++2.0 message.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Message {
    /// Represents a short HID++2.0 message with 3 bytes of payload.
    Short(MessageHeader, [u8; SHORT_REPORT_LENGTH - 4]),

    /// Represents a long HID++2.0 message with 16 bytes of payload.
    Long(MessageHeader, [u8; LONG_REPORT_LENGTH - 4]),
}

impl Message {
    /// Builds a message of the given kind, zero-padding `params`.
    ///
    /// Parameters not fitting into the report are ignored.
    pub fn with_params(kind: ReportKind, header: MessageHeader, params: &[u8]) -> Self {
        let mut payload = [0u8; LONG_REPORT_LENGTH - 4];
        let len = params.len().min(kind.report_length() - 4);
        payload[..len].copy_from_slice(&params[..len]);

        match kind {
            ReportKind::Short => {
                let mut short = [0u8; SHORT_REPORT_LENGTH - 4];
                short.copy_from_slice(&payload[..SHORT_REPORT_LENGTH - 4]);
                Message::Short(header, short)
            },
            ReportKind::Long => Message::Long(header, payload),
        }
    }

    /// Extracts the header of the message.
    pub fn header(&self) -> MessageHeader {
        match *self {
            Message::Short(header, _) => header,
            Message::Long(header, _) => header,
        }
    }

    /// The kind of report the message travels in.
    pub fn kind(&self) -> ReportKind {
        match self {
            Message::Short(..) => ReportKind::Short,
            Message::Long(..) => ReportKind::Long,
        }
    }

    /// The payload bytes, starting at report byte 4.
    pub fn payload(&self) -> &[u8] {
        match self {
            Message::Short(_, payload) => payload,
            Message::Long(_, payload) => payload,
        }
    }

    /// Extracts the payload of the message and fits it into an array capable of
    /// containing the longest possible payload, filling the rest up with
    /// zeroes.
    pub fn extend_payload(&self) -> [u8; LONG_REPORT_LENGTH - 4] {
        match *self {
            Message::Short(_, payload) => {
                let mut data = [0; LONG_REPORT_LENGTH - 4];
                data[..SHORT_REPORT_LENGTH - 4].copy_from_slice(&payload);
                data
            },
            Message::Long(_, payload) => payload,
        }
    }

    /// Whether this is an error reply.
    pub fn is_error(&self) -> bool {
        is_error_index(self.header().feature_index)
    }

    /// The error code carried by an error reply.
    ///
    /// Error replies move the original feature index into the function byte,
    /// so the payload starts with the original function byte, followed by
    /// the code.
    ///
    /// Returns [`None`] for any other message.
    pub fn error_type(&self) -> Option<ErrorType> {
        self.is_error()
            .then(|| ErrorType::from(self.payload()[1]))
    }
}

impl From<HidppMessage> for Message {
    fn from(msg: HidppMessage) -> Self {
        let [device_index, feature_index, function_and_sw_id] = msg.header_bytes();
        let (function_id, software_id) = nibble::split(function_and_sw_id);
        let header = MessageHeader {
            device_index,
            feature_index,
            function_id,
            software_id,
        };

        match msg {
            HidppMessage::Short(data) => Message::with_params(ReportKind::Short, header, &data[3..]),
            HidppMessage::Long(data) => Message::with_params(ReportKind::Long, header, &data[3..]),
        }
    }
}

impl From<Message> for HidppMessage {
    fn from(msg: Message) -> Self {
        let header = msg.header();
        let header = [
            header.device_index,
            header.feature_index,
            nibble::combine(header.function_id, header.software_id),
        ];

        match msg {
            Message::Short(_, payload) => {
                let mut data = [0u8; SHORT_REPORT_LENGTH - 1];
                data[..3].copy_from_slice(&header);
                data[3..].copy_from_slice(&payload);

                HidppMessage::Short(data)
            },
            Message::Long(_, payload) => {
                let mut data = [0u8; LONG_REPORT_LENGTH - 1];
                data[..3].copy_from_slice(&header);
                data[3..].copy_from_slice(&payload);

                HidppMessage::Long(data)
            },
        }
    }
}

/// Builds the raw bytes of a request, including its report ID.
///
/// Short requests are 7 and long requests 20 bytes long. Unused parameter
/// bytes are zeroed.
pub fn encode_request(
    kind: ReportKind,
    device_index: u8,
    feature_index: u8,
    function_id: U4,
    software_id: U4,
    params: &[u8],
) -> Vec<u8> {
    let msg = Message::with_params(
        kind,
        MessageHeader {
            device_index,
            feature_index,
            function_id,
            software_id,
        },
        params,
    );

    let mut buf = vec![0u8; kind.report_length()];
    HidppMessage::from(msg).write_raw(&mut buf);
    buf
}

/// Parses the raw bytes of a short or long reply.
///
/// Returns [`None`] if the bytes do not form a HID++ report.
pub fn decode_reply(report: &[u8]) -> Option<Message> {
    HidppMessage::read_raw(report).map(Message::from)
}

/// Represents the error code carried by an error reply.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, IntoPrimitive, FromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum ErrorType {
    /// No error.
    Success = 0x00,

    /// The addressed feature is not supported.
    InvalidFeature = 0x01,

    /// The addressed function does not exist.
    InvalidFunction = 0x02,

    /// A value included in the request is invalid.
    InvalidValue = 0x03,

    /// A connection request failed on the receiver's side.
    ConnectFailed = 0x04,

    /// Too many devices are connected to the receiver.
    TooManyDevices = 0x05,

    AlreadyExists = 0x06,

    /// The receiver is still handling another request for the device.
    Busy = 0x07,

    /// There is no device paired at the addressed device index.
    UnknownDevice = 0x08,

    /// The device is paired but currently disconnected, usually after several
    /// minutes of inactivity.
    ResourceError = 0x09,

    /// The request is not available in the current context.
    RequestUnavailable = 0x10,

    /// A request parameter has an unsupported value.
    InvalidParameter = 0x11,

    WrongPin = 0x12,

    Reserved = 0x13,

    /// An error code without a documented meaning.
    #[num_enum(catch_all)]
    Unknown(u8),
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "success",
            Self::InvalidFeature => "invalid feature",
            Self::InvalidFunction => "invalid function",
            Self::InvalidValue => "invalid value",
            Self::ConnectFailed => "connection failed",
            Self::TooManyDevices => "too many devices",
            Self::AlreadyExists => "already exists",
            Self::Busy => "busy",
            Self::UnknownDevice => "unknown device",
            Self::ResourceError => "resource error",
            Self::RequestUnavailable => "request unavailable",
            Self::InvalidParameter => "invalid parameter",
            Self::WrongPin => "wrong PIN",
            Self::Reserved => "reserved",
            Self::Unknown(code) => return write!(f, "unknown error {code:#04x}"),
        };

        f.write_str(name)
    }
}

/// Represents an error of a HID++2.0 feature call.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Hidpp20Error {
    /// Indicates that the underlying [`crate::channel::HidppChannel`] failed.
    #[error("the HID++ channel returned an error")]
    Channel(#[from] ChannelError),

    /// Indicates that the device answered with an error reply.
    #[error("the device returned an error: {0}")]
    Feature(ErrorType),

    /// Indicates that the device returned a response that could not be
    /// interpreted.
    #[error("the device returned an unsupported response")]
    UnsupportedResponse,
}
