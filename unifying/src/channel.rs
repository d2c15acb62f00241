//! Implements the receiver session: HID++ framing on top of a raw HID channel,
//! the reader task splitting the incoming stream into input events and command
//! replies, and strictly serialized request/reply transactions.
//!
//! HID++ replies carry no correlation ID. A reply is attributed to a request
//! only because at most one request is awaiting a reply on a channel at any
//! time, which is enforced by [`HidppChannel::transact`].

use std::{
    error::Error,
    fmt,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use futures::{FutureExt, channel::oneshot, select};
use hidreport::{Field, Report, ReportDescriptor, Usage, UsageId, UsagePage};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::{
    nibble::U4,
    protocol::v20::{self, Hidpp20Error},
};

/// hidapi defines this as the maximum EXPECTED size of report descriptors.
const MAX_REPORT_DESCRIPTOR_LENGTH: usize = 4096;

/// The size of the buffer incoming reports are read into.
///
/// This is larger than [`LONG_REPORT_LENGTH`] as the receiver also forwards
/// the input reports of its devices on the same channel.
pub const MAX_REPORT_LENGTH: usize = 32;

/// The report ID of short (7 bytes) HID++ messages.
pub const SHORT_REPORT_ID: u8 = 0x10;
const SHORT_REPORT_USAGE_PAGE: u16 = 0xff00;
const SHORT_REPORT_USAGE: u16 = 0x0001;

/// The total length of a short HID++ report, including its report ID.
pub const SHORT_REPORT_LENGTH: usize = 7;

/// The report ID of long (20 bytes) HID++ messages.
pub const LONG_REPORT_ID: u8 = 0x11;
const LONG_REPORT_USAGE_PAGE: u16 = 0xff00;
const LONG_REPORT_USAGE: u16 = 0x0002;

/// The total length of a long HID++ report, including its report ID.
pub const LONG_REPORT_LENGTH: usize = 20;

/// The report ID of input reports the receiver forwards from its devices.
///
/// These are never produced by this crate and never answer a request.
pub const EVENT_REPORT_ID: u8 = 0x20;

/// Static information about a raw HID channel, as reported by the operating
/// system when the channel was opened.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RawHidInfo {
    /// The path of the device node backing the channel.
    pub path: String,

    /// The USB vendor ID.
    pub vendor_id: u16,

    /// The USB product ID.
    pub product_id: u16,

    /// The human readable name of the device.
    pub name: String,

    /// The physical address (bus topology path) of the device.
    pub address: String,
}

/// Represents an arbitrary HID communication channel that is both readable and
/// writable. It has to support async I/O.
///
/// Any type this trait is implemented for can be used for HID(++)
/// communication. Whether a specific channel supports HID++ is determined by
/// [`HidppChannel::from_raw_channel`].
#[async_trait]
pub trait RawHidChannel: Sync + Send + 'static {
    /// Static information about the underlying device.
    fn info(&self) -> RawHidInfo;

    /// Writes a raw report to the channel.
    ///
    /// Returns the exact amount of written bytes on success.
    async fn write_report(&self, src: &[u8]) -> Result<usize, Box<dyn Error + Sync + Send>>;

    /// Reads a raw report from the channel.
    ///
    /// If the buffer is not large enough to fit the whole report, its remainder
    /// should be discarded and must not be returned by any succeeding call to
    /// [`Self::read_report`].
    ///
    /// Returns the exact amount of read bytes on success. Returning `0` signals
    /// that the channel was closed.
    async fn read_report(&self, buf: &mut [u8]) -> Result<usize, Box<dyn Error + Sync + Send>>;

    /// If the implementation already knows whether the underlying HID channel
    /// supports HID++ messages, it should return `Some((supports_short,
    /// supports_long))` from this method.
    ///
    /// In this case, the report descriptor will not be read and parsed.
    fn supports_short_long_hidpp(&self) -> Option<(bool, bool)>;

    /// Retrieves the raw HID report descriptor from the channel.
    ///
    /// Returns the exact size of the report descriptor on success.
    async fn get_report_descriptor(
        &self,
        buf: &mut [u8],
    ) -> Result<usize, Box<dyn Error + Sync + Send>>;
}

/// Checks whether a raw channel supports short or long HID++ messages.
async fn supports_short_long_hidpp(
    chan: &dyn RawHidChannel,
) -> Result<(bool, bool), ChannelError> {
    if let Some(supported) = chan.supports_short_long_hidpp() {
        return Ok(supported);
    }

    let mut raw_descriptor = vec![0u8; MAX_REPORT_DESCRIPTOR_LENGTH];
    let descriptor_size = chan
        .get_report_descriptor(&mut raw_descriptor)
        .await
        .map_err(ChannelError::Implementation)?;

    let descriptor = ReportDescriptor::try_from(&raw_descriptor[..descriptor_size])
        .map_err(ChannelError::ReportDescriptor)?;

    let declares = |report_id: u8, usage_page: u16, usage: u16| {
        descriptor
            .find_input_report(&[report_id])
            .and_then(|report| report.fields().first())
            .and_then(|field| match field {
                Field::Array(arr) => Some(arr.usage_range()),
                _ => None,
            })
            .is_some_and(|range| {
                range
                    .lookup_usage(&Usage::from_page_and_id(
                        UsagePage::from(usage_page),
                        UsageId::from(usage),
                    ))
                    .is_some()
            })
    };

    Ok((
        declares(SHORT_REPORT_ID, SHORT_REPORT_USAGE_PAGE, SHORT_REPORT_USAGE),
        declares(LONG_REPORT_ID, LONG_REPORT_USAGE_PAGE, LONG_REPORT_USAGE),
    ))
}

/// The two report kinds HID++ commands travel in.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ReportKind {
    /// A 7-byte report with 3 bytes of parameters.
    Short,

    /// A 20-byte report with 16 bytes of parameters.
    Long,
}

impl ReportKind {
    /// The report ID introducing reports of this kind.
    pub const fn report_id(self) -> u8 {
        match self {
            Self::Short => SHORT_REPORT_ID,
            Self::Long => LONG_REPORT_ID,
        }
    }

    /// The total length of reports of this kind.
    pub const fn report_length(self) -> usize {
        match self {
            Self::Short => SHORT_REPORT_LENGTH,
            Self::Long => LONG_REPORT_LENGTH,
        }
    }
}

/// Represents a raw HID++ message without its leading report ID.
///
/// The first three bytes always hold the device index, the feature index and
/// the packed function and software IDs.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum HidppMessage {
    /// A short HID++ message.
    Short([u8; SHORT_REPORT_LENGTH - 1]),

    /// A long HID++ message.
    Long([u8; LONG_REPORT_LENGTH - 1]),
}

impl HidppMessage {
    /// Tries to read a HID++ message from a raw report.
    ///
    /// Returns [`None`] for reports that are not HID++ messages or whose
    /// length does not match their report ID.
    pub fn read_raw(data: &[u8]) -> Option<Self> {
        match *data.first()? {
            SHORT_REPORT_ID => data[1..].try_into().ok().map(Self::Short),
            LONG_REPORT_ID => data[1..].try_into().ok().map(Self::Long),
            _ => None,
        }
    }

    /// Writes the message in its raw report form into a buffer, which must be
    /// at least [`LONG_REPORT_LENGTH`] bytes long for long messages.
    ///
    /// Returns the amount of written bytes.
    pub fn write_raw(&self, buf: &mut [u8]) -> usize {
        let kind = self.kind();
        buf[0] = kind.report_id();
        buf[1..kind.report_length()].copy_from_slice(self.body());
        kind.report_length()
    }

    /// The kind of report the message travels in.
    pub fn kind(&self) -> ReportKind {
        match self {
            Self::Short(_) => ReportKind::Short,
            Self::Long(_) => ReportKind::Long,
        }
    }

    /// The device index, feature index and function/software byte.
    pub fn header_bytes(&self) -> [u8; 3] {
        let body = self.body();
        [body[0], body[1], body[2]]
    }

    fn body(&self) -> &[u8] {
        match self {
            Self::Short(data) => data,
            Self::Long(data) => data,
        }
    }
}

/// Tuning knobs of a [`HidppChannel`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ChannelConfig {
    /// The software ID folded into every request.
    ///
    /// It identifies this client's traffic and is not used for correlation.
    pub software_id: U4,

    /// How long a transaction waits for its reply before failing.
    pub timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            software_id: U4::from_lo(0x01),
            timeout: Duration::from_secs(1),
        }
    }
}

/// What the reader task hands to the transaction waiting for a reply.
#[derive(Debug)]
enum Reply {
    Message(HidppMessage),
    Malformed(usize),

    /// A control report from the pending device answering something else.
    Unexpected([u8; 3]),
}

/// The single transaction currently awaiting a reply.
struct PendingTransaction {
    /// Device index, feature index and function/software byte of the request.
    header: [u8; 3],
    sender: oneshot::Sender<Reply>,
}

impl PendingTransaction {
    /// Checks whether a report answers the request, either by echoing its
    /// header or by being an error reply naming it.
    fn is_answered_by(&self, report: &[u8]) -> bool {
        let [device_index, feature_index, function_and_sw_id] = self.header;

        if report.len() < 4 || report[1] != device_index {
            return false;
        }

        if report[2] == feature_index && report[3] == function_and_sw_id {
            return true;
        }

        v20::is_error_index(report[2])
            && report.len() >= 5
            && report[3] == feature_index
            && report[4] == function_and_sw_id
    }

    fn is_from_same_device(&self, report: &[u8]) -> bool {
        report.len() >= 4 && report[1] == self.header[0]
    }
}

/// State shared between the channel and its reader task.
#[derive(Default)]
struct Shared {
    pending: Mutex<Option<PendingTransaction>>,
    closed: AtomicBool,
}

impl Shared {
    fn pending(&self) -> MutexGuard<'_, Option<PendingTransaction>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Marks the channel as unusable and fails the in-flight transaction by
    /// dropping its reply sender.
    fn shut_down(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.pending().take();
    }

    /// Hands a control report to the pending transaction if it answers it.
    ///
    /// A report from the pending device that answers another request fails
    /// the transaction. Reports from other devices are discarded.
    fn deliver(&self, report: &[u8]) {
        let mut pending = self.pending();

        let (waiting, reply) = if let Some(waiting) = pending.take_if(|waiting| waiting.is_answered_by(report)) {
            let reply = match HidppMessage::read_raw(report) {
                Some(msg) => Reply::Message(msg),
                None => Reply::Malformed(report.len()),
            };
            (waiting, reply)
        } else if let Some(waiting) = pending.take_if(|waiting| waiting.is_from_same_device(report)) {
            warn!(report = ?report, request = ?waiting.header, "control report does not answer the pending request");
            (waiting, Reply::Unexpected([report[1], report[2], report[3]]))
        } else {
            if pending.is_some() {
                warn!(report = ?report, "discarding control report from another device");
            } else {
                warn!(report = ?report, "discarding control report without pending request");
            }
            return;
        };

        // The transaction may have given up in the meantime.
        let _ = waiting.sender.send(reply);
    }
}

/// Clears the pending slot when a transaction ends, however it ends.
struct PendingGuard<'a>(&'a Shared);

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.pending().take();
    }
}

/// Represents a HID communication channel supporting HID++.
///
/// The channel owns a reader task for its whole lifetime. Input reports
/// forwarded by the receiver are queued and can be consumed via
/// [`Self::events`]; every other report is treated as a reply candidate for
/// the single pending transaction.
pub struct HidppChannel {
    /// Whether the channel supports short (7 bytes) HID++ messages.
    pub supports_short: bool,

    /// Whether the channel supports long (20 bytes) HID++ messages.
    pub supports_long: bool,

    info: RawHidInfo,
    config: ChannelConfig,
    raw_channel: Arc<dyn RawHidChannel>,
    shared: Arc<Shared>,

    /// Held for the whole write-then-await span of a transaction.
    transaction_lock: tokio::sync::Mutex<()>,

    events: flume::Receiver<Vec<u8>>,
    read_task_close: Mutex<Option<oneshot::Sender<()>>>,
    read_task: Option<JoinHandle<()>>,
}

impl fmt::Debug for HidppChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HidppChannel")
            .field("info", &self.info)
            .field("config", &self.config)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Drop for HidppChannel {
    fn drop(&mut self) {
        self.close();

        if let Some(read_task) = self.read_task.take() {
            read_task.abort();
        }
    }
}

impl HidppChannel {
    /// Tries to construct a HID++ channel from a raw HID channel and starts
    /// its reader task.
    ///
    /// If the given HID channel does not support HID++,
    /// [`ChannelError::HidppNotSupported`] will be returned.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub async fn from_raw_channel(
        raw: impl RawHidChannel,
        config: ChannelConfig,
    ) -> Result<Self, ChannelError> {
        let raw: Arc<dyn RawHidChannel> = Arc::new(raw);
        let (supports_short, supports_long) = supports_short_long_hidpp(raw.as_ref()).await?;

        if !supports_short && !supports_long {
            return Err(ChannelError::HidppNotSupported);
        }

        let info = raw.info();
        let shared = Arc::new(Shared::default());
        let (events_sender, events) = flume::unbounded();
        let (close_sender, close_receiver) = oneshot::channel();

        let read_task = tokio::spawn(read_reports(
            Arc::clone(&raw),
            Arc::clone(&shared),
            events_sender,
            close_receiver,
        ));

        debug!(path = %info.path, supports_short, supports_long, "opened HID++ channel");

        Ok(Self {
            supports_short,
            supports_long,
            info,
            config,
            raw_channel: raw,
            shared,
            transaction_lock: tokio::sync::Mutex::new(()),
            events,
            read_task_close: Mutex::new(Some(close_sender)),
            read_task: Some(read_task),
        })
    }

    /// Static information about the underlying HID device.
    pub fn info(&self) -> &RawHidInfo {
        &self.info
    }

    /// The software ID included in every request.
    pub fn get_sw_id(&self) -> U4 {
        self.config.software_id
    }

    /// The deadline every transaction waits for its reply.
    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    /// Returns the queue of raw input reports forwarded by the receiver.
    ///
    /// All returned receivers share one queue, so every report is consumed by
    /// exactly one of them. Reports are queued without bound until consumed.
    pub fn events(&self) -> flume::Receiver<Vec<u8>> {
        self.events.clone()
    }

    /// Whether the reader task has stopped, either because of [`Self::close`]
    /// or because the raw channel failed.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Stops the reader task and fails any in-flight transaction.
    ///
    /// A closed channel cannot be reopened.
    pub fn close(&self) {
        let close = self
            .read_task_close
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(close) = close {
            // Fails only if the reader task already stopped.
            let _ = close.send(());
            debug!(path = %self.info.path, "closing HID++ channel");
        }

        self.shared.shut_down();
    }

    /// Checks whether the channel supports the given HID++ message.
    pub fn supports_msg(&self, msg: &HidppMessage) -> bool {
        match msg {
            HidppMessage::Short(_) => self.supports_short,
            HidppMessage::Long(_) => self.supports_long,
        }
    }

    /// Writes a request and waits for its reply.
    ///
    /// Concurrent callers are queued: the next request is only written after
    /// the previous transaction received its reply, timed out or was dropped.
    /// A reply arriving after its transaction ended is discarded by the reader
    /// task.
    pub async fn transact(&self, msg: HidppMessage) -> Result<HidppMessage, ChannelError> {
        if !self.supports_msg(&msg) {
            return Err(ChannelError::MessageTypeNotSupported);
        }

        let _transaction = self.transaction_lock.lock().await;

        let (sender, receiver) = oneshot::channel();
        *self.shared.pending() = Some(PendingTransaction {
            header: msg.header_bytes(),
            sender,
        });
        let _pending = PendingGuard(&self.shared);

        // Checked after installing the transaction, so a concurrent shutdown
        // either fails it here or drops its sender.
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }

        let mut buf = [0u8; LONG_REPORT_LENGTH];
        let len = msg.write_raw(&mut buf);
        trace!(request = ?&buf[..len], "writing request");

        let written = self
            .raw_channel
            .write_report(&buf[..len])
            .await
            .map_err(ChannelError::Implementation)?;
        if written != len {
            return Err(ChannelError::WriteLength {
                expected: len,
                written,
            });
        }

        match tokio::time::timeout(self.config.timeout, receiver).await {
            Ok(Ok(Reply::Message(reply))) => Ok(reply),
            Ok(Ok(Reply::Malformed(len))) => Err(ChannelError::MalformedReply(len)),
            Ok(Ok(Reply::Unexpected(header))) => Err(ChannelError::UnexpectedReply(header)),
            Ok(Err(oneshot::Canceled)) => Err(ChannelError::Closed),
            Err(_) => {
                debug!(request = ?&buf[..len], "request timed out");
                Err(ChannelError::Timeout(self.config.timeout))
            },
        }
    }

    /// Sends a HID++2.0 request and waits for its reply, decoding error
    /// replies into [`Hidpp20Error::Feature`].
    pub async fn send_v20(&self, msg: v20::Message) -> Result<v20::Message, Hidpp20Error> {
        let response = v20::Message::from(self.transact(msg.into()).await?);

        if let Some(err) = response.error_type() {
            return Err(Hidpp20Error::Feature(err));
        }

        Ok(response)
    }
}

/// Reads reports until the channel is closed or fails.
async fn read_reports(
    raw: Arc<dyn RawHidChannel>,
    shared: Arc<Shared>,
    events: flume::Sender<Vec<u8>>,
    mut close: oneshot::Receiver<()>,
) {
    let mut buf = [0u8; MAX_REPORT_LENGTH];
    debug!("reader task started");

    loop {
        let res = select! {
            _ = close => break,
            res = raw.read_report(&mut buf).fuse() => res,
        };

        let len = match res {
            Ok(0) => {
                debug!("HID channel reached its end");
                break;
            },
            Ok(len) => len.min(MAX_REPORT_LENGTH),
            Err(err) => {
                warn!(%err, "could not read from the HID channel");
                break;
            },
        };

        let report = &buf[..len];
        trace!(report = ?report, "received report");

        if report[0] == EVENT_REPORT_ID {
            // The receiving end lives in the channel, which outlives this task.
            let _ = events.send(report.to_vec());
            continue;
        }

        shared.deliver(report);
    }

    shared.shut_down();
    debug!("reader task stopped");
}

/// Represents an error that occurred when creating or interacting with a HID or
/// HID++ communication channel.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ChannelError {
    /// Indicates that the concrete implementation of [`RawHidChannel`]
    /// returned an error.
    #[error("the HID channel implementation returned an error")]
    Implementation(#[source] Box<dyn Error + Sync + Send>),

    /// Indicates that the HID report descriptor could not be parsed.
    #[error("the report descriptor could not be parsed")]
    ReportDescriptor(hidreport::ParserError),

    /// Indicates that the channel in question does not support HID++.
    #[error("the HID channel does not support HID++")]
    HidppNotSupported,

    /// Indicates that the HID++ channel does not support messages of the given
    /// type (short/long).
    #[error("the channel does not support the given HID++ message type")]
    MessageTypeNotSupported,

    /// Indicates that a request was only partially written.
    #[error("only {written} of {expected} request bytes were written")]
    WriteLength { expected: usize, written: usize },

    /// Indicates that no reply arrived in time.
    #[error("no reply was received within {0:?}")]
    Timeout(Duration),

    /// Indicates that the channel was closed before or while waiting for a
    /// reply.
    #[error("the HID++ channel is closed")]
    Closed,

    /// Indicates that the reply to a request had an invalid length.
    #[error("received a reply of invalid length {0}")]
    MalformedReply(usize),

    /// Indicates that the device answered with a report whose header (device
    /// index, feature index, function/software byte) does not match the
    /// request.
    #[error("received a reply to another request: {0:02x?}")]
    UnexpectedReply([u8; 3]),
}
