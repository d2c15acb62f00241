//! An in-memory receiver used by the unit tests.

use std::{
    collections::HashMap,
    error::Error,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;

use crate::{
    button::ControlId,
    channel::{LONG_REPORT_ID, LONG_REPORT_LENGTH, RawHidChannel, RawHidInfo, SHORT_REPORT_ID, SHORT_REPORT_LENGTH},
    feature::{FeatureId, battery::BatteryStatus, device_type_and_name::DeviceType},
    protocol::v20::{ERROR_FEATURE_INDEX, ErrorType},
};

type Responder = dyn Fn(&[u8], flume::Sender<Vec<u8>>) + Send + Sync;

/// A raw channel answering every written request through a closure.
///
/// The closure receives the request and a sender for reports to be read back.
pub struct MockChannel {
    info: RawHidInfo,
    hidpp: (bool, bool),
    responder: Box<Responder>,
    writes: Arc<Mutex<Vec<Vec<u8>>>>,

    /// Held until [`Self::injector`] hands it out, which lets a test end the
    /// report stream by dropping it.
    injector: Mutex<Option<flume::Sender<Vec<u8>>>>,
    reply_sender: flume::WeakSender<Vec<u8>>,
    reports: flume::Receiver<Vec<u8>>,
}

impl MockChannel {
    pub fn new(responder: impl Fn(&[u8], flume::Sender<Vec<u8>>) + Send + Sync + 'static) -> Self {
        let (sender, reports) = flume::unbounded();

        Self {
            info: RawHidInfo {
                path: "/dev/hidraw3".to_owned(),
                vendor_id: 0x046d,
                product_id: 0xc52b,
                name: "Logitech USB Receiver".to_owned(),
                address: "usb-0000:00:14.0-2/input2".to_owned(),
            },
            hidpp: (true, true),
            responder: Box::new(responder),
            writes: Arc::default(),
            reply_sender: sender.downgrade(),
            injector: Mutex::new(Some(sender)),
            reports,
        }
    }

    /// A channel serving the given devices. Indices without a device answer
    /// with [`ErrorType::UnknownDevice`].
    pub fn with_devices(devices: Vec<SimulatedDevice>) -> Self {
        Self::new(move |request, replies| {
            let Some(&device_index) = request.get(1) else {
                return;
            };

            let answer = match devices.iter().find(|device| device.device_index == device_index) {
                Some(device) if device.ignores(request) => return,
                Some(device) => device.answer(request),
                None => Err(ErrorType::UnknownDevice),
            };

            let _ = replies.send(reply(request, answer));
        })
    }

    pub fn with_hidpp_support(mut self, short: bool, long: bool) -> Self {
        self.hidpp = (short, long);
        self
    }

    pub fn with_vpid(mut self, vendor_id: u16, product_id: u16) -> Self {
        self.info.vendor_id = vendor_id;
        self.info.product_id = product_id;
        self
    }

    /// Every request written so far.
    pub fn writes(&self) -> Arc<Mutex<Vec<Vec<u8>>>> {
        Arc::clone(&self.writes)
    }

    /// A sender for reports to be read without a preceding request.
    ///
    /// Dropping it makes reads report the end of the channel.
    ///
    /// # Panics
    ///
    /// Panics if called twice.
    pub fn injector(&self) -> flume::Sender<Vec<u8>> {
        self.injector
            .lock()
            .unwrap()
            .take()
            .expect("the injector was already taken")
    }
}

#[async_trait]
impl RawHidChannel for MockChannel {
    fn info(&self) -> RawHidInfo {
        self.info.clone()
    }

    async fn write_report(&self, src: &[u8]) -> Result<usize, Box<dyn Error + Sync + Send>> {
        self.writes.lock().unwrap().push(src.to_vec());

        if let Some(replies) = self.reply_sender.upgrade() {
            (self.responder)(src, replies);
        }

        Ok(src.len())
    }

    async fn read_report(&self, buf: &mut [u8]) -> Result<usize, Box<dyn Error + Sync + Send>> {
        let Ok(report) = self.reports.recv_async().await else {
            return Ok(0);
        };

        let len = report.len().min(buf.len());
        buf[..len].copy_from_slice(&report[..len]);
        Ok(len)
    }

    fn supports_short_long_hidpp(&self) -> Option<(bool, bool)> {
        Some(self.hidpp)
    }

    async fn get_report_descriptor(&self, _: &mut [u8]) -> Result<usize, Box<dyn Error + Sync + Send>> {
        Ok(0)
    }
}

/// A short reply echoing the header of `request`.
pub fn short_reply(request: &[u8], params: [u8; 3]) -> Vec<u8> {
    vec![SHORT_REPORT_ID, request[1], request[2], request[3], params[0], params[1], params[2]]
}

enum Answer {
    Short([u8; 3]),
    Long(Vec<u8>),
}

fn reply(request: &[u8], answer: Result<Answer, ErrorType>) -> Vec<u8> {
    match answer {
        Ok(Answer::Short(params)) => short_reply(request, params),
        Ok(Answer::Long(params)) => {
            let mut report = vec![0u8; LONG_REPORT_LENGTH];
            report[..4].copy_from_slice(&[LONG_REPORT_ID, request[1], request[2], request[3]]);
            let len = params.len().min(LONG_REPORT_LENGTH - 4);
            report[4..4 + len].copy_from_slice(&params[..len]);
            report
        },
        Err(code) => {
            let mut report = vec![0u8; SHORT_REPORT_LENGTH];
            report[..6].copy_from_slice(&[
                SHORT_REPORT_ID,
                request[1],
                ERROR_FEATURE_INDEX,
                request[2],
                request[3],
                u8::from(code),
            ]);
            report
        },
    }
}

/// Per-control reporting state: divert, persist and remap target.
type Reporting = HashMap<ControlId, (bool, bool, ControlId)>;

/// A HID++2.0 device paired to a [`MockChannel`].
#[derive(Clone, Debug)]
pub struct SimulatedDevice {
    device_index: u8,
    name: Vec<u8>,
    kind: DeviceType,
    features: Vec<(FeatureId, u8)>,
    controls: Vec<ControlId>,
    battery: (u8, BatteryStatus),
    silent: bool,
    unanswered: Vec<FeatureId>,
    reporting: Arc<Mutex<Reporting>>,
}

impl SimulatedDevice {
    /// A mouse with `buttons` controls. The first five are left, right,
    /// middle, back and forward, of which only back and forward are
    /// reprogrammable.
    pub fn mouse(device_index: u8, name: &str, buttons: u8) -> Self {
        let named = [
            ControlId::Left,
            ControlId::Right,
            ControlId::Middle,
            ControlId::Back,
            ControlId::Forward,
            ControlId::Thumb,
            ControlId::Top,
        ];
        let controls = (0..buttons as u16)
            .map(|i| named.get(i as usize).copied().unwrap_or(ControlId::Unknown(0x0100 + i)))
            .collect();

        Self::new(device_index, name, DeviceType::Mouse, controls)
    }

    pub fn keyboard(device_index: u8, name: &str) -> Self {
        Self::new(device_index, name, DeviceType::Keyboard, Vec::new())
    }

    fn new(device_index: u8, name: &str, kind: DeviceType, controls: Vec<ControlId>) -> Self {
        let features = FeatureId::DISCOVERED
            .into_iter()
            .filter(|id| *id != FeatureId::Root)
            .zip(1..)
            .collect();

        Self {
            device_index,
            name: name.as_bytes().to_vec(),
            kind,
            features,
            controls,
            battery: (90, BatteryStatus::Discharging),
            silent: false,
            unanswered: Vec::new(),
            reporting: Arc::default(),
        }
    }

    /// Never answers any request.
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Leaves root lookups of `id` unanswered while answering everything else.
    pub fn ignoring_lookup_of(mut self, id: FeatureId) -> Self {
        self.unanswered.push(id);
        self
    }

    /// Reports `name` as the device name, byte for byte.
    pub fn with_raw_name(mut self, name: &[u8]) -> Self {
        self.name = name.to_vec();
        self
    }

    /// Removes a feature, keeping the feature table contiguous.
    pub fn without_feature(mut self, id: FeatureId) -> Self {
        self.features.retain(|(feature, _)| *feature != id);
        for (slot, (_, index)) in self.features.iter_mut().enumerate() {
            *index = slot as u8 + 1;
        }
        self
    }

    pub fn with_battery(mut self, percentage: u8, status: BatteryStatus) -> Self {
        self.battery = (percentage, status);
        self
    }

    pub fn feature_index(&self, id: FeatureId) -> Option<u8> {
        self.features
            .iter()
            .find(|(feature, _)| *feature == id)
            .map(|(_, index)| *index)
    }

    fn ignores(&self, request: &[u8]) -> bool {
        if self.silent {
            return true;
        }

        match request {
            [_, _, 0x00, fn_sw, hi, lo, ..] if *fn_sw >> 4 == 0 => {
                let id = FeatureId::from(u16::from_be_bytes([*hi, *lo]));
                self.unanswered.contains(&id)
            },
            _ => false,
        }
    }

    fn version(id: FeatureId) -> u8 {
        match id {
            FeatureId::ControlsV4 => 4,
            FeatureId::Firmware | FeatureId::NameType => 2,
            _ => 0,
        }
    }

    fn answer(&self, request: &[u8]) -> Result<Answer, ErrorType> {
        let feature_index = request[2];
        let function = request[3] >> 4;
        let params = &request[4..];

        if feature_index == 0 {
            return match function {
                0 => {
                    let id = FeatureId::from(u16::from_be_bytes([params[0], params[1]]));
                    Ok(Answer::Short(match self.feature_index(id) {
                        Some(index) => [index, 0x00, Self::version(id)],
                        None => [0x00, 0x00, 0x00],
                    }))
                },
                1 => Ok(Answer::Short([4, 5, params[2]])),
                _ => Err(ErrorType::InvalidFunction),
            };
        }

        let Some(&(id, _)) = self.features.iter().find(|(_, index)| *index == feature_index) else {
            return Err(ErrorType::InvalidFeature);
        };

        match (id, function) {
            (FeatureId::FeatureSet, 0) => Ok(Answer::Short([self.features.len() as u8, 0x00, 0x00])),
            (FeatureId::FeatureSet, 1) => {
                let (id, _) = self
                    .features
                    .iter()
                    .find(|(_, index)| *index == params[0])
                    .ok_or(ErrorType::InvalidValue)?;
                let [id_hi, id_lo] = u16::from(*id).to_be_bytes();
                Ok(Answer::Long(vec![id_hi, id_lo, 0x00, Self::version(*id)]))
            },

            (FeatureId::Firmware, 0) => Ok(Answer::Short([1, 0x00, 0x00])),
            (FeatureId::Firmware, 1) if params[0] == 0 => Ok(Answer::Long(vec![
                0x00, b'M', b'P', b'M', 0x17, 0x00, 0x00, 0x22, 0x01, 0x40, 0x82,
            ])),
            (FeatureId::Firmware, 1) => Err(ErrorType::InvalidValue),

            (FeatureId::NameType, 0) => Ok(Answer::Short([self.name.len() as u8, 0x00, 0x00])),
            (FeatureId::NameType, 1) => {
                let offset = (params[0] as usize).min(self.name.len());
                let end = (offset + 16).min(self.name.len());
                Ok(Answer::Long(self.name[offset..end].to_vec()))
            },
            (FeatureId::NameType, 2) => Ok(Answer::Short([u8::from(self.kind), 0x00, 0x00])),

            (FeatureId::Battery, 0) => {
                let (percentage, status) = self.battery;
                Ok(Answer::Short([percentage, percentage, u8::from(status)]))
            },

            (FeatureId::ControlsV4, 0) => Ok(Answer::Short([self.controls.len() as u8, 0x00, 0x00])),
            (FeatureId::ControlsV4, 1) => {
                let cid = *self
                    .controls
                    .get(params[0] as usize)
                    .ok_or(ErrorType::InvalidParameter)?;
                let [cid_hi, cid_lo] = u16::from(cid).to_be_bytes();
                let flags = if Self::reprogrammable(cid) { 0x11 } else { 0x01 };
                Ok(Answer::Long(vec![
                    cid_hi, cid_lo, 0x00, 0x38, flags, 0x00, 0x01, 0x00, 0x00,
                ]))
            },
            (FeatureId::ControlsV4, 2) => {
                let cid = self.control(params)?;
                let (divert, persist, remap) = self
                    .reporting
                    .lock()
                    .unwrap()
                    .get(&cid)
                    .copied()
                    .unwrap_or((false, false, cid));
                Ok(Answer::Long(reporting_params(cid, divert, persist, remap)))
            },
            (FeatureId::ControlsV4, 3) => {
                let cid = self.control(params)?;
                if !Self::reprogrammable(cid) {
                    return Err(ErrorType::InvalidParameter);
                }

                let flags = params[2];
                let remap = ControlId::from(u16::from_be_bytes([params[3], params[4]]));
                let mut reporting = self.reporting.lock().unwrap();
                let state = reporting.entry(cid).or_insert((false, false, cid));
                if flags & 0x02 != 0 {
                    state.0 = flags & 0x01 != 0;
                }
                if flags & 0x08 != 0 {
                    state.1 = flags & 0x04 != 0;
                }
                if u16::from(remap) != 0 {
                    state.2 = remap;
                }

                Ok(Answer::Long(params[..5].to_vec()))
            },

            _ => Err(ErrorType::InvalidFunction),
        }
    }

    fn control(&self, params: &[u8]) -> Result<ControlId, ErrorType> {
        let cid = ControlId::from(u16::from_be_bytes([params[0], params[1]]));

        self.controls
            .contains(&cid)
            .then_some(cid)
            .ok_or(ErrorType::InvalidParameter)
    }

    fn reprogrammable(cid: ControlId) -> bool {
        !matches!(cid, ControlId::Left | ControlId::Right | ControlId::Middle)
    }
}

fn reporting_params(cid: ControlId, divert: bool, persist: bool, remap: ControlId) -> Vec<u8> {
    let [cid_hi, cid_lo] = u16::from(cid).to_be_bytes();
    let [remap_hi, remap_lo] = u16::from(remap).to_be_bytes();
    let flags = u8::from(divert) | (u8::from(persist) << 2);

    vec![cid_hi, cid_lo, flags, remap_hi, remap_lo]
}
