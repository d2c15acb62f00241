//! Device features and the per-device table mapping feature IDs to the
//! indices a device assigned them.

use std::{fmt, sync::Arc};

use num_enum::{FromPrimitive, IntoPrimitive};
use tracing::debug;

use crate::{
    channel::{ChannelError, HidppChannel},
    protocol::v20::Hidpp20Error,
};

pub mod battery;
pub mod device_information;
pub mod device_type_and_name;
pub mod feature_set;
pub mod reprog_controls;
pub mod root;

use root::RootFeature;

/// Represents the globally unique ID of a HID++2.0 feature.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, IntoPrimitive, FromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u16)]
pub enum FeatureId {
    Root = 0x0000,
    FeatureSet = 0x0001,
    Firmware = 0x0003,
    NameType = 0x0005,
    Reset = 0x0020,
    Crypto = 0x0021,
    Battery = 0x1000,
    Host = 0x1814,
    ControlsV4 = 0x1b04,

    #[num_enum(catch_all)]
    Unknown(u16),
}

impl FeatureId {
    /// The features looked up for every device, in lookup order.
    pub const DISCOVERED: [FeatureId; 9] = [
        FeatureId::Root,
        FeatureId::FeatureSet,
        FeatureId::Firmware,
        FeatureId::NameType,
        FeatureId::Reset,
        FeatureId::Crypto,
        FeatureId::Battery,
        FeatureId::Host,
        FeatureId::ControlsV4,
    ];

    /// A short human readable name of the feature.
    pub fn name(self) -> &'static str {
        match self {
            FeatureId::Root => "root",
            FeatureId::FeatureSet => "feature_set",
            FeatureId::Firmware => "firmware",
            FeatureId::NameType => "name/type",
            FeatureId::Reset => "reset",
            FeatureId::Crypto => "crypto",
            FeatureId::Battery => "battery",
            FeatureId::Host => "host",
            FeatureId::ControlsV4 => "controls_v4",
            FeatureId::Unknown(_) => "unknown",
        }
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#06x})", self.name(), u16::from(*self))
    }
}

/// A bitfield describing some properties of a feature.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FeatureType {
    /// The feature was replaced by a newer one and is only advertised for
    /// older software.
    pub obsolete: bool,

    /// The feature should not be managed by end user configuration software.
    pub hidden: bool,

    /// The feature is disabled for user software and used for internal
    /// testing and manufacturing.
    pub engineering: bool,

    pub manufacturing_deactivatable: bool,

    pub compliance_deactivatable: bool,
}

impl FeatureType {
    const OBSOLETE: u8 = 1 << 7;
    const HIDDEN: u8 = 1 << 6;
    const ENGINEERING: u8 = 1 << 5;
    const MANUFACTURING_DEACTIVATABLE: u8 = 1 << 4;
    const COMPLIANCE_DEACTIVATABLE: u8 = 1 << 3;
}

impl From<u8> for FeatureType {
    fn from(value: u8) -> Self {
        Self {
            obsolete: value & Self::OBSOLETE != 0,
            hidden: value & Self::HIDDEN != 0,
            engineering: value & Self::ENGINEERING != 0,
            manufacturing_deactivatable: value & Self::MANUFACTURING_DEACTIVATABLE != 0,
            compliance_deactivatable: value & Self::COMPLIANCE_DEACTIVATABLE != 0,
        }
    }
}

impl From<FeatureType> for u8 {
    fn from(value: FeatureType) -> Self {
        [
            (value.obsolete, FeatureType::OBSOLETE),
            (value.hidden, FeatureType::HIDDEN),
            (value.engineering, FeatureType::ENGINEERING),
            (
                value.manufacturing_deactivatable,
                FeatureType::MANUFACTURING_DEACTIVATABLE,
            ),
            (
                value.compliance_deactivatable,
                FeatureType::COMPLIANCE_DEACTIVATABLE,
            ),
        ]
        .into_iter()
        .filter(|(set, _)| *set)
        .fold(0, |raw, (_, bit)| raw | bit)
    }
}

/// A feature supported by a specific device.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Feature {
    pub id: FeatureId,

    /// The index the device assigned to the feature.
    pub index: u8,

    pub version: u8,

    pub typ: FeatureType,
}

impl Feature {
    /// The root feature, which lives at index 0 on every device.
    pub const ROOT: Feature = Feature {
        id: FeatureId::Root,
        index: 0,
        version: 0,
        typ: FeatureType {
            obsolete: false,
            hidden: false,
            engineering: false,
            manufacturing_deactivatable: false,
            compliance_deactivatable: false,
        },
    };
}

/// The features of one device that were found during discovery.
///
/// Features the device does not support are simply absent.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FeatureTable {
    features: Vec<Feature>,
}

impl Default for FeatureTable {
    fn default() -> Self {
        Self {
            features: vec![Feature::ROOT],
        }
    }
}

impl FeatureTable {
    /// Looks up every feature of [`FeatureId::DISCOVERED`] on a device.
    ///
    /// Fails if the lookup of the root feature itself fails, as that means
    /// there is no reachable device, or if the channel gets closed. Features
    /// the device reports as unsupported, rejects or leaves unanswered are
    /// left out.
    pub async fn discover(root: &RootFeature) -> Result<Self, Hidpp20Error> {
        let device_index = root.device_index();

        root.get_feature(FeatureId::Root).await?;

        let mut table = Self::default();
        for id in FeatureId::DISCOVERED {
            if id == FeatureId::Root {
                continue;
            }

            match root.get_feature(id).await {
                Ok(Some(info)) => table.features.push(Feature {
                    id,
                    index: info.index,
                    version: info.version,
                    typ: info.typ,
                }),
                Ok(None) => debug!(device_index, feature = %id, "feature is not supported"),
                Err(err @ Hidpp20Error::Channel(ChannelError::Closed)) => return Err(err),
                Err(err) => debug!(device_index, feature = %id, %err, "feature lookup failed"),
            }
        }

        Ok(table)
    }

    /// The index the device assigned to a feature.
    ///
    /// The root feature always resolves to index 0.
    pub fn index_of(&self, id: FeatureId) -> Option<u8> {
        self.get(id).map(|feature| feature.index)
    }

    pub fn get(&self, id: FeatureId) -> Option<&Feature> {
        self.features.iter().find(|feature| feature.id == id)
    }

    pub fn contains(&self, id: FeatureId) -> bool {
        self.get(id).is_some()
    }

    /// Iterates over the features in discovery order, starting with root.
    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Always `false`, as the root feature is part of every table.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Represents a feature implementation that can be bound to a device once the
/// feature's index is known.
pub trait CreatableFeature: Sized {
    /// The protocol ID of the implemented feature.
    const ID: FeatureId;

    /// The version of the feature the implementation starts to support.
    const STARTING_VERSION: u8;

    /// Creates a new instance of the feature implementation.
    fn new(chan: Arc<HidppChannel>, device_index: u8, feature_index: u8) -> Self;
}
