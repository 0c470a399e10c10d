//! Common data types shared across components
//!
//! This module defines the decoded-record model produced by the reader:
//! DAQ addresses, sensor identifiers, multisamples and the per-event output.

use serde::{Deserialize, Serialize};

pub mod cli;
pub mod error;

pub use cli::CommonArgs;
pub use error::{DecodeError, DecodeResult};

use crate::header::{HeaderStatus, RocHeaderRecord};

/// Number of 32-bit words in one multisample
pub const MULTISAMPLE_WORDS: usize = 4;
/// Number of ADC samples carried by one multisample
pub const SAMPLES_PER_MULTISAMPLE: usize = 6;
/// Number of APV25 chips read out by one hybrid
pub const APV25_PER_HYBRID: u32 = 5;
/// Number of channels on one APV25
pub const CHANNELS_PER_APV25: u32 = 128;

/// Collection names used when tagging decoded output into an event
pub mod collections {
    /// Decoded per-channel samples
    pub const RAW_TRACKER_HITS: &str = "SVTRawTrackerHits";
    /// Retained ROC header records
    pub const SVT_HEADERS: &str = "SvtHeaders";
    /// Event metadata flag: all SVT headers passed validation
    pub const HEADERS_GOOD_FLAG: &str = "svt_event_header_good";
}

/// DAQ address of a readout hybrid
///
/// `board` is the FPGA id for test-run data and the FEB id otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DaqAddress {
    pub board: u32,
    pub hybrid: u32,
}

impl DaqAddress {
    pub fn new(board: u32, hybrid: u32) -> Self {
        Self { board, hybrid }
    }
}

impl std::fmt::Display for DaqAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.board, self.hybrid)
    }
}

/// Opaque physical-sensor identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SensorId(pub u32);

impl std::fmt::Display for SensorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sensor#{}", self.0)
    }
}

/// Role of a multisample within a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MultisampleKind {
    /// APV header: buffer addresses, frame counts, read-error bits
    Header,
    /// Six packed ADC samples for one channel
    Data,
    /// Frame-level trailer multisample
    Tail,
}

/// One 4-word multisample group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Multisample {
    pub kind: MultisampleKind,
    pub words: [u32; MULTISAMPLE_WORDS],
}

impl Multisample {
    pub fn new(kind: MultisampleKind, words: [u32; MULTISAMPLE_WORDS]) -> Self {
        Self { kind, words }
    }

    pub fn is_header(&self) -> bool {
        self.kind == MultisampleKind::Header
    }

    pub fn is_data(&self) -> bool {
        self.kind == MultisampleKind::Data
    }
}

/// Decoded samples of one channel, resolved to a sensor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedSample {
    /// Sensor the channel belongs to
    pub sensor: SensorId,
    /// Raw DAQ address the sensor was resolved from
    pub address: DaqAddress,
    /// ROC the samples were read out by
    pub roc: u32,
    /// Channel number on the sensor
    pub channel: u16,
    /// Ordinal of the data multisample within its frame
    pub pulse: u16,
    /// Six ADC samples in readout order
    pub samples: [i16; SAMPLES_PER_MULTISAMPLE],
}

impl std::fmt::Display for DecodedSample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} addr:{} roc:{:3} ch:{:4} p:{:3} s:{:?}",
            self.sensor, self.address, self.roc, self.channel, self.pulse, self.samples
        )
    }
}

/// Why a data multisample produced no sample record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedReason {
    /// No sensor is read out at the address
    UnknownAddress,
    /// The address resolves but the APV index does not exist on a hybrid
    ChannelOutOfRange,
}

impl std::fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownAddress => write!(f, "did not resolve to a sensor"),
            Self::ChannelOutOfRange => write!(f, "has an out-of-range APV channel"),
        }
    }
}

/// Occurrences of a DAQ address whose multisamples were diverted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedRecord {
    pub address: DaqAddress,
    pub reason: UnresolvedReason,
    pub occurrences: u64,
}

/// Everything the reader produced for one event
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecodedEvent {
    /// Event number assigned by the caller
    pub event_number: u64,
    /// Decoded samples, stored under [`collections::RAW_TRACKER_HITS`]
    pub samples: Vec<DecodedSample>,
    /// ROC header records, present only when header retention is enabled
    pub headers: Option<Vec<RocHeaderRecord>>,
    /// Header validation outcome
    pub header_status: HeaderStatus,
    /// Diverted multisamples in this event, per address and reason
    pub unresolved: Vec<UnresolvedRecord>,
}

impl DecodedEvent {
    /// Value of the [`collections::HEADERS_GOOD_FLAG`] metadata flag
    pub fn headers_good(&self) -> bool {
        self.header_status.headers_good()
    }

    /// Serialize to MessagePack bytes
    pub fn to_msgpack(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec(self)
    }

    /// Deserialize from MessagePack bytes
    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}
