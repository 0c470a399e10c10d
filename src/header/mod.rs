//! SVT header assembly and validation
//!
//! The reader feeds every extracted frame into a [`HeaderAssembler`]; the
//! resulting [`RocHeaderRecord`]s are checked by [`validate`] and the outcome
//! is attached to the decoded event as a [`HeaderStatus`].

pub mod assembler;
pub mod error;
pub mod validator;

pub use assembler::HeaderAssembler;
pub use error::{AssemblyError, HeaderError, HeaderErrorKind};
pub use validator::validate;

use serde::{Deserialize, Serialize};

use crate::common::MULTISAMPLE_WORDS;

/// Header metadata of one ROC in one event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RocHeaderRecord {
    pub roc: u32,
    /// Frame header word of the first frame
    pub header: u32,
    /// Frame tail word: error flags of every frame combined, count of the last
    pub tail: u32,
    /// APV sub-header multisamples in readout order
    pub multisample_headers: Vec<[u32; MULTISAMPLE_WORDS]>,
}

/// What to do with an event whose headers fail validation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HeaderPolicy {
    /// Record the failures in the event and keep its samples
    #[default]
    Collect,
    /// Reject the event on the first failure
    FailClosed,
}

/// Header validation outcome attached to a decoded event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderStatus {
    pub errors: Vec<HeaderError>,
    pub assembly_errors: Vec<AssemblyError>,
}

impl HeaderStatus {
    /// No integrity or assembly failure was found
    pub fn headers_good(&self) -> bool {
        self.errors.is_empty() && self.assembly_errors.is_empty()
    }

    /// Representative integrity failure
    pub fn first_error(&self) -> Option<&HeaderError> {
        self.errors.first()
    }
}
