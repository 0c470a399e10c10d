//! Decoder module for SVT multisample data
//!
//! Pure field extraction for the three wire layouts plus the extraction of
//! multisample frames from a board buffer. The layout is selected by the
//! run [`Era`] and never inferred from the data.

pub mod common;
pub mod engineering;
pub mod extract;
pub mod phys2019;
pub mod test_run;

pub use common::{FrameHeader, FrameTail};
pub use extract::{extract_frames, BoardFrame};

use crate::common::{DaqAddress, MultisampleKind, MULTISAMPLE_WORDS, SAMPLES_PER_MULTISAMPLE};
use crate::config::Era;

/// DAQ address a multisample was read out from
pub fn daq_address(era: Era, words: &[u32; MULTISAMPLE_WORDS]) -> DaqAddress {
    match era {
        Era::TestRun => test_run::daq_address(words),
        Era::EngineeringRun => engineering::daq_address(words),
        Era::Phys2019 => phys2019::daq_address(words),
    }
}

/// Sensor channel of a data multisample
///
/// `None` when the APV index is outside the hybrid.
pub fn channel(era: Era, words: &[u32; MULTISAMPLE_WORDS]) -> Option<u16> {
    match era {
        Era::TestRun => Some(test_run::channel(words)),
        Era::EngineeringRun => engineering::physical_channel(engineering::tail_word(words)),
        Era::Phys2019 => phys2019::physical_channel(phys2019::tail_word(words)),
    }
}

/// The six ADC samples of a data multisample
pub fn samples(era: Era, words: &[u32; MULTISAMPLE_WORDS]) -> [i16; SAMPLES_PER_MULTISAMPLE] {
    match era {
        Era::TestRun => test_run::samples(words),
        Era::EngineeringRun => engineering::samples(words),
        Era::Phys2019 => phys2019::samples(words),
    }
}

/// Header, data or tail
pub fn classify(era: Era, words: &[u32; MULTISAMPLE_WORDS]) -> MultisampleKind {
    match era {
        Era::TestRun => test_run::classify(words),
        Era::EngineeringRun => engineering::classify(words),
        Era::Phys2019 => phys2019::classify(words),
    }
}

/// Fields of an APV header multisample
///
/// Header multisamples only occur in the FEB-addressed layouts, which share
/// the payload and error-bit positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApvHeader {
    pub buffer_addresses: [u8; SAMPLES_PER_MULTISAMPLE],
    pub frame_counts: [u8; SAMPLES_PER_MULTISAMPLE],
    pub read_errors: [u8; SAMPLES_PER_MULTISAMPLE],
    pub error_bit: u32,
    pub tail_word: u32,
}

impl ApvHeader {
    pub fn decode(words: &[u32; MULTISAMPLE_WORDS]) -> Self {
        let payload = engineering::payload(words);
        let tail_word = engineering::tail_word(words);
        Self {
            buffer_addresses: common::apv_buffer_addresses(&payload),
            frame_counts: common::apv_frame_counts(&payload),
            read_errors: common::apv_read_errors(&payload),
            error_bit: engineering::error_bit(tail_word),
            tail_word,
        }
    }
}
