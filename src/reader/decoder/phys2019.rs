//! 2019 physics-run multisample layout
//!
//! Multisamples keep the engineering-run tail word fields but mark APV
//! headers with the top bit of word 3. Frames are closed by a 4-word trailer
//! whose last word carries the tag `0x15` in its top five bits; the trailer
//! has to be located by scanning the board buffer from the end.

use crate::common::{
    DaqAddress, MultisampleKind, APV25_PER_HYBRID, CHANNELS_PER_APV25, MULTISAMPLE_WORDS,
    SAMPLES_PER_MULTISAMPLE,
};

use super::{common, engineering};

mod constants {
    pub const HEADER_MARKER_SHIFT: u32 = 31;
    pub const TRAILER_TAG_SHIFT: u32 = 27;
    pub const TRAILER_TAG_MASK: u32 = 0x1F;
    pub const TRAILER_TAG: u32 = 0x15;
    pub const TRAILER_WORDS: usize = 4;
    /// FEBs whose hybrids read the APVs in swapped order
    pub const SWAPPED_APV_FEBS: [u32; 2] = [0, 1];
}

pub use constants::{TRAILER_TAG, TRAILER_WORDS};

pub use engineering::{apv, channel, error_bit, feb_id, hybrid_id, tail_word};

/// Whether the multisample is an APV header
pub fn is_header(words: &[u32; MULTISAMPLE_WORDS]) -> bool {
    (tail_word(words) >> constants::HEADER_MARKER_SHIFT) & 0x1 == 1
}

/// Whether `word` is the last word of a frame trailer
pub fn is_trailer_tag(word: u32) -> bool {
    (word >> constants::TRAILER_TAG_SHIFT) & constants::TRAILER_TAG_MASK == constants::TRAILER_TAG
}

/// Words of a trailer ending at index `tag_index`, in buffer order
///
/// Returns `None` if the buffer does not hold a full trailer there.
pub fn trailer(words: &[u32], tag_index: usize) -> Option<Trailer> {
    if tag_index + 1 < constants::TRAILER_WORDS || tag_index >= words.len() {
        return None;
    }
    let start = tag_index + 1 - constants::TRAILER_WORDS;
    Some(Trailer {
        header: words[start],
        tail: words[start + 1],
        reserved: words[start + 2],
        tag: words[start + 3],
    })
}

/// Frame trailer: header word, tail word, reserved word, tag word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trailer {
    pub header: u32,
    pub tail: u32,
    pub reserved: u32,
    pub tag: u32,
}

impl Trailer {
    /// Number of multisamples preceding the trailer
    pub fn multisample_count(&self) -> u32 {
        common::FrameTail::decode(self.tail).multisample_count
    }
}

/// Sensor channel from a multisample tail word
///
/// FEBs 0 and 1 count channels as `apv * 128 + channel` with APVs 0 and 1
/// swapped; every other FEB uses the engineering-run physical channel.
pub fn physical_channel(tail: u32) -> Option<u16> {
    let feb = feb_id(tail);
    if !constants::SWAPPED_APV_FEBS.contains(&feb) {
        return engineering::physical_channel(tail);
    }
    let apv = match apv(tail) {
        0 => 1,
        1 => 0,
        other => other,
    };
    if apv >= APV25_PER_HYBRID {
        return None;
    }
    Some((apv * CHANNELS_PER_APV25 + channel(tail)) as u16)
}

pub fn daq_address(words: &[u32; MULTISAMPLE_WORDS]) -> DaqAddress {
    let tail = tail_word(words);
    DaqAddress::new(feb_id(tail), hybrid_id(tail))
}

pub fn classify(words: &[u32; MULTISAMPLE_WORDS]) -> MultisampleKind {
    if is_header(words) {
        MultisampleKind::Header
    } else {
        MultisampleKind::Data
    }
}

pub fn samples(words: &[u32; MULTISAMPLE_WORDS]) -> [i16; SAMPLES_PER_MULTISAMPLE] {
    common::samples(&engineering::payload(words))
}
