//! Bit fields shared by all SVT wire layouts
//!
//! Payload words carry two 16-bit halves each. In a data multisample the
//! halves are ADC samples; in an APV header multisample each half describes
//! one APV slot (read-error bit, buffer address, frame count).

use serde::{Deserialize, Serialize};

use crate::common::SAMPLES_PER_MULTISAMPLE;

mod constants {
    pub const SAMPLE_MASK: u32 = 0xFFFF;
    pub const HALF_WORD_SHIFT: u32 = 16;

    // APV header slot (relative to the half-word)
    pub const READ_ERROR_MASK: u32 = 0x1; // [0:0]
    pub const BUFFER_ADDRESS_SHIFT: u32 = 1;
    pub const BUFFER_ADDRESS_MASK: u32 = 0xFF; // [8:1]
    pub const FRAME_COUNT_SHIFT: u32 = 9;
    pub const FRAME_COUNT_MASK: u32 = 0xF; // [12:9]

    // Frame header word
    pub const DATA_TYPE_SHIFT: u32 = 24;
    pub const DATA_TYPE_MASK: u32 = 0xFF;
    pub const EVENT_COUNTER_MASK: u32 = 0xFF_FFFF;

    // Frame tail word
    pub const MULTISAMPLE_COUNT_MASK: u32 = 0xFFF;
    pub const SKIP_COUNT_SHIFT: u32 = 12;
    pub const SKIP_COUNT_MASK: u32 = 0xFFF;
    pub const SYNC_ERROR_SHIFT: u32 = 26;
    pub const OVERFLOW_ERROR_SHIFT: u32 = 27;
}

pub use constants::{FRAME_COUNT_MASK, SAMPLE_MASK};

/// Half-word `n` (0..6) of three payload words
#[inline]
fn half_word(payload: &[u32; 3], n: usize) -> u32 {
    (payload[n / 2] >> (constants::HALF_WORD_SHIFT * (n % 2) as u32)) & constants::SAMPLE_MASK
}

/// The six ADC samples, low half-word first
pub fn samples(payload: &[u32; 3]) -> [i16; SAMPLES_PER_MULTISAMPLE] {
    std::array::from_fn(|n| half_word(payload, n) as u16 as i16)
}

/// Buffer address of each APV slot
pub fn apv_buffer_addresses(payload: &[u32; 3]) -> [u8; SAMPLES_PER_MULTISAMPLE] {
    std::array::from_fn(|n| {
        ((half_word(payload, n) >> constants::BUFFER_ADDRESS_SHIFT)
            & constants::BUFFER_ADDRESS_MASK) as u8
    })
}

/// Frame count of each APV slot
pub fn apv_frame_counts(payload: &[u32; 3]) -> [u8; SAMPLES_PER_MULTISAMPLE] {
    std::array::from_fn(|n| {
        ((half_word(payload, n) >> constants::FRAME_COUNT_SHIFT) & constants::FRAME_COUNT_MASK)
            as u8
    })
}

/// Read-error bit of each APV slot (active low: 1 means no error)
pub fn apv_read_errors(payload: &[u32; 3]) -> [u8; SAMPLES_PER_MULTISAMPLE] {
    std::array::from_fn(|n| (half_word(payload, n) & constants::READ_ERROR_MASK) as u8)
}

/// Fields of the word opening an SVT frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameHeader {
    pub data_type: u8,
    pub event_counter: u32,
}

impl FrameHeader {
    pub fn decode(word: u32) -> Self {
        Self {
            data_type: ((word >> constants::DATA_TYPE_SHIFT) & constants::DATA_TYPE_MASK) as u8,
            event_counter: word & constants::EVENT_COUNTER_MASK,
        }
    }
}

/// Fields of the word closing an SVT frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameTail {
    /// Multisamples declared in the frame
    pub multisample_count: u32,
    /// Multisamples dropped by the front end
    pub skip_count: u32,
    pub sync_error: bool,
    pub overflow_error: bool,
}

impl FrameTail {
    pub fn decode(word: u32) -> Self {
        Self {
            multisample_count: word & constants::MULTISAMPLE_COUNT_MASK,
            skip_count: (word >> constants::SKIP_COUNT_SHIFT) & constants::SKIP_COUNT_MASK,
            sync_error: (word >> constants::SYNC_ERROR_SHIFT) & 0x1 != 0,
            overflow_error: (word >> constants::OVERFLOW_ERROR_SHIFT) & 0x1 != 0,
        }
    }

    pub fn encode(&self) -> u32 {
        (self.multisample_count & constants::MULTISAMPLE_COUNT_MASK)
            | ((self.skip_count & constants::SKIP_COUNT_MASK) << constants::SKIP_COUNT_SHIFT)
            | (u32::from(self.sync_error) << constants::SYNC_ERROR_SHIFT)
            | (u32::from(self.overflow_error) << constants::OVERFLOW_ERROR_SHIFT)
    }

    /// Fold a later tail of the same ROC into this one
    ///
    /// Error flags accumulate and the largest skip count wins; the
    /// multisample count is taken from `later`.
    pub fn merge(self, later: FrameTail) -> Self {
        Self {
            multisample_count: later.multisample_count,
            skip_count: self.skip_count.max(later.skip_count),
            sync_error: self.sync_error || later.sync_error,
            overflow_error: self.overflow_error || later.overflow_error,
        }
    }
}
