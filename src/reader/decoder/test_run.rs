//! Test-run multisample layout
//!
//! Word 0 addresses the channel (FPGA, hybrid, channel); words 1-3 carry the
//! six samples. Test-run frames have no APV header or tail multisamples.

use crate::common::{DaqAddress, MultisampleKind, MULTISAMPLE_WORDS, SAMPLES_PER_MULTISAMPLE};

use super::common;

mod constants {
    pub const SAMPLE_HEADER_INDEX: usize = 0;
    pub const FPGA_MASK: u32 = 0xFFFF;
    pub const HYBRID_SHIFT: u32 = 28;
    pub const HYBRID_MASK: u32 = 0x3;
    pub const CHANNEL_SHIFT: u32 = 16;
    pub const CHANNEL_MASK: u32 = 0x7F;
}

/// FPGA id (0-7 in practice)
pub fn fpga_id(words: &[u32; MULTISAMPLE_WORDS]) -> u32 {
    words[constants::SAMPLE_HEADER_INDEX] & constants::FPGA_MASK
}

/// Hybrid id (0-2 in practice)
pub fn hybrid_id(words: &[u32; MULTISAMPLE_WORDS]) -> u32 {
    (words[constants::SAMPLE_HEADER_INDEX] >> constants::HYBRID_SHIFT) & constants::HYBRID_MASK
}

/// Channel number (0-127)
pub fn channel(words: &[u32; MULTISAMPLE_WORDS]) -> u16 {
    ((words[constants::SAMPLE_HEADER_INDEX] >> constants::CHANNEL_SHIFT) & constants::CHANNEL_MASK)
        as u16
}

pub fn daq_address(words: &[u32; MULTISAMPLE_WORDS]) -> DaqAddress {
    DaqAddress::new(fpga_id(words), hybrid_id(words))
}

pub fn classify(_words: &[u32; MULTISAMPLE_WORDS]) -> MultisampleKind {
    MultisampleKind::Data
}

pub fn payload(words: &[u32; MULTISAMPLE_WORDS]) -> [u32; 3] {
    [words[1], words[2], words[3]]
}

pub fn samples(words: &[u32; MULTISAMPLE_WORDS]) -> [i16; SAMPLES_PER_MULTISAMPLE] {
    common::samples(&payload(words))
}
