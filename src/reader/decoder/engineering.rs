//! Engineering-run multisample layout
//!
//! Words 0-2 carry samples (or APV header slots); word 3 is the multisample
//! tail word holding the FEB address, channel, APV and header/tail flags.

use crate::common::{
    DaqAddress, MultisampleKind, APV25_PER_HYBRID, CHANNELS_PER_APV25, MULTISAMPLE_WORDS,
    SAMPLES_PER_MULTISAMPLE,
};

use super::common;

mod constants {
    pub const SAMPLE_HEADER_INDEX: usize = 3;
    pub const FEB_SHIFT: u32 = 8;
    pub const FEB_MASK: u32 = 0xFF;
    pub const CHANNEL_SHIFT: u32 = 16;
    pub const CHANNEL_MASK: u32 = 0x7F;
    pub const APV_SHIFT: u32 = 23;
    pub const APV_MASK: u32 = 0x7;
    pub const HYBRID_SHIFT: u32 = 26;
    pub const HYBRID_MASK: u32 = 0x3;
    pub const ERROR_BIT_SHIFT: u32 = 28;
    pub const TAIL_FLAG_SHIFT: u32 = 29;
    pub const HEADER_FLAG_SHIFT: u32 = 30;
}

/// The word carrying addressing and status bits
pub fn tail_word(words: &[u32; MULTISAMPLE_WORDS]) -> u32 {
    words[constants::SAMPLE_HEADER_INDEX]
}

/// FEB id from a multisample tail word (0-10 in practice)
pub fn feb_id(tail: u32) -> u32 {
    (tail >> constants::FEB_SHIFT) & constants::FEB_MASK
}

/// FEB hybrid id from a multisample tail word (0-3)
pub fn hybrid_id(tail: u32) -> u32 {
    (tail >> constants::HYBRID_SHIFT) & constants::HYBRID_MASK
}

/// APV index from a multisample tail word (0-4 when valid)
pub fn apv(tail: u32) -> u32 {
    (tail >> constants::APV_SHIFT) & constants::APV_MASK
}

/// APV-local channel from a multisample tail word (0-127)
pub fn channel(tail: u32) -> u32 {
    (tail >> constants::CHANNEL_SHIFT) & constants::CHANNEL_MASK
}

/// Multisample error bit; non-zero signals an error
pub fn error_bit(tail: u32) -> u32 {
    (tail >> constants::ERROR_BIT_SHIFT) & 0x1
}

pub fn has_header_flag(tail: u32) -> bool {
    (tail >> constants::HEADER_FLAG_SHIFT) & 0x1 == 1
}

pub fn has_tail_flag(tail: u32) -> bool {
    (tail >> constants::TAIL_FLAG_SHIFT) & 0x1 == 1
}

/// Sensor channel (0-639); `None` when the APV index is out of range
pub fn physical_channel(tail: u32) -> Option<u16> {
    let apv = apv(tail);
    if apv >= APV25_PER_HYBRID {
        return None;
    }
    Some(((APV25_PER_HYBRID - apv - 1) * CHANNELS_PER_APV25 + channel(tail)) as u16)
}

pub fn daq_address(words: &[u32; MULTISAMPLE_WORDS]) -> DaqAddress {
    let tail = tail_word(words);
    DaqAddress::new(feb_id(tail), hybrid_id(tail))
}

pub fn classify(words: &[u32; MULTISAMPLE_WORDS]) -> MultisampleKind {
    let tail = tail_word(words);
    match (has_header_flag(tail), has_tail_flag(tail)) {
        (true, false) => MultisampleKind::Header,
        (true, true) => MultisampleKind::Tail,
        _ => MultisampleKind::Data,
    }
}

pub fn payload(words: &[u32; MULTISAMPLE_WORDS]) -> [u32; 3] {
    [words[0], words[1], words[2]]
}

pub fn samples(words: &[u32; MULTISAMPLE_WORDS]) -> [i16; SAMPLES_PER_MULTISAMPLE] {
    common::samples(&payload(words))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tail(feb: u32, hybrid: u32, apv: u32, channel: u32) -> u32 {
        (hybrid << 26) | (apv << 23) | (channel << 16) | (feb << 8)
    }

    #[test]
    fn test_tail_word_fields() {
        let t = tail(9, 3, 4, 127) | (1 << 28);
        assert_eq!(feb_id(t), 9);
        assert_eq!(hybrid_id(t), 3);
        assert_eq!(apv(t), 4);
        assert_eq!(channel(t), 127);
        assert_eq!(error_bit(t), 1);
    }

    #[test]
    fn test_physical_channel() {
        // APV 0 sits at the top of the sensor
        assert_eq!(physical_channel(tail(0, 0, 0, 0)), Some(512));
        assert_eq!(physical_channel(tail(0, 0, 4, 5)), Some(5));
        assert_eq!(physical_channel(tail(0, 0, 2, 127)), Some(383));
        assert_eq!(physical_channel(tail(0, 0, 5, 0)), None);
        assert_eq!(physical_channel(tail(0, 0, 7, 0)), None);
    }

    #[test]
    fn test_classify() {
        let header = [0, 0, 0, 1 << 30];
        let tail_ms = [0, 0, 0, (1 << 30) | (1 << 29)];
        let data = [0, 0, 0, 1 << 29];
        assert_eq!(classify(&header), MultisampleKind::Header);
        assert_eq!(classify(&tail_ms), MultisampleKind::Tail);
        assert_eq!(classify(&data), MultisampleKind::Data);
    }

    #[test]
    fn test_daq_address_from_word_three() {
        let words = [0xFFFF_FFFF, 0xFFFF_FFFF, 0xFFFF_FFFF, tail(4, 1, 0, 0)];
        assert_eq!(daq_address(&words), DaqAddress::new(4, 1));
    }
}
