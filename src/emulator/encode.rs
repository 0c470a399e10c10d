//! Inverse codecs: pack fields into SVT wire words
//!
//! Every function here mirrors a decoder in [`crate::reader::decoder`] and
//! masks its inputs to the field width, so out-of-range values are
//! truncated the way the front-end firmware would.

use crate::common::{MultisampleKind, MULTISAMPLE_WORDS, SAMPLES_PER_MULTISAMPLE};
use crate::config::EraLayout;
use crate::reader::decoder::common::{FRAME_COUNT_MASK, SAMPLE_MASK};
use crate::reader::decoder::phys2019::TRAILER_TAG;

const HEADER_FLAG: u32 = 1 << 30;
const TAIL_FLAG: u32 = 1 << 29;
const ERROR_BIT: u32 = 1 << 28;
const PHYS2019_HEADER_MARKER: u32 = 1 << 31;

/// Pack six samples into three payload words, low half-word first
pub fn pack_samples(samples: &[i16; SAMPLES_PER_MULTISAMPLE]) -> [u32; 3] {
    let half = |n: usize| samples[n] as u16 as u32 & SAMPLE_MASK;
    [
        half(0) | (half(1) << 16),
        half(2) | (half(3) << 16),
        half(4) | (half(5) << 16),
    ]
}

/// One APV header slot: read bit, buffer address, frame count
fn apv_slot(read_ok: bool, buffer_address: u8, frame_count: u8) -> u32 {
    u32::from(read_ok) | (u32::from(buffer_address) << 1) | ((u32::from(frame_count) & FRAME_COUNT_MASK) << 9)
}

/// Payload words of an APV header multisample
pub fn apv_header_payload(
    read_ok: &[bool; SAMPLES_PER_MULTISAMPLE],
    buffer_addresses: &[u8; SAMPLES_PER_MULTISAMPLE],
    frame_counts: &[u8; SAMPLES_PER_MULTISAMPLE],
) -> [u32; 3] {
    let slot = |n: usize| apv_slot(read_ok[n], buffer_addresses[n], frame_counts[n]);
    [
        slot(0) | (slot(1) << 16),
        slot(2) | (slot(3) << 16),
        slot(4) | (slot(5) << 16),
    ]
}

/// Test-run address word
pub fn test_run_address(fpga: u32, hybrid: u32, channel: u32) -> u32 {
    (fpga & 0xFFFF) | ((channel & 0x7F) << 16) | ((hybrid & 0x3) << 28)
}

/// Test-run data multisample: address word then payload
pub fn test_run_multisample(address: u32, payload: [u32; 3]) -> [u32; MULTISAMPLE_WORDS] {
    [address, payload[0], payload[1], payload[2]]
}

/// FEB-addressed multisample tail word without role flags
pub fn feb_tail_word(feb: u32, hybrid: u32, apv: u32, channel: u32, error: bool) -> u32 {
    ((feb & 0xFF) << 8)
        | ((channel & 0x7F) << 16)
        | ((apv & 0x7) << 23)
        | ((hybrid & 0x3) << 26)
        | if error { ERROR_BIT } else { 0 }
}

/// Engineering-run multisample with role flags applied to the tail word
pub fn engineering_multisample(
    kind: MultisampleKind,
    tail_word: u32,
    payload: [u32; 3],
) -> [u32; MULTISAMPLE_WORDS] {
    let flags = match kind {
        MultisampleKind::Header => HEADER_FLAG,
        MultisampleKind::Tail => HEADER_FLAG | TAIL_FLAG,
        MultisampleKind::Data => 0,
    };
    [payload[0], payload[1], payload[2], tail_word | flags]
}

/// 2019 multisample; headers carry the top-bit marker
pub fn phys2019_multisample(header: bool, tail_word: u32, payload: [u32; 3]) -> [u32; MULTISAMPLE_WORDS] {
    let marker = if header { PHYS2019_HEADER_MARKER } else { 0 };
    [payload[0], payload[1], payload[2], tail_word | marker]
}

/// Frame header word
pub fn frame_header(data_type: u8, event_counter: u32) -> u32 {
    (u32::from(data_type) << 24) | (event_counter & 0xFF_FFFF)
}

/// Frame tail word
pub fn frame_tail(multisample_count: u32, skip_count: u32, sync_error: bool, overflow_error: bool) -> u32 {
    (multisample_count & 0xFFF)
        | ((skip_count & 0xFFF) << 12)
        | (u32::from(sync_error) << 26)
        | (u32::from(overflow_error) << 27)
}

/// Board buffer for the forward-read layouts
///
/// The frame header word opens the header block; the remaining header words
/// are zero.
pub fn forward_buffer(
    layout: &EraLayout,
    header: u32,
    multisamples: &[[u32; MULTISAMPLE_WORDS]],
    tail: u32,
) -> Vec<u32> {
    let header_len = layout.header_len.max(1);
    let mut words = Vec::with_capacity(header_len + multisamples.len() * MULTISAMPLE_WORDS + 1);
    words.push(header);
    words.resize(header_len, 0);
    for multisample in multisamples {
        words.extend_from_slice(multisample);
    }
    words.push(tail);
    words
}

/// 2019 trailer closing a frame
pub fn trailer(header: u32, tail: u32) -> [u32; 4] {
    [header, tail, 0, TRAILER_TAG << 27]
}

/// Append one trailer-closed frame to a 2019 board buffer
pub fn append_phys2019_frame(
    words: &mut Vec<u32>,
    header: u32,
    tail: u32,
    multisamples: &[[u32; MULTISAMPLE_WORDS]],
) {
    for multisample in multisamples {
        words.extend_from_slice(multisample);
    }
    words.extend_from_slice(&trailer(header, tail));
}
