//! Multisample extraction from a board's word buffer
//!
//! Test-run and engineering-run buffers are laid out front to back as
//! `header words | multisamples | tail word`. 2019 buffers hold one or more
//! trailer-closed frames that are located by scanning from the end.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::common::{Multisample, MultisampleKind, MULTISAMPLE_WORDS};
use crate::config::{Era, EraLayout};

use super::common::FrameTail;
use super::{classify, phys2019};

/// One frame of multisamples cut out of a board buffer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardFrame {
    /// Frame header word
    pub header: u32,
    /// Frame tail word
    pub tail: u32,
    /// Multisamples in buffer order
    pub multisamples: Vec<Multisample>,
    /// Words between header and tail that do not form a full multisample
    pub dangling_words: usize,
}

impl BoardFrame {
    /// Multisample count declared by the tail word
    pub fn declared_count(&self) -> u32 {
        FrameTail::decode(self.tail).multisample_count
    }

    /// Multisamples actually present in the buffer
    pub fn consumed_count(&self) -> usize {
        self.multisamples.len()
    }

    /// Data multisamples, with their ordinal among data multisamples
    pub fn data(&self) -> impl Iterator<Item = (usize, &Multisample)> {
        self.multisamples.iter().filter(|ms| ms.is_data()).enumerate()
    }

    /// APV header multisamples
    pub fn sub_headers(&self) -> impl Iterator<Item = &Multisample> {
        self.multisamples.iter().filter(|ms| ms.is_header())
    }
}

/// Split a board buffer into frames of multisamples
///
/// Never fails: a buffer too short to hold a frame, or a 2019 buffer
/// without a trailer, yields no frames.
pub fn extract_frames(layout: &EraLayout, words: &[u32]) -> Vec<BoardFrame> {
    match layout.era {
        Era::TestRun | Era::EngineeringRun => extract_forward(layout, words)
            .map(|frame| vec![frame])
            .unwrap_or_default(),
        Era::Phys2019 => extract_backward(words),
    }
}

fn group(words: &[u32]) -> [u32; MULTISAMPLE_WORDS] {
    [words[0], words[1], words[2], words[3]]
}

fn extract_forward(layout: &EraLayout, words: &[u32]) -> Option<BoardFrame> {
    let frame_overhead = layout.header_len + layout.tail_len;
    if words.is_empty() || words.len() < frame_overhead || layout.header_len == 0 {
        if !words.is_empty() {
            debug!(
                words = words.len(),
                minimum = frame_overhead,
                "Board buffer too short for a frame"
            );
        }
        return None;
    }

    let header = words[0];
    let tail = words[words.len() - layout.tail_len];
    let region = &words[layout.header_len..words.len() - layout.tail_len];

    let chunks = region.chunks_exact(MULTISAMPLE_WORDS);
    let dangling_words = chunks.remainder().len();
    let multisamples: Vec<Multisample> = chunks
        .map(|chunk| {
            let words = group(chunk);
            Multisample::new(classify(layout.era, &words), words)
        })
        .collect();

    trace!(
        multisamples = multisamples.len(),
        dangling = dangling_words,
        "Extracted frame"
    );

    Some(BoardFrame {
        header,
        tail,
        multisamples,
        dangling_words,
    })
}

fn extract_backward(words: &[u32]) -> Vec<BoardFrame> {
    let mut frames = Vec::new();
    let mut index = words.len();

    while index > 0 {
        index -= 1;
        if !phys2019::is_trailer_tag(words[index]) {
            continue;
        }
        let Some(trailer) = phys2019::trailer(words, index) else {
            continue;
        };

        let trailer_start = index + 1 - phys2019::TRAILER_WORDS;
        let declared = trailer.multisample_count() as usize;
        let available = trailer_start / MULTISAMPLE_WORDS;
        let consumed = declared.min(available);
        if consumed < declared {
            debug!(
                declared,
                available, "Trailer declares more multisamples than the buffer holds"
            );
        }

        let mut multisamples = Vec::with_capacity(consumed);
        for n in 1..=consumed {
            let start = trailer_start - n * MULTISAMPLE_WORDS;
            let words = group(&words[start..start + MULTISAMPLE_WORDS]);
            let kind = if phys2019::is_header(&words) {
                MultisampleKind::Header
            } else {
                MultisampleKind::Data
            };
            multisamples.push(Multisample::new(kind, words));
        }
        multisamples.reverse();

        frames.push(BoardFrame {
            header: trailer.header,
            tail: trailer.tail,
            multisamples,
            dangling_words: 0,
        });

        index = trailer_start - consumed * MULTISAMPLE_WORDS;
    }

    frames.reverse();
    frames
}
