//! Header integrity and assembly errors

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::common::SAMPLES_PER_MULTISAMPLE;

/// Integrity failure found while validating a ROC header record
///
/// `index` is the position of the offending multisample sub-header within
/// the ROC's record.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeaderError {
    #[error(
        "ROC {roc}: APV buffer addresses of sub-header {index} {found:?} differ from sub-header {reference_index} {reference:?}"
    )]
    ApvBufferAddressMismatch {
        roc: u32,
        reference_index: usize,
        index: usize,
        reference: [u8; SAMPLES_PER_MULTISAMPLE],
        found: [u8; SAMPLES_PER_MULTISAMPLE],
    },

    #[error("ROC {roc}: invalid APV frame counts {frame_counts:?} in sub-header {index} (previous {previous:?})")]
    ApvFrameCountInvalid {
        roc: u32,
        index: usize,
        previous: Option<[u8; SAMPLES_PER_MULTISAMPLE]>,
        frame_counts: [u8; SAMPLES_PER_MULTISAMPLE],
    },

    #[error("ROC {roc}: APV read error in sub-header {index} (read bits {read_errors:?})")]
    ApvReadError {
        roc: u32,
        index: usize,
        read_errors: [u8; SAMPLES_PER_MULTISAMPLE],
    },

    #[error("ROC {roc}: multisample error bit set in sub-header {index} (tail word 0x{tail_word:08x})")]
    MultisampleErrorBit { roc: u32, index: usize, tail_word: u32 },

    #[error("ROC {roc}: frame sync error (tail 0x{tail:08x})")]
    SyncError { roc: u32, tail: u32 },

    #[error("ROC {roc}: frame overflow error (tail 0x{tail:08x})")]
    OverflowError { roc: u32, tail: u32 },

    #[error("ROC {roc}: {skip_count} multisamples skipped (tail 0x{tail:08x})")]
    SkipCountNonzero { roc: u32, tail: u32, skip_count: u32 },
}

/// Discriminant of a [`HeaderError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HeaderErrorKind {
    ApvBufferAddressMismatch,
    ApvFrameCountInvalid,
    ApvReadError,
    MultisampleErrorBit,
    SyncError,
    OverflowError,
    SkipCountNonzero,
}

impl HeaderError {
    pub fn kind(&self) -> HeaderErrorKind {
        match self {
            Self::ApvBufferAddressMismatch { .. } => HeaderErrorKind::ApvBufferAddressMismatch,
            Self::ApvFrameCountInvalid { .. } => HeaderErrorKind::ApvFrameCountInvalid,
            Self::ApvReadError { .. } => HeaderErrorKind::ApvReadError,
            Self::MultisampleErrorBit { .. } => HeaderErrorKind::MultisampleErrorBit,
            Self::SyncError { .. } => HeaderErrorKind::SyncError,
            Self::OverflowError { .. } => HeaderErrorKind::OverflowError,
            Self::SkipCountNonzero { .. } => HeaderErrorKind::SkipCountNonzero,
        }
    }

    /// ROC the error was found in
    pub fn roc(&self) -> u32 {
        match self {
            Self::ApvBufferAddressMismatch { roc, .. }
            | Self::ApvFrameCountInvalid { roc, .. }
            | Self::ApvReadError { roc, .. }
            | Self::MultisampleErrorBit { roc, .. }
            | Self::SyncError { roc, .. }
            | Self::OverflowError { roc, .. }
            | Self::SkipCountNonzero { roc, .. } => *roc,
        }
    }
}

/// Failure detected while assembling a ROC header record
///
/// Signals a mis-sliced buffer: the frame tail disagrees with what was
/// actually found between header and tail.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssemblyError {
    #[error("ROC {roc}: tail declares {declared} multisamples but {actual} were found ({dangling_words} dangling words)")]
    MultisampleCountMismatch {
        roc: u32,
        declared: u32,
        actual: usize,
        dangling_words: usize,
    },
}

impl AssemblyError {
    pub fn roc(&self) -> u32 {
        match self {
            Self::MultisampleCountMismatch { roc, .. } => *roc,
        }
    }
}
