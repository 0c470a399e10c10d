//! Header validation
//!
//! Checks every ROC record for consistency between its APV sub-headers and
//! for frame-level error flags. All problems are collected; whether the
//! first one aborts the event is left to the caller.

use tracing::trace;

use crate::common::SAMPLES_PER_MULTISAMPLE;
use crate::reader::decoder::common::FRAME_COUNT_MASK;
use crate::reader::decoder::{ApvHeader, FrameTail};

use super::error::HeaderError;
use super::RocHeaderRecord;

const MAX_FRAME_COUNT: u8 = FRAME_COUNT_MASK as u8;

/// Validate every record, in order
pub fn validate(records: &[RocHeaderRecord]) -> Vec<HeaderError> {
    let mut errors = Vec::new();
    for record in records {
        validate_record(record, &mut errors);
    }
    errors
}

/// Validate one ROC record, appending to `errors`
fn validate_record(record: &RocHeaderRecord, errors: &mut Vec<HeaderError>) {
    let roc = record.roc;
    let already_reported = errors.len();
    let mut reference: Option<[u8; SAMPLES_PER_MULTISAMPLE]> = None;
    let mut previous_counts: Option<[u8; SAMPLES_PER_MULTISAMPLE]> = None;

    for (index, words) in record.multisample_headers.iter().enumerate() {
        let header = ApvHeader::decode(words);

        match reference {
            None => reference = Some(header.buffer_addresses),
            Some(reference) if reference != header.buffer_addresses => {
                errors.push(HeaderError::ApvBufferAddressMismatch {
                    roc,
                    reference_index: 0,
                    index,
                    reference,
                    found: header.buffer_addresses,
                });
            }
            Some(_) => {}
        }

        if !frame_counts_valid(previous_counts.as_ref(), &header.frame_counts) {
            errors.push(HeaderError::ApvFrameCountInvalid {
                roc,
                index,
                previous: previous_counts,
                frame_counts: header.frame_counts,
            });
        }
        previous_counts = Some(header.frame_counts);

        if header.read_errors.iter().any(|&bit| bit != 1) {
            errors.push(HeaderError::ApvReadError {
                roc,
                index,
                read_errors: header.read_errors,
            });
        }

        if header.error_bit != 0 {
            errors.push(HeaderError::MultisampleErrorBit {
                roc,
                index,
                tail_word: header.tail_word,
            });
        }
    }

    if let Some(error) = check_tail(roc, record.tail) {
        errors.push(error);
    }

    trace!(
        roc,
        sub_headers = record.multisample_headers.len(),
        errors = errors.len() - already_reported,
        "Validated ROC headers"
    );
}

/// Whether `next` may follow `prev` in a 4-bit rolling frame counter
pub fn frame_count_follows(prev: u8, next: u8) -> bool {
    if prev > MAX_FRAME_COUNT || next > MAX_FRAME_COUNT {
        return false;
    }
    next >= prev || (prev == MAX_FRAME_COUNT && next == 0)
}

/// Frame counts must roll forward within a sub-header and slot by slot
/// against the previous sub-header
fn frame_counts_valid(
    previous: Option<&[u8; SAMPLES_PER_MULTISAMPLE]>,
    counts: &[u8; SAMPLES_PER_MULTISAMPLE],
) -> bool {
    if counts.iter().any(|&count| count > MAX_FRAME_COUNT) {
        return false;
    }
    let within = counts.windows(2).all(|pair| frame_count_follows(pair[0], pair[1]));
    let across = previous.map_or(true, |previous| {
        previous
            .iter()
            .zip(counts)
            .all(|(&prev, &next)| frame_count_follows(prev, next))
    });
    within && across
}

/// Sync, then overflow, then skip count; only the first is reported
fn check_tail(roc: u32, tail: u32) -> Option<HeaderError> {
    let fields = FrameTail::decode(tail);
    if fields.sync_error {
        Some(HeaderError::SyncError { roc, tail })
    } else if fields.overflow_error {
        Some(HeaderError::OverflowError { roc, tail })
    } else if fields.skip_count != 0 {
        Some(HeaderError::SkipCountNonzero {
            roc,
            tail,
            skip_count: fields.skip_count,
        })
    } else {
        None
    }
}
