//! Header assembly
//!
//! Collects the frame header word, tail word and APV sub-headers of every
//! frame read out by a ROC into one [`RocHeaderRecord`] per ROC.

use std::collections::BTreeMap;

use tracing::debug;

use crate::reader::decoder::{BoardFrame, FrameTail};

use super::error::AssemblyError;
use super::RocHeaderRecord;

/// Per-event accumulator of ROC header records
///
/// Records come out of [`finish`](Self::finish) in ROC order.
#[derive(Debug, Default)]
pub struct HeaderAssembler {
    records: BTreeMap<u32, RocHeaderRecord>,
}

impl HeaderAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one extracted frame into the record of `roc`
    ///
    /// The sub-headers are kept even when the tail count check fails so the
    /// validator still sees them.
    pub fn add_frame(&mut self, roc: u32, frame: &BoardFrame) -> Result<(), AssemblyError> {
        let record = self.records.entry(roc).or_insert_with(|| RocHeaderRecord {
            roc,
            header: frame.header,
            tail: frame.tail,
            multisample_headers: Vec::new(),
        });

        record.tail = FrameTail::decode(record.tail)
            .merge(FrameTail::decode(frame.tail))
            .encode();
        record
            .multisample_headers
            .extend(frame.sub_headers().map(|ms| ms.words));

        let declared = frame.declared_count();
        let actual = frame.consumed_count();
        if declared as usize != actual || frame.dangling_words != 0 {
            debug!(
                roc,
                declared,
                actual,
                dangling = frame.dangling_words,
                "Frame tail disagrees with extracted multisamples"
            );
            return Err(AssemblyError::MultisampleCountMismatch {
                roc,
                declared,
                actual,
                dangling_words: frame.dangling_words,
            });
        }
        Ok(())
    }

    /// Number of ROCs seen so far
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Freeze the accumulated records
    pub fn finish(self) -> Vec<RocHeaderRecord> {
        self.records.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{Multisample, MultisampleKind};

    fn frame(header: u32, tail: u32, kinds: &[MultisampleKind]) -> BoardFrame {
        BoardFrame {
            header,
            tail,
            multisamples: kinds
                .iter()
                .enumerate()
                .map(|(n, kind)| Multisample::new(*kind, [n as u32, 0, 0, 0]))
                .collect(),
            dangling_words: 0,
        }
    }

    #[test]
    fn test_one_record_per_roc() {
        use MultisampleKind::*;
        let mut assembler = HeaderAssembler::new();
        assembler
            .add_frame(52, &frame(0x1, 3, &[Header, Data, Data]))
            .unwrap();
        assembler
            .add_frame(51, &frame(0x2, 2, &[Header, Data]))
            .unwrap();
        assembler
            .add_frame(52, &frame(0x3, 2, &[Header, Tail]))
            .unwrap();
        assert_eq!(assembler.len(), 2);

        let records = assembler.finish();
        assert_eq!(records[0].roc, 51);
        assert_eq!(records[1].roc, 52);
        // First frame's header, last frame's tail
        assert_eq!(records[1].header, 0x1);
        assert_eq!(records[1].tail, 2);
        assert_eq!(records[1].multisample_headers.len(), 2);
        assert_eq!(records[1].multisample_headers[0][0], 0);
    }

    #[test]
    fn test_error_tail_is_kept() {
        use MultisampleKind::*;
        let sync_tail = (1 << 26) | 1;
        let mut assembler = HeaderAssembler::new();
        assembler.add_frame(51, &frame(0, sync_tail, &[Data])).unwrap();
        assembler.add_frame(51, &frame(0, 1, &[Data])).unwrap();
        let records = assembler.finish();
        assert_eq!(records[0].tail, sync_tail);
    }

    #[test]
    fn test_tail_flags_accumulate_across_frames() {
        use MultisampleKind::*;
        let skip_tail = (3 << 12) | 1;
        let sync_tail = (1 << 26) | 1;
        let mut assembler = HeaderAssembler::new();
        assembler.add_frame(51, &frame(0, skip_tail, &[Data])).unwrap();
        assembler.add_frame(51, &frame(0, sync_tail, &[Data])).unwrap();
        let tail = FrameTail::decode(assembler.finish()[0].tail);
        assert!(tail.sync_error);
        assert_eq!(tail.skip_count, 3);
    }

    #[test]
    fn test_count_mismatch() {
        use MultisampleKind::*;
        let mut assembler = HeaderAssembler::new();
        let err = assembler
            .add_frame(55, &frame(0, 5, &[Header, Data]))
            .unwrap_err();
        assert_eq!(
            err,
            AssemblyError::MultisampleCountMismatch {
                roc: 55,
                declared: 5,
                actual: 2,
                dangling_words: 0,
            }
        );
        // Sub-headers still recorded
        assert_eq!(assembler.finish()[0].multisample_headers.len(), 1);
    }

    #[test]
    fn test_dangling_words_mismatch() {
        let mut f = frame(0, 1, &[MultisampleKind::Data]);
        f.dangling_words = 3;
        let mut assembler = HeaderAssembler::new();
        assert!(assembler.add_frame(51, &f).is_err());
    }
}
