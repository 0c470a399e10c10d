//! SVT event reader
//!
//! This module provides:
//! - Wire-layout decoders and frame extraction (decoder)
//! - Per-event orchestration: ROC banks -> frames -> samples + headers
//! - Reader counters (metrics)
//!
//! The reader itself is stateless per event; the only state carried across
//! events is the unresolved-address bookkeeping of the [`HitBuilder`] and the
//! counters, both safe to share between workers.

pub mod decoder;
pub mod metrics;

pub use decoder::{extract_frames, ApvHeader, BoardFrame, FrameHeader, FrameTail};
pub use metrics::{MetricsSnapshot, ReaderMetrics};

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, warn};

use crate::common::{DaqAddress, DecodedEvent, UnresolvedReason, UnresolvedRecord};
use crate::config::{Config, Era, EraLayout};
use crate::container::{data_banks, roc_banks, BankView};
use crate::header::{self, AssemblyError, HeaderAssembler, HeaderError, HeaderPolicy, HeaderStatus};
use crate::hits::HitBuilder;
use crate::mapping::ChannelMap;

/// Reader error type
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("Header validation failed: {0}")]
    Header(#[from] HeaderError),

    #[error("Header assembly failed: {0}")]
    Assembly(#[from] AssemblyError),

    #[error("Channel map was built for {map} but the reader decodes {reader}")]
    EraMismatch { reader: Era, map: Era },
}

/// Reader settings, fixed for the life of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderSettings {
    pub layout: EraLayout,
    pub header_policy: HeaderPolicy,
    pub retain_headers: bool,
    pub unresolved_silence_after: u64,
}

impl ReaderSettings {
    /// Defaults for `era`: collect failures, drop header records
    pub fn new(era: Era) -> Self {
        Self {
            layout: EraLayout::for_era(era),
            header_policy: HeaderPolicy::Collect,
            retain_headers: false,
            unresolved_silence_after: 10,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            layout: config.layout(),
            header_policy: config.decoder.header_policy,
            retain_headers: config.decoder.retain_headers,
            unresolved_silence_after: config.decoder.unresolved_silence_after,
        }
    }

    pub fn with_policy(mut self, policy: HeaderPolicy) -> Self {
        self.header_policy = policy;
        self
    }

    pub fn with_retained_headers(mut self, retain: bool) -> Self {
        self.retain_headers = retain;
        self
    }
}

/// Decodes the SVT banks of one event at a time
#[derive(Debug)]
pub struct SvtReader {
    settings: ReaderSettings,
    hits: HitBuilder,
    metrics: ReaderMetrics,
}

impl SvtReader {
    pub fn new(settings: ReaderSettings) -> Self {
        Self {
            hits: HitBuilder::new(settings.layout.era, settings.unresolved_silence_after),
            settings,
            metrics: ReaderMetrics::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(ReaderSettings::from_config(config))
    }

    pub fn settings(&self) -> &ReaderSettings {
        &self.settings
    }

    pub fn metrics(&self) -> &ReaderMetrics {
        &self.metrics
    }

    pub fn hit_builder(&self) -> &HitBuilder {
        &self.hits
    }

    /// Decode every SVT board of `event` against `map`
    ///
    /// Structural problems in a board buffer never fail the event. Header
    /// failures are recorded in the returned event; under
    /// [`HeaderPolicy::FailClosed`] the first one is returned as the error
    /// instead.
    pub fn process_event<B: BankView>(
        &self,
        event: &B,
        map: &ChannelMap,
    ) -> Result<DecodedEvent, ReaderError> {
        let layout = &self.settings.layout;
        if map.era() != layout.era {
            return Err(ReaderError::EraMismatch {
                reader: layout.era,
                map: map.era(),
            });
        }
        self.metrics.inc_events();

        let event_number = u64::from(event.number());
        let mut samples = Vec::new();
        let mut unresolved: BTreeMap<(DaqAddress, UnresolvedReason), u64> = BTreeMap::new();
        let mut assembler = HeaderAssembler::new();
        let mut status = HeaderStatus::default();

        for roc_bank in roc_banks(event, layout) {
            let roc = roc_bank.tag();
            for board in data_banks(roc_bank, layout) {
                self.metrics.inc_boards();
                let frames = extract_frames(layout, board.int_words());
                self.metrics.add_frames(frames.len() as u64);

                for frame in &frames {
                    if let Err(e) = assembler.add_frame(roc, frame) {
                        if self.settings.header_policy == HeaderPolicy::FailClosed {
                            self.reject(event_number);
                            return Err(e.into());
                        }
                        warn!(event = event_number, roc, error = %e, "SVT header assembly failed");
                        status.assembly_errors.push(e);
                    }

                    for (pulse, multisample) in frame.data() {
                        match self.hits.build(map, roc, pulse, multisample) {
                            Ok(sample) => samples.push(sample),
                            Err(diverted) => {
                                *unresolved.entry((diverted.address, diverted.reason)).or_default() += 1
                            }
                        }
                    }
                }
            }
        }

        let records = assembler.finish();
        status.errors = header::validate(&records);

        if !status.headers_good() {
            self.metrics.inc_header_failures();
            if let Some(first) = status.first_error() {
                if self.settings.header_policy == HeaderPolicy::FailClosed {
                    self.metrics.inc_rejected();
                    return Err(first.clone().into());
                }
                warn!(
                    event = event_number,
                    errors = status.errors.len(),
                    first = %first,
                    "SVT header validation failed"
                );
            }
        }

        let unresolved: Vec<UnresolvedRecord> = unresolved
            .into_iter()
            .map(|((address, reason), occurrences)| UnresolvedRecord {
                address,
                reason,
                occurrences,
            })
            .collect();

        self.metrics.add_samples(samples.len() as u64);
        self.metrics
            .add_unresolved(unresolved.iter().map(|r| r.occurrences).sum());

        debug!(
            event = event_number,
            rocs = records.len(),
            samples = samples.len(),
            unresolved = unresolved.len(),
            headers_good = status.headers_good(),
            "Decoded SVT event"
        );

        Ok(DecodedEvent {
            event_number,
            samples,
            headers: self.settings.retain_headers.then_some(records),
            header_status: status,
            unresolved,
        })
    }

    fn reject(&self, event_number: u64) {
        self.metrics.inc_header_failures();
        self.metrics.inc_rejected();
        debug!(event = event_number, "Event rejected on header failure");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Bank;
    use crate::header::HeaderErrorKind;
    use crate::mapping::{SensorDescriptor, SensorTable};

    const HEADER_FLAG: u32 = 1 << 30;
    const TAIL_FLAG: u32 = 1 << 29;

    fn map() -> ChannelMap {
        let sensors = (0..2)
            .map(|h| SensorDescriptor {
                id: h,
                name: format!("sensor{}", h),
                fpga: None,
                hybrid: None,
                feb: Some(2),
                feb_hybrid: Some(h),
            })
            .collect();
        ChannelMap::build(Era::EngineeringRun, &SensorTable::new("test", sensors)).unwrap()
    }

    fn apv_header(address: u32, count: u32) -> [u32; 4] {
        let slot = 1 | (address << 1) | (count << 9);
        let word = slot | (slot << 16);
        [word, word, word, HEADER_FLAG | (2 << 8)]
    }

    fn data(hybrid: u32, channel: u32, fill: u32) -> [u32; 4] {
        [fill, fill, fill, (hybrid << 26) | (4 << 23) | (channel << 16) | (2 << 8)]
    }

    /// Engineering-run board buffer around the given multisamples
    fn board(multisamples: &[[u32; 4]], tail_extra: u32) -> Vec<u32> {
        let mut words = vec![0x0100_0000; 7];
        for ms in multisamples {
            words.extend_from_slice(ms);
        }
        words.push(multisamples.len() as u32 | tail_extra);
        words
    }

    fn event(boards: Vec<Vec<u32>>) -> Bank {
        let data: Vec<Bank> = boards.into_iter().map(|w| Bank::data(3, 0, w)).collect();
        Bank::container(1, 17, vec![Bank::container(51, 0, data)])
    }

    fn tail_ms() -> [u32; 4] {
        [0, 0, 0, HEADER_FLAG | TAIL_FLAG | (2 << 8)]
    }

    #[test]
    fn test_process_clean_event() {
        let reader = SvtReader::new(ReaderSettings::new(Era::EngineeringRun));
        let ev = event(vec![board(
            &[apv_header(5, 1), data(0, 3, 7), data(1, 4, 8), tail_ms()],
            0,
        )]);

        let decoded = reader.process_event(&ev, &map()).unwrap();
        assert_eq!(decoded.event_number, 17);
        assert_eq!(decoded.samples.len(), 2);
        assert_eq!(decoded.samples[0].pulse, 0);
        assert_eq!(decoded.samples[1].pulse, 1);
        assert_eq!(decoded.samples[1].channel, 4);
        assert_eq!(decoded.samples[0].roc, 51);
        assert!(decoded.headers_good());
        assert!(decoded.headers.is_none());
        assert!(decoded.unresolved.is_empty());

        let snap = reader.metrics().snapshot();
        assert_eq!(snap.events, 1);
        assert_eq!(snap.boards, 1);
        assert_eq!(snap.samples, 2);
    }

    #[test]
    fn test_retained_headers() {
        let settings = ReaderSettings::new(Era::EngineeringRun).with_retained_headers(true);
        let reader = SvtReader::new(settings);
        let ev = event(vec![
            board(&[apv_header(5, 1), data(0, 3, 7)], 0),
            board(&[apv_header(5, 1)], 0),
        ]);
        let decoded = reader.process_event(&ev, &map()).unwrap();
        let headers = decoded.headers.unwrap();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].roc, 51);
        assert_eq!(headers[0].multisample_headers.len(), 2);
    }

    #[test]
    fn test_collect_keeps_samples() {
        let reader = SvtReader::new(ReaderSettings::new(Era::EngineeringRun));
        let ev = event(vec![board(&[apv_header(5, 1), data(0, 3, 7)], 1 << 26)]);
        let decoded = reader.process_event(&ev, &map()).unwrap();
        assert_eq!(decoded.samples.len(), 1);
        assert!(!decoded.headers_good());
        assert_eq!(
            decoded.header_status.first_error().map(HeaderError::kind),
            Some(HeaderErrorKind::SyncError)
        );
    }

    #[test]
    fn test_fail_closed_rejects() {
        let settings = ReaderSettings::new(Era::EngineeringRun).with_policy(HeaderPolicy::FailClosed);
        let reader = SvtReader::new(settings);
        let ev = event(vec![board(
            &[apv_header(5, 1), apv_header(6, 1), data(0, 3, 7)],
            0,
        )]);
        match reader.process_event(&ev, &map()) {
            Err(ReaderError::Header(HeaderError::ApvBufferAddressMismatch { index, .. })) => {
                assert_eq!(index, 1)
            }
            other => panic!("expected mismatch, got {:?}", other),
        }
        assert_eq!(reader.metrics().snapshot().rejected, 1);
    }

    #[test]
    fn test_fail_closed_assembly_error() {
        let settings = ReaderSettings::new(Era::EngineeringRun).with_policy(HeaderPolicy::FailClosed);
        let reader = SvtReader::new(settings);
        let mut words = board(&[data(0, 1, 1)], 0);
        *words.last_mut().unwrap() = 3;
        let result = reader.process_event(&event(vec![words]), &map());
        assert!(matches!(result, Err(ReaderError::Assembly(_))));
    }

    #[test]
    fn test_unresolved_address() {
        let reader = SvtReader::new(ReaderSettings::new(Era::EngineeringRun));
        let ev = event(vec![board(&[data(3, 1, 1), data(3, 2, 1)], 0)]);
        let decoded = reader.process_event(&ev, &map()).unwrap();
        assert!(decoded.samples.is_empty());
        assert_eq!(
            decoded.unresolved,
            vec![UnresolvedRecord {
                address: DaqAddress::new(2, 3),
                reason: UnresolvedReason::UnknownAddress,
                occurrences: 2
            }]
        );
    }

    #[test]
    fn test_out_of_range_channel_is_not_an_unknown_address() {
        let reader = SvtReader::new(ReaderSettings::new(Era::EngineeringRun));
        let mut bad_apv = data(0, 1, 1);
        bad_apv[3] = (bad_apv[3] & !(0x7 << 23)) | (6 << 23);
        let ev = event(vec![board(&[bad_apv, data(0, 2, 1)], 0)]);

        let decoded = reader.process_event(&ev, &map()).unwrap();
        assert_eq!(decoded.samples.len(), 1);
        assert_eq!(
            decoded.unresolved,
            vec![UnresolvedRecord {
                address: DaqAddress::new(2, 0),
                reason: UnresolvedReason::ChannelOutOfRange,
                occurrences: 1
            }]
        );
    }

    #[test]
    fn test_era_mismatch() {
        let reader = SvtReader::new(ReaderSettings::new(Era::Phys2019));
        let result = reader.process_event(&event(vec![]), &map());
        assert!(matches!(result, Err(ReaderError::EraMismatch { .. })));
    }

    #[test]
    fn test_empty_event() {
        let reader = SvtReader::new(ReaderSettings::new(Era::EngineeringRun));
        let decoded = reader.process_event(&event(vec![vec![]]), &map()).unwrap();
        assert!(decoded.samples.is_empty());
        assert!(decoded.headers_good());
    }
}
