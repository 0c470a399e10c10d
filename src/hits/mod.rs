//! Hit builder
//!
//! Turns a decoded data multisample into a [`DecodedSample`]. Multisamples
//! whose DAQ address is not in the channel map, or whose APV index is out
//! of range, are diverted into a diagnostic side channel instead of failing
//! the event. Occurrences are counted per address and reason for the
//! lifetime of the builder; logging is throttled so a permanently unmapped
//! hybrid does not flood the log.

use dashmap::DashMap;
use tracing::{debug, trace};

use crate::common::{DaqAddress, DecodedSample, Multisample, UnresolvedReason, UnresolvedRecord};
use crate::config::Era;
use crate::mapping::ChannelMap;
use crate::reader::decoder;

/// A multisample diverted to the side channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unresolved {
    pub address: DaqAddress,
    pub reason: UnresolvedReason,
    /// Occurrences of this address and reason so far, including this one
    pub occurrences: u64,
}

/// Builds sample records; safe to share between worker threads
#[derive(Debug)]
pub struct HitBuilder {
    era: Era,
    silence_after: u64,
    unresolved: DashMap<(DaqAddress, UnresolvedReason), u64>,
}

impl HitBuilder {
    /// `silence_after` is the occurrence count per address and reason
    /// after which diverted multisamples are no longer logged
    pub fn new(era: Era, silence_after: u64) -> Self {
        Self {
            era,
            silence_after,
            unresolved: DashMap::new(),
        }
    }

    /// Build the sample record for one data multisample
    pub fn build(
        &self,
        map: &ChannelMap,
        roc: u32,
        pulse: usize,
        multisample: &Multisample,
    ) -> Result<DecodedSample, Unresolved> {
        let words = &multisample.words;
        let address = decoder::daq_address(self.era, words);

        let Some(sensor) = map.resolve(&address) else {
            return Err(self.divert(address, UnresolvedReason::UnknownAddress));
        };
        let Some(channel) = decoder::channel(self.era, words) else {
            return Err(self.divert(address, UnresolvedReason::ChannelOutOfRange));
        };

        Ok(DecodedSample {
            sensor,
            address,
            roc,
            channel,
            // Frames declare at most 4095 multisamples
            pulse: u16::try_from(pulse).unwrap_or(u16::MAX),
            samples: decoder::samples(self.era, words),
        })
    }

    fn divert(&self, address: DaqAddress, reason: UnresolvedReason) -> Unresolved {
        let occurrences = {
            let mut count = self.unresolved.entry((address, reason)).or_insert(0);
            *count += 1;
            *count
        };

        if occurrences < self.silence_after {
            trace!(address = %address, occurrences, "Multisample {}", reason);
        } else if occurrences == self.silence_after {
            debug!(
                address = %address,
                occurrences,
                "Multisample {}, silencing further messages",
                reason
            );
        }

        Unresolved {
            address,
            reason,
            occurrences,
        }
    }

    /// Occurrences of `address` diverted for `reason` so far
    pub fn unresolved_count(&self, address: &DaqAddress, reason: UnresolvedReason) -> u64 {
        self.unresolved
            .get(&(*address, reason))
            .map(|count| *count)
            .unwrap_or(0)
    }

    /// Cumulative diverted counts, ordered by address then reason
    pub fn unresolved_report(&self) -> Vec<UnresolvedRecord> {
        let mut report: Vec<UnresolvedRecord> = self
            .unresolved
            .iter()
            .map(|entry| {
                let (address, reason) = *entry.key();
                UnresolvedRecord {
                    address,
                    reason,
                    occurrences: *entry.value(),
                }
            })
            .collect();
        report.sort_by_key(|record| (record.address, record.reason));
        report
    }
}
