//! Concurrent decode pipeline
//!
//! Events are decoded on the blocking thread pool, at most `workers` at a
//! time. Each event takes a snapshot of the channel map when it is
//! dispatched, so a geometry change only affects events that arrive after
//! it. Outputs are emitted in input order.
//!
//! ```text
//! rx ──► dispatch ──► [spawn_blocking × workers] ──► reorder ──► tx
//!           │
//!           └── Geometry ──► ChannelMapHandle::rebuild
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::common::{DecodeError, DecodeResult, DecodedEvent};
use crate::config::Config;
use crate::container::{Bank, BankView};
use crate::mapping::{ChannelMapHandle, SensorTable};
use crate::reader::{ReaderError, SvtReader};

/// Pipeline input
#[derive(Debug, Clone)]
pub enum PipelineInput {
    /// Raw event to decode
    Event(Bank),
    /// New detector geometry; rebuilds the channel map if it changed
    Geometry(SensorTable),
}

/// Pipeline output, one per input event
#[derive(Debug, Clone)]
pub enum PipelineOutput {
    Decoded(DecodedEvent),
    /// Event rejected by the reader (fail-closed header policy)
    Rejected { event_number: u64, reason: String },
}

impl PipelineOutput {
    pub fn event_number(&self) -> u64 {
        match self {
            Self::Decoded(event) => event.event_number,
            Self::Rejected { event_number, .. } => *event_number,
        }
    }
}

/// Counts reported when the pipeline stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub events: u64,
    pub decoded: u64,
    pub rejected: u64,
    pub geometry_changes: u64,
}

type Completed = (u64, PipelineOutput);

/// Multi-event decoder sharing one reader and one channel map handle
pub struct DecodePipeline {
    reader: Arc<SvtReader>,
    maps: ChannelMapHandle,
    workers: usize,
}

impl DecodePipeline {
    pub fn new(reader: SvtReader, maps: ChannelMapHandle, workers: usize) -> Self {
        Self {
            reader: Arc::new(reader),
            maps,
            workers: workers.max(1),
        }
    }

    pub fn from_config(config: &Config, maps: ChannelMapHandle) -> Self {
        Self::new(SvtReader::from_config(config), maps, config.pipeline.workers)
    }

    pub fn reader(&self) -> &SvtReader {
        &self.reader
    }

    pub fn maps(&self) -> &ChannelMapHandle {
        &self.maps
    }

    /// Decode until `rx` closes and every dispatched event is emitted
    ///
    /// A geometry that cannot be mapped is fatal and stops the pipeline.
    pub async fn run(
        &self,
        mut rx: mpsc::Receiver<PipelineInput>,
        tx: mpsc::Sender<PipelineOutput>,
    ) -> DecodeResult<PipelineStats> {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks: JoinSet<Completed> = JoinSet::new();
        let mut reorder = Reorder::default();
        let mut stats = PipelineStats::default();
        let mut next_seq = 0u64;

        info!(workers = self.workers, "Decode pipeline started");

        loop {
            tokio::select! {
                biased;

                Some(done) = tasks.join_next(), if !tasks.is_empty() => {
                    let (seq, output) = done.map_err(|e| DecodeError::worker(e.to_string()))?;
                    reorder.insert(seq, output);
                    reorder.flush(&tx, &mut stats).await?;
                }

                input = rx.recv() => match input {
                    None => break,
                    Some(PipelineInput::Geometry(table)) => {
                        match self.maps.rebuild(&table) {
                            Ok(true) => {
                                stats.geometry_changes += 1;
                                info!(detector = %table.detector, "Channel map rebuilt");
                            }
                            Ok(false) => {}
                            Err(e) => {
                                error!(error = %e, "Failed to build channel map");
                                return Err(e.into());
                            }
                        }
                    }
                    Some(PipelineInput::Event(bank)) => {
                        let permit = semaphore
                            .clone()
                            .acquire_owned()
                            .await
                            .map_err(|e| DecodeError::worker(e.to_string()))?;
                        let map = self.maps.snapshot();
                        let reader = Arc::clone(&self.reader);
                        let seq = next_seq;
                        next_seq += 1;
                        stats.events += 1;

                        tasks.spawn_blocking(move || {
                            let _permit = permit;
                            let output = match reader.process_event(&bank, &map) {
                                Ok(event) => PipelineOutput::Decoded(event),
                                Err(e) => reject(u64::from(bank.number()), e),
                            };
                            (seq, output)
                        });
                    }
                }
            }
        }

        while let Some(done) = tasks.join_next().await {
            let (seq, output) = done.map_err(|e| DecodeError::worker(e.to_string()))?;
            reorder.insert(seq, output);
            reorder.flush(&tx, &mut stats).await?;
        }

        info!(
            events = stats.events,
            decoded = stats.decoded,
            rejected = stats.rejected,
            geometry_changes = stats.geometry_changes,
            "Decode pipeline stopped"
        );
        Ok(stats)
    }
}

fn reject(event_number: u64, error: ReaderError) -> PipelineOutput {
    warn!(event = event_number, error = %error, "Event rejected");
    PipelineOutput::Rejected {
        event_number,
        reason: error.to_string(),
    }
}

/// Holds completed outputs until every earlier one has been sent
#[derive(Default)]
struct Reorder {
    next: u64,
    pending: BTreeMap<u64, PipelineOutput>,
}

impl Reorder {
    fn insert(&mut self, seq: u64, output: PipelineOutput) {
        self.pending.insert(seq, output);
    }

    async fn flush(
        &mut self,
        tx: &mpsc::Sender<PipelineOutput>,
        stats: &mut PipelineStats,
    ) -> DecodeResult<()> {
        while let Some(output) = self.pending.remove(&self.next) {
            match output {
                PipelineOutput::Decoded(_) => stats.decoded += 1,
                PipelineOutput::Rejected { .. } => stats.rejected += 1,
            }
            tx.send(output).await.map_err(|_| DecodeError::ChannelSend)?;
            self.next += 1;
        }
        Ok(())
    }
}
