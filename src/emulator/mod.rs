//! Emulator - generates synthetic SVT events for testing
//!
//! Produces complete event banks in any of the three wire layouts, together
//! with the truth record of every hit that was encoded. Generation is
//! driven by a seeded RNG, so a given configuration always yields the same
//! event sequence.
//!
//! Per board and event the emulator writes one APV header multisample for
//! each hybrid, followed by the data multisamples of that board. The
//! engineering layout closes the frame with a tail multisample; the 2019
//! layout writes one trailer-closed frame per hybrid.

pub mod encode;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal, NormalError};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::common::{DaqAddress, MultisampleKind, APV25_PER_HYBRID, CHANNELS_PER_APV25, MULTISAMPLE_WORDS, SAMPLES_PER_MULTISAMPLE};
use crate::config::{Era, EraLayout};
use crate::container::Bank;
use crate::mapping::{SensorDescriptor, SensorTable};

/// Largest value of the 14-bit ADC
pub const ADC_MAX: i16 = 0x3FFF;

/// Shaping time of the APV25 CR-RC response, in ns
const SHAPING_TIME_NS: f64 = 50.0;
/// Spacing of the six samples, in ns
const SAMPLE_SPACING_NS: f64 = 24.0;
/// Hybrids addressable in a DAQ address
const MAX_HYBRIDS: u32 = 4;

/// Emulator errors
#[derive(Error, Debug)]
pub enum EmulatorError {
    #[error("Invalid noise or amplitude distribution: {0}")]
    Distribution(#[from] NormalError),

    #[error("{era} layout holds at most {max} boards, {requested} requested")]
    TooManyBoards { era: Era, max: u32, requested: u32 },

    #[error("At most {max} hybrids per board, {requested} requested")]
    TooManyHybrids { max: u32, requested: u32 },
}

/// Emulator configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    /// RNG seed
    pub seed: u64,
    /// Data multisamples generated per event
    pub hits_per_event: usize,
    /// Boards (FPGAs or FEBs) read out per event
    pub boards: u32,
    /// Hybrids per board
    pub hybrids_per_board: u32,
    /// Pedestal level in ADC counts
    pub baseline: f64,
    /// Gaussian noise on every sample, ADC counts
    pub noise_sigma: f64,
    /// Mean pulse amplitude, ADC counts
    pub amplitude: f64,
    /// Probability that a frame tail carries a sync error
    pub sync_error_rate: f64,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            hits_per_event: 32,
            boards: 2,
            hybrids_per_board: 2,
            baseline: 4000.0,
            noise_sigma: 20.0,
            amplitude: 1500.0,
            sync_error_rate: 0.0,
        }
    }
}

/// One encoded hit as generated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TruthHit {
    pub address: DaqAddress,
    pub roc: u32,
    pub apv: u32,
    /// APV-local channel (0-127)
    pub apv_channel: u32,
    pub samples: [i16; SAMPLES_PER_MULTISAMPLE],
}

/// A generated event and the hits encoded into it
#[derive(Debug, Clone)]
pub struct EmulatedEvent {
    pub bank: Bank,
    pub hits: Vec<TruthHit>,
}

/// Synthetic event generator
pub struct FrameEmulator {
    layout: EraLayout,
    config: EmulatorConfig,
    rng: StdRng,
    noise: Normal<f64>,
    amplitude: Normal<f64>,
    event_number: u32,
}

impl FrameEmulator {
    pub fn new(era: Era, config: EmulatorConfig) -> Result<Self, EmulatorError> {
        let layout = EraLayout::for_era(era);
        let max_boards = board_capacity(&layout);
        if config.boards > max_boards {
            return Err(EmulatorError::TooManyBoards {
                era,
                max: max_boards,
                requested: config.boards,
            });
        }
        if config.hybrids_per_board > MAX_HYBRIDS {
            return Err(EmulatorError::TooManyHybrids {
                max: MAX_HYBRIDS,
                requested: config.hybrids_per_board,
            });
        }

        let noise = Normal::new(0.0, config.noise_sigma)?;
        let amplitude = Normal::new(config.amplitude, config.amplitude.abs() * 0.1)?;

        info!(
            era = %era,
            seed = config.seed,
            boards = config.boards,
            hybrids = config.hybrids_per_board,
            "SVT frame emulator ready"
        );

        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed),
            layout,
            config,
            noise,
            amplitude,
            event_number: 0,
        })
    }

    pub fn layout(&self) -> &EraLayout {
        &self.layout
    }

    /// Sensor table matching the emulated readout
    pub fn sensor_table(&self) -> SensorTable {
        let era = self.layout.era;
        let sensors = (0..self.config.boards)
            .flat_map(|board| (0..self.config.hybrids_per_board).map(move |hybrid| (board, hybrid)))
            .map(|(board, hybrid)| {
                let id = board * self.config.hybrids_per_board + hybrid;
                let (fpga, feb) = match era {
                    Era::TestRun => (Some(board), None),
                    Era::EngineeringRun | Era::Phys2019 => (None, Some(board)),
                };
                SensorDescriptor {
                    id,
                    name: format!("svt_sensor_{}_{}", board, hybrid),
                    fpga,
                    hybrid: fpga.map(|_| hybrid),
                    feb,
                    feb_hybrid: feb.map(|_| hybrid),
                }
            })
            .collect();
        SensorTable::new(format!("emulated-{}", era), sensors)
    }

    /// ROC bank tag a board is read out by
    pub fn roc_for_board(&self, board: u32) -> u32 {
        match self.layout.era {
            Era::TestRun => {
                let rocs = self.layout.max_roc_tag - self.layout.min_roc_tag + 1;
                self.layout.min_roc_tag + board % rocs
            }
            Era::EngineeringRun | Era::Phys2019 => self.layout.min_roc_tag + board,
        }
    }

    /// Generate the next event
    pub fn next_event(&mut self) -> EmulatedEvent {
        self.event_number = self.event_number.wrapping_add(1);
        let event_number = self.event_number;
        let frame_count = (event_number % 16) as u8;
        let buffer_address: u8 = self.rng.gen();

        let mut hits: Vec<TruthHit> = (0..self.config.hits_per_event)
            .filter_map(|_| self.generate_hit())
            .collect();
        hits.sort_by_key(|hit| (hit.address.board, hit.address.hybrid));

        let mut roc_children: Vec<(u32, Vec<Bank>)> = Vec::new();
        for board in 0..self.config.boards {
            let roc = self.roc_for_board(board);
            let board_hits: Vec<&TruthHit> = hits.iter().filter(|h| h.address.board == board).collect();
            let words = self.encode_board(board, &board_hits, event_number, buffer_address, frame_count);
            let data_tag = match self.layout.era {
                Era::TestRun => board,
                Era::EngineeringRun | Era::Phys2019 => self.layout.min_data_tag,
            };
            let bank = Bank::data(data_tag, board, words);
            match roc_children.iter_mut().find(|(tag, _)| *tag == roc) {
                Some((_, children)) => children.push(bank),
                None => roc_children.push((roc, vec![bank])),
            }
        }

        let rocs = roc_children
            .into_iter()
            .map(|(tag, children)| Bank::container(tag, 0, children))
            .collect();

        debug!(event = event_number, hits = hits.len(), "Generated SVT event");

        EmulatedEvent {
            bank: Bank::container(0, event_number, rocs),
            hits,
        }
    }

    fn generate_hit(&mut self) -> Option<TruthHit> {
        if self.config.boards == 0 || self.config.hybrids_per_board == 0 {
            return None;
        }
        let board = self.rng.gen_range(0..self.config.boards);
        let hybrid = self.rng.gen_range(0..self.config.hybrids_per_board);
        let apv = match self.layout.era {
            Era::TestRun => 0,
            Era::EngineeringRun | Era::Phys2019 => self.rng.gen_range(0..APV25_PER_HYBRID),
        };
        let apv_channel = self.rng.gen_range(0..CHANNELS_PER_APV25);

        let amplitude = self.amplitude.sample(&mut self.rng);
        let t0 = self.rng.gen_range(-SAMPLE_SPACING_NS..SAMPLE_SPACING_NS);
        let samples = std::array::from_fn(|n| {
            let t = n as f64 * SAMPLE_SPACING_NS - t0;
            let signal = if t > 0.0 {
                let x = t / SHAPING_TIME_NS;
                amplitude * x * (1.0 - x).exp()
            } else {
                0.0
            };
            let value = self.config.baseline + signal + self.noise.sample(&mut self.rng);
            value.round().clamp(0.0, f64::from(ADC_MAX)) as i16
        });

        Some(TruthHit {
            address: DaqAddress::new(board, hybrid),
            roc: self.roc_for_board(board),
            apv,
            apv_channel,
            samples,
        })
    }

    fn encode_board(
        &mut self,
        board: u32,
        hits: &[&TruthHit],
        event_number: u32,
        buffer_address: u8,
        frame_count: u8,
    ) -> Vec<u32> {
        let header = encode::frame_header(0, event_number);
        let sync_error = self.config.sync_error_rate > 0.0 && self.rng.gen_bool(self.config.sync_error_rate.min(1.0));
        let apv_header = |hybrid: u32, header_ms: fn(u32, [u32; 3]) -> [u32; MULTISAMPLE_WORDS]| {
            let payload = encode::apv_header_payload(
                &[true; SAMPLES_PER_MULTISAMPLE],
                &[buffer_address; SAMPLES_PER_MULTISAMPLE],
                &[frame_count; SAMPLES_PER_MULTISAMPLE],
            );
            header_ms(encode::feb_tail_word(board, hybrid, 0, 0, false), payload)
        };
        let data_tail_word =
            |hit: &TruthHit| encode::feb_tail_word(board, hit.address.hybrid, hit.apv, hit.apv_channel, false);

        match self.layout.era {
            Era::TestRun => {
                let multisamples: Vec<[u32; MULTISAMPLE_WORDS]> = hits
                    .iter()
                    .map(|hit| {
                        let address = encode::test_run_address(board, hit.address.hybrid, hit.apv_channel);
                        encode::test_run_multisample(address, encode::pack_samples(&hit.samples))
                    })
                    .collect();
                let tail = encode::frame_tail(multisamples.len() as u32, 0, sync_error, false);
                encode::forward_buffer(&self.layout, header, &multisamples, tail)
            }
            Era::EngineeringRun => {
                let mut multisamples: Vec<[u32; MULTISAMPLE_WORDS]> = (0..self.config.hybrids_per_board)
                    .map(|hybrid| {
                        apv_header(hybrid, |tail, payload| {
                            encode::engineering_multisample(MultisampleKind::Header, tail, payload)
                        })
                    })
                    .collect();
                multisamples.extend(hits.iter().map(|hit| {
                    encode::engineering_multisample(
                        MultisampleKind::Data,
                        data_tail_word(*hit),
                        encode::pack_samples(&hit.samples),
                    )
                }));
                multisamples.push(encode::engineering_multisample(
                    MultisampleKind::Tail,
                    encode::feb_tail_word(board, 0, 0, 0, false),
                    [0; 3],
                ));
                let tail = encode::frame_tail(multisamples.len() as u32, 0, sync_error, false);
                encode::forward_buffer(&self.layout, header, &multisamples, tail)
            }
            Era::Phys2019 => {
                let mut words = Vec::new();
                for hybrid in 0..self.config.hybrids_per_board {
                    let mut multisamples = vec![apv_header(hybrid, |tail, payload| {
                        encode::phys2019_multisample(true, tail, payload)
                    })];
                    multisamples.extend(hits.iter().filter(|hit| hit.address.hybrid == hybrid).map(|hit| {
                        encode::phys2019_multisample(false, data_tail_word(*hit), encode::pack_samples(&hit.samples))
                    }));
                    let tail = encode::frame_tail(multisamples.len() as u32, 0, sync_error, false);
                    encode::append_phys2019_frame(&mut words, header, tail, &multisamples);
                }
                words
            }
        }
    }
}

/// Boards the layout's bank tags can address
fn board_capacity(layout: &EraLayout) -> u32 {
    match layout.era {
        Era::TestRun => layout.max_data_tag - layout.min_data_tag + 1,
        Era::EngineeringRun | Era::Phys2019 => layout.max_roc_tag - layout.min_roc_tag + 1,
    }
}
