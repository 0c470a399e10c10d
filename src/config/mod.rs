//! Configuration module for the SVT decoder
//!
//! Supports loading configuration from TOML files. The run era is fixed
//! for the life of a run and selects the wire layout, bank tag ranges and
//! header/tail lengths.
//!
//! # Example
//! ```ignore
//! let config = Config::load("svt.toml")?;
//! let layout = config.layout();
//! ```

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use crate::emulator::EmulatorConfig;
use crate::header::HeaderPolicy;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

// =============================================================================
// Run eras
// =============================================================================

/// Data-taking period; determines which wire layout the SVT banks use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Era {
    /// Test run: FPGA/hybrid addressing, one header word
    TestRun,
    /// Engineering run: FEB/hybrid addressing, seven header words
    EngineeringRun,
    /// 2019 physics run: trailer-delimited frames scanned from the end
    Phys2019,
}

impl std::fmt::Display for Era {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Era::TestRun => write!(f, "test-run"),
            Era::EngineeringRun => write!(f, "engineering-run"),
            Era::Phys2019 => write!(f, "phys2019"),
        }
    }
}

impl std::str::FromStr for Era {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "test-run" => Ok(Era::TestRun),
            "engineering-run" => Ok(Era::EngineeringRun),
            "phys2019" => Ok(Era::Phys2019),
            other => Err(ConfigError::InvalidValue {
                field: "era".to_string(),
                reason: format!("unknown era '{}'", other),
            }),
        }
    }
}

/// Per-era bank tags and frame lengths
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EraLayout {
    pub era: Era,
    /// Words preceding the first multisample of a frame
    pub header_len: usize,
    /// Words following the last multisample of a frame
    pub tail_len: usize,
    pub min_roc_tag: u32,
    pub max_roc_tag: u32,
    pub min_data_tag: u32,
    pub max_data_tag: u32,
}

impl EraLayout {
    pub const TEST_RUN: EraLayout = EraLayout {
        era: Era::TestRun,
        header_len: 1,
        tail_len: 1,
        min_roc_tag: 1,
        max_roc_tag: 2,
        min_data_tag: 0,
        max_data_tag: 7,
    };

    pub const ENGINEERING_RUN: EraLayout = EraLayout {
        era: Era::EngineeringRun,
        header_len: 7,
        tail_len: 1,
        min_roc_tag: 51,
        max_roc_tag: 66,
        min_data_tag: 3,
        max_data_tag: 3,
    };

    pub const PHYS_2019: EraLayout = EraLayout {
        era: Era::Phys2019,
        header_len: 0,
        tail_len: 1,
        min_roc_tag: 51,
        max_roc_tag: 66,
        min_data_tag: 3,
        max_data_tag: 3,
    };

    /// Constants for the given era
    pub fn for_era(era: Era) -> Self {
        match era {
            Era::TestRun => Self::TEST_RUN,
            Era::EngineeringRun => Self::ENGINEERING_RUN,
            Era::Phys2019 => Self::PHYS_2019,
        }
    }
}

// =============================================================================
// File configuration
// =============================================================================

/// Top-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub decoder: DecoderSettings,
    #[serde(default)]
    pub geometry: GeometrySettings,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub emulator: EmulatorConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults for `era`, used when no configuration file is given
    pub fn for_era(era: Era) -> Self {
        Self {
            decoder: DecoderSettings {
                era,
                header_policy: HeaderPolicy::default(),
                retain_headers: false,
                unresolved_silence_after: default_unresolved_silence_after(),
            },
            geometry: GeometrySettings::default(),
            pipeline: PipelineSettings::default(),
            emulator: EmulatorConfig::default(),
        }
    }

    /// Layout constants for the configured era
    pub fn layout(&self) -> EraLayout {
        EraLayout::for_era(self.decoder.era)
    }

    /// Path of the sensor table, required to build the channel map
    pub fn sensor_table_path(&self) -> Result<&str, ConfigError> {
        self.geometry
            .sensor_table
            .as_deref()
            .ok_or_else(|| ConfigError::MissingField("geometry.sensor_table".to_string()))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.workers == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.workers".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.pipeline.queue_depth == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.queue_depth".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Decoder settings
#[derive(Debug, Clone, Deserialize)]
pub struct DecoderSettings {
    /// Run era (selects the wire layout)
    pub era: Era,

    /// What to do with an event whose headers fail validation
    #[serde(default)]
    pub header_policy: HeaderPolicy,

    /// Keep ROC header records in the decoded event
    #[serde(default)]
    pub retain_headers: bool,

    /// Occurrences of an unresolved address logged before going quiet
    #[serde(default = "default_unresolved_silence_after")]
    pub unresolved_silence_after: u64,
}

fn default_unresolved_silence_after() -> u64 {
    10
}

/// Detector geometry source
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeometrySettings {
    /// TOML sensor table with per-sensor DAQ addresses
    #[serde(default)]
    pub sensor_table: Option<String>,
}

/// Concurrent decode settings
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSettings {
    /// Events decoded concurrently
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Capacity of the input and output channels
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_depth: default_queue_depth(),
        }
    }
}

fn default_workers() -> usize {
    4
}

fn default_queue_depth() -> usize {
    64
}

// =============================================================================
// Tests
// =============================================================================
