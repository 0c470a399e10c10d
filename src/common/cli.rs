//! Command-line arguments shared by `svt_emulator` and `svt_decode`
//!
//! Each binary declares its own `Args` and pulls these in with
//! `#[command(flatten)]`.

use clap::Parser;

/// Common arguments shared across the SVT binaries
#[derive(Parser, Debug, Clone)]
pub struct CommonArgs {
    /// Path to configuration file
    #[arg(short = 'f', long = "config", default_value = "svt.toml")]
    pub config_file: String,

    /// Override the sensor table path from the config file
    #[arg(long = "sensors", env = "SVT_SENSOR_TABLE")]
    pub sensor_table: Option<String>,
}
