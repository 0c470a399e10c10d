//! SVT emulator binary - writes synthetic SVT events to a dump file
//!
//! Usage:
//!   cargo run --bin svt_emulator                                   # Engineering run, defaults
//!   cargo run --bin svt_emulator -- --era phys2019 -n 1000         # 1000 events, 2019 layout
//!   cargo run --bin svt_emulator -- --config svt.toml -o run.svt   # Settings from config file
//!   cargo run --bin svt_emulator -- --sensors sensors.toml         # Also write the sensor table

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use clap::Parser;
use svt_decode::common::CommonArgs;
use svt_decode::config::{Config, Era};
use svt_decode::container::write_events;
use svt_decode::emulator::FrameEmulator;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// SVT emulator - generates synthetic SVT readout events
#[derive(Parser, Debug)]
#[command(name = "svt_emulator", about = "Synthetic SVT event generator")]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Run era (overrides the config file)
    #[arg(long)]
    era: Option<Era>,

    /// Number of events to generate
    #[arg(short = 'n', long, default_value_t = 100)]
    events: usize,

    /// Output dump file
    #[arg(short, long, default_value = "svt_events.bin")]
    output: String,

    /// RNG seed (overrides the config file)
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("svt_decode=info".parse()?))
        .init();

    let args = Args::parse();

    let config_path = &args.common.config_file;
    let mut config = if Path::new(config_path).exists() {
        info!(config_file = %config_path, "Loaded configuration");
        Config::load(config_path)?
    } else {
        Config::for_era(args.era.unwrap_or(Era::EngineeringRun))
    };
    if let Some(era) = args.era {
        config.decoder.era = era;
    }
    if let Some(seed) = args.seed {
        config.emulator.seed = seed;
    }

    let mut emulator = FrameEmulator::new(config.decoder.era, config.emulator.clone())?;

    if let Some(path) = &args.common.sensor_table {
        let table = toml::to_string(&emulator.sensor_table())?;
        std::fs::write(path, table)?;
        info!(path = %path, "Wrote sensor table");
    }

    let events: Vec<_> = (0..args.events)
        .map(|_| emulator.next_event().bank)
        .collect();

    let mut writer = BufWriter::new(File::create(&args.output)?);
    write_events(&mut writer, &events)?;
    writer.flush()?;

    info!(
        era = %config.decoder.era,
        events = events.len(),
        output = %args.output,
        "Emulator finished"
    );
    Ok(())
}
