//! SVT decode binary - decodes a dump file and prints one JSON line per event
//!
//! Usage:
//!   cargo run --bin svt_decode -- run.svt --sensors sensors.toml
//!   cargo run --bin svt_decode -- run.svt --config svt.toml
//!   cargo run --bin svt_decode -- run.svt --era phys2019 --sensors s.toml --summary

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use clap::Parser;
use svt_decode::common::CommonArgs;
use svt_decode::config::{Config, Era};
use svt_decode::container::read_events;
use svt_decode::mapping::{ChannelMap, ChannelMapHandle, SensorTable};
use svt_decode::pipeline::{DecodePipeline, PipelineInput, PipelineOutput};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// SVT decoder - decodes SVT banks and checks their headers
#[derive(Parser, Debug)]
#[command(name = "svt_decode", about = "SVT frame decoder and header validator")]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Event dump file written by svt_emulator
    input: String,

    /// Run era (overrides the config file)
    #[arg(long)]
    era: Option<Era>,

    /// Print only the final counters, not the decoded events
    #[arg(long)]
    summary: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("svt_decode=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = &args.common.config_file;
    let mut config = if Path::new(config_path).exists() {
        info!(config_file = %config_path, "Loaded configuration");
        Config::load(config_path)?
    } else {
        let era = args
            .era
            .ok_or_else(|| anyhow::anyhow!("no config file at {}; pass --era", config_path))?;
        Config::for_era(era)
    };
    if let Some(era) = args.era {
        config.decoder.era = era;
    }
    if let Some(path) = &args.common.sensor_table {
        config.geometry.sensor_table = Some(path.clone());
    }

    let table = SensorTable::load(config.sensor_table_path()?)?;
    let map = ChannelMap::build(config.decoder.era, &table)?;
    let pipeline = DecodePipeline::from_config(&config, ChannelMapHandle::new(map));

    let events = read_events(&mut BufReader::new(File::open(&args.input)?))?;
    info!(input = %args.input, events = events.len(), "Read event dump");

    let depth = config.pipeline.queue_depth;
    let (in_tx, in_rx) = mpsc::channel(depth);
    let (out_tx, mut out_rx) = mpsc::channel::<PipelineOutput>(depth);

    let feeder = async move {
        for bank in events {
            if in_tx.send(PipelineInput::Event(bank)).await.is_err() {
                break;
            }
        }
    };

    let summary = args.summary;
    let consumer = async move {
        let mut stdout = BufWriter::new(std::io::stdout().lock());
        while let Some(output) = out_rx.recv().await {
            match output {
                PipelineOutput::Decoded(event) => {
                    if !summary {
                        serde_json::to_writer(&mut stdout, &event)?;
                        stdout.write_all(b"\n")?;
                    }
                }
                PipelineOutput::Rejected {
                    event_number,
                    reason,
                } => warn!(event = event_number, reason = %reason, "Event rejected"),
            }
        }
        stdout.flush()?;
        Ok::<(), anyhow::Error>(())
    };

    let (stats, (), written) = tokio::join!(pipeline.run(in_rx, out_tx), feeder, consumer);
    let stats = stats?;
    written?;

    let metrics = pipeline.reader().metrics().snapshot();
    let unresolved = pipeline.reader().hit_builder().unresolved_report();
    info!(
        events = stats.events,
        decoded = stats.decoded,
        rejected = stats.rejected,
        samples = metrics.samples,
        header_failures = metrics.header_failures,
        unresolved_addresses = unresolved.len(),
        good_fraction = metrics.good_fraction(),
        "Decode finished"
    );
    if args.summary {
        println!("{}", serde_json::to_string_pretty(&metrics)?);
    }
    Ok(())
}
