use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use ridecrab_core::combine::LatestByTimestamp;
use ridecrab_core::config::WindowConfig;
use ridecrab_core::parallel::{Distribution, combine_per_key};
use ridecrab_core::ride::{RidePoint, latest_rides};
use ridecrab_core::time::watermarked;
use ridecrab_core::types::StreamElement;
use ridecrab_core::window::Pane;
use tracing_subscriber::EnvFilter;

mod wire;

use wire::{PaneLine, RideMessage};

#[derive(Parser, Debug)]
#[command(name = "ridecrab")]
#[command(about = "Latest position per taxi ride", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay ride updates through session windows with early and final panes.
    Replay {
        /// JSON-lines input; `-` reads stdin.
        #[arg(long, default_value = "-")]
        input: PathBuf,
        #[arg(long, default_value_t = 60)]
        gap_minutes: u64,
        #[arg(long, default_value_t = 2000, conflicts_with = "no_early_firing")]
        early_firing_ms: u64,
        #[arg(long)]
        no_early_firing: bool,
        #[arg(long, default_value_t = 0)]
        allowed_lateness_ms: u64,
        #[arg(long, default_value_t = 5000)]
        max_out_of_orderness_ms: u64,
        /// Only print final panes.
        #[arg(long)]
        final_only: bool,
    },
    /// Latest update per ride over the whole input, combined in parallel.
    Latest {
        #[arg(long, default_value = "-")]
        input: PathBuf,
        #[arg(long, default_value_t = 4)]
        parallelism: usize,
        /// Route each ride to a single worker instead of round-robin.
        #[arg(long)]
        by_key: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Replay {
            input,
            gap_minutes,
            early_firing_ms,
            no_early_firing,
            allowed_lateness_ms,
            max_out_of_orderness_ms,
            final_only,
        } => {
            let config = WindowConfig::default()
                .with_gap(gap_from_minutes(gap_minutes)?)
                .with_early_firing_delay(
                    (!no_early_firing).then(|| Duration::from_millis(early_firing_ms)),
                )
                .with_allowed_lateness(Duration::from_millis(allowed_lateness_ms));
            replay(
                open_input(&input)?,
                &config,
                Duration::from_millis(max_out_of_orderness_ms),
                final_only,
            )?;
        }
        Commands::Latest {
            input,
            parallelism,
            by_key,
        } => {
            let points: Vec<RidePoint> = read_points(open_input(&input)?).collect();
            let distribution = if by_key {
                Distribution::ByKey
            } else {
                Distribution::RoundRobin
            };
            let result = combine_per_key(
                points,
                parallelism,
                distribution,
                RidePoint::ride_key,
                LatestByTimestamp,
            )?;

            let mut rides: Vec<RidePoint> = result.outputs.into_values().collect();
            rides.sort_by(|a, b| a.ride_id.cmp(&b.ride_id));
            let mut out = BufWriter::new(io::stdout().lock());
            for ride in &rides {
                serde_json::to_writer(&mut out, &RideMessage::from_point(ride)?)?;
                writeln!(out)?;
            }
            out.flush()?;
            tracing::info!(
                "rides={} unkeyed_dropped={} partials_merged={}",
                rides.len(),
                result.unkeyed_dropped,
                result.partials_merged
            );
        }
    }
    Ok(())
}

fn gap_from_minutes(minutes: u64) -> anyhow::Result<Duration> {
    let secs = minutes
        .checked_mul(60)
        .ok_or_else(|| anyhow!("--gap-minutes {minutes} is out of range"))?;
    Ok(Duration::from_secs(secs))
}

fn replay(
    input: Box<dyn BufRead>,
    config: &WindowConfig,
    max_out_of_orderness: Duration,
    final_only: bool,
) -> anyhow::Result<()> {
    let mut engine = latest_rides(config)?;
    let started = Instant::now();
    let mut out = BufWriter::new(io::stdout().lock());

    let elements = watermarked(read_points(input), max_out_of_orderness, |p: &RidePoint| {
        p.timestamp
    });
    for elem in elements {
        if matches!(elem, StreamElement::Record(_)) {
            let now = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
            emit(&mut out, engine.on_processing_time(now)?, final_only)?;
        }
        emit(&mut out, engine.process(elem)?, final_only)?;
    }
    out.flush()?;

    tracing::info!(
        "{} watermark={} open_windows={}",
        engine.stats(),
        engine.current_watermark(),
        engine.open_window_count()
    );
    Ok(())
}

fn emit(
    out: &mut impl Write,
    elements: Vec<StreamElement<Pane<RidePoint>>>,
    final_only: bool,
) -> anyhow::Result<()> {
    for elem in elements {
        let StreamElement::Record(rec) = elem else {
            continue;
        };
        if final_only && !rec.value.is_final() {
            continue;
        }
        serde_json::to_writer(&mut *out, &PaneLine::from_pane(&rec.value)?)?;
        writeln!(out)?;
    }
    Ok(())
}

fn open_input(path: &Path) -> anyhow::Result<Box<dyn BufRead>> {
    if path.as_os_str() == "-" {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    Ok(Box::new(BufReader::new(file)))
}

/// Parse every line into a point, skipping blank and malformed lines.
fn read_points(input: Box<dyn BufRead>) -> impl Iterator<Item = RidePoint> {
    input
        .lines()
        .enumerate()
        .filter_map(|(idx, line)| {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    tracing::warn!("line {}: read failed: {}", idx + 1, err);
                    return None;
                }
            };
            if line.trim().is_empty() {
                return None;
            }
            match RideMessage::parse_line(&line).and_then(|msg| msg.to_point()) {
                Ok(point) => Some(point),
                Err(err) => {
                    tracing::warn!("line {}: skipping: {:#}", idx + 1, err);
                    None
                }
            }
        })
}
