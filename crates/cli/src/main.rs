// MemFeed - Memory Reader Feed Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

mod stats_log;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

use memfeed_config::FeedConfig;
use memfeed_core::console::Console;
use memfeed_core::controls::ControlSnapshot;
use memfeed_core::feed::RunSummary;
use memfeed_core::metrics::{FeedMetrics, MetricsSnapshot};
use memfeed_core::mmio::DevMem;
use memfeed_core::regs::{Access, Telemetry, REGISTER_MAP};
use memfeed_core::system::SimSystem;
use memfeed_core::words::SeededWords;
use memfeed_core::{ControlCommand, FeedLoop, FeedOptions, MemoryReaderRegs, RuntimeControls};
use stats_log::{LogUsage, StatsLog};

const EXIT_PASS: u8 = 0;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 3;

const REPORT_SCHEMA_VERSION: &str = "1.0";

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "MemFeed memory reader feed harness",
    long_about = None
)]
struct Cli {
    /// Enable debug logging (every submission and wrap)
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Feed a simulated memory reader on the host.
    Run(RunArgs),

    /// Feed the real memory reader through /dev/mem (requires root).
    Hw(HwArgs),

    /// Print the register map at the configured base address.
    Regs(RegsArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Path to the feed configuration (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of loop iterations to run
    #[arg(long, default_value = "10000")]
    iterations: u64,

    /// PRNG seed (overrides the config; random when unset everywhere)
    #[arg(long)]
    seed: Option<u64>,

    /// Start with perform_reading enabled
    #[arg(long)]
    enable: bool,

    /// Start with dump_statistics enabled
    #[arg(long)]
    stats: bool,

    /// Override the buffer size divide factor
    #[arg(long)]
    divide_factor: Option<u32>,

    /// Also write progress lines to this file
    #[arg(long)]
    stats_log: Option<PathBuf>,

    /// Maximum bytes written to --stats-log; lines past the cap are dropped whole
    #[arg(long, default_value = "1048576")]
    max_log_bytes: u64,

    /// Write a JSON run summary to this file
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Read control commands (enable, disable, stats on|off, divide <n>, status) from stdin
    #[arg(long)]
    controls_stdin: bool,

    /// Keep progress lines off stdout (still written to --stats-log)
    #[arg(long)]
    quiet: bool,
}

#[derive(Parser, Debug)]
struct HwArgs {
    /// Path to the feed configuration (YAML); `window.size` sets the mapped length
    #[arg(short, long)]
    config: PathBuf,

    /// Stop after this many iterations instead of running forever
    #[arg(long)]
    iterations: Option<u64>,

    /// Start with perform_reading enabled
    #[arg(long)]
    enable: bool,

    /// Start with dump_statistics enabled
    #[arg(long)]
    stats: bool,

    /// Read control commands from stdin
    #[arg(long)]
    controls_stdin: bool,
}

#[derive(Parser, Debug)]
struct RegsArgs {
    /// Path to the feed configuration (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct RunReport {
    report_schema_version: String,
    seed: u64,
    summary: RunSummary,
    metrics: MetricsSnapshot,
    controls: ControlSnapshot,
    telemetry: Telemetry,
    dropped_starts: u64,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    controls: ControlSnapshot,
    metrics: MetricsSnapshot,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Progress lines and register dumps own stdout; logs go to stderr
    if cli.trace {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Run(args) => run_sim(args),
        Commands::Hw(args) => run_hw(args),
        Commands::Regs(args) => print_regs(args),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<FeedConfig> {
    match path {
        Some(path) => {
            info!("Loading configuration: {:?}", path);
            FeedConfig::from_file(path)
        }
        None => Ok(FeedConfig::default()),
    }
}

/// Spawn the stdin control channel. The thread ends with stdin.
fn spawn_control_reader(controls: RuntimeControls, metrics: Arc<FeedMetrics>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!("Control channel closed: {}", e);
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            let command = match line.parse::<ControlCommand>() {
                Ok(command) => command,
                Err(e) => {
                    tracing::warn!("{}", e);
                    continue;
                }
            };
            if let Err(e) = controls.apply(command) {
                tracing::warn!("{}", e);
                continue;
            }
            if command == ControlCommand::Status {
                let status = StatusReport {
                    controls: controls.snapshot(),
                    metrics: metrics.snapshot(),
                };
                match serde_json::to_string(&status) {
                    Ok(json) => eprintln!("{}", json),
                    Err(e) => tracing::warn!("Failed to encode status: {}", e),
                }
            }
        }
    });
}

/// Console for progress lines, plus the byte count of the stats log if one was requested.
fn build_console(args: &RunArgs) -> anyhow::Result<(Console, Option<Arc<LogUsage>>)> {
    let mut console = Console::new();
    if args.quiet {
        console.set_sink(None, false);
    }
    let mut log_usage = None;
    if let Some(path) = &args.stats_log {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create stats log {:?}", path))?;
        let log = StatsLog::new(std::io::BufWriter::new(file), args.max_log_bytes);
        log_usage = Some(log.usage());
        console.set_writer(Some(Box::new(log)));
    }
    Ok((console, log_usage))
}

fn resolve_run_config(args: &RunArgs) -> anyhow::Result<FeedConfig> {
    let mut config = load_config(args.config.as_deref())?;
    if args.enable {
        config.controls.perform_reading = true;
    }
    if args.stats {
        config.controls.dump_statistics = true;
    }
    if let Some(factor) = args.divide_factor {
        config.controls.divide_factor = factor;
    }
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
    config.validate()?;
    Ok(config)
}

fn run_sim(args: RunArgs) -> ExitCode {
    let config = match resolve_run_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let setup = (|| -> anyhow::Result<_> {
        let options = FeedOptions::from_config(&config)?;
        let controls = RuntimeControls::from_config(&config.controls)?;
        let system = SimSystem::from_config(&config)?;
        let (console, log_usage) = build_console(&args)?;
        Ok((options, controls, system, console, log_usage))
    })();
    let (options, controls, mut system, console, log_usage) = match setup {
        Ok(parts) => parts,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let words = match config.seed {
        Some(seed) => SeededWords::new(seed),
        None => SeededWords::from_entropy(),
    };
    let seed = words.seed();
    info!("Word source seed: {}", seed);

    let metrics = Arc::new(FeedMetrics::new());
    let mut feed = FeedLoop::new(options, controls.clone(), words).with_console(console);
    feed.add_observer(metrics.clone());

    if args.controls_stdin {
        spawn_control_reader(controls.clone(), metrics.clone());
    }

    info!(
        "Running {} iterations (perform_reading={}, divide_factor={})",
        args.iterations,
        controls.perform_reading(),
        controls.divide_factor()
    );
    let result = system.run(&mut feed, args.iterations).and_then(|summary| {
        system.drain()?;
        Ok(summary)
    });
    let summary = match result {
        Ok(summary) => summary,
        Err(e) => {
            error!("Feed loop failed: {}", e);
            return ExitCode::from(EXIT_RUNTIME_ERROR);
        }
    };
    let telemetry = match system.telemetry() {
        Ok(telemetry) => telemetry,
        Err(e) => {
            error!("Failed to read telemetry: {}", e);
            return ExitCode::from(EXIT_RUNTIME_ERROR);
        }
    };

    info!(
        "Done: {} submissions, {} wraps, {} stalled, {} idle",
        summary.submissions, summary.wraps, summary.backpressure, summary.idle
    );
    info!(
        "Counter at {} ({} bytes written)",
        summary.final_state.counter, summary.bytes_written
    );
    if let (Some(path), Some(usage)) = (&args.stats_log, &log_usage) {
        info!(
            "Stats log {:?}: {} bytes, {} lines dropped at the cap",
            path,
            usage.bytes(),
            usage.dropped_lines()
        );
    }
    if telemetry.valid_count != telemetry.query_count {
        tracing::warn!(
            "Peripheral flagged {} of {} transfers out of sequence",
            telemetry.query_count.wrapping_sub(telemetry.valid_count),
            telemetry.query_count
        );
    }

    if let Some(path) = &args.summary {
        let report = RunReport {
            report_schema_version: REPORT_SCHEMA_VERSION.to_string(),
            seed,
            summary,
            metrics: metrics.snapshot(),
            controls: controls.snapshot(),
            telemetry,
            dropped_starts: system.regs.backend().dropped_starts(),
        };
        match std::fs::File::create(path) {
            Ok(f) => {
                if let Err(e) = serde_json::to_writer_pretty(f, &report) {
                    error!("Failed to write summary {:?}: {}", path, e);
                    return ExitCode::from(EXIT_RUNTIME_ERROR);
                }
            }
            Err(e) => {
                error!("Failed to create summary {:?}: {}", path, e);
                return ExitCode::from(EXIT_RUNTIME_ERROR);
            }
        }
    }

    ExitCode::from(EXIT_PASS)
}

fn run_hw(args: HwArgs) -> ExitCode {
    let setup = (|| -> anyhow::Result<_> {
        let mut config = load_config(Some(&args.config))?;
        if args.enable {
            config.controls.perform_reading = true;
        }
        if args.stats {
            config.controls.dump_statistics = true;
        }
        let window_len = config
            .window_size()?
            .context("window.size is required to map the buffer window")?;
        let window_len = usize::try_from(window_len).context("window.size too large")?;
        let options = FeedOptions::from_config(&config)?;
        let controls = RuntimeControls::from_config(&config.controls)?;
        Ok((config, window_len, options, controls))
    })();
    let (config, window_len, options, controls) = match setup {
        Ok(parts) => parts,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let (regs, mut window) =
        match DevMem::open(config.reader.register_base, config.window.base, window_len) {
            Ok(mapped) => mapped,
            Err(e) => {
                error!("Failed to map {}: {}", DevMem::PATH, e);
                return ExitCode::from(EXIT_RUNTIME_ERROR);
            }
        };
    let mut regs = MemoryReaderRegs::new(regs);

    let words = match config.seed {
        Some(seed) => SeededWords::new(seed),
        None => SeededWords::from_entropy(),
    };
    info!("Word source seed: {}", words.seed());

    let metrics = Arc::new(FeedMetrics::new());
    let mut feed = FeedLoop::new(options, controls.clone(), words);
    feed.add_observer(metrics.clone());

    if args.controls_stdin {
        spawn_control_reader(controls, metrics.clone());
    }

    let result = match args.iterations {
        Some(iterations) => feed
            .run(&mut regs, &mut window, iterations)
            .map(|summary| {
                info!(
                    "Done: {} submissions, {} wraps, counter at {}",
                    summary.submissions, summary.wraps, summary.final_state.counter
                );
            }),
        None => feed.run_forever(&mut regs, &mut window),
    };
    match result {
        Ok(()) => ExitCode::from(EXIT_PASS),
        Err(e) => {
            error!("Feed loop failed: {}", e);
            ExitCode::from(EXIT_RUNTIME_ERROR)
        }
    }
}

fn print_regs(args: RegsArgs) -> ExitCode {
    let config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let base = config.reader.register_base;
    println!("memory reader @ {:#010x}", base);
    for info in REGISTER_MAP.iter() {
        let access = match info.access {
            Access::ReadOnly => "RO",
            Access::WriteOnly => "WO",
        };
        println!(
            "  {:<20} 0x{:08x}  +0x{:02x}  {}",
            info.name,
            base + info.offset,
            info.offset,
            access
        );
    }
    ExitCode::from(EXIT_PASS)
}
