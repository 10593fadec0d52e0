// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Host-side hostio bridge for programs running on the RVLab FPGA core
//! OWNERS: @tools-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests per module; end-to-end over TCP in `tests/hostio_e2e`
//!
//! PUBLIC API:
//!   - CommandChannel / Debugger: OpenOCD Tcl port, 0x1A-framed, one command at a time
//!   - MemoryAccessor / WordMemory: 32-bit target memory, byte stores by read-modify-write
//!   - HostioBridge: firmware circular-buffer character I/O
//!   - ProgramRunner: load, resume, interactive loop, exit code
//!   - Config: TOML session configuration
//!   - DebuggerProcess: optional OpenOCD child for the session
//!   - fake: in-memory target and console for host tests
//!
//! Control flow is strictly layered: ProgramRunner -> HostioBridge ->
//! MemoryAccessor -> CommandChannel. Everything runs on the caller's thread.

#![forbid(unsafe_code)]

pub mod bridge;
pub mod channel;
pub mod config;
pub mod console;
pub mod error;
pub mod fake;
pub mod launcher;
pub mod layout;
pub mod memory;
pub mod runner;

pub use bridge::HostioBridge;
pub use channel::{CommandChannel, Debugger, SENTINEL};
pub use config::{Config, DebuggerConfig};
pub use console::{Console, RawMode, Terminal};
pub use error::{Error, Result};
pub use launcher::DebuggerProcess;
pub use layout::{HostioLayout, Ring};
pub use memory::{MemoryAccessor, WordMemory};
pub use runner::{ProgramRunner, RunnerConfig, SessionOutcome, SessionReport, SessionState};

/// Runner over a live TCP connection to OpenOCD.
pub type TcpRunner = ProgramRunner<MemoryAccessor<CommandChannel<std::net::TcpStream>>>;

/// Connects to the debugger and prepares an idle session.
pub fn connect(config: &Config) -> Result<TcpRunner> {
    let channel = CommandChannel::connect(&config.debugger.host, config.debugger.port)?;
    ProgramRunner::new(MemoryAccessor::new(channel), config.layout, config.runner.clone())
}
