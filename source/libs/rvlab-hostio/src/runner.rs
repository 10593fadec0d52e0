// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Interactive program session on a debugger-attached RISC-V target
//! OWNERS: @tools-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: 10 unit tests
//!
//! PUBLIC API:
//!   - ProgramRunner::load(): halt, clear hostio, load + verify image, set pc
//!   - ProgramRunner::start(): resume and wait for the target to settle
//!   - ProgramRunner::interact(): raw-terminal poll loop until exit or cancel
//!   - ProgramRunner::run(): all of the above, returning a SessionReport
//!
//! States: Idle -> Loaded -> Running -> {Finished, Cancelled}. Each loop iteration
//! checks the finished flag, drains output, then forwards at most one keystroke, so
//! output is never starved by input and cancellation is seen within one iteration.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crate::bridge::HostioBridge;
use crate::channel::Debugger;
use crate::console::{is_cancel_key, Console, RawMode};
use crate::error::{Error, Result};
use crate::layout::HostioLayout;
use crate::memory::WordMemory;

/// Session parameters that are not part of the firmware memory map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Offset passed to `load_image`/`verify_image`.
    pub load_offset: u32,
    /// Program counter set after loading.
    pub entry: u32,
    /// Delay between `resume` and the first poll.
    pub settle: Duration,
    /// Bound on the input backpressure wait; `None` waits forever.
    pub input_timeout: Option<Duration>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self { load_offset: 0, entry: 0x80, settle: Duration::from_secs(1), input_timeout: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Loaded,
    Running,
    Finished(i32),
    Cancelled,
}

impl SessionState {
    fn name(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Loaded => "loaded",
            SessionState::Running => "running",
            SessionState::Finished(_) => "finished",
            SessionState::Cancelled => "cancelled",
        }
    }
}

/// How an interactive session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The program exited with this return value.
    Finished(i32),
    /// The operator pressed a cancel key; no exit code is available.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub outcome: SessionOutcome,
    /// Everything written to the console while running (CR LF line endings).
    pub transcript: Vec<u8>,
}

pub struct ProgramRunner<M> {
    bridge: HostioBridge<M>,
    config: RunnerConfig,
    state: SessionState,
    transcript: Vec<u8>,
}

impl<M: WordMemory + Debugger> ProgramRunner<M> {
    pub fn new(target: M, layout: HostioLayout, config: RunnerConfig) -> Result<Self> {
        let bridge = HostioBridge::new(target, layout)?.with_input_timeout(config.input_timeout);
        Ok(Self { bridge, config, state: SessionState::Idle, transcript: Vec::new() })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn transcript(&self) -> &[u8] {
        &self.transcript
    }

    pub fn bridge_mut(&mut self) -> &mut HostioBridge<M> {
        &mut self.bridge
    }

    pub fn into_target(self) -> M {
        self.bridge.into_memory()
    }

    /// Idle -> Loaded.
    pub fn load(&mut self, image: &Path) -> Result<()> {
        self.expect(SessionState::Idle, "load an image")?;
        let path = resolve_image(image)?;
        let path_text = path
            .to_str()
            .ok_or_else(|| Error::image(image, "path is not valid UTF-8"))?
            .to_owned();
        let offset = self.config.load_offset;

        self.cmd("halt")?;
        self.cmd("tcl_trace off")?;
        self.bridge.clear()?;

        log::info!("loading {} at offset {offset:#x}", path.display());
        let loaded = self.cmd(&format!("load_image {path_text} {offset} elf"))?;
        check_load(image, &loaded)?;
        let verified = self.cmd(&format!("verify_image {path_text} {offset} elf"))?;
        check_verify(image, &verified)?;

        self.cmd(&format!("reg pc 0x{:x}", self.config.entry))?;
        self.cmd("riscv set_mem_access sysbus")?;
        self.transition(SessionState::Loaded);
        Ok(())
    }

    /// Loaded -> Running.
    pub fn start(&mut self) -> Result<()> {
        self.expect(SessionState::Loaded, "start")?;
        self.cmd("resume")?;
        self.transition(SessionState::Running);
        if !self.config.settle.is_zero() {
            thread::sleep(self.config.settle);
        }
        Ok(())
    }

    /// Running -> Finished | Cancelled.
    ///
    /// The console is in raw mode for exactly the duration of this call, whatever
    /// the result.
    pub fn interact<C: Console + ?Sized>(&mut self, console: &mut C) -> Result<SessionOutcome> {
        self.expect(SessionState::Running, "interact")?;
        let outcome = {
            let mut raw = RawMode::enter(console).map_err(Error::Terminal)?;
            self.poll_loop(&mut *raw)
        }?;
        self.transition(match outcome {
            SessionOutcome::Finished(code) => SessionState::Finished(code),
            SessionOutcome::Cancelled => SessionState::Cancelled,
        });
        Ok(outcome)
    }

    /// Runs one program from Idle to a terminal state.
    pub fn run<C: Console + ?Sized>(&mut self, image: &Path, console: &mut C) -> Result<SessionReport> {
        self.load(image)?;
        self.start()?;
        let outcome = self.interact(console)?;
        Ok(SessionReport { outcome, transcript: std::mem::take(&mut self.transcript) })
    }

    fn poll_loop<C: Console + ?Sized>(&mut self, console: &mut C) -> Result<SessionOutcome> {
        loop {
            let finished = self.bridge.is_finished()?;
            let mut sink = Tee { console: &mut *console, transcript: &mut self.transcript };
            self.bridge.drain_output(&mut sink)?;
            if finished {
                let code = self.bridge.exit_code()?;
                log::info!("program finished with {code}");
                return Ok(SessionOutcome::Finished(code));
            }

            match console.poll_key().map_err(Error::Terminal)? {
                Some(key) if is_cancel_key(key) => {
                    log::info!("session cancelled by operator");
                    return Ok(SessionOutcome::Cancelled);
                }
                Some(key) => self.bridge.feed_input(key)?,
                None => {}
            }
        }
    }

    fn cmd(&mut self, cmd: &str) -> Result<String> {
        self.bridge.memory_mut().command(cmd)
    }

    fn expect(&self, expected: SessionState, op: &'static str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::SessionState { op, state: self.state.name() })
        }
    }

    fn transition(&mut self, next: SessionState) {
        log::debug!("session: {} -> {}", self.state.name(), next.name());
        self.state = next;
    }
}

/// Console output that is also recorded.
struct Tee<'a, C: ?Sized> {
    console: &'a mut C,
    transcript: &'a mut Vec<u8>,
}

impl<C: Write + ?Sized> Write for Tee<'_, C> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.console.write(buf)?;
        self.transcript.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.console.flush()
    }
}

/// The debugger runs in its own working directory, so relative paths are resolved here.
fn resolve_image(image: &Path) -> Result<PathBuf> {
    image.canonicalize().map_err(|err| Error::image(image, format!("cannot open image: {err}")))
}

fn check_load(image: &Path, reply: &str) -> Result<()> {
    let lower = reply.to_ascii_lowercase();
    if lower.contains("error") || lower.contains("failed") {
        return Err(Error::image(image, format!("load failed: {reply}")));
    }
    Ok(())
}

/// `verify_image` is authoritative: any reported difference is fatal.
fn check_verify(image: &Path, reply: &str) -> Result<()> {
    let mismatch = reply.lines().find(|line| {
        let line = line.trim_start();
        line.starts_with("diff ") || line.contains("mismatch") || line.to_ascii_lowercase().contains("error")
    });
    match mismatch {
        Some(line) => Err(Error::image(image, format!("verification failed: {line}"))),
        None if reply.contains("verified") => Ok(()),
        None => Err(Error::image(image, format!("unexpected verify reply: {reply:?}"))),
    }
}
