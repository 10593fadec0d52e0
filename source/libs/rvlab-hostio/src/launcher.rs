// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Spawns the debugger server for the duration of a session.

use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use crate::error::{Error, Result};

/// Time the debugger needs before its Tcl port accepts connections.
pub const STARTUP_DELAY: Duration = Duration::from_secs(1);

/// A running debugger child process. Killed and reaped on drop.
pub struct DebuggerProcess {
    child: Option<Child>,
    program: String,
}

impl DebuggerProcess {
    /// Starts `<program> -f <board_cfg>` and waits `startup` for it to come up.
    ///
    /// The child's stdio is detached so it cannot write into the raw terminal.
    pub fn spawn(program: &str, board_cfg: &Path, startup: Duration) -> Result<Self> {
        let child = Command::new(program)
            .arg("-f")
            .arg(board_cfg)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| Error::Launch { program: program.to_string(), source })?;
        log::info!("started {program} (pid {}) with {}", child.id(), board_cfg.display());
        if !startup.is_zero() {
            thread::sleep(startup);
        }
        Ok(Self { child: Some(child), program: program.to_string() })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// Kills the debugger and waits for it to exit.
    pub fn stop(mut self) -> Result<Option<ExitStatus>> {
        self.reap()
    }

    fn reap(&mut self) -> Result<Option<ExitStatus>> {
        let Some(mut child) = self.child.take() else {
            return Ok(None);
        };
        if let Err(err) = child.kill() {
            // Already exited; waiting below still reaps it.
            log::warn!("failed to kill {}: {err}", self.program);
        }
        log::info!("waiting for {} to finish", self.program);
        let status = child
            .wait()
            .map_err(|source| Error::Launch { program: self.program.clone(), source })?;
        Ok(Some(status))
    }
}

impl Drop for DebuggerProcess {
    fn drop(&mut self) {
        if let Err(err) = self.reap() {
            log::warn!("failed to reap {}: {err}", self.program);
        }
    }
}
