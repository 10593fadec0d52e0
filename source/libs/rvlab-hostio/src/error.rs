// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error model shared by every layer of the hostio bridge.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result alias for hostio operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors produced while talking to the debugger or driving a session.
///
/// Connection and protocol failures are fatal for the session: buffer indices and
/// load state may be inconsistent afterwards, so nothing is retried.
#[derive(Debug, Error)]
pub enum Error {
    /// The debugger's command port could not be reached.
    #[error("cannot reach debugger at {addr}: {source}")]
    Connect {
        /// `host:port` that was dialed.
        addr: String,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },
    /// The connection failed after it was established.
    #[error("debugger connection lost: {0}")]
    Connection(#[from] io::Error),
    /// The debugger sent something that does not follow the command protocol.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The program image could not be loaded or failed verification.
    #[error("image {path}: {detail}")]
    Image {
        /// Image path as given by the caller.
        path: PathBuf,
        /// What went wrong.
        detail: String,
    },
    /// The target stopped consuming input for longer than the configured bound.
    #[error("input buffer did not drain within {0:?}")]
    InputStalled(Duration),
    /// The local terminal could not be switched or read.
    #[error("terminal error: {0}")]
    Terminal(#[source] io::Error),
    /// A session operation was invoked from the wrong state.
    #[error("cannot {op} while session is {state}")]
    SessionState {
        /// Operation that was attempted.
        op: &'static str,
        /// State the session was in.
        state: &'static str,
    },
    /// A configuration file could not be read.
    #[error("failed to access {path}: {source}")]
    ConfigIo {
        /// Config file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A configuration value is malformed or violates a layout invariant.
    #[error("invalid configuration {path}: {detail}")]
    Config {
        /// Config file path, or `<builtin>` for programmatic values.
        path: PathBuf,
        /// Reason the value was rejected.
        detail: String,
    },
    /// The debugger process could not be spawned.
    #[error("failed to launch {program}: {source}")]
    Launch {
        /// Program that was spawned.
        program: String,
        /// Underlying spawn error.
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub(crate) fn protocol(detail: impl Into<String>) -> Self {
        Error::Protocol(detail.into())
    }

    pub(crate) fn image(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        Error::Image { path: path.into(), detail: detail.into() }
    }

    /// Returns true for failures of the debugger link itself.
    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Connect { .. } | Error::Connection(_))
    }
}
