// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! TOML session configuration.
//!
//! ```toml
//! [debugger]
//! host = "127.0.0.1"
//! port = 6666
//! openocd_cfg = "openocd.cfg"
//!
//! [session]
//! entry = 0x80
//! settle_ms = 1000
//!
//! [hostio]
//! obuf = 0x3F000
//! obuf_size = 1024
//! ```
//!
//! Every key is optional; missing keys keep the built-in defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::layout::HostioLayout;
use crate::runner::RunnerConfig;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DebuggerConfig {
    pub host: String,
    /// OpenOCD Tcl port.
    pub port: u16,
    /// Executable used when the debugger is spawned.
    pub openocd: String,
    /// When set, the debugger is spawned with `-f <openocd_cfg>`.
    pub openocd_cfg: Option<PathBuf>,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".into(), port: 6666, openocd: "openocd".into(), openocd_cfg: None }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawSession {
    load_offset: Option<u32>,
    entry: Option<u32>,
    settle_ms: Option<u64>,
    input_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawConfig {
    debugger: DebuggerConfig,
    session: RawSession,
    hostio: HostioLayout,
}

/// Resolved configuration for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub debugger: DebuggerConfig,
    pub runner: RunnerConfig,
    pub layout: HostioLayout,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|source| Error::ConfigIo { path: path.to_path_buf(), source })?;
        Self::parse(&raw, path)
    }

    /// Parses TOML text; `origin` is only used in error messages.
    pub fn parse(text: &str, origin: &Path) -> Result<Self> {
        let raw: RawConfig = toml::from_str(text)
            .map_err(|err| Error::Config { path: origin.to_path_buf(), detail: err.to_string() })?;
        raw.hostio.validate().map_err(|err| match err {
            Error::Config { detail, .. } => Error::Config { path: origin.to_path_buf(), detail },
            other => other,
        })?;

        let defaults = RunnerConfig::default();
        let session = raw.session;
        let runner = RunnerConfig {
            load_offset: session.load_offset.unwrap_or(defaults.load_offset),
            entry: session.entry.unwrap_or(defaults.entry),
            settle: session.settle_ms.map(Duration::from_millis).unwrap_or(defaults.settle),
            input_timeout: session.input_timeout_ms.map(Duration::from_millis),
        };
        log::debug!("config: loaded {}", origin.display());
        Ok(Self { debugger: raw.debugger, runner, layout: raw.hostio })
    }
}
