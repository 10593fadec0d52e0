// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Host-only end-to-end harness for the hostio stack.
//!
//! [`FakeOpenOcd`] listens on a loopback port and speaks the debugger's Tcl
//! protocol (0x1A-terminated commands and replies) on behalf of an in-memory
//! [`FakeTarget`]. Sessions under test use the real `CommandChannel` over a real
//! `TcpStream`, so framing and connection teardown are covered without hardware.

#![forbid(unsafe_code)]

use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use rvlab_hostio::fake::FakeTarget;
use rvlab_hostio::{Config, SENTINEL};
use tempfile::NamedTempFile;

/// What the fake debugger saw during one connection.
pub struct ServerLog {
    /// Target state after the client went away.
    pub target: FakeTarget,
    /// Raw bytes received from the client.
    pub wire: Vec<u8>,
    /// Commands answered before the connection ended.
    pub served: usize,
}

/// Single-connection fake of the debugger's Tcl server.
pub struct FakeOpenOcd {
    addr: SocketAddr,
    handle: JoinHandle<io::Result<ServerLog>>,
}

impl FakeOpenOcd {
    /// Serves one client until it disconnects.
    pub fn start(target: FakeTarget) -> Result<Self> {
        Self::spawn(target, None)
    }

    /// Answers `commands` commands, then closes the connection mid-session.
    pub fn hang_up_after(target: FakeTarget, commands: usize) -> Result<Self> {
        Self::spawn(target, Some(commands))
    }

    fn spawn(target: FakeTarget, hang_up_after: Option<usize>) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").context("bind fake debugger")?;
        let addr = listener.local_addr()?;
        let handle = thread::Builder::new()
            .name("fake-openocd".into())
            .spawn(move || serve(listener, target, hang_up_after))
            .context("spawn fake debugger")?;
        Ok(Self { addr, handle })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Session configuration pointing at this server, with no settle delay.
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.debugger.host = self.addr.ip().to_string();
        config.debugger.port = self.addr.port();
        config.runner.settle = Duration::ZERO;
        config
    }

    /// Waits for the client to disconnect and returns what was observed.
    pub fn finish(self) -> Result<ServerLog> {
        self.handle
            .join()
            .map_err(|_| anyhow!("fake debugger thread panicked"))?
            .context("fake debugger I/O")
    }
}

fn serve(listener: TcpListener, mut target: FakeTarget, hang_up_after: Option<usize>) -> io::Result<ServerLog> {
    let (mut stream, _) = listener.accept()?;
    let mut wire = Vec::new();
    let mut pending = Vec::new();
    let mut served = 0;
    let mut chunk = [0u8; 512];

    loop {
        let n = match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == ErrorKind::ConnectionReset => break,
            Err(err) => return Err(err),
        };
        wire.extend_from_slice(&chunk[..n]);
        pending.extend_from_slice(&chunk[..n]);

        while let Some(end) = pending.iter().position(|&b| b == SENTINEL) {
            let frame: Vec<u8> = pending.drain(..=end).collect();
            if hang_up_after == Some(served) {
                hang_up(&stream);
                return Ok(ServerLog { target, wire, served });
            }
            let cmd = String::from_utf8_lossy(&frame[..end]).into_owned();
            let reply = target.handle_command(&cmd).unwrap_or_else(|err| format!("error: {err}"));
            stream.write_all(reply.as_bytes())?;
            stream.write_all(b"\n")?;
            stream.write_all(&[SENTINEL])?;
            served += 1;
        }
    }
    Ok(ServerLog { target, wire, served })
}

fn hang_up(stream: &TcpStream) {
    // Ignored: the client may already be gone.
    let _ = stream.shutdown(Shutdown::Both);
}

/// A throwaway file standing in for an ELF image.
pub fn image() -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new().context("create image")?;
    file.write_all(b"\x7fELF fake image").context("write image")?;
    Ok(file)
}

/// A loopback port with nothing listening on it.
pub fn unused_port() -> Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}
