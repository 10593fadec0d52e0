// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Synchronous OpenOCD Tcl command channel
//! OWNERS: @tools-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: 7 unit tests
//!
//! PUBLIC API:
//!   - Debugger: one-command-at-a-time request/response seam
//!   - CommandChannel<S>: sentinel-framed channel over any byte stream
//!   - SENTINEL: 0x1A frame terminator
//!
//! Each command is sent as UTF-8 text followed by a single 0x1A byte; the reply is
//! accumulated until it ends in 0x1A. There is no length prefix and no pipelining.

use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;

use crate::error::{Error, Result};

/// Terminator for both commands and responses.
pub const SENTINEL: u8 = 0x1A;

const READ_CHUNK: usize = 4096;

/// Issues a single debugger command and returns its trimmed reply.
pub trait Debugger {
    fn command(&mut self, cmd: &str) -> Result<String>;
}

/// Exclusive owner of the debugger connection.
///
/// Dropping the channel (or calling [`CommandChannel::close`]) sends a best-effort
/// `shutdown` command and then releases the stream unconditionally.
pub struct CommandChannel<S: Read + Write> {
    stream: Option<S>,
}

impl CommandChannel<TcpStream> {
    /// Opens a TCP connection to the debugger's Tcl port.
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        let addr = format!("{host}:{port}");
        let stream =
            TcpStream::connect(&addr).map_err(|source| Error::Connect { addr: addr.clone(), source })?;
        stream.set_nodelay(true).map_err(|source| Error::Connect { addr: addr.clone(), source })?;
        log::debug!("connected to debugger at {addr}");
        Ok(Self::new(stream))
    }
}

impl<S: Read + Write> CommandChannel<S> {
    /// Wraps an already connected stream.
    pub fn new(stream: S) -> Self {
        Self { stream: Some(stream) }
    }

    /// Borrows the underlying stream while the channel is open.
    pub fn get_ref(&self) -> Option<&S> {
        self.stream.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Sends `cmd` and blocks until the sentinel-terminated reply arrives.
    pub fn command(&mut self, cmd: &str) -> Result<String> {
        let stream = self.stream.as_mut().ok_or_else(|| Error::protocol("channel is closed"))?;

        let mut frame = Vec::with_capacity(cmd.len() + 1);
        frame.extend_from_slice(cmd.as_bytes());
        frame.push(SENTINEL);
        log::trace!("[send] {cmd:?}");
        stream.write_all(&frame)?;
        stream.flush()?;

        let mut reply = Vec::new();
        let mut chunk = [0u8; READ_CHUNK];
        while reply.last() != Some(&SENTINEL) {
            let n = match stream.read(&mut chunk) {
                Ok(0) => {
                    return Err(Error::protocol(format!(
                        "debugger closed the connection before replying to {cmd:?}"
                    )))
                }
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            };
            reply.extend_from_slice(&chunk[..n]);
        }
        reply.pop();

        let text = String::from_utf8(reply)
            .map_err(|_| Error::protocol(format!("reply to {cmd:?} is not valid UTF-8")))?;
        let text = text.trim().to_string();
        log::trace!("[recv] {text:?}");
        Ok(text)
    }

    /// Asks the debugger to shut down, then drops the connection whatever the outcome.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.stream.is_none() {
            return;
        }
        if let Err(err) = self.command("shutdown") {
            log::warn!("debugger shutdown command failed: {err}");
        }
        self.stream = None;
        log::debug!("debugger connection released");
    }
}

impl<S: Read + Write> Debugger for CommandChannel<S> {
    fn command(&mut self, cmd: &str) -> Result<String> {
        CommandChannel::command(self, cmd)
    }
}

impl<S: Read + Write> Drop for CommandChannel<S> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::io::{self, Cursor};
    use std::rc::Rc;

    /// Byte stream with a canned inbound script that records everything written.
    pub(crate) struct MockStream {
        rx: Cursor<Vec<u8>>,
        tx: Rc<RefCell<Vec<u8>>>,
    }

    impl MockStream {
        pub(crate) fn new(script: &[u8]) -> Self {
            Self { rx: Cursor::new(script.to_vec()), tx: Rc::default() }
        }

        /// Handle on the written bytes that outlives the stream.
        pub(crate) fn sent(&self) -> Rc<RefCell<Vec<u8>>> {
            Rc::clone(&self.tx)
        }
    }

    impl Read for MockStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            // One byte at a time exercises reassembly across reads.
            let limit = buf.len().min(1);
            self.rx.read(&mut buf[..limit])
        }
    }

    impl Write for MockStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.tx.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn halt_is_framed_with_sentinel() {
        let stream = MockStream::new(b"0\n\x1a");
        let sent = stream.sent();
        let mut channel = CommandChannel::new(stream);
        let reply = channel.command("halt").expect("halt");
        assert_eq!(reply, "0");
        assert_eq!(sent.borrow().as_slice(), b"halt\x1a");
    }

    #[test]
    fn reply_is_reassembled_and_trimmed() {
        let mut channel = CommandChannel::new(MockStream::new(b"  0x0000004c \r\n\x1a"));
        assert_eq!(channel.command("read_memory 0x0003f808 32 1").expect("read"), "0x0000004c");
    }

    #[test]
    fn consecutive_commands_are_not_pipelined() {
        let stream = MockStream::new(b"first\x1asecond\x1a");
        let sent = stream.sent();
        let mut channel = CommandChannel::new(stream);
        assert_eq!(channel.command("a").expect("a"), "first");
        assert_eq!(channel.command("b").expect("b"), "second");
        assert_eq!(sent.borrow().as_slice(), b"a\x1ab\x1a");
    }

    #[test]
    fn drop_releases_connection() {
        let stream = MockStream::new(b"shutdown command invoked\x1a");
        let sent = stream.sent();
        drop(CommandChannel::new(stream));
        assert_eq!(sent.borrow().as_slice(), b"shutdown\x1a");
    }

    #[test]
    fn eof_before_sentinel_is_protocol_error() {
        let mut channel = CommandChannel::new(MockStream::new(b"partial"));
        let err = channel.command("halt").expect_err("eof");
        assert!(matches!(err, Error::Protocol(_)), "unexpected {err:?}");
    }

    #[test]
    fn invalid_utf8_is_protocol_error() {
        let mut channel = CommandChannel::new(MockStream::new(b"\xff\xfe\x1a"));
        assert!(matches!(channel.command("halt"), Err(Error::Protocol(_))));
    }

    #[test]
    fn close_sends_shutdown_even_when_peer_is_gone() {
        let stream = MockStream::new(b"");
        let sent = stream.sent();
        let mut channel = CommandChannel::new(stream);
        channel.release();
        assert!(!channel.is_open());
        assert_eq!(sent.borrow().as_slice(), b"shutdown\x1a");
        // A second release is a no-op.
        channel.release();
        assert_eq!(sent.borrow().len(), b"shutdown\x1a".len());
    }
}
