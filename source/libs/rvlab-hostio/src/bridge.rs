// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Hostio circular-buffer protocol (host side)
//! OWNERS: @tools-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: 13 unit tests (1 proptest)
//!
//! PUBLIC API:
//!   - HostioBridge::clear(): reset flags, return value and all ring indices
//!   - HostioBridge::drain_output(): copy device output to a writer (LF -> CR LF)
//!   - HostioBridge::feed_input(): enqueue one byte for the device, waiting for space
//!   - HostioBridge::is_finished()/exit_code(): program termination status
//!
//! The output ring is single-producer (device) / single-consumer (host); the input
//! ring is the reverse. The host keeps shadow copies of the indices it owns
//! (output read, input write) and republishes them after every advance.

use std::io::Write;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::layout::{HostioLayout, Ring, FLAG_FINISHED};
use crate::memory::WordMemory;

pub struct HostioBridge<M> {
    mem: M,
    layout: HostioLayout,
    obuf: Ring,
    ibuf: Ring,
    obuf_ridx: u32,
    ibuf_widx: u32,
    input_timeout: Option<Duration>,
}

impl<M: WordMemory> HostioBridge<M> {
    /// Validates `layout` and binds it to `mem`. Shadow indices start at zero.
    pub fn new(mem: M, layout: HostioLayout) -> Result<Self> {
        layout.validate()?;
        Ok(Self {
            mem,
            layout,
            obuf: Ring::new(layout.obuf_size),
            ibuf: Ring::new(layout.ibuf_size),
            obuf_ridx: 0,
            ibuf_widx: 0,
            input_timeout: None,
        })
    }

    /// Bounds the backpressure wait in [`HostioBridge::feed_input`].
    ///
    /// `None` (the default) waits forever, which hangs the session if the firmware
    /// stops draining its input ring.
    pub fn with_input_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.input_timeout = timeout;
        self
    }

    pub fn layout(&self) -> &HostioLayout {
        &self.layout
    }

    pub fn memory_mut(&mut self) -> &mut M {
        &mut self.mem
    }

    pub fn into_memory(self) -> M {
        self.mem
    }

    /// Host-side output read index.
    pub fn output_read_index(&self) -> u32 {
        self.obuf_ridx
    }

    /// Host-side input write index.
    pub fn input_write_index(&self) -> u32 {
        self.ibuf_widx
    }

    pub fn clear(&mut self) -> Result<()> {
        let l = self.layout;
        for addr in [l.flags, l.retval, l.obuf_widx, l.obuf_ridx, l.ibuf_widx, l.ibuf_ridx] {
            self.mem.write_word(addr, 0)?;
        }
        self.obuf_ridx = 0;
        self.ibuf_widx = 0;
        log::debug!("hostio: cleared");
        Ok(())
    }

    /// Copies everything the device has produced since the last drain into `out`.
    ///
    /// Returns the number of device bytes consumed. Words are fetched once per
    /// 4-byte group rather than once per byte.
    pub fn drain_output<W: Write + ?Sized>(&mut self, out: &mut W) -> Result<usize> {
        let widx = self.mem.read_word(self.layout.obuf_widx)? & self.obuf.mask();
        if widx == self.obuf_ridx {
            return Ok(0);
        }

        let mut consumed = 0;
        let mut cached: Option<(u32, u32)> = None;
        while self.obuf_ridx != widx {
            let word_addr = self.layout.obuf + (self.obuf_ridx & !3);
            let word = match cached {
                Some((addr, word)) if addr == word_addr => word,
                _ => {
                    let word = self.mem.read_word(word_addr)?;
                    cached = Some((word_addr, word));
                    word
                }
            };
            let byte = (word >> ((self.obuf_ridx & 3) * 8)) as u8;
            let emitted = if byte == b'\n' { out.write_all(b"\r\n") } else { out.write_all(&[byte]) };
            emitted.map_err(Error::Terminal)?;
            self.obuf_ridx = self.obuf.advance(self.obuf_ridx);
            consumed += 1;
        }
        out.flush().map_err(Error::Terminal)?;

        self.mem.write_word(self.layout.obuf_ridx, self.obuf_ridx)?;
        log::debug!("hostio: drained {consumed} bytes");
        Ok(consumed)
    }

    /// Enqueues `byte` into the device's input ring.
    ///
    /// Blocks by re-reading the device read index while the ring is full.
    pub fn feed_input(&mut self, byte: u8) -> Result<()> {
        let mut ridx = self.mem.read_word(self.layout.ibuf_ridx)? & self.ibuf.mask();
        if self.ibuf.is_full(self.ibuf_widx, ridx) {
            log::debug!("hostio: input ring full, waiting for device");
            let started = Instant::now();
            while self.ibuf.is_full(self.ibuf_widx, ridx) {
                if let Some(limit) = self.input_timeout {
                    if started.elapsed() >= limit {
                        return Err(Error::InputStalled(limit));
                    }
                }
                ridx = self.mem.read_word(self.layout.ibuf_ridx)? & self.ibuf.mask();
            }
        }

        self.mem.write_byte(self.layout.ibuf + self.ibuf_widx, byte)?;
        self.ibuf_widx = self.ibuf.advance(self.ibuf_widx);
        self.mem.write_word(self.layout.ibuf_widx, self.ibuf_widx)
    }

    pub fn feed_input_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        bytes.iter().try_for_each(|&byte| self.feed_input(byte))
    }

    pub fn is_finished(&mut self) -> Result<bool> {
        Ok(self.mem.read_word(self.layout.flags)? & FLAG_FINISHED != 0)
    }

    /// Program return value. Meaningful only once [`HostioBridge::is_finished`] is true.
    pub fn exit_code(&mut self) -> Result<i32> {
        Ok(self.mem.read_word(self.layout.retval)? as i32)
    }
}
