// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Word-granular target memory access over debugger commands
//! OWNERS: @tools-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: 7 unit tests
//!
//! The target only exposes 32-bit accesses (`read_memory`/`write_memory` with width
//! 32). Byte stores are derived by read-modify-write of the containing word, which
//! assumes a single writer for the whole session.

use crate::channel::Debugger;
use crate::error::{Error, Result};

/// 32-bit target memory.
pub trait WordMemory {
    fn read_word(&mut self, addr: u32) -> Result<u32>;

    fn write_word(&mut self, addr: u32, value: u32) -> Result<()>;

    /// Stores one byte by rewriting its containing word. Not atomic.
    fn write_byte(&mut self, addr: u32, value: u8) -> Result<()> {
        let word_addr = addr & !3;
        let shift = (addr & 3) * 8;
        let mut word = self.read_word(word_addr)?;
        word &= !(0xff << shift);
        word |= u32::from(value) << shift;
        self.write_word(word_addr, word)
    }
}

/// [`WordMemory`] implemented with OpenOCD memory commands.
///
/// Also forwards raw commands, so a session can drive the debugger through the
/// same owner that the hostio bridge uses.
pub struct MemoryAccessor<D> {
    debugger: D,
}

impl<D: Debugger> MemoryAccessor<D> {
    pub fn new(debugger: D) -> Self {
        Self { debugger }
    }

    pub fn get_mut(&mut self) -> &mut D {
        &mut self.debugger
    }

    pub fn into_inner(self) -> D {
        self.debugger
    }
}

impl<D: Debugger> Debugger for MemoryAccessor<D> {
    fn command(&mut self, cmd: &str) -> Result<String> {
        self.debugger.command(cmd)
    }
}

impl<D: Debugger> WordMemory for MemoryAccessor<D> {
    fn read_word(&mut self, addr: u32) -> Result<u32> {
        let reply = self.debugger.command(&format!("read_memory 0x{addr:08x} 32 1"))?;
        parse_word(&reply)
    }

    fn write_word(&mut self, addr: u32, value: u32) -> Result<()> {
        self.debugger.command(&format!("write_memory 0x{addr:08x} 32 0x{value:08x}"))?;
        Ok(())
    }
}

/// Parses a memory-read reply in decimal or `0x` hexadecimal form.
pub fn parse_word(reply: &str) -> Result<u32> {
    let text = reply.trim();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => text.parse::<u32>(),
    };
    parsed.map_err(|_| Error::protocol(format!("unparsable memory reply {reply:?}")))
}
