// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Deterministic in-memory target and console for host-first tests
//! OWNERS: @tools-team
//! STATUS: Experimental
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Exercised by unit tests in `bridge.rs`, `memory.rs`, `runner.rs`
//!   and by the `hostio_e2e` integration crate
//!
//! PUBLIC API:
//!   - Device: word memory plus the firmware side of the hostio rings
//!   - FakeTarget: Debugger + WordMemory over a Device, with access logs and a read hook
//!   - ScriptedConsole: Console fed from a keystroke script, capturing output

use std::collections::{HashMap, VecDeque};
use std::io::{self, Write};
use std::ops::{Deref, DerefMut};

use crate::channel::Debugger;
use crate::console::Console;
use crate::error::{Error, Result};
use crate::layout::{HostioLayout, Ring, FLAG_FINISHED};
use crate::memory::{parse_word, WordMemory};

/// Invoked before every word read with the device state and the address read.
pub type ReadHook = Box<dyn FnMut(&mut Device, u32) + Send>;

/// Target-side view: sparse word memory and firmware helpers for the hostio rings.
pub struct Device {
    layout: HostioLayout,
    words: HashMap<u32, u32>,
    received: Vec<u8>,
    running: bool,
}

impl Device {
    fn new(layout: HostioLayout) -> Self {
        Self { layout, words: HashMap::new(), received: Vec::new(), running: false }
    }

    pub fn layout(&self) -> &HostioLayout {
        &self.layout
    }

    /// True between `resume` and the next `halt`.
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn peek(&self, addr: u32) -> u32 {
        self.words.get(&(addr & !3)).copied().unwrap_or(0)
    }

    pub fn poke(&mut self, addr: u32, value: u32) {
        self.words.insert(addr & !3, value);
    }

    fn peek_byte(&self, addr: u32) -> u8 {
        (self.peek(addr) >> ((addr & 3) * 8)) as u8
    }

    fn poke_byte(&mut self, addr: u32, value: u8) {
        let shift = (addr & 3) * 8;
        let word = self.peek(addr) & !(0xff << shift);
        self.poke(addr, word | (u32::from(value) << shift));
    }

    /// Firmware `putchar`: appends to the output ring.
    ///
    /// Panics if the host has not drained enough space.
    pub fn print(&mut self, bytes: &[u8]) {
        let ring = Ring::new(self.layout.obuf_size);
        for &byte in bytes {
            let widx = self.peek(self.layout.obuf_widx);
            let ridx = self.peek(self.layout.obuf_ridx);
            assert!(!ring.is_full(widx, ridx), "fake device: output ring overflow");
            self.poke_byte(self.layout.obuf + widx, byte);
            self.poke(self.layout.obuf_widx, ring.advance(widx));
        }
    }

    /// Free space left in the output ring.
    pub fn output_space(&self) -> u32 {
        let ring = Ring::new(self.layout.obuf_size);
        let queued = ring.queued(self.peek(self.layout.obuf_widx), self.peek(self.layout.obuf_ridx));
        ring.mask() - queued
    }

    /// Bytes the host has queued and the firmware has not consumed yet.
    pub fn input_queued(&self) -> u32 {
        Ring::new(self.layout.ibuf_size)
            .queued(self.peek(self.layout.ibuf_widx), self.peek(self.layout.ibuf_ridx))
    }

    /// Firmware `getchar` for up to `n` bytes; consumed bytes accumulate in [`Device::received`].
    pub fn consume_input(&mut self, n: u32) {
        let taken = self.pop_input(n);
        self.received.extend(taken);
    }

    /// Consumes and returns every queued input byte.
    pub fn take_input(&mut self) -> Vec<u8> {
        self.pop_input(u32::MAX)
    }

    fn pop_input(&mut self, n: u32) -> Vec<u8> {
        let ring = Ring::new(self.layout.ibuf_size);
        let mut ridx = self.peek(self.layout.ibuf_ridx);
        let count = self.input_queued().min(n);
        let mut out = Vec::with_capacity(count as usize);
        for _ in 0..count {
            out.push(self.peek_byte(self.layout.ibuf + ridx));
            ridx = ring.advance(ridx);
        }
        self.poke(self.layout.ibuf_ridx, ridx);
        out
    }

    pub fn received(&self) -> &[u8] {
        &self.received
    }

    /// Firmware `exit(code)`.
    pub fn exit_with(&mut self, code: i32) {
        self.poke(self.layout.retval, code as u32);
        let flags = self.peek(self.layout.flags);
        self.poke(self.layout.flags, flags | FLAG_FINISHED);
        self.running = false;
    }
}

/// In-memory stand-in for a debugger attached to a hostio target.
pub struct FakeTarget {
    device: Device,
    hook: Option<ReadHook>,
    reads: Vec<u32>,
    writes: Vec<(u32, u32)>,
    commands: Vec<String>,
    replies: HashMap<String, String>,
    reads_left: Option<usize>,
}

impl Default for FakeTarget {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeTarget {
    pub fn new() -> Self {
        Self::with_layout(HostioLayout::default())
    }

    pub fn with_layout(layout: HostioLayout) -> Self {
        Self {
            device: Device::new(layout),
            hook: None,
            reads: Vec::new(),
            writes: Vec::new(),
            commands: Vec::new(),
            replies: HashMap::new(),
            reads_left: None,
        }
    }

    /// Installs firmware behaviour that runs before every word read.
    pub fn set_read_hook(&mut self, hook: impl FnMut(&mut Device, u32) + Send + 'static) {
        self.hook = Some(Box::new(hook));
    }

    /// Overrides the reply for commands starting with `verb`.
    pub fn set_reply(&mut self, verb: &str, reply: &str) {
        self.replies.insert(verb.to_string(), reply.to_string());
    }

    /// Simulates the debugger dropping the link: reads after the first `reads` fail.
    pub fn disconnect_after_reads(&mut self, reads: usize) {
        self.reads_left = Some(reads);
    }

    pub fn reads(&self) -> &[u32] {
        &self.reads
    }

    pub fn writes(&self) -> &[(u32, u32)] {
        &self.writes
    }

    /// Non-memory commands received, in order.
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    pub fn reset_log(&mut self) {
        self.reads.clear();
        self.writes.clear();
        self.commands.clear();
    }

    /// Executes one textual debugger command against the fake.
    pub fn handle_command(&mut self, cmd: &str) -> Result<String> {
        let mut args = cmd.split_whitespace();
        let verb = args.next().unwrap_or_default();
        match verb {
            "read_memory" => {
                let addr = parse_word(args.next().unwrap_or_default())?;
                return Ok(format!("0x{:08x}", self.read_word(addr)?));
            }
            "write_memory" => {
                let addr = parse_word(args.next().unwrap_or_default())?;
                let _width = args.next();
                let value = parse_word(args.next().unwrap_or_default())?;
                self.write_word(addr, value)?;
                return Ok(String::new());
            }
            "halt" => self.device.running = false,
            "resume" => self.device.running = true,
            _ => {}
        }
        self.commands.push(cmd.to_string());
        if let Some(reply) = self.replies.get(verb) {
            return Ok(reply.clone());
        }
        Ok(match verb {
            "load_image" => "1024 bytes written at address 0x00000000\ndownloaded 1024 bytes".into(),
            "verify_image" => "verified 1024 bytes in 0.012s (83.333 KiB/s)".into(),
            "shutdown" => "shutdown command invoked".into(),
            _ => String::new(),
        })
    }
}

impl Deref for FakeTarget {
    type Target = Device;

    fn deref(&self) -> &Device {
        &self.device
    }
}

impl DerefMut for FakeTarget {
    fn deref_mut(&mut self) -> &mut Device {
        &mut self.device
    }
}

impl WordMemory for FakeTarget {
    fn read_word(&mut self, addr: u32) -> Result<u32> {
        if addr & 3 != 0 {
            return Err(Error::protocol(format!("unaligned word read at {addr:#x}")));
        }
        if let Some(left) = self.reads_left.as_mut() {
            if *left == 0 {
                return Err(Error::Connection(io::ErrorKind::ConnectionReset.into()));
            }
            *left -= 1;
        }
        if let Some(mut hook) = self.hook.take() {
            hook(&mut self.device, addr);
            self.hook = Some(hook);
        }
        self.reads.push(addr);
        Ok(self.device.peek(addr))
    }

    fn write_word(&mut self, addr: u32, value: u32) -> Result<()> {
        if addr & 3 != 0 {
            return Err(Error::protocol(format!("unaligned word write at {addr:#x}")));
        }
        self.writes.push((addr, value));
        self.device.poke(addr, value);
        Ok(())
    }
}

impl Debugger for FakeTarget {
    fn command(&mut self, cmd: &str) -> Result<String> {
        self.handle_command(cmd)
    }
}

/// Console whose keystrokes come from a script; output is captured in memory.
#[derive(Default)]
pub struct ScriptedConsole {
    script: VecDeque<Option<u8>>,
    output: Vec<u8>,
    raw: bool,
    raw_entries: usize,
    restores: usize,
    polls: usize,
}

impl ScriptedConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `polls` polls that report no keystroke.
    pub fn idle(mut self, polls: usize) -> Self {
        self.script.extend(std::iter::repeat(None).take(polls));
        self
    }

    pub fn key(mut self, byte: u8) -> Self {
        self.script.push_back(Some(byte));
        self
    }

    pub fn keys(mut self, bytes: &[u8]) -> Self {
        self.script.extend(bytes.iter().copied().map(Some));
        self
    }

    pub fn output(&self) -> &[u8] {
        &self.output
    }

    pub fn is_raw(&self) -> bool {
        self.raw
    }

    pub fn raw_entries(&self) -> usize {
        self.raw_entries
    }

    pub fn restores(&self) -> usize {
        self.restores
    }

    /// Number of readiness checks performed so far.
    pub fn polls(&self) -> usize {
        self.polls
    }
}

impl Write for ScriptedConsole {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.output.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Console for ScriptedConsole {
    fn enter_raw(&mut self) -> io::Result<()> {
        self.raw = true;
        self.raw_entries += 1;
        Ok(())
    }

    fn leave_raw(&mut self) -> io::Result<()> {
        self.raw = false;
        self.restores += 1;
        Ok(())
    }

    fn poll_key(&mut self) -> io::Result<Option<u8>> {
        self.polls += 1;
        Ok(self.script.pop_front().flatten())
    }
}
