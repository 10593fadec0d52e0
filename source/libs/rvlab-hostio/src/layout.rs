// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Firmware contract: where the hostio buffers and registers live in target memory.

use serde::Deserialize;

use crate::error::{Error, Result};

/// Bit in the flags word set by firmware once the program has exited.
pub const FLAG_FINISHED: u32 = 1 << 0;

/// Addresses of the hostio buffers and registers.
///
/// Carried as an explicit value so targets with a different memory map need no
/// rebuild. Both capacities must be powers of two; see [`HostioLayout::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostioLayout {
    /// Device-to-host buffer base.
    pub obuf: u32,
    pub obuf_size: u32,
    /// Host-to-device buffer base.
    pub ibuf: u32,
    pub ibuf_size: u32,
    pub flags: u32,
    pub retval: u32,
    pub obuf_widx: u32,
    pub obuf_ridx: u32,
    pub ibuf_widx: u32,
    pub ibuf_ridx: u32,
}

impl Default for HostioLayout {
    fn default() -> Self {
        Self {
            obuf: 0x0003_F000,
            obuf_size: 1024,
            ibuf: 0x0003_F400,
            ibuf_size: 1024,
            flags: 0x0003_F800,
            retval: 0x0003_F804,
            obuf_widx: 0x0003_F808,
            obuf_ridx: 0x0003_F80C,
            ibuf_widx: 0x0003_F810,
            ibuf_ridx: 0x0003_F814,
        }
    }
}

impl HostioLayout {
    /// Checks the invariants the index arithmetic relies on.
    pub fn validate(&self) -> Result<()> {
        let regions = [("obuf", self.obuf, self.obuf_size), ("ibuf", self.ibuf, self.ibuf_size)];
        for (name, base, size) in regions {
            if !size.is_power_of_two() {
                return Err(invalid(format!("{name}_size = {size} is not a power of two")));
            }
            // One slot always stays free, so a single-byte ring can never hold data.
            if size < 2 {
                return Err(invalid(format!("{name}_size = {size} is too small, need at least 2")));
            }
            if base.checked_add(size - 1).is_none() {
                return Err(invalid(format!(
                    "{name} = {base:#010x} with size {size} runs past the 32-bit address space"
                )));
            }
        }
        let registers = [
            ("flags", self.flags),
            ("retval", self.retval),
            ("obuf_widx", self.obuf_widx),
            ("obuf_ridx", self.obuf_ridx),
            ("ibuf_widx", self.ibuf_widx),
            ("ibuf_ridx", self.ibuf_ridx),
            ("obuf", self.obuf),
            ("ibuf", self.ibuf),
        ];
        for (name, addr) in registers {
            if addr & 3 != 0 {
                return Err(invalid(format!("{name} = {addr:#010x} is not word aligned")));
            }
        }
        Ok(())
    }
}

fn invalid(detail: String) -> Error {
    Error::Config { path: "<layout>".into(), detail }
}

/// Index arithmetic for a power-of-two ring of `capacity` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ring {
    mask: u32,
}

impl Ring {
    /// `capacity` must be a power of two (guaranteed by [`HostioLayout::validate`]).
    pub const fn new(capacity: u32) -> Self {
        Self { mask: capacity - 1 }
    }

    pub const fn mask(self) -> u32 {
        self.mask
    }

    pub const fn capacity(self) -> u32 {
        self.mask + 1
    }

    /// Next index, wrapping by mask.
    pub const fn advance(self, idx: u32) -> u32 {
        idx.wrapping_add(1) & self.mask
    }

    /// Bytes queued between a reader at `ridx` and a writer at `widx`.
    pub const fn queued(self, widx: u32, ridx: u32) -> u32 {
        widx.wrapping_sub(ridx) & self.mask
    }

    /// A ring holds at most `capacity - 1` bytes; `widx == ridx` means empty.
    pub const fn is_full(self, widx: u32, ridx: u32) -> bool {
        self.queued(widx, ridx) == self.mask
    }
}
