// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Local operator terminal: raw-mode switching, non-blocking keystrokes, output.

use std::collections::VecDeque;
use std::io::{self, Stdout, Write};
use std::ops::{Deref, DerefMut};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;

/// Ctrl+C.
pub const KEY_INTERRUPT: u8 = 0x03;
/// Ctrl+D.
pub const KEY_EOF: u8 = 0x04;

/// Keystrokes that end an interactive session.
pub fn is_cancel_key(byte: u8) -> bool {
    matches!(byte, KEY_INTERRUPT | KEY_EOF)
}

/// Operator terminal as seen by a session.
pub trait Console: Write {
    /// Switches to raw, unbuffered, no-echo input.
    fn enter_raw(&mut self) -> io::Result<()>;

    /// Restores the mode saved by [`Console::enter_raw`].
    fn leave_raw(&mut self) -> io::Result<()>;

    /// Returns the next input byte if one is ready, without blocking.
    fn poll_key(&mut self) -> io::Result<Option<u8>>;
}

/// Holds a console in raw mode; restores it when dropped.
pub struct RawMode<'a, C: Console + ?Sized> {
    console: &'a mut C,
}

impl<'a, C: Console + ?Sized> RawMode<'a, C> {
    pub fn enter(console: &'a mut C) -> io::Result<Self> {
        console.enter_raw()?;
        log::debug!("console: raw mode on");
        Ok(Self { console })
    }
}

impl<C: Console + ?Sized> Deref for RawMode<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        self.console
    }
}

impl<C: Console + ?Sized> DerefMut for RawMode<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        self.console
    }
}

impl<C: Console + ?Sized> Drop for RawMode<'_, C> {
    fn drop(&mut self) {
        match self.console.leave_raw() {
            Ok(()) => log::debug!("console: raw mode off"),
            Err(err) => log::warn!("console: failed to restore terminal mode: {err}"),
        }
    }
}

/// The process's controlling terminal (stdin/stdout) driven through crossterm.
pub struct Terminal {
    stdout: Stdout,
    pending: VecDeque<u8>,
}

impl Terminal {
    pub fn new() -> Self {
        Self { stdout: io::stdout(), pending: VecDeque::new() }
    }
}

impl Default for Terminal {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for Terminal {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stdout.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stdout.flush()
    }
}

impl Console for Terminal {
    fn enter_raw(&mut self) -> io::Result<()> {
        terminal::enable_raw_mode()
    }

    fn leave_raw(&mut self) -> io::Result<()> {
        terminal::disable_raw_mode()
    }

    fn poll_key(&mut self) -> io::Result<Option<u8>> {
        if self.pending.is_empty() && event::poll(Duration::ZERO)? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Release {
                    self.pending.extend(encode_key(&key));
                }
            }
        }
        Ok(self.pending.pop_front())
    }
}

/// Bytes a raw VT100-style terminal would send for `key`.
pub fn encode_key(key: &KeyEvent) -> Vec<u8> {
    match key.code {
        KeyCode::Char(c) if key.modifiers.contains(KeyModifiers::CONTROL) => match c {
            'a'..='z' | 'A'..='Z' => vec![(c.to_ascii_lowercase() as u8) & 0x1f],
            '@' | ' ' => vec![0],
            '[' => vec![0x1b],
            '\\' => vec![0x1c],
            ']' => vec![0x1d],
            _ => c.to_string().into_bytes(),
        },
        KeyCode::Char(c) => c.to_string().into_bytes(),
        KeyCode::Enter => vec![b'\r'],
        KeyCode::Tab => vec![b'\t'],
        KeyCode::BackTab => b"\x1b[Z".to_vec(),
        KeyCode::Backspace => vec![0x7f],
        KeyCode::Esc => vec![0x1b],
        KeyCode::Up => b"\x1b[A".to_vec(),
        KeyCode::Down => b"\x1b[B".to_vec(),
        KeyCode::Right => b"\x1b[C".to_vec(),
        KeyCode::Left => b"\x1b[D".to_vec(),
        KeyCode::Home => b"\x1b[H".to_vec(),
        KeyCode::End => b"\x1b[F".to_vec(),
        KeyCode::Delete => b"\x1b[3~".to_vec(),
        _ => Vec::new(),
    }
}
