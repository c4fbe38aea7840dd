//! Console Device
//!
//! Descriptors 0 and 1 are wired to the console: `read(0, ..)` pulls bytes
//! from the keyboard, `write(1, ..)` pushes them to the screen.
//!
//! # Security Considerations
//! - Output is written in bounded chunks so one large write cannot hold the
//!   console for an unbounded time
//! - The console driver does its own locking; callers share it by reference

use core::fmt::{self, Write};

/// Largest block handed to [`Console::putbuf`] in one call.
pub const CONSOLE_CHUNK: usize = 256;

/// The console collaborator.
pub trait Console {
    /// Read one byte of keyboard input, blocking until one is available.
    fn getc(&self) -> u8;

    /// Write a buffer to the screen without interleaving it with other output.
    fn putbuf(&self, bytes: &[u8]);

    /// Write `bytes` in chunks of at most [`CONSOLE_CHUNK`].
    fn put_chunked(&self, bytes: &[u8]) {
        for chunk in bytes.chunks(CONSOLE_CHUNK) {
            self.putbuf(chunk);
        }
    }
}

/// `core::fmt::Write` adapter over a console, for kernel messages.
pub struct ConsoleWriter<'a, C: ?Sized> {
    console: &'a C,
}

impl<'a, C: Console + ?Sized> ConsoleWriter<'a, C> {
    /// Wrap a console.
    pub const fn new(console: &'a C) -> Self {
        Self { console }
    }
}

impl<C: Console + ?Sized> Write for ConsoleWriter<'_, C> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.console.put_chunked(s.as_bytes());
        Ok(())
    }
}
