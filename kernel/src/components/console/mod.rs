//! Console component trait
//!
//! A blocking byte sink. The core never reads from the console.

use core::fmt;

/// Console used for kernel output
pub trait Console: Send + Sync {
    /// Write a single byte
    ///
    /// Blocks until the device accepts it.
    fn putc(&self, c: u8);

    /// Write raw bytes, translating `\n` to CRLF
    fn write_bytes(&self, bytes: &[u8]) {
        for &byte in bytes {
            if byte == b'\n' {
                self.putc(b'\r');
            }
            self.putc(byte);
        }
    }

    /// Write a string
    fn puts(&self, s: &str) {
        self.write_bytes(s.as_bytes());
    }
}

/// Adapter from a console to [`core::fmt::Write`]
pub struct ConsoleWriter<'a> {
    console: &'a dyn Console,
}

impl<'a> ConsoleWriter<'a> {
    pub const fn new(console: &'a dyn Console) -> Self {
        Self { console }
    }
}

impl fmt::Write for ConsoleWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.console.puts(s);
        Ok(())
    }
}

pub mod null;
