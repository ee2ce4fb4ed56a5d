//! Null console (no output)
//!
//! Stands in when no serial console has been registered.

use super::Console;

/// Console that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullConsole;

impl Console for NullConsole {
    #[inline(always)]
    fn putc(&self, _c: u8) {}

    #[inline(always)]
    fn write_bytes(&self, _bytes: &[u8]) {}
}
