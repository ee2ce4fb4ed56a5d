//! Debug output and logging
//!
//! `kprint!`/`kprintln!` write to the console registered with
//! [`set_console`]; until one is registered output goes to a
//! [`NullConsole`]. [`KernelLogger`] routes the `log` facade through the same
//! console.

mod logger;

pub use logger::{init_logger, KernelLogger};

use core::fmt;

use crate::components::console::null::NullConsole;
use crate::components::console::{Console, ConsoleWriter};

static CONSOLE: spin::Once<&'static dyn Console> = spin::Once::new();
static NULL_CONSOLE: NullConsole = NullConsole;

/// Register the kernel console
///
/// Only the first registration takes effect.
pub fn set_console(console: &'static dyn Console) {
    CONSOLE.call_once(|| console);
}

/// The registered console, or the null console
pub fn console() -> &'static dyn Console {
    match CONSOLE.get() {
        Some(console) => *console,
        None => &NULL_CONSOLE,
    }
}

/// Write raw bytes to the console
pub fn write_bytes(bytes: &[u8]) {
    console().write_bytes(bytes);
}

/// Debug writer (uses the registered console)
pub struct DebugWriter;

impl fmt::Write for DebugWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        ConsoleWriter::new(console()).write_str(s)
    }
}

/// Print macro for kernel
#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => ({
        use core::fmt::Write;
        let _ = write!($crate::debug::DebugWriter, $($arg)*);
    });
}

/// Print with newline macro for kernel
#[macro_export]
macro_rules! kprintln {
    () => ($crate::kprint!("\n"));
    ($($arg:tt)*) => ({
        use core::fmt::Write;
        let _ = writeln!($crate::debug::DebugWriter, $($arg)*);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::vec::Vec;

    struct CaptureConsole(Mutex<Vec<u8>>);

    impl Console for CaptureConsole {
        fn putc(&self, c: u8) {
            self.0.lock().unwrap().push(c);
        }
    }

    static CAPTURE: CaptureConsole = CaptureConsole(Mutex::new(Vec::new()));

    #[test]
    fn test_output_reaches_registered_console() {
        set_console(&CAPTURE);
        kprint!("pid {}", 7);
        kprintln!();
        write_bytes(b"raw");

        let out = CAPTURE.0.lock().unwrap().clone();
        let text = std::string::String::from_utf8(out).unwrap();
        assert!(text.contains("pid 7\r\n"));
        assert!(text.contains("raw"));
    }
}
