//! Raw-mode terminal handling.

use std::io;
use std::io::Write;

use crossterm::terminal::disable_raw_mode;
use crossterm::terminal::enable_raw_mode;
use tracing::warn;

/// Keeps the terminal in raw mode while alive and restores it on drop.
pub struct RawModeGuard(bool);

impl RawModeGuard {
    pub fn new(enable: bool) -> Self {
        if !enable {
            return Self(false);
        }
        match enable_raw_mode() {
            Ok(()) => Self(true),
            Err(e) => {
                warn!("Failed to enable raw mode, keyboard shortcuts disabled: {}", e);
                Self(false)
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.0
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if self.0 {
            let _ = disable_raw_mode();
        }
    }
}

/// Writer that turns `\n` into `\r\n`.
///
/// Raw mode disables output post-processing, so bare newlines would only move the cursor down.
pub struct CrlfWriter<W>(pub W);

impl<W: Write> Write for CrlfWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut start = 0;
        for (i, byte) in buf.iter().enumerate() {
            if *byte == b'\n' && (i == 0 || buf[i - 1] != b'\r') {
                self.0.write_all(&buf[start..i])?;
                self.0.write_all(b"\r\n")?;
                start = i + 1;
            }
        }
        self.0.write_all(&buf[start..])?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}
