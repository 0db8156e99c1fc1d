//! Where escape sequences go
//!
//! Every draw is fully encoded in memory first and handed to the sink in a
//! single `write_bytes` call, so a failed encode never leaves half a sequence
//! on the terminal.

use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

/// Byte sink for terminal output
///
/// Implementations are not expected to serialize concurrent redraws; the
/// caller runs one redraw at a time.
pub trait OutputSink: Send + Sync {
    fn write_bytes(&self, bytes: &[u8]) -> io::Result<()>;
}

/// Writes to the process's stdout and flushes after each draw
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn write_bytes(&self, bytes: &[u8]) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        stdout.write_all(bytes)?;
        stdout.flush()
    }
}

/// In-memory sink that records every write
#[derive(Debug, Default)]
pub struct MemorySink {
    writes: Mutex<Vec<Vec<u8>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `write_bytes` calls so far
    pub fn write_count(&self) -> usize {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Everything written, concatenated
    pub fn contents(&self) -> Vec<u8> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .concat()
    }

    /// Everything written, lossily decoded for assertions
    pub fn contents_string(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }

    /// Drain and return the recorded writes
    pub fn take(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.writes.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl OutputSink for MemorySink {
    fn write_bytes(&self, bytes: &[u8]) -> io::Result<()> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(bytes.to_vec());
        Ok(())
    }
}
