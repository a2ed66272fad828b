//! In-memory log capture.
//!
//! The installed subscriber is thread-local, so capture only sees events
//! from tests running on a current-thread runtime.

use std::{
    io,
    sync::{Arc, Mutex},
};

use tracing::{dispatcher::DefaultGuard, Level};
use tracing_subscriber::{fmt::MakeWriter, util::SubscriberInitExt};

/// Shared buffer that collects formatted log output.
#[derive(Debug, Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

/// Writer handed out to the fmt layer for each event.
#[derive(Debug)]
pub struct CaptureWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    /// Creates an empty capture.
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes every event at `TRACE` and above on this thread into the
    /// capture until the returned guard is dropped.
    #[must_use = "capture stops when the guard is dropped"]
    pub fn install(&self) -> DefaultGuard {
        tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_max_level(Level::TRACE)
            .with_ansi(false)
            .finish()
            .set_default()
    }

    /// Everything captured so far, lossily decoded.
    pub fn contents(&self) -> String {
        let buffer = self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = CaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CaptureWriter { buffer: Arc::clone(&self.buffer) }
    }
}

impl io::Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut buffer = self.buffer.lock().map_err(|_| io::Error::other("log buffer poisoned"))?;
        buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
