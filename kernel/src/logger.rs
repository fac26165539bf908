//! `log` backend for the clock subsystem.
//!
//! Messages logged before the kernel hands us an output sink (early boot,
//! before the console is up) are kept in a fixed buffer and replayed into
//! the sink when it is registered. No allocation anywhere.

use conquer_once::spin::OnceCell;
use core::fmt::{self, Write};
use log::{LevelFilter, Log, Metadata, Record};
use spin::Mutex;

use crate::error::ClockError;

const BUFFER_SIZE: usize = 4096;
const LINE_SIZE: usize = 256;

/// Output sink supplied by the kernel (serial port, console, ...).
pub type LogSink = fn(&str);

static LOGGER: ClockLogger = ClockLogger::new();

/// Buffer for storing log messages before a sink is registered
struct LogBuffer {
    buffer: [u8; BUFFER_SIZE],
    position: usize,
}

impl LogBuffer {
    const fn new() -> Self {
        Self {
            buffer: [0; BUFFER_SIZE],
            position: 0,
        }
    }

    fn contents(&self) -> &str {
        core::str::from_utf8(&self.buffer[..self.position]).unwrap_or("<invalid UTF-8>")
    }

    fn clear(&mut self) {
        self.position = 0;
    }
}

impl Write for LogBuffer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let bytes = s.as_bytes();
        let remaining = BUFFER_SIZE - self.position;

        if bytes.len() > remaining {
            // Full: keep what we have, drop the newer message
            return Err(fmt::Error);
        }

        self.buffer[self.position..self.position + bytes.len()].copy_from_slice(bytes);
        self.position += bytes.len();
        Ok(())
    }
}

/// One formatted line, truncated at `LINE_SIZE` bytes.
struct LineBuffer {
    buffer: [u8; LINE_SIZE],
    len: usize,
}

impl LineBuffer {
    const fn new() -> Self {
        Self {
            buffer: [0; LINE_SIZE],
            len: 0,
        }
    }

    fn as_str(&self) -> &str {
        match core::str::from_utf8(&self.buffer[..self.len]) {
            Ok(s) => s,
            // Truncation split a character; drop the partial tail
            Err(e) => core::str::from_utf8(&self.buffer[..e.valid_up_to()]).unwrap_or(""),
        }
    }
}

impl Write for LineBuffer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let bytes = s.as_bytes();
        let n = bytes.len().min(LINE_SIZE - self.len);
        self.buffer[self.len..self.len + n].copy_from_slice(&bytes[..n]);
        self.len += n;
        Ok(())
    }
}

/// Format `record` as one output line.
fn format_line(record: &Record) -> LineBuffer {
    let mut line = LineBuffer::new();
    let _ = writeln!(
        &mut line,
        "[{:>5}] {}: {}",
        record.level(),
        record.target(),
        record.args()
    );
    line
}

pub struct ClockLogger {
    buffer: Mutex<LogBuffer>,
    sink: OnceCell<LogSink>,
}

impl ClockLogger {
    const fn new() -> Self {
        ClockLogger {
            buffer: Mutex::new(LogBuffer::new()),
            sink: OnceCell::uninit(),
        }
    }

    /// Replay buffered messages into `sink`, then route everything to it.
    ///
    /// The replay runs under the buffer lock and before `sink` becomes
    /// visible to `log`, so buffered lines always reach the sink first.
    fn register(&self, sink: LogSink) -> Result<(), ClockError> {
        let mut buffer = self.buffer.lock();
        if self.sink.is_initialized() {
            return Err(ClockError::AlreadyInitialized);
        }

        if buffer.position > 0 {
            sink(buffer.contents());
            buffer.clear();
        }

        self.sink
            .try_init_once(|| sink)
            .map_err(|_| ClockError::AlreadyInitialized)
    }
}

impl Log for ClockLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        if let Some(sink) = self.sink.get() {
            sink(format_line(record).as_str());
            return;
        }

        // try_lock: a record logged from an interrupt that landed while this
        // CPU holds the buffer is dropped, not deadlocked on
        if let Some(mut buffer) = self.buffer.try_lock() {
            let line = format_line(record);
            match self.sink.get() {
                // Registered since the check above; the buffer is already replayed
                Some(sink) => sink(line.as_str()),
                // Whole lines only; a full buffer drops the newer message
                None => {
                    let _ = buffer.write_str(line.as_str());
                }
            }
        }
    }

    // Nothing is held back once a sink exists.
    fn flush(&self) {}
}

/// Install the clock logger as the global `log` backend.
pub fn init(level: LevelFilter) -> Result<(), ClockError> {
    log::set_logger(&LOGGER).map_err(|_| ClockError::LoggerAlreadyInstalled)?;
    log::set_max_level(level);
    Ok(())
}

/// Route output to `sink`, replaying anything buffered so far.
pub fn register_sink(sink: LogSink) -> Result<(), ClockError> {
    LOGGER.register(sink)
}
