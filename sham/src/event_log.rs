//! Protocol event log.
//!
//! A write-only diagnostics sink recording one line per protocol event
//! (`SND SYN SEQ=100`, `RETX DATA SEQ=1124 LEN=1024`, ...).  It is separate
//! from developer logging through the `log` facade: the event log is a
//! stable, grep-able trace of what went over the wire.
//!
//! Recording never fails from the caller's point of view.  A write error
//! disables the sink after a single warning.

use std::fmt::Display;
use std::fs::File;
use std::io::{LineWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Environment variable that turns the file sink on when set to `1`.
pub const ENV_VAR: &str = "RUDP_LOG";

#[derive(Debug)]
enum Sink {
    Disabled,
    File(LineWriter<File>),
    Memory(Arc<Mutex<Vec<String>>>),
}

/// Where protocol events go.
#[derive(Debug)]
pub struct EventLog {
    sink: Sink,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::disabled()
    }
}

impl EventLog {
    /// A log that records nothing.
    pub fn disabled() -> Self {
        Self {
            sink: Sink::Disabled,
        }
    }

    /// Truncate `path` and record timestamped events into it.
    pub fn to_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            sink: Sink::File(LineWriter::new(file)),
        })
    }

    /// Record into `path` only when `RUDP_LOG=1`; otherwise stay disabled.
    pub fn from_env(path: impl AsRef<Path>) -> Self {
        if std::env::var(ENV_VAR).as_deref() != Ok("1") {
            return Self::disabled();
        }
        let path = path.as_ref();
        match Self::to_file(path) {
            Ok(log) => log,
            Err(e) => {
                log::warn!("[event-log] cannot open {}: {e}", path.display());
                Self::disabled()
            }
        }
    }

    /// An in-memory log plus a handle for reading back what was recorded.
    pub fn memory() -> (Self, EventRecorder) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let log = Self {
            sink: Sink::Memory(Arc::clone(&events)),
        };
        (log, EventRecorder { events })
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self.sink, Sink::Disabled)
    }

    /// Record one event.
    pub fn record(&mut self, event: impl Display) {
        let failed = match &mut self.sink {
            Sink::Disabled => None,
            Sink::File(out) => {
                let now = chrono::Local::now();
                writeln!(out, "[{}] [LOG] {event}", now.format("%Y-%m-%d %H:%M:%S%.6f")).err()
            }
            Sink::Memory(events) => {
                if let Ok(mut events) = events.lock() {
                    events.push(event.to_string());
                }
                None
            }
        };
        if let Some(e) = failed {
            log::warn!("[event-log] write failed, disabling: {e}");
            self.sink = Sink::Disabled;
        }
    }
}

/// Read handle onto an in-memory [`EventLog`].
#[derive(Debug, Clone)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<String>>>,
}

impl EventRecorder {
    /// Snapshot of every event recorded so far.
    pub fn events(&self) -> Vec<String> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Number of recorded events starting with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }
}
