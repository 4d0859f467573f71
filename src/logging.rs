use chrono::{DateTime, Utc};
use log::{Level, LevelFilter, Log, Metadata, Record};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Write};
use std::os::fd::FromRawFd;

use crate::config::{BridgeConfig, TraceOutput};
use crate::errors::{MirrorError, Result};

/// Log target for mirror-table events.
pub const TARGET_MIRROR: &str = "rffi_bridge::mirror";
/// Log target for global reference cache events.
pub const TARGET_REFS: &str = "rffi_bridge::refs";
/// Log target for call frame events.
pub const TARGET_CALLS: &str = "rffi_bridge::calls";

/// Structured log entry with context
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub component: String,
    pub message: String,
    pub error_code: Option<String>,
    pub context: HashMap<String, serde_json::Value>,
    pub thread_id: String,
    pub process_id: u32,
}

impl LogEntry {
    pub fn new(level: &str, component: &str, message: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            level: level.to_string(),
            component: component.to_string(),
            message: message.to_string(),
            error_code: None,
            context: HashMap::new(),
            thread_id: format!("{:?}", std::thread::current().id()),
            process_id: std::process::id(),
        }
    }

    pub fn with_error_code(mut self, error_code: &str) -> Self {
        self.error_code = Some(error_code.to_string());
        self
    }

    pub fn with_context(mut self, key: &str, value: serde_json::Value) -> Self {
        self.context.insert(key.to_string(), value);
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!("{{\"level\":\"{}\",\"message\":\"unserializable log entry\"}}", self.level)
        })
    }
}

/// Destination of formatted log lines.
pub enum TraceSink {
    Stdout,
    Stderr,
    File(File),
}

impl TraceSink {
    /// Open the sink for `output`. Descriptors are duplicated so the caller
    /// keeps ownership of the original.
    pub fn open(output: TraceOutput) -> Result<Self> {
        match output {
            TraceOutput::None => Ok(TraceSink::Stderr),
            TraceOutput::Console => Ok(TraceSink::Stdout),
            TraceOutput::Descriptor(fd) => {
                let dup = unsafe { libc::dup(fd) };
                if dup < 0 {
                    return Err(MirrorError::Io(io::Error::last_os_error()));
                }
                // SAFETY: `dup` returned a fresh descriptor that nothing else owns.
                Ok(TraceSink::File(unsafe { File::from_raw_fd(dup) }))
            }
        }
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        match self {
            TraceSink::Stdout => writeln!(io::stdout().lock(), "{}", line),
            TraceSink::Stderr => writeln!(io::stderr().lock(), "{}", line),
            // unbuffered: every record is written through immediately
            TraceSink::File(file) => writeln!(file, "{}", line),
        }
    }
}

/// Structured logger implementation
pub struct StructuredLogger {
    component: String,
    min_level: Level,
    sink: Mutex<TraceSink>,
}

impl StructuredLogger {
    pub fn new(component: &str, min_level: Level, sink: TraceSink) -> Self {
        Self {
            component: component.to_string(),
            min_level,
            sink: Mutex::new(sink),
        }
    }

    /// Build the logger selected by the bridge configuration.
    pub fn for_config(config: &BridgeConfig) -> Result<Self> {
        let level = if config.trace_output.is_enabled() {
            Level::Trace
        } else {
            Level::Warn
        };
        Ok(Self::new(
            "rffi_bridge",
            level,
            TraceSink::open(config.trace_output)?,
        ))
    }

    pub fn min_level(&self) -> Level {
        self.min_level
    }

    pub fn format(&self, record: &Record) -> LogEntry {
        let mut entry = LogEntry::new(
            &record.level().to_string(),
            &self.component,
            &record.args().to_string(),
        )
        .with_context("target", serde_json::Value::String(record.target().to_string()));

        if let Some(file) = record.file() {
            entry = entry.with_context("file", serde_json::Value::String(file.to_string()));
        }
        if let Some(line) = record.line() {
            entry = entry.with_context("line", serde_json::Value::Number(line.into()));
        }
        entry
    }
}

impl Log for StructuredLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.min_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = self.format(record).to_json();
        // a broken trace sink must never take the bridge down
        let _ = self.sink.lock().write_line(&line);
    }

    fn flush(&self) {
        if let TraceSink::File(file) = &mut *self.sink.lock() {
            let _ = file.flush();
        }
    }
}

static LOGGER_LEVEL: OnceCell<LevelFilter> = OnceCell::new();

/// Install the structured logger once per process.
///
/// Later calls are no-ops and report the level that is already active. When
/// another logger owns the `log` facade, bridge records go to it instead.
pub fn init_logging(config: &BridgeConfig) -> Result<LevelFilter> {
    LOGGER_LEVEL
        .get_or_try_init(|| {
            let logger = StructuredLogger::for_config(config)?;
            let filter = logger.min_level().to_level_filter();
            if log::set_boxed_logger(Box::new(logger)).is_ok() {
                log::set_max_level(filter);
            }
            Ok(filter)
        })
        .copied()
}
