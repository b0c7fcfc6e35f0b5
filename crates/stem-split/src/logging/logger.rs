//! Structured log channel
//!
//! Every `log` record is fanned out to three places:
//!
//! 1. the console (an `env_logger` logger, honouring `RUST_LOG`)
//! 2. the durable log file, with full diagnostic detail
//! 3. the bounded [`DisplayBuffer`] and the outward `append_log` callback,
//!    with diagnostic detail stripped
//!
//! By convention the first line of a record's message is the message and any
//! further lines (an error chain, a backtrace) are diagnostic detail. Display
//! formatting only borrows the record, so the durable sink always sees it
//! whole even if display formatting misbehaves.

use std::fs::{File, OpenOptions};
use std::io::{LineWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use log::{Level, LevelFilter, Log, Metadata, Record};

use super::buffer::{DisplayBuffer, DEFAULT_CAPACITY};
use crate::sink::StatusSink;

/// One log record split into message and diagnostic detail
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub level: Level,
    pub target: String,
    pub message: String,
    pub detail: Option<String>,
}

impl LogEntry {
    /// Build an entry from raw parts, splitting detail off the first line
    pub fn new(level: Level, target: &str, text: &str) -> Self {
        let (message, detail) = match text.split_once('\n') {
            Some((head, rest)) if !rest.trim().is_empty() => {
                (head.trim_end().to_string(), Some(rest.trim_end().to_string()))
            }
            Some((head, _)) => (head.trim_end().to_string(), None),
            None => (text.to_string(), None),
        };
        Self {
            timestamp: Local::now(),
            level,
            target: target.to_string(),
            message,
            detail,
        }
    }

    pub fn from_record(record: &Record) -> Self {
        Self::new(record.level(), record.target(), &record.args().to_string())
    }

    /// Line shown to the user: `HH:MM:SS - LEVEL - message`, never the detail
    pub fn display_line(&self) -> String {
        format!(
            "{} - {} - {}",
            self.timestamp.format("%H:%M:%S"),
            self.level,
            self.message
        )
    }

    /// Full text for the durable sink, detail included
    pub fn durable_text(&self) -> String {
        let mut text = format!(
            "{} - {} - [{}] {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.level,
            self.target,
            self.message
        );
        if let Some(detail) = &self.detail {
            for line in detail.lines() {
                text.push_str("\n    ");
                text.push_str(line);
            }
        }
        text
    }
}

/// Settings for [`LogFunnel`]
#[derive(Debug, Clone)]
pub struct FunnelConfig {
    /// Durable log file (appended to); `None` disables the durable sink
    pub log_file: Option<PathBuf>,
    /// Display buffer capacity
    pub display_capacity: usize,
    /// Most verbose level routed to the file and display sinks
    pub level: LevelFilter,
    /// Target prefixes only shown at `warn` or above
    pub quiet_targets: Vec<String>,
}

impl Default for FunnelConfig {
    fn default() -> Self {
        Self {
            log_file: None,
            display_capacity: DEFAULT_CAPACITY,
            level: LevelFilter::Info,
            quiet_targets: Vec::new(),
        }
    }
}

struct Shared {
    display: DisplayBuffer,
    sink: RwLock<Option<Arc<dyn StatusSink>>>,
    file: Option<Mutex<LineWriter<File>>>,
    log_path: Option<PathBuf>,
    level: LevelFilter,
    quiet_targets: Vec<String>,
}

/// Handle to the structured log channel
///
/// Cheap to clone; all clones share the same buffer and sinks.
#[derive(Clone)]
pub struct LogFunnel {
    shared: Arc<Shared>,
}

impl LogFunnel {
    /// Create the funnel, opening the durable log file if configured
    pub fn new(config: FunnelConfig) -> Result<Self> {
        let file = match &config.log_file {
            Some(path) => Some(Mutex::new(open_log_file(path)?)),
            None => None,
        };

        Ok(Self {
            shared: Arc::new(Shared {
                display: DisplayBuffer::new(config.display_capacity),
                sink: RwLock::new(None),
                file,
                log_path: config.log_file,
                level: config.level,
                quiet_targets: config.quiet_targets,
            }),
        })
    }

    /// Install as the process-wide `log` logger
    ///
    /// Console output follows `RUST_LOG` (default `info`) with millisecond
    /// timestamps.
    pub fn install(&self) -> Result<()> {
        let console = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .format_timestamp_millis()
            .build();
        let max_level = console.filter().max(self.shared.level);

        log::set_boxed_logger(Box::new(FunnelLogger {
            console,
            funnel: self.clone(),
        }))
        .context("Failed to install logger")?;
        log::set_max_level(max_level);
        Ok(())
    }

    /// Attach (or replace) the outward `append_log` receiver
    pub fn set_sink(&self, sink: Arc<dyn StatusSink>) {
        match self.shared.sink.write() {
            Ok(mut slot) => *slot = Some(sink),
            Err(poisoned) => *poisoned.into_inner() = Some(sink),
        }
    }

    /// Bounded buffer of display lines
    pub fn display(&self) -> &DisplayBuffer {
        &self.shared.display
    }

    /// Path of the durable log file, if one is configured
    pub fn log_path(&self) -> Option<&Path> {
        self.shared.log_path.as_deref()
    }

    /// Whether a record at this level/target reaches the file and display sinks
    pub fn accepts(&self, metadata: &Metadata) -> bool {
        if metadata.level() > self.shared.level {
            return false;
        }
        let quiet = self
            .shared
            .quiet_targets
            .iter()
            .any(|t| metadata.target().starts_with(t.as_str()));
        !quiet || metadata.level() <= Level::Warn
    }

    /// Route one record to the durable and display sinks
    pub fn dispatch(&self, record: &Record) {
        if !self.accepts(record.metadata()) {
            return;
        }
        let entry = LogEntry::from_record(record);

        if let Some(file) = &self.shared.file {
            let mut writer = file.lock().unwrap_or_else(|e| e.into_inner());
            // Nowhere left to report a failing log file
            let _ = writeln!(writer, "{}", entry.durable_text());
        }

        let line = entry.display_line();
        self.shared.display.push(line.clone());

        let sink = match self.shared.sink.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        if let Some(sink) = sink {
            sink.append_log(&line);
        }
    }

    /// Flush the durable sink
    pub fn flush(&self) {
        if let Some(file) = &self.shared.file {
            let _ = file.lock().unwrap_or_else(|e| e.into_inner()).flush();
        }
    }
}

fn open_log_file(path: &Path) -> Result<LineWriter<File>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory: {:?}", parent))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file: {:?}", path))?;
    Ok(LineWriter::new(file))
}

/// `log::Log` implementation behind [`LogFunnel::install`]
struct FunnelLogger {
    console: env_logger::Logger,
    funnel: LogFunnel,
}

impl Log for FunnelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.console.enabled(metadata) || self.funnel.accepts(metadata)
    }

    fn log(&self, record: &Record) {
        if self.console.matches(record) {
            // Console is user-facing too: headline only
            let text = record.args().to_string();
            match text.split_once('\n') {
                Some((head, _)) => self.console.log(
                    &Record::builder()
                        .metadata(record.metadata().clone())
                        .module_path(record.module_path())
                        .file(record.file())
                        .line(record.line())
                        .args(format_args!("{}", head.trim_end()))
                        .build(),
                ),
                None => self.console.log(record),
            }
        }
        self.funnel.dispatch(record);
    }

    fn flush(&self) {
        self.console.flush();
        self.funnel.flush();
    }
}
