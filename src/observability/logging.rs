//! Structured logging.
//!
//! # Responsibilities
//! - Install the process-wide sink set: console (stderr) and a rotating file
//! - Keep the two sinks on independent thresholds
//! - Attach a stack trace to every error written to the file sink
//!
//! # Design Decisions
//! - The file sink is fixed at DEBUG whatever the console level is
//! - Writes to the file are synchronous so nothing is lost on exit
//! - Re-initialization only re-targets the console filter; sinks are never
//!   registered twice
//! - Network runtime targets keep their own level in both sinks
//! - A malformed `RUST_LOG` is reported and ignored, never fatal

use std::backtrace::Backtrace;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::{Duration, SystemTime};

use chrono::NaiveDate;
use file_rotate::compression::Compression;
use file_rotate::suffix::{AppendTimestamp, FileLimit};
use file_rotate::{ContentLimit, FileRotate};
use thiserror::Error;
use tracing::{Event, Subscriber};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, Layer, Registry};

use crate::net::runtime::{RUNTIME_LOG_LEVEL, RUNTIME_LOG_TARGETS};

/// Directory for durable logs, relative to the process root.
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Active log file is rotated once it grows past this size.
pub const ROTATE_AFTER_BYTES: usize = 10 * 1024 * 1024;

/// Log files older than this are purged.
pub const RETENTION_DAYS: u64 = 30;

const LOG_FILE_PREFIX: &str = "debug_";
const CONSOLE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const FILE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Error raised while installing the sinks.
#[derive(Debug, Error)]
pub enum LoggingInitError {
    #[error("failed to create log directory {}: {source}", path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to open log file {}: {source}", path.display())]
    OpenFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid log filter: {0}")]
    Filter(String),

    #[error("failed to install global subscriber: {0}")]
    Install(#[from] tracing_subscriber::util::TryInitError),

    #[error("failed to update console filter: {0}")]
    Reload(#[from] reload::Error),
}

/// Settings for [`init_logging`].
#[derive(Debug, Clone)]
pub struct LogSettings {
    /// Threshold of the console sink.
    pub console_level: LevelFilter,
    /// Directory receiving the dated log files.
    pub log_dir: PathBuf,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            console_level: LevelFilter::INFO,
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
        }
    }
}

/// The installed sink set.
///
/// Lives for the rest of the process once installed; obtained only through
/// [`init_logging`].
pub struct LogSinkSet {
    console: reload::Handle<EnvFilter, Registry>,
    log_file: PathBuf,
}

impl LogSinkSet {
    /// Path of the active log file.
    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    /// Swap the console threshold. The file sink is unaffected.
    pub fn set_console_level(&self, level: LevelFilter) -> Result<(), LoggingInitError> {
        self.console.reload(console_filter(level)?)?;
        Ok(())
    }
}

static SINKS: OnceLock<LogSinkSet> = OnceLock::new();
static INIT_LOCK: Mutex<()> = Mutex::new(());

/// Initialize process-wide logging.
///
/// The first call creates the log directory, opens the dated log file and
/// installs the subscriber. Later calls only apply `console_level`; the file
/// destination chosen by the first call stays in effect.
pub fn init_logging(settings: &LogSettings) -> Result<&'static LogSinkSet, LoggingInitError> {
    let _guard = INIT_LOCK.lock().unwrap_or_else(PoisonError::into_inner);

    if let Some(sinks) = SINKS.get() {
        sinks.set_console_level(settings.console_level)?;
        tracing::debug!(
            console_level = %settings.console_level,
            "Logging already initialized, console level updated"
        );
        return Ok(sinks);
    }

    let sinks = install(settings)?;
    Ok(SINKS.get_or_init(|| sinks))
}

fn install(settings: &LogSettings) -> Result<LogSinkSet, LoggingInitError> {
    fs::create_dir_all(&settings.log_dir).map_err(|source| LoggingInitError::Directory {
        path: settings.log_dir.clone(),
        source,
    })?;

    let today = chrono::Local::now().date_naive();
    let purged = purge_expired(&settings.log_dir, SystemTime::now());
    let log_file = settings.log_dir.join(log_file_name(today));

    // FileRotate opens lazily and swallows errors; probe the path first.
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file)
        .map_err(|source| LoggingInitError::OpenFile {
            path: log_file.clone(),
            source,
        })?;
    let file = FileSink::open(&log_file);

    let (console_reload, console_handle) = reload::Layer::new(console_filter(settings.console_level)?);

    build_subscriber(io::stderr, console_reload, file)?.try_init()?;

    tracing::debug!(
        log_file = %log_file.display(),
        console_level = %settings.console_level,
        purged,
        "Logging initialized"
    );

    Ok(LogSinkSet {
        console: console_handle,
        log_file,
    })
}

/// Assemble the sink set over arbitrary writers.
///
/// The console layer honours `console_filter`; the file layer is fixed at
/// DEBUG and every ERROR is followed by a stack trace on `file_writer`.
fn build_subscriber<C, F>(
    console_writer: C,
    console_filter: reload::Layer<EnvFilter, Registry>,
    file_writer: F,
) -> Result<impl Subscriber + Send + Sync + 'static, LoggingInitError>
where
    C: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    F: for<'w> MakeWriter<'w> + Clone + Send + Sync + 'static,
{
    let console_layer = fmt::layer()
        .with_writer(console_writer)
        .with_ansi(true)
        .with_timer(LocalTime(CONSOLE_TIME_FORMAT))
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(console_filter);

    let file_layer = fmt::layer()
        .with_writer(file_writer.clone())
        .with_ansi(false)
        .with_timer(LocalTime(FILE_TIME_FORMAT))
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_filter(file_filter()?);

    let trace_layer = ErrorTraceLayer {
        writer: file_writer,
    }
    .with_filter(LevelFilter::ERROR);

    Ok(tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .with(trace_layer))
}

/// File name for the log of a given day.
pub fn log_file_name(date: NaiveDate) -> String {
    format!("{LOG_FILE_PREFIX}{}.log", date.format("%Y-%m-%d"))
}

/// Remove log files in `dir` last modified more than [`RETENTION_DAYS`]
/// before `now`. Returns how many were removed.
///
/// Rotation only prunes siblings of the current file; this sweeps the
/// files left behind by earlier days.
pub fn purge_expired(dir: &Path, now: SystemTime) -> usize {
    let retention = Duration::from_secs(RETENTION_DAYS * 24 * 60 * 60);
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let is_log = name
            .to_str()
            .is_some_and(|n| n.starts_with(LOG_FILE_PREFIX) && n.contains(".log"));
        if !is_log {
            continue;
        }

        let expired = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .is_some_and(|age| age > retention);

        if expired && fs::remove_file(entry.path()).is_ok() {
            removed += 1;
        }
    }
    removed
}

fn console_filter(level: LevelFilter) -> Result<EnvFilter, LoggingInitError> {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    console_filter_from(env.as_deref(), level)
}

/// Console filter from `RUST_LOG` (if set and valid) or `level`.
///
/// A malformed `RUST_LOG` is reported on stderr and ignored.
fn console_filter_from(env: Option<&str>, level: LevelFilter) -> Result<EnvFilter, LoggingInitError> {
    let fallback = level.to_string().to_lowercase();
    match env.map(str::trim).filter(|v| !v.is_empty()) {
        Some(directives) => with_runtime_directives(directives).or_else(|e| {
            eprintln!(
                "warning: ignoring {}={directives:?} ({e}), using {fallback}",
                EnvFilter::DEFAULT_ENV
            );
            with_runtime_directives(&fallback)
        }),
        None => with_runtime_directives(&fallback),
    }
}

fn file_filter() -> Result<EnvFilter, LoggingInitError> {
    with_runtime_directives("debug")
}

fn with_runtime_directives(base: &str) -> Result<EnvFilter, LoggingInitError> {
    let runtime_level = RUNTIME_LOG_LEVEL.as_str().to_lowercase();
    let directives = RUNTIME_LOG_TARGETS
        .iter()
        .map(|target| format!("{target}={runtime_level}"))
        .fold(base.to_string(), |acc, d| format!("{acc},{d}"));
    EnvFilter::try_new(&directives).map_err(|e| LoggingInitError::Filter(e.to_string()))
}

/// Local-time timestamps in a fixed `chrono` format.
struct LocalTime(&'static str);

impl FormatTime for LocalTime {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format(self.0))
    }
}

/// Shared handle to the rotating log file.
#[derive(Clone)]
struct FileSink(Arc<Mutex<FileRotate<AppendTimestamp>>>);

impl FileSink {
    fn open(path: &Path) -> Self {
        let retention = chrono::Duration::days(RETENTION_DAYS as i64);
        let rotate = FileRotate::new(
            path,
            AppendTimestamp::default(FileLimit::Age(retention)),
            ContentLimit::BytesSurpassed(ROTATE_AFTER_BYTES),
            Compression::None,
            #[cfg(unix)]
            None,
        );
        Self(Arc::new(Mutex::new(rotate)))
    }
}

struct FileSinkWriter<'a>(MutexGuard<'a, FileRotate<AppendTimestamp>>);

impl Write for FileSinkWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl<'a> MakeWriter<'a> for FileSink {
    type Writer = FileSinkWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        FileSinkWriter(self.0.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Appends a captured stack trace after each event it sees; filtered to
/// ERROR when installed.
struct ErrorTraceLayer<W> {
    writer: W,
}

impl<S, W> Layer<S> for ErrorTraceLayer<W>
where
    S: Subscriber,
    W: for<'w> MakeWriter<'w> + 'static,
{
    fn on_event(&self, _event: &Event<'_>, _ctx: Context<'_, S>) {
        let trace = Backtrace::force_capture();
        let mut writer = self.writer.make_writer();
        let _ = writeln!(writer, "stack backtrace:\n{trace}");
    }
}
