//! # Logger Factory
//!
//! Builds named loggers that write every record both to a log file and to
//! stderr, using the line format `<timestamp> - <LEVEL> - <message>`.
//!
//! Each `Logger` owns its own `tracing` dispatcher, so several loggers with
//! different files and levels can coexist with whatever global subscriber
//! the application installed. Loggers are created once per name: asking for
//! a known name returns the existing handle and attaches no new writers.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use tracing::{Dispatch, Event, Level, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{reload, Registry};

/// Destination for the retry messages of the completion invoker.
pub trait LogSink: Send + Sync {
    fn info(&self, message: &str);
    fn warning(&self, message: &str);
}

/// Options for [`get_logger`].
#[derive(Debug, Clone)]
pub struct LoggerOptions {
    /// Directory of the log file. Defaults to `logs/` beside the caller's source file.
    pub log_dir: Option<PathBuf>,
    pub level: Level,
    /// Append the current date (`YYYY-MM-DD`) to the log file name.
    pub with_date: bool,
}

impl Default for LoggerOptions {
    fn default() -> Self {
        Self {
            log_dir: None,
            level: Level::INFO,
            with_date: false,
        }
    }
}

/// Handle to a named logger. Cheap to clone.
#[derive(Clone)]
pub struct Logger {
    name: Arc<str>,
    log_file: Arc<Path>,
    dispatch: Dispatch,
    level: reload::Handle<LevelFilter, Registry>,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.name)
            .field("log_file", &self.log_file)
            .finish()
    }
}

impl Logger {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    /// Changes the minimum level of records written by this logger.
    pub fn set_level(&self, level: Level) -> Result<()> {
        self.level
            .modify(|filter| *filter = LevelFilter::from_level(level))
            .with_context(|| format!("Failed to set the level of logger '{}'", self.name))
    }

    pub fn debug(&self, message: &str) {
        tracing::dispatcher::with_default(&self.dispatch, || tracing::debug!("{}", message));
    }

    pub fn info(&self, message: &str) {
        tracing::dispatcher::with_default(&self.dispatch, || tracing::info!("{}", message));
    }

    pub fn warning(&self, message: &str) {
        tracing::dispatcher::with_default(&self.dispatch, || tracing::warn!("{}", message));
    }

    pub fn error(&self, message: &str) {
        tracing::dispatcher::with_default(&self.dispatch, || tracing::error!("{}", message));
    }
}

impl LogSink for Logger {
    fn info(&self, message: &str) {
        Logger::info(self, message);
    }

    fn warning(&self, message: &str) {
        Logger::warning(self, message);
    }
}

/// `<timestamp> - <LEVEL> - <message>` lines.
struct LineFormat;

fn level_name(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "ERROR",
        Level::WARN => "WARNING",
        Level::INFO => "INFO",
        Level::DEBUG => "DEBUG",
        Level::TRACE => "TRACE",
    }
}

impl<S, N> FormatEvent<S, N> for LineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S,%3f");
        write!(writer, "{} - {} - ", now, level_name(event.metadata().level()))?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

static LOGGERS: LazyLock<Mutex<HashMap<String, Logger>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

fn build_logger(name: &str, log_file: PathBuf, level: Level) -> Result<Logger> {
    if let Some(parent) = log_file.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file)
        .with_context(|| format!("Failed to open log file: {}", log_file.display()))?;

    let (level_filter, level_handle) = reload::Layer::new(LevelFilter::from_level(level));
    let subscriber = tracing_subscriber::registry()
        .with(level_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .event_format(LineFormat)
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .event_format(LineFormat)
                .with_writer(std::io::stderr),
        );

    Ok(Logger {
        name: Arc::from(name),
        log_file: Arc::from(log_file.as_path()),
        dispatch: Dispatch::new(subscriber),
        level: level_handle,
    })
}

/// Returns the logger registered under `name`, creating it with `make_file`
/// if this is the first request for that name. An existing logger keeps its
/// file and writers but takes the new `level`.
fn get_or_create(
    name: &str,
    level: Level,
    make_file: impl FnOnce() -> PathBuf,
) -> Result<Logger> {
    let mut loggers = LOGGERS.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(existing) = loggers.get(name) {
        existing.set_level(level)?;
        return Ok(existing.clone());
    }
    let logger = build_logger(name, make_file(), level)?;
    loggers.insert(name.to_string(), logger.clone());
    Ok(logger)
}

fn caller_dir(location: &Location<'_>) -> PathBuf {
    let file = Path::new(location.file());
    let file = if file.is_absolute() {
        file.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(file))
            .unwrap_or_else(|_| file.to_path_buf())
    };
    file.parent().map(Path::to_path_buf).unwrap_or_default()
}

/// Creates (or returns the existing) logger called `name`.
///
/// The log file is `<log_dir>/<name>.log`, or `<name>_<YYYY-MM-DD>.log` with
/// `with_date`. The directory is created if missing; an existing file is
/// appended to. Asking again for a known name returns the same logger with
/// its level set to `options.level`; the other options are ignored.
///
/// The default `log_dir` comes from the caller's source path as recorded at
/// compile time. That path is usually relative to the workspace root and is
/// resolved against the current directory, so run from the workspace root or
/// pass an explicit `log_dir`.
///
/// # Arguments
/// * `name`: Logger name, also used as the file name.
/// * `options`: Log directory, level and date suffix.
#[track_caller]
pub fn get_logger(name: &str, options: LoggerOptions) -> Result<Logger> {
    let location = Location::caller();
    get_or_create(name, options.level, || {
        let log_dir = options
            .log_dir
            .unwrap_or_else(|| caller_dir(location).join("logs"));
        let file_name = if options.with_date {
            format!("{}_{}.log", name, chrono::Local::now().format("%Y-%m-%d"))
        } else {
            format!("{}.log", name)
        };
        log_dir.join(file_name)
    })
}

/// Step name for a script file: the file stem up to the first `_`
/// (`step03_extract.rs` gives `step03`), plus `_<suffix>` when given.
pub fn step_name(caller_file: &Path, name_suffix: &str) -> String {
    let stem = caller_file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut name = stem.split('_').next().unwrap_or_default().to_string();
    if !name_suffix.is_empty() {
        name.push('_');
        name.push_str(name_suffix);
    }
    name
}

/// Initializes the logger of the calling step script.
///
/// The logger is named after the caller's source file (see [`step_name`])
/// and writes to `logs/` beside that file, with a `%Y-%m-%d-%H-%M-%S`
/// timestamp in the file name when `with_date` is set.
///
/// As with [`get_logger`], the caller's path is compile-time and resolved
/// against the current directory.
#[track_caller]
pub fn init_step_logger(name_suffix: &str, with_date: bool, level: Level) -> Result<Logger> {
    let location = Location::caller();
    let name = step_name(Path::new(location.file()), name_suffix);
    get_or_create(&name, level, || {
        let file_name = if with_date {
            format!(
                "{}_{}.log",
                name,
                chrono::Local::now().format("%Y-%m-%d-%H-%M-%S")
            )
        } else {
            format!("{}.log", name)
        };
        caller_dir(location).join("logs").join(file_name)
    })
}
