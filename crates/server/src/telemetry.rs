//! Logging setup.
//!
//! One subscriber is installed at startup:
//!
//! - an [`EnvFilter`] behind a reload layer (level from config; a valid
//!   `RUST_LOG` present at startup wins, then and on every reload);
//! - a human-readable console layer on stderr that can be switched off;
//! - a JSON layer writing to a size-rotated log file.
//!
//! The returned [`LogHandle`] swaps all three at runtime.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::Subscriber;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::fmt::writer::{MakeWriter, OptionalWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

use crate::config::LoggingConfig;

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("Invalid log level '{level}': {source}")]
    InvalidLevel {
        level: String,
        #[source]
        source: ParseError,
    },

    #[error("Cannot open log file {}: {source}", path.display())]
    LogFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to swap log filter: {0}")]
    Reload(#[from] reload::Error),

    #[error("Failed to install log subscriber: {0}")]
    Init(#[from] TryInitError),
}

// ---------------------------------------------------------------------------
// LogHandle
// ---------------------------------------------------------------------------

type SharedFile = Arc<Mutex<Option<RotatingFile>>>;

/// Runtime control over the installed subscriber.
#[derive(Clone)]
pub struct LogHandle {
    filter: reload::Handle<EnvFilter, Registry>,
    /// `RUST_LOG` as seen at startup.
    env_directive: Option<String>,
    console: Arc<AtomicBool>,
    file: SharedFile,
}

impl LogHandle {
    /// Apply a new logging configuration.
    ///
    /// The new filter and file are prepared first; nothing changes unless
    /// both are valid. The level is always validated, but a `RUST_LOG`
    /// directive that overrode it at startup keeps overriding it here.
    pub fn reconfigure(&self, config: &LoggingConfig) -> Result<(), TelemetryError> {
        let filter = select_filter(self.env_directive.as_deref(), &config.level)?;
        let file = open_log_file(config)?;

        self.filter.reload(filter)?;
        self.console.store(config.console, Ordering::Relaxed);
        *lock(&self.file) = file;

        tracing::info!(
            level = %config.level,
            rust_log = ?self.env_directive,
            console = config.console,
            file = ?config.file,
            "Logging reconfigured",
        );
        Ok(())
    }
}

/// Build the subscriber without installing it.
pub fn build(
    config: &LoggingConfig,
) -> Result<(impl Subscriber + Send + Sync, LogHandle), TelemetryError> {
    build_with_env(config, std::env::var(EnvFilter::DEFAULT_ENV).ok())
}

fn build_with_env(
    config: &LoggingConfig,
    env_directive: Option<String>,
) -> Result<(impl Subscriber + Send + Sync, LogHandle), TelemetryError> {
    let filter = select_filter(env_directive.as_deref(), &config.level)?;
    let (filter_layer, filter_handle) = reload::Layer::new(filter);

    let console = Arc::new(AtomicBool::new(config.console));
    let file: SharedFile = Arc::new(Mutex::new(open_log_file(config)?));

    let subscriber = tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer().with_writer(ConsoleWriter {
            enabled: Arc::clone(&console),
        }))
        .with(fmt::layer().json().with_writer(FileWriter {
            target: Arc::clone(&file),
        }));

    let handle = LogHandle {
        filter: filter_handle,
        env_directive,
        console,
        file,
    };
    Ok((subscriber, handle))
}

/// Build and install the process-wide subscriber.
pub fn init(config: &LoggingConfig) -> Result<LogHandle, TelemetryError> {
    let (subscriber, handle) = build(config)?;
    subscriber.try_init()?;
    Ok(handle)
}

// ---- private helpers ----

/// The configured level, unless a valid `RUST_LOG` directive overrides it.
fn select_filter(env_directive: Option<&str>, level: &str) -> Result<EnvFilter, TelemetryError> {
    let configured = parse_filter(level)?;
    Ok(env_directive
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .unwrap_or(configured))
}

fn parse_filter(level: &str) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(level).map_err(|source| TelemetryError::InvalidLevel {
        level: level.to_string(),
        source,
    })
}

fn open_log_file(config: &LoggingConfig) -> Result<Option<RotatingFile>, TelemetryError> {
    let Some(path) = &config.file else {
        return Ok(None);
    };
    RotatingFile::open(path, config.max_file_size, config.backup_count)
        .map(Some)
        .map_err(|source| TelemetryError::LogFile {
            path: path.clone(),
            source,
        })
}

fn lock(file: &SharedFile) -> MutexGuard<'_, Option<RotatingFile>> {
    file.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Writers
// ---------------------------------------------------------------------------

struct ConsoleWriter {
    enabled: Arc<AtomicBool>,
}

impl<'a> MakeWriter<'a> for ConsoleWriter {
    type Writer = OptionalWriter<io::Stderr>;

    fn make_writer(&'a self) -> Self::Writer {
        if self.enabled.load(Ordering::Relaxed) {
            OptionalWriter::some(io::stderr())
        } else {
            OptionalWriter::none()
        }
    }
}

struct FileWriter {
    target: SharedFile,
}

/// Holds the file lock for the duration of one record.
struct FileGuard<'a>(MutexGuard<'a, Option<RotatingFile>>);

impl<'a> MakeWriter<'a> for FileWriter {
    type Writer = FileGuard<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        FileGuard(lock(&self.target))
    }
}

impl Write for FileGuard<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.0.as_mut() {
            Some(file) => file.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.0.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// RotatingFile
// ---------------------------------------------------------------------------

/// An append-only file that rolls over at a size limit.
///
/// On rollover `log.N` moves to `log.N+1` (the oldest beyond `backup_count`
/// is dropped), the active file becomes `log.1`, and a fresh file is
/// started. With `backup_count == 0` the active file is truncated instead.
pub struct RotatingFile {
    path: PathBuf,
    file: File,
    written: u64,
    max_size: u64,
    backup_count: usize,
}

impl RotatingFile {
    pub fn open(path: impl Into<PathBuf>, max_size: u64, backup_count: usize) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = open_append(&path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            path,
            file,
            written,
            max_size,
            backup_count,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;

        if self.backup_count == 0 {
            self.file.set_len(0)?;
            self.written = 0;
            return Ok(());
        }

        for i in (1..self.backup_count).rev() {
            let src = backup_path(&self.path, i);
            if src.exists() {
                let dst = backup_path(&self.path, i + 1);
                if dst.exists() {
                    fs::remove_file(&dst)?;
                }
                fs::rename(&src, &dst)?;
            }
        }

        let first = backup_path(&self.path, 1);
        if first.exists() {
            fs::remove_file(&first)?;
        }
        fs::rename(&self.path, &first)?;

        self.file = open_append(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.max_size {
            self.rotate()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// `<path>.<n>`
fn backup_path(path: &Path, n: usize) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{n}"));
    PathBuf::from(name)
}
