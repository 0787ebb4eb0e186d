//! Logging setup
//!
//! tracing with an `EnvFilter`. When a log file is configured, output
//! goes through a reopenable sink so SIGHUP can reopen the file after
//! rotation without dropping connections; otherwise logs go to stderr.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogConfig;

struct Sink {
    file: Option<File>,
    path: Option<PathBuf>,
    mode: u32,
}

static SINK: Lazy<Mutex<Sink>> = Lazy::new(|| {
    Mutex::new(Sink {
        file: None,
        path: None,
        mode: 0o644,
    })
});

/// Writer handed to the fmt layer; every write goes through the shared
/// sink so a reopen takes effect immediately
pub struct SinkWriter;

impl Write for SinkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match SINK.lock() {
            Ok(mut sink) => match sink.file.as_mut() {
                Some(file) => file.write(buf),
                None => io::stderr().write(buf),
            },
            Err(_) => io::stderr().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match SINK.lock() {
            Ok(mut sink) => match sink.file.as_mut() {
                Some(file) => file.flush(),
                None => io::stderr().flush(),
            },
            Err(_) => io::stderr().flush(),
        }
    }
}

fn open_log_file(path: &PathBuf, mode: u32) -> io::Result<File> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(mode))?;
    }

    Ok(file)
}

/// Initialize the global subscriber. Must be called once, before any
/// request handling starts.
pub fn init(config: &LogConfig, no_color: bool) -> Result<()> {
    let path = config.path();
    let mode = config.mode();

    if let Some(path) = &path {
        let file = open_log_file(path, mode)
            .with_context(|| format!("Can't open log file {}", path.display()))?;

        if let Ok(mut sink) = SINK.lock() {
            sink.file = Some(file);
            sink.path = Some(path.clone());
            sink.mode = mode;
        }
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("pkgre_morpher={0},morpher_refs={0}", config.level)));

    let ansi = !no_color && path.is_none();

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_ansi(ansi)
                .with_target(false)
                .with_writer(|| SinkWriter),
        )
        .init();

    Ok(())
}

/// Reopen the log file (SIGHUP). A no-op when logging to stderr.
pub fn reopen() -> io::Result<()> {
    let mut sink = match SINK.lock() {
        Ok(sink) => sink,
        Err(_) => return Ok(()),
    };

    if let Some(path) = sink.path.clone() {
        let file = open_log_file(&path, sink.mode)?;
        sink.file = Some(file);
    }

    Ok(())
}
