use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;

/// Shared handle to an append-mode log file, usable as a `tracing_subscriber`
/// writer from any number of concurrent connection tasks.
#[derive(Clone)]
struct SharedFile(Arc<Mutex<File>>);

impl Write for SharedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("log file mutex poisoned").write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.lock().expect("log file mutex poisoned").flush()
    }
}

impl<'a> MakeWriter<'a> for SharedFile {
    type Writer = SharedFile;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Initializes the global `tracing` subscriber: always to stdout, and
/// additionally to `logfile` when one is given.
///
/// `filter` is an `EnvFilter` directive string such as `"info"` or
/// `"debug,workers=trace"`. Invalid directives fall back to `"info"`.
///
/// A global subscriber can only be set once per process; later calls are a
/// no-op rather than a panic, so tests that each exercise [`crate::run`] can
/// call this repeatedly.
///
/// # Errors
///
/// Returns the I/O error from opening `logfile` for appending, if a log
/// file path was supplied and could not be opened.
pub fn init(filter: &str, logfile: Option<&Path>) -> io::Result<()> {
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = tracing_subscriber::fmt::layer().with_target(true);

    match logfile {
        None => {
            let _ = tracing_subscriber::registry().with(env_filter).with(stdout_layer).try_init();
        }
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let file_layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(SharedFile(Arc::new(Mutex::new(file))));
            let _ = tracing_subscriber::registry().with(env_filter).with(stdout_layer).with(file_layer).try_init();
        }
    }

    Ok(())
}
