#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `cli` is the daemon's entry point: it parses arguments, overlays a
//! config file under them, sets up logging, wires [`objectstore`],
//! [`pathmap`], [`pool`], [`workers`], and [`server`] together, and runs the
//! listener until interrupted.
//!
//! # Design
//!
//! Argument parsing, config-file reading, and log handler setup are kept
//! here rather than inside any service crate, so every other crate in the
//! workspace stays free of process-level concerns and is independently
//! testable without touching a filesystem or a terminal. A config file
//! supplies defaults a CLI flag can override; one small `resolve` helper
//! encodes that priority rule everywhere it's needed.
//!
//! # Invariants
//!
//! - A value the user passed on the command line always wins over the same
//!   value from a config file, which always wins over a hardcoded default.
//! - The pooled connection count is clamped to at least 1 and at most
//!   [`pool::MAX_POOL_SIZE`]; the stripe read size is clamped to at least
//!   one MiB.
//! - Receiving `SIGINT` is a normal shutdown path, not an error.
//! - The `actions` allow-list, when given, must name only workers the
//!   registry knows about; an unrecognized name is a startup error, not a
//!   silently-ignored one.
//!
//! # Errors
//!
//! [`run`] returns [`CliError`] for any setup failure (unreadable secrets
//! file, malformed config or path-mapping XML, an unsupported checksum
//! algorithm, or a failure to bind the listening socket). Once the server
//! is serving connections, only a fatal listener error or `SIGINT` ends the
//! process.
//!
//! # Examples
//!
//! ```no_run
//! # async fn run() -> Result<(), cli::CliError> {
//! use clap::Parser;
//! let args = cli::Cli::parse_from(["cksumd", "--host", "127.0.0.1", "--secrets", "/etc/cksumd/secret"]);
//! cli::run(args).await
//! # }
//! ```

mod config;
mod logging;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use config::FileConfig;
use objectstore::{MemoryObjectStore, ObjectStoreClient};
use pathmap::PathMapper;
use pool::ConnectionPool;
use server::{RequestServer, ServerConfig};
use workers::{WorkerContext, WorkerRegistry};

/// Default listen port, matching the original service's default.
const DEFAULT_PORT: u16 = 6000;
/// Default stripe read size, in MiB.
const DEFAULT_READSIZE_MIB: u32 = 4;
/// Default per-request deadline, measured from dispatch.
const DEFAULT_TIMEOUT_SECS: u64 = 3600;
/// Default pooled connection count.
const DEFAULT_MAXPOOLSIZE: usize = pool::MAX_POOL_SIZE;

/// Command-line flags for the checksum daemon.
///
/// Every flag here is optional except none are strictly required on the
/// command line itself: the shared secret may instead come from a config
/// file's `[app] secrets_file`, so its absence is only an error once both
/// sources have been checked.
#[derive(Debug, Parser)]
#[command(name = "cksumd", about = "Striped object-store checksum daemon", version)]
pub struct Cli {
    /// Enable debug-level logging, overriding both the config file and
    /// `RUST_LOG`.
    #[arg(short, long)]
    pub debug: bool,

    /// Mirror log output to this file in addition to stdout.
    #[arg(short, long, value_name = "PATH")]
    pub log: Option<PathBuf>,

    /// TOML config file providing defaults for any flag not given here.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Address to listen on.
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on.
    #[arg(long)]
    pub port: Option<u16>,

    /// File containing the shared HMAC authentication secret.
    #[arg(short, long, value_name = "PATH")]
    pub secrets: Option<PathBuf>,

    /// Stripe read size in MiB. Should be a power of two near, but not
    /// larger than, the object store's stripe size.
    #[arg(short, long, value_name = "MIB")]
    pub readsize: Option<u32>,

    /// Checksum algorithm to use; only `adler32` is implemented.
    #[arg(long = "default-checksum", value_name = "ALGORITHM")]
    pub default_checksum: Option<String>,

    /// `lfn-to-pfn` XML mapping file. Without one, logical names are split
    /// into pool and object with the built-in heuristic.
    #[arg(short = 'x', long = "lfn2pfnxml", value_name = "PATH")]
    pub lfn2pfn_xmlfile: Option<PathBuf>,

    /// Maximum number of pooled backend connections, clamped to
    /// [`pool::MAX_POOL_SIZE`].
    #[arg(short = 'm', long, value_name = "N")]
    pub maxpoolsize: Option<usize>,

    /// Per-request deadline in seconds, measured from dispatch.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Comma-separated subset of `ping,wait,stat,cksum` to serve. Defaults
    /// to all four.
    #[arg(long, value_name = "LIST")]
    pub actions: Option<String>,
}

/// Failures encountered while resolving configuration or starting the
/// service. Never raised once the server is accepting connections.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// A file (config, secrets, or path-mapping XML) could not be read.
    #[error("failed to read {path}: {source}")]
    ReadFile {
        /// Path that failed to open or read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The config file's TOML was malformed.
    #[error("invalid config file: {0}")]
    InvalidConfig(String),
    /// The secrets file existed but had no usable key.
    #[error("secrets file {0} contained no usable key")]
    EmptySecret(PathBuf),
    /// Neither a flag nor a config file supplied a secrets file.
    #[error("no secrets file given (use --secrets or [app] secrets_file)")]
    MissingSecrets,
    /// The path-mapping XML could not be parsed.
    #[error("invalid lfn2pfn mapping file: {0}")]
    InvalidPathMap(#[from] pathmap::PathMapError),
    /// A checksum algorithm other than the one implemented was requested.
    #[error("unsupported checksum algorithm {0:?}; only \"adler32\" is implemented")]
    UnsupportedAlgorithm(String),
    /// The connection pool could not be built.
    #[error("failed to build connection pool: {0}")]
    Pool(String),
    /// The `actions` allow-list named an unregistered worker.
    #[error("invalid actions list: {0}")]
    InvalidActions(#[from] workers::DispatchError),
    /// The listening socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that failed to bind.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Logging could not be initialized (only its log-file sink can fail).
    #[error("failed to open log file: {0}")]
    Logging(#[from] std::io::Error),
}

fn read_to_string(path: &std::path::Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|source| CliError::ReadFile { path: path.to_path_buf(), source })
}

/// Parses CLI flags, overlays a config file, sets up logging, builds the
/// object-store pool and path mapper, and serves connections until the
/// listener fails or the process receives `SIGINT`.
///
/// # Errors
///
/// See [`CliError`] for every way setup can fail before the server starts
/// accepting connections.
pub async fn run(cli: Cli) -> Result<(), CliError> {
    let file_config = match &cli.config {
        Some(path) => FileConfig::parse(&read_to_string(path)?).map_err(CliError::InvalidConfig)?,
        None => FileConfig::default(),
    };

    let log_level = if cli.debug { "debug".to_string() } else { file_config.logging.level.clone().unwrap_or_else(|| "info".to_string()) };
    let logfile = cli.log.clone().or_else(|| file_config.logging.logfile.clone());
    logging::init(&log_level, logfile.as_deref())?;

    let host = config::resolve(cli.host.clone(), file_config.app.host.clone(), "localhost".to_string());
    let port = config::resolve(cli.port, file_config.app.port, DEFAULT_PORT);

    let secrets_path = cli.secrets.clone().or_else(|| file_config.app.secrets_file.clone()).ok_or(CliError::MissingSecrets)?;
    let secret = protocol::auth::load_secret(&read_to_string(&secrets_path)?).ok_or_else(|| CliError::EmptySecret(secrets_path.clone()))?;

    let readsize_mib = config::resolve(cli.readsize, file_config.cksum.readsize_mib, DEFAULT_READSIZE_MIB).max(1);
    let read_block_size = readsize_mib as usize * 1024 * 1024;

    let algorithm = config::resolve(cli.default_checksum.clone(), file_config.cksum.default_checksum.clone(), actions::ALGORITHM.to_string());
    if algorithm.to_ascii_lowercase() != actions::ALGORITHM {
        return Err(CliError::UnsupportedAlgorithm(algorithm));
    }

    let path_mapper = match cli.lfn2pfn_xmlfile.clone().or_else(|| file_config.cksum.lfn2pfn_xmlfile.clone()) {
        Some(path) => PathMapper::from_xml_str(&read_to_string(&path)?)?,
        None => PathMapper::identity(),
    };

    let maxpoolsize = config::resolve(cli.maxpoolsize, file_config.cksum.maxpoolsize, DEFAULT_MAXPOOLSIZE).max(1);
    let pool = ConnectionPool::build(maxpoolsize, |_index| {
        Ok::<Box<dyn ObjectStoreClient>, std::convert::Infallible>(Box::new(MemoryObjectStore::new()))
    })
    .map_err(|err| CliError::Pool(err.to_string()))?;

    let timeout_secs = config::resolve(cli.timeout, file_config.cksum.request_timeout_secs, DEFAULT_TIMEOUT_SECS);

    let actions = config::resolve(cli.actions.clone(), file_config.cksum.actions.clone(), "ping,wait,stat,cksum".to_string());
    let action_names: Vec<&str> = actions.split(',').map(str::trim).filter(|name| !name.is_empty()).collect();

    let context = WorkerContext::new(pool, path_mapper, read_block_size);
    let mut registry = WorkerRegistry::new();
    registry.register_only(&action_names)?;
    let server_config = ServerConfig::new(secret, Duration::from_secs(timeout_secs));

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|source| CliError::Bind { addr: addr.clone(), source })?;

    tracing::info!(%addr, readsize_mib, maxpoolsize, timeout_secs, "starting cksumd");

    let server = Arc::new(RequestServer::new(registry, context, server_config));

    tokio::select! {
        result = server.serve(listener) => {
            result.map_err(|source| CliError::Bind { addr, source })
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received SIGINT, shutting down");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_flags() {
        let cli = Cli::parse_from(["cksumd", "--secrets", "/tmp/secret"]);
        assert_eq!(cli.secrets, Some(PathBuf::from("/tmp/secret")));
        assert_eq!(cli.host, None);
        assert!(!cli.debug);
    }

    #[test]
    fn parses_every_long_flag() {
        let cli = Cli::parse_from([
            "cksumd",
            "--debug",
            "--log",
            "/tmp/cksumd.log",
            "--config",
            "/tmp/cksumd.toml",
            "--host",
            "0.0.0.0",
            "--port",
            "7000",
            "--secrets",
            "/tmp/secret",
            "--readsize",
            "2",
            "--default-checksum",
            "adler32",
            "--lfn2pfnxml",
            "/tmp/storage.xml",
            "--maxpoolsize",
            "3",
            "--timeout",
            "60",
        ]);
        assert!(cli.debug);
        assert_eq!(cli.port, Some(7000));
        assert_eq!(cli.readsize, Some(2));
        assert_eq!(cli.maxpoolsize, Some(3));
        assert_eq!(cli.timeout, Some(60));
    }

    #[tokio::test]
    async fn run_without_secrets_fails_fast() {
        let cli = Cli::parse_from(["cksumd", "--port", "0"]);
        let err = run(cli).await.unwrap_err();
        assert!(matches!(err, CliError::MissingSecrets));
    }

    #[tokio::test]
    async fn run_rejects_unsupported_algorithm() {
        let secrets = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(secrets.path(), "s3cr3t\n").unwrap();

        let cli = Cli::parse_from(["cksumd", "--port", "0", "--secrets", secrets.path().to_str().unwrap(), "--default-checksum", "md5"]);
        let err = run(cli).await.unwrap_err();
        assert!(matches!(err, CliError::UnsupportedAlgorithm(alg) if alg == "md5"));
    }

    #[tokio::test]
    async fn run_rejects_an_unrecognized_action_name() {
        let secrets = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(secrets.path(), "s3cr3t\n").unwrap();

        let cli = Cli::parse_from(["cksumd", "--port", "0", "--secrets", secrets.path().to_str().unwrap(), "--actions", "ping,not-a-worker"]);
        let err = run(cli).await.unwrap_err();
        assert!(matches!(err, CliError::InvalidActions(_)));
    }
}
