use std::path::PathBuf;

use serde::Deserialize;

/// Optional settings read from a TOML config file, overlaid beneath
/// whatever the command line supplies.
///
/// Every field is optional: a config file only needs to mention what it
/// wants to override, and an absent `--config` flag means every field here
/// stays `None`.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    /// `[app]` table.
    #[serde(default)]
    pub app: AppSection,
    /// `[logging]` table.
    #[serde(default)]
    pub logging: LoggingSection,
    /// `[cksum]` table.
    #[serde(default)]
    pub cksum: CksumSection,
}

/// Network-facing settings.
#[derive(Debug, Default, Deserialize)]
pub struct AppSection {
    /// Listen address.
    pub host: Option<String>,
    /// Listen port.
    pub port: Option<u16>,
    /// Path to the file holding the shared HMAC secret.
    pub secrets_file: Option<PathBuf>,
}

/// Logging settings.
#[derive(Debug, Default, Deserialize)]
pub struct LoggingSection {
    /// `tracing_subscriber::EnvFilter` directive, e.g. `"info"` or `"debug"`.
    pub level: Option<String>,
    /// Optional path to additionally mirror log lines to.
    pub logfile: Option<PathBuf>,
}

/// Checksum-service settings.
#[derive(Debug, Default, Deserialize)]
pub struct CksumSection {
    /// Stripe read size in MiB.
    pub readsize_mib: Option<u32>,
    /// Checksum algorithm name; only `"adler32"` is implemented.
    pub default_checksum: Option<String>,
    /// Path to the `lfn-to-pfn` XML mapping file.
    pub lfn2pfn_xmlfile: Option<PathBuf>,
    /// Maximum number of pooled backend connections.
    pub maxpoolsize: Option<usize>,
    /// Per-request deadline, measured from dispatch, in seconds.
    pub request_timeout_secs: Option<u64>,
    /// Comma-separated subset of `ping,wait,stat,cksum` this server answers.
    pub actions: Option<String>,
}

impl FileConfig {
    /// Parses a TOML document into a [`FileConfig`].
    ///
    /// # Errors
    ///
    /// Returns the underlying `toml` parse error, wrapped in a `String` so
    /// callers don't need to depend on the `toml` crate themselves.
    pub fn parse(contents: &str) -> Result<Self, String> {
        toml::from_str(contents).map_err(|err| err.to_string())
    }
}

/// Picks the first `Some` value among a CLI-supplied override, a config-file
/// value, and a hardcoded default, in that priority order.
pub fn resolve<T>(cli: Option<T>, file: Option<T>, default: T) -> T {
    cli.or(file).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_parses_to_all_none_fields() {
        let config = FileConfig::parse("").unwrap();
        assert_eq!(config.app.host, None);
        assert_eq!(config.cksum.readsize_mib, None);
    }

    #[test]
    fn sections_parse_independently() {
        let toml = r#"
            [app]
            host = "0.0.0.0"
            port = 7000

            [cksum]
            maxpoolsize = 3
        "#;
        let config = FileConfig::parse(toml).unwrap();
        assert_eq!(config.app.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(config.app.port, Some(7000));
        assert_eq!(config.cksum.maxpoolsize, Some(3));
        assert_eq!(config.cksum.default_checksum, None);
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(FileConfig::parse("not = valid = toml").is_err());
    }

    #[test]
    fn resolve_prefers_cli_then_file_then_default() {
        assert_eq!(resolve(Some(1), Some(2), 3), 1);
        assert_eq!(resolve(None, Some(2), 3), 2);
        assert_eq!(resolve::<i32>(None, None, 3), 3);
    }
}
