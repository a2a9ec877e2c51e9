use anyhow::{Context, Result, bail};
use clap::Parser;
use lib_nest::core::encoder::{DEFAULT_AUX_FIELDS, DEFAULT_SEPARATOR};
use lib_nest::WireFormat;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_FILE: &str = "server_nest.conf";

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[clap(about = "Nest telemetry dashboard server", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "NEST_HTTP_PORT", help = "Port of the plain HTTP listener.")]
    pub http_port: Option<u16>,

    #[clap(long, env = "NEST_HTTPS_PORT", help = "Port of the HTTPS listener (only used when TLS paths are set).")]
    pub https_port: Option<u16>,

    #[clap(long, env = "NEST_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "NEST_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "NEST_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "NEST_STATIC_DIR", help = "Directory served under /static.")]
    pub static_dir: Option<PathBuf>,

    #[clap(long, env = "NEST_AUX_FIELDS", value_delimiter = ',', help = "Ordered, comma separated auxiliary fields appended to every payload.")]
    pub aux_fields: Option<Vec<String>>,

    #[clap(long, env = "NEST_SEPARATOR", help = "Separator token of the legacy payload format.")]
    pub separator: Option<String>,

    #[clap(long, env = "NEST_WIRE_FORMAT", help = "Payload format pushed to browsers (structured, separated).")]
    pub wire_format: Option<String>,

    #[clap(long, env = "NEST_LOG_PAGE_LIMIT", help = "Show only the last N records on the log page.")]
    pub log_page_limit: Option<usize>,

    #[clap(long, env = "NEST_CHANNEL_CAPACITY", help = "Capacity of the inbound reading channel.")]
    pub channel_capacity: Option<usize>,

    #[clap(long, env = "TLS_CERT_PATH", help = "Path to the TLS certificate file.")]
    pub tls_cert_path: Option<PathBuf>,

    #[clap(long, env = "TLS_KEY_PATH", help = "Path to the TLS private key file.")]
    pub tls_key_path: Option<PathBuf>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            http_port: other.http_port.or(self.http_port),
            https_port: other.https_port.or(self.https_port),
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            static_dir: other.static_dir.or(self.static_dir),
            aux_fields: other.aux_fields.or(self.aux_fields),
            separator: other.separator.or(self.separator),
            wire_format: other.wire_format.or(self.wire_format),
            log_page_limit: other.log_page_limit.or(self.log_page_limit),
            channel_capacity: other.channel_capacity.or(self.channel_capacity),
            tls_cert_path: other.tls_cert_path.or(self.tls_cert_path),
            tls_key_path: other.tls_key_path.or(self.tls_key_path),
        }
    }

    fn defaults() -> Config {
        Config {
            http_port: Some(8080),
            https_port: Some(8443),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            static_dir: Some(PathBuf::from("./static")),
            aux_fields: Some(DEFAULT_AUX_FIELDS.iter().map(|s| s.to_string()).collect()),
            separator: Some(DEFAULT_SEPARATOR.to_string()),
            wire_format: Some(WireFormat::default().to_string()),
            channel_capacity: Some(64),
            ..Default::default()
        }
    }

    /// Turns the merged configuration into concrete settings.
    pub fn resolve(self) -> Result<Settings> {
        let defaults = Config::defaults();
        let merged = defaults.merge(self);

        let wire_format = merged
            .wire_format
            .as_deref()
            .unwrap_or("structured")
            .parse::<WireFormat>()
            .map_err(anyhow::Error::msg)?;

        let separator = merged.separator.unwrap_or_default();
        if separator.is_empty() {
            bail!("separator must not be empty");
        }

        let channel_capacity = merged.channel_capacity.unwrap_or(64);
        if channel_capacity == 0 {
            bail!("channel capacity must be at least 1");
        }

        let tls = match (merged.tls_cert_path, merged.tls_key_path) {
            (Some(cert), Some(key)) => Some(TlsPaths { cert, key }),
            (None, None) => None,
            _ => bail!("TLS needs both a certificate and a key path"),
        };

        Ok(Settings {
            http_port: merged.http_port.unwrap_or(8080),
            https_port: merged.https_port.unwrap_or(8443),
            tls,
            log_dir: merged.log_dir.unwrap_or_else(|| PathBuf::from("./logs")),
            log_level: merged.log_level.unwrap_or_else(|| "info".to_string()),
            static_dir: merged.static_dir.unwrap_or_else(|| PathBuf::from("./static")),
            aux_fields: merged.aux_fields.unwrap_or_default(),
            separator,
            wire_format,
            log_page_limit: merged.log_page_limit,
            channel_capacity,
            config_file: merged.config_path,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Resolved configuration used by the rest of the server.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub http_port: u16,
    pub https_port: u16,
    pub tls: Option<TlsPaths>,
    pub log_dir: PathBuf,
    pub log_level: String,
    pub static_dir: PathBuf,
    pub aux_fields: Vec<String>,
    pub separator: String,
    pub wire_format: WireFormat,
    pub log_page_limit: Option<usize>,
    pub channel_capacity: usize,
    /// Config file that was applied, if any.
    pub config_file: Option<PathBuf>,
}

impl Settings {
    /// One line per setting, logged once the logger is up.
    pub fn summary(&self) -> Vec<String> {
        vec![
            format!("http port: {}", self.http_port),
            match &self.tls {
                Some(tls) => format!("https port: {} (cert {})", self.https_port, tls.cert.display()),
                None => "https: disabled".to_string(),
            },
            format!("log dir: {} (level {})", self.log_dir.display(), self.log_level),
            format!("static dir: {}", self.static_dir.display()),
            format!("payload: {} with aux fields [{}]", self.wire_format, self.aux_fields.join(", ")),
            format!(
                "config file: {}",
                self.config_file.as_deref().map_or("none".to_string(), |p| p.display().to_string())
            ),
        ]
    }
}

/// Layers the JSON config file under the CLI/env arguments.
pub fn load_config_from(cli: Config) -> Result<Settings> {
    let explicit = cli.config_path.is_some();
    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut current_config = Config::default();
    if config_file_path.exists() {
        current_config = read_config_file(&config_file_path)?;
        current_config.config_path = Some(config_file_path);
    } else if explicit {
        bail!("config file {} does not exist", config_file_path.display());
    }

    // CLI args (which include env vars) override the file.
    let mut cli = cli;
    cli.config_path = None;
    current_config.merge(cli).resolve()
}

pub fn load_config() -> Result<Settings> {
    load_config_from(Config::parse())
}

fn read_config_file(path: &Path) -> Result<Config> {
    let config_str = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    serde_json::from_str::<Config>(&config_str)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}
