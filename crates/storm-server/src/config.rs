//! Server configuration.
//!
//! Every option can come from a command-line flag, an environment variable,
//! or an optional TOML file. Flags and environment win over the file, and
//! the file wins over built-in defaults.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use storm_pool::PoolConfig;

use crate::logging::LogStyle;

pub const DEFAULT_LISTEN: &str = "0.0.0.0:8221";
pub const DEFAULT_DAEMON_PORT: u16 = 58846;
const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid {field}: {value:?}")]
    Invalid { field: &'static str, value: String },

    #[error("daemon hostname is required")]
    MissingHostname,

    #[error(transparent)]
    Pool(#[from] storm_pool::ConfigError),
}

/// Command-line options. Unset options fall back to the config file.
#[derive(Debug, Default, Parser)]
#[command(name = "storm", about = "Web control surface for a torrent daemon")]
pub struct Options {
    /// Address to listen on [default: 0.0.0.0:8221].
    #[arg(short, long, env = "LISTEN_ADDR")]
    pub listen: Option<String>,

    /// Log output format.
    #[arg(long, env = "LOGGING_STYLE", value_enum)]
    pub log_style: Option<LogStyle>,

    /// Path prefix the API is served under [default: /].
    #[arg(long, env = "STORM_BASE_PATH")]
    pub base_path: Option<String>,

    /// Maximum concurrent daemon connections [default: 5].
    #[arg(long, env = "POOL_MAX_CONNECTIONS")]
    pub max_connections: Option<usize>,

    /// Close daemon connections idle for this long, e.g. `30s` [default: 30s].
    #[arg(long, env = "POOL_IDLE_TIME")]
    pub idle_time: Option<String>,

    /// Give up waiting for a daemon connection after this long [default: 30s].
    #[arg(long, env = "POOL_ACQUIRE_TIMEOUT")]
    pub acquire_timeout: Option<String>,

    /// Daemon RPC hostname.
    #[arg(short = 'H', long, env = "DELUGE_RPC_HOSTNAME")]
    pub hostname: Option<String>,

    /// Daemon RPC port [default: 58846].
    #[arg(short = 'P', long, env = "DELUGE_RPC_PORT")]
    pub port: Option<u16>,

    /// Daemon RPC username.
    #[arg(short, long, env = "DELUGE_RPC_USERNAME")]
    pub username: Option<String>,

    /// Daemon RPC password.
    #[arg(short, long, env = "DELUGE_RPC_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Daemon RPC protocol version.
    #[arg(long = "deluge-version", env = "DELUGE_RPC_VERSION", value_enum)]
    pub rpc_version: Option<RpcVersion>,

    /// TOML config file.
    #[arg(long, env = "STORM_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Contents of the optional TOML config file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileConfig {
    pub listen: Option<String>,
    pub log_style: Option<LogStyle>,
    pub base_path: Option<String>,
    pub pool: FilePoolConfig,
    pub daemon: FileDaemonConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct FilePoolConfig {
    pub max_connections: Option<usize>,
    pub idle_time: Option<String>,
    pub acquire_timeout: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileDaemonConfig {
    pub hostname: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub version: Option<RpcVersion>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Daemon RPC protocol generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RpcVersion {
    #[default]
    V1,
    V2,
}

/// Where and how to reach the daemon.
#[derive(Clone, PartialEq, Eq)]
pub struct DaemonSettings {
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub version: RpcVersion,
}

impl std::fmt::Debug for DaemonSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonSettings")
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("version", &self.version)
            .finish()
    }
}

/// Fully resolved server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub log_style: LogStyle,
    pub base_path: String,
    pub pool: PoolConfig,
    pub acquire_timeout: Duration,
    pub daemon: DaemonSettings,
}

impl ServerConfig {
    /// Parse the process arguments and environment, then resolve.
    pub fn from_args() -> Result<Self, ConfigError> {
        Self::load(Options::parse())
    }

    /// Read the config file named in `options`, if any, then resolve.
    pub fn load(options: Options) -> Result<Self, ConfigError> {
        let file = match &options.config {
            Some(path) => FileConfig::from_file(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(options, file)
    }

    /// Merge options over the file over defaults and validate the result.
    pub fn resolve(options: Options, file: FileConfig) -> Result<Self, ConfigError> {
        let listen = options
            .listen
            .or(file.listen)
            .unwrap_or_else(|| DEFAULT_LISTEN.to_string());
        let listen = listen.parse().map_err(|_| ConfigError::Invalid {
            field: "listen address",
            value: listen.clone(),
        })?;

        let base_path = normalize_base_path(
            options.base_path.or(file.base_path).as_deref().unwrap_or("/"),
        )?;

        let mut pool = PoolConfig::default();
        if let Some(max) = options.max_connections.or(file.pool.max_connections) {
            pool.max_connections = max;
        }
        if let Some(idle) = options.idle_time.or(file.pool.idle_time) {
            pool.idle_ttl = parse_duration("idle time", &idle)?;
        }
        pool.validate()?;

        let acquire_timeout = match options.acquire_timeout.or(file.pool.acquire_timeout) {
            Some(timeout) => parse_duration("acquire timeout", &timeout)?,
            None => DEFAULT_ACQUIRE_TIMEOUT,
        };

        let hostname = options
            .hostname
            .or(file.daemon.hostname)
            .filter(|h| !h.is_empty())
            .ok_or(ConfigError::MissingHostname)?;

        Ok(Self {
            listen,
            log_style: options.log_style.or(file.log_style).unwrap_or_default(),
            base_path,
            pool,
            acquire_timeout,
            daemon: DaemonSettings {
                hostname,
                port: options
                    .port
                    .or(file.daemon.port)
                    .unwrap_or(DEFAULT_DAEMON_PORT),
                username: options.username.or(file.daemon.username).unwrap_or_default(),
                password: options.password.or(file.daemon.password).unwrap_or_default(),
                version: options
                    .rpc_version
                    .or(file.daemon.version)
                    .unwrap_or_default(),
            },
        })
    }
}

/// Parse `500ms`, `30s`, `5m`, or a bare number of seconds.
pub fn parse_duration(field: &'static str, s: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::Invalid {
        field,
        value: s.to_string(),
    };
    let s = s.trim();
    let (digits, scale) = if let Some(ms) = s.strip_suffix("ms") {
        (ms, Duration::from_millis(1))
    } else if let Some(secs) = s.strip_suffix('s') {
        (secs, Duration::from_secs(1))
    } else if let Some(mins) = s.strip_suffix('m') {
        (mins, Duration::from_secs(60))
    } else {
        (s, Duration::from_secs(1))
    };
    let n: u32 = digits.trim().parse().map_err(|_| invalid())?;
    scale.checked_mul(n).ok_or_else(invalid)
}

/// Leading `/`, no trailing `/`, no empty segments. The root stays `/`.
pub fn normalize_base_path(raw: &str) -> Result<String, ConfigError> {
    let segments: Vec<&str> = raw.split('/').filter(|s| !s.is_empty()).collect();
    if segments
        .iter()
        .any(|s| *s == "." || *s == ".." || s.contains(['?', '#', '{', '}']))
    {
        return Err(ConfigError::Invalid {
            field: "base path",
            value: raw.to_string(),
        });
    }
    Ok(format!("/{}", segments.join("/")))
}
