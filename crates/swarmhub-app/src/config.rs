//! Environment-driven configuration.
//!
//! Every setting has a default, so an empty environment yields a working
//! development configuration. Values that are present but malformed are
//! rejected rather than silently replaced.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use swarmhub_events::DEFAULT_QUEUE_CAPACITY;
use swarmhub_hub::SessionConfig;
use swarmhub_telemetry::{DEFAULT_LOG_LEVEL, LogFormat};
use thiserror::Error;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";
const DEFAULT_DATA_DIR: &str = "swarmhub-data";
const DEFAULT_USER: &str = "adminuser";

/// Configuration validation failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable was set to a value that cannot be used.
    #[error("invalid configuration value")]
    InvalidValue {
        /// Environment variable name.
        name: &'static str,
        /// Machine-readable reason.
        reason: &'static str,
        /// Offending value.
        value: String,
    },
}

/// Typed application settings.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Address the HTTP and socket surface listens on.
    pub bind_addr: SocketAddr,
    /// Root of per-transfer data directories.
    pub data_dir: PathBuf,
    /// `host:port` of the NSQ daemon; `None` disables bus publication.
    pub nsq_addr: Option<String>,
    /// URL receiving a POST for every completed transfer.
    pub completion_hook: Option<reqwest::Url>,
    /// Log filter used when `RUST_LOG` is unset.
    pub log_level: String,
    /// Log output format.
    pub log_format: LogFormat,
    /// Session write and stream-stop bounds.
    pub session: SessionConfig,
    /// Events buffered for the bus worker.
    pub bus_queue_capacity: usize,
    /// Owner of transfers created without a session identity.
    pub default_user: String,
    /// Simulated download rate of the in-process engine.
    pub simulated_rate_bps: Option<u64>,
}

impl AppConfig {
    /// Read configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error when a variable is set to an unusable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through `lookup`, which maps variable names to values.
    ///
    /// # Errors
    ///
    /// Returns an error when a variable is set to an unusable value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let bind_raw = var("SWARMHUB_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidValue {
                name: "SWARMHUB_BIND_ADDR",
                reason: "not_a_socket_address",
                value: bind_raw.clone(),
            })?;

        let completion_hook = var("SWARMHUB_COMPLETION_HOOK")
            .map(|raw| {
                reqwest::Url::parse(&raw)
                    .ok()
                    .filter(|url| matches!(url.scheme(), "http" | "https"))
                    .ok_or(ConfigError::InvalidValue {
                        name: "SWARMHUB_COMPLETION_HOOK",
                        reason: "not_an_http_url",
                        value: raw,
                    })
            })
            .transpose()?;

        let defaults = SessionConfig::default();
        let session = SessionConfig {
            write_timeout: seconds(
                "SWARMHUB_WRITE_TIMEOUT_SECS",
                var("SWARMHUB_WRITE_TIMEOUT_SECS"),
                defaults.write_timeout,
            )?,
            stop_stream_timeout: seconds(
                "SWARMHUB_STOP_STREAM_TIMEOUT_SECS",
                var("SWARMHUB_STOP_STREAM_TIMEOUT_SECS"),
                defaults.stop_stream_timeout,
            )?,
        };

        let bus_queue_capacity = var("SWARMHUB_BUS_QUEUE_CAPACITY")
            .map(|raw| positive("SWARMHUB_BUS_QUEUE_CAPACITY", raw))
            .transpose()?
            .map_or(DEFAULT_QUEUE_CAPACITY, |value| {
                usize::try_from(value).unwrap_or(usize::MAX)
            });

        let simulated_rate_bps = var("SWARMHUB_SIMULATED_RATE_BPS")
            .map(|raw| positive("SWARMHUB_SIMULATED_RATE_BPS", raw))
            .transpose()?;

        Ok(Self {
            bind_addr,
            data_dir: var("SWARMHUB_DATA_DIR")
                .map_or_else(|| PathBuf::from(DEFAULT_DATA_DIR), PathBuf::from),
            nsq_addr: var("SWARMHUB_NSQ_ADDR"),
            completion_hook,
            log_level: var("SWARMHUB_LOG_LEVEL").unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            log_format: var("SWARMHUB_LOG_FORMAT")
                .map_or_else(LogFormat::infer, |raw| LogFormat::from_name(&raw)),
            session,
            bus_queue_capacity,
            default_user: var("SWARMHUB_DEFAULT_USER").unwrap_or_else(|| DEFAULT_USER.to_string()),
            simulated_rate_bps,
        })
    }
}

fn positive(name: &'static str, raw: String) -> Result<u64, ConfigError> {
    match raw.parse::<u64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ConfigError::InvalidValue {
            name,
            reason: "not_a_positive_integer",
            value: raw,
        }),
    }
}

fn seconds(
    name: &'static str,
    raw: Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    raw.map_or(Ok(default), |raw| {
        positive(name, raw).map(Duration::from_secs)
    })
}
