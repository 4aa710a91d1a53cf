use crate::executor::HttpConfig;
use crate::humanize::HumanDuration;
use crate::replay::EngineConfig;
use crate::retry::RetryStrategy;
use crate::store::DEFAULT_CAPACITY;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
}

/// Operator API server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Period of the background replay ticker; zero disables it
    #[serde(default = "default_replay_interval")]
    pub replay_interval: HumanDuration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            replay_interval: default_replay_interval(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_replay_interval() -> HumanDuration {
    HumanDuration::from_secs(30)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Fjall,
    Memory,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    /// Maximum retained entries; oldest are evicted first
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_store_path(),
            capacity: default_capacity(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("data/replaybox")
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReplayConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub stop_on_error: bool,
    #[serde(default = "default_offline_poll_interval")]
    pub offline_poll_interval: HumanDuration,
    #[serde(default)]
    pub retry: RetryStrategy,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            stop_on_error: false,
            offline_poll_interval: default_offline_poll_interval(),
            retry: RetryStrategy::default(),
        }
    }
}

impl ReplayConfig {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            concurrency: self.concurrency,
            stop_on_error: self.stop_on_error,
            offline_poll_interval: self.offline_poll_interval.as_duration(),
            retry: self.retry.clone(),
        }
    }
}

fn default_concurrency() -> usize {
    1
}

fn default_offline_poll_interval() -> HumanDuration {
    HumanDuration::from_secs(1)
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: HumanDuration,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: HumanDuration,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Header carrying the entry's idempotency key
    #[serde(default = "default_idempotency_header")]
    pub idempotency_header: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
            idempotency_header: default_idempotency_header(),
        }
    }
}

impl ExecutorConfig {
    pub fn http_config(&self) -> HttpConfig {
        HttpConfig {
            connect_timeout: self.connect_timeout.as_duration(),
            request_timeout: self.request_timeout.as_duration(),
            user_agent: self.user_agent.clone(),
            idempotency_header: self.idempotency_header.clone(),
        }
    }
}

fn default_connect_timeout() -> HumanDuration {
    HumanDuration::from_secs(10)
}

fn default_request_timeout() -> HumanDuration {
    HumanDuration::from_secs(30)
}

fn default_user_agent() -> String {
    format!("replaybox/{}", env!("CARGO_PKG_VERSION"))
}

fn default_idempotency_header() -> String {
    "Idempotency-Key".to_string()
}

/// Connectivity probe configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProbeConfig {
    /// HEAD target; without one the service assumes it is always online
    pub health_url: Option<String>,
    #[serde(default = "default_probe_timeout")]
    pub timeout: HumanDuration,
    /// Skip probing and report this value
    pub force_online: Option<bool>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            health_url: None,
            timeout: default_probe_timeout(),
            force_online: None,
        }
    }
}

fn default_probe_timeout() -> HumanDuration {
    HumanDuration::from_secs(3)
}
