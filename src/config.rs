//! Command-line and environment configuration.

use clap::{Args, ValueEnum};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageKind {
    /// In-process map, lost on restart
    Memory,
    /// Redis with native key expiry
    Redis,
}

#[derive(Debug, Clone, Args)]
pub struct ServeConfig {
    /// Port to listen on
    #[arg(long, env = "CODEBRIDGE_PORT", default_value = "8080")]
    pub port: u16,

    /// Address to bind to
    #[arg(long, env = "CODEBRIDGE_BIND", default_value = "0.0.0.0")]
    pub bind: String,

    /// Base URL of the execution backend
    #[arg(long, env = "JUDGE0_URL", default_value = "http://localhost:2358")]
    pub backend_url: String,

    /// Auth token sent to the execution backend
    #[arg(long, env = "JUDGE0_TOKEN")]
    pub backend_token: Option<String>,

    /// API key clients must send in `x-api-key`; unset disables the check
    #[arg(long, env = "CODEBRIDGE_API_KEY")]
    pub api_key: Option<String>,

    /// Session storage backend
    #[arg(long, env = "CODEBRIDGE_STORAGE", value_enum, default_value = "memory")]
    pub storage: StorageKind,

    /// Redis connection URL (with --storage redis)
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub redis_url: String,

    /// Idle time after which a session and its files expire
    #[arg(long, env = "CODEBRIDGE_SESSION_TTL_SECS", default_value = "86400")]
    pub session_ttl_secs: u64,

    /// Interval of the in-memory expiry sweep
    #[arg(long, env = "CODEBRIDGE_CLEANUP_INTERVAL_SECS", default_value = "300")]
    pub cleanup_interval_secs: u64,

    /// Upper bound on one backend round trip
    #[arg(long, env = "CODEBRIDGE_REQUEST_TIMEOUT_SECS", default_value = "60")]
    pub request_timeout_secs: u64,

    /// Maximum accepted upload body size in bytes
    #[arg(long, env = "CODEBRIDGE_MAX_UPLOAD_BYTES", default_value = "52428800")]
    pub max_upload_bytes: usize,

    /// Enable verbose logging
    #[arg(short, long, env = "CODEBRIDGE_VERBOSE")]
    pub verbose: bool,
}

impl ServeConfig {
    pub fn addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.bind, self.port).parse()
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
