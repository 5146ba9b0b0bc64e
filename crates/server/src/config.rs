use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Default receiver route.
pub const DEFAULT_INGEST_PATH: &str = "/bridge/v1/ingest";

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Server bind address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Hard cap on bodies read from the socket, in MB. The receiver's own
    /// `max_payload_kb` limit is applied on top of this.
    #[serde(default = "default_max_body_size_mb")]
    pub max_body_size_mb: usize,

    /// Route the ingest handler is mounted on
    #[serde(default = "default_ingest_path")]
    pub ingest_path: String,

    /// Treat `X-Forwarded-Proto: https` as TLS. Enable only when every
    /// request arrives through a TLS-terminating proxy that sets the header.
    #[serde(default)]
    pub trust_forwarded_proto: bool,

    /// Log level / `EnvFilter` directive
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            timeout_secs: default_timeout_secs(),
            max_body_size_mb: default_max_body_size_mb(),
            ingest_path: default_ingest_path(),
            trust_forwarded_proto: false,
            log_level: default_log_level(),
        }
    }
}

impl ServerConfig {
    /// Load from an optional `server` config file and `BRIDGE_SERVER__*`
    /// environment variables (a `.env` file is read first when present).
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let builder = config::Config::builder()
            .add_source(config::File::with_name("server").required(false))
            .add_source(config::Environment::with_prefix("BRIDGE_SERVER").separator("__"));

        let config: ServerConfig = builder.build()?.try_deserialize()?;
        if !config.ingest_path.starts_with('/') {
            anyhow::bail!("ingest_path must start with '/': {:?}", config.ingest_path);
        }
        Ok(config)
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.bind_addr, self.port);
        Ok(addr_str.parse()?)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn max_body_size(&self) -> usize {
        self.max_body_size_mb * 1024 * 1024
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_body_size_mb() -> usize {
    10
}

fn default_ingest_path() -> String {
    DEFAULT_INGEST_PATH.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}
