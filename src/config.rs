use serde::{Deserialize, Serialize};
use std::fs;

use anyhow::{Context, Result};

use crate::amount::Amount;
use crate::rpc::EndpointConfig;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_log_file")]
    pub log_file: String,
    #[serde(default)]
    pub use_json: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String,

    #[serde(default)]
    pub server: ServerConfig,

    /// Path of the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    #[serde(default)]
    pub payment: PaymentConfig,

    /// Upstream JSON-RPC providers.
    #[serde(default = "default_endpoints")]
    pub rpc: Vec<EndpointConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PaymentConfig {
    /// Address every buyer pays to.
    pub address: String,
    /// Unit price as an 8-decimal string, e.g. "0.00500000".
    #[serde(default = "default_price")]
    pub price_per_item: String,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            price_per_item: default_price(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> String {
    "./logs".to_string()
}

fn default_log_file() -> String {
    "mintgate.log".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

fn default_database_path() -> String {
    "./mintgate.db".to_string()
}

fn default_price() -> String {
    "0.00500000".to_string()
}

fn default_endpoints() -> Vec<EndpointConfig> {
    (1..=5)
        .map(|i| EndpointConfig {
            name: format!("upstream-{i}"),
            url: "http://127.0.0.1:8332".to_string(),
            daily_limit: crate::rpc::pool::DEFAULT_DAILY_LIMIT,
        })
        .collect()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_dir: default_log_dir(),
            log_file: default_log_file(),
            use_json: false,
            rotation: default_rotation(),
            server: ServerConfig::default(),
            database_path: default_database_path(),
            payment: PaymentConfig::default(),
            rpc: default_endpoints(),
        }
    }
}

impl AppConfig {
    /// Load config from a YAML file, falling back to defaults when the file
    /// is absent, then apply environment overrides and validate.
    pub fn load(path: &str) -> Result<Self> {
        let mut config = if fs::metadata(path).is_ok() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {path}"))?;
            serde_yaml::from_str(&content).context("Failed to parse config yaml")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Environment variables take precedence over the YAML file.
    ///
    /// Supported overrides:
    /// - DATABASE_PATH: SQLite database file
    /// - PORT: HTTP listen port (u16)
    /// - MINTGATE_PAYMENT_ADDRESS: drop wallet address
    /// - MINTGATE_LOG_LEVEL: log level (trace/debug/info/warn/error)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("DATABASE_PATH") {
            tracing::info!(
                "Config override: database_path = {} (from DATABASE_PATH)",
                path
            );
            self.database_path = path;
        }
        if let Ok(port) = std::env::var("PORT")
            && let Ok(p) = port.parse::<u16>()
        {
            tracing::info!("Config override: server.port = {} (from PORT)", p);
            self.server.port = p;
        }
        if let Ok(address) = std::env::var("MINTGATE_PAYMENT_ADDRESS") {
            tracing::info!("Config override: payment.address (from MINTGATE_PAYMENT_ADDRESS)");
            self.payment.address = address;
        }
        if let Ok(level) = std::env::var("MINTGATE_LOG_LEVEL") {
            tracing::info!(
                "Config override: log_level = {} (from MINTGATE_LOG_LEVEL)",
                level
            );
            self.log_level = level;
        }
    }

    /// Validate configuration at startup. Setup failures exit non-zero.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Invalid server.port: must be > 0");
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log_level '{}': must be one of {:?}",
                self.log_level,
                valid_levels
            );
        }

        if self.payment.address.is_empty() {
            anyhow::bail!("payment.address is required");
        }
        let price = self
            .price_per_item()
            .map_err(|e| anyhow::anyhow!("Invalid payment.price_per_item: {e}"))?;
        if price.is_zero() {
            anyhow::bail!("payment.price_per_item must be > 0");
        }

        if self.rpc.is_empty() {
            anyhow::bail!("At least one rpc endpoint is required");
        }
        for endpoint in &self.rpc {
            if endpoint.url.is_empty() {
                anyhow::bail!("rpc endpoint '{}' has no url", endpoint.name);
            }
            if endpoint.daily_limit == 0 {
                anyhow::bail!("rpc endpoint '{}' has a zero daily_limit", endpoint.name);
            }
        }

        Ok(())
    }

    pub fn price_per_item(&self) -> Result<Amount, crate::amount::AmountError> {
        self.payment.price_per_item.parse()
    }
}
