//! Configuration management

use anyhow::{Context, Result};
use protocol::{
    DEFAULT_MASTER_HOST, DEFAULT_MASTER_PORT, DEFAULT_STATUS_QUERY, GAME_VARIANTS,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub master: MasterConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default = "default_games")]
    pub games: Vec<GameConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MasterConfig {
    #[serde(default = "default_master_host")]
    pub host: String,
    #[serde(default = "default_master_port")]
    pub port: u16,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_master_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CollectorConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_recv_timeout_ms")]
    pub recv_timeout_ms: u64,
    #[serde(default = "default_quiet_period_ms")]
    pub quiet_period_ms: u64,
    #[serde(default = "default_recv_buffer_bytes")]
    pub recv_buffer_bytes: usize,
    #[serde(default = "default_query")]
    pub query: String,
}

/// One entry of the variant table: short code -> (game name, cipher key)
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct GameConfig {
    pub code: String,
    pub gamename: String,
    pub key: String,
}

fn default_master_host() -> String {
    DEFAULT_MASTER_HOST.to_string()
}

fn default_master_port() -> u16 {
    DEFAULT_MASTER_PORT
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_master_read_timeout_ms() -> u64 {
    5000
}

fn default_max_response_bytes() -> usize {
    1 << 20
}

fn default_bind_address() -> String {
    "0.0.0.0:0".to_string()
}

fn default_recv_timeout_ms() -> u64 {
    20
}

fn default_quiet_period_ms() -> u64 {
    500
}

fn default_recv_buffer_bytes() -> usize {
    1 << 20
}

fn default_query() -> String {
    DEFAULT_STATUS_QUERY.to_string()
}

fn default_games() -> Vec<GameConfig> {
    GAME_VARIANTS
        .iter()
        .map(|v| GameConfig {
            code: v.code.to_string(),
            gamename: v.gamename.to_string(),
            key: v.key.to_string(),
        })
        .collect()
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            host: default_master_host(),
            port: default_master_port(),
            connect_timeout_ms: default_connect_timeout_ms(),
            read_timeout_ms: default_master_read_timeout_ms(),
            max_response_bytes: default_max_response_bytes(),
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            recv_timeout_ms: default_recv_timeout_ms(),
            quiet_period_ms: default_quiet_period_ms(),
            recv_buffer_bytes: default_recv_buffer_bytes(),
            query: default_query(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            master: MasterConfig::default(),
            collector: CollectorConfig::default(),
            games: default_games(),
        }
    }
}

impl MasterConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl CollectorConfig {
    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }

    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)
            .with_context(|| "Failed to parse config file")?;

        // A zero receive timeout means "block forever" for std sockets
        if config.collector.recv_timeout_ms == 0 {
            anyhow::bail!("collector.recv_timeout_ms must be greater than zero");
        }
        if config.collector.quiet_period_ms == 0 {
            anyhow::bail!("collector.quiet_period_ms must be greater than zero");
        }
        if config.master.read_timeout_ms == 0 || config.master.connect_timeout_ms == 0 {
            anyhow::bail!("master timeouts must be greater than zero");
        }
        for game in &config.games {
            if game.key.is_empty() || game.gamename.is_empty() {
                anyhow::bail!("game {:?} needs a non-empty gamename and key", game.code);
            }
        }

        Ok(config)
    }

    /// Look up a variant by short code
    pub fn game(&self, code: &str) -> Option<&GameConfig> {
        self.games.iter().find(|g| g.code == code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.master.host, DEFAULT_MASTER_HOST);
        assert_eq!(config.master.port, 28910);
        assert_eq!(config.collector.quiet_period(), Duration::from_millis(500));
        assert_eq!(config.collector.query, "\\status\\");
        assert_eq!(config.game("ce").unwrap().gamename, "halom");
        assert_eq!(config.game("pc").unwrap().key, "QW88cv");
        assert!(config.game("h2").is_none());
    }

    #[test]
    fn test_partial_config() {
        let config = Config::parse(
            r#"
            [master]
            host = "127.0.0.1"

            [collector]
            quiet_period_ms = 750

            [[games]]
            code = "ce"
            gamename = "halom"
            key = "e4Rd9J"
            "#,
        )
        .unwrap();

        assert_eq!(config.master.host, "127.0.0.1");
        assert_eq!(config.master.port, DEFAULT_MASTER_PORT);
        assert_eq!(config.collector.quiet_period_ms, 750);
        assert_eq!(config.collector.recv_timeout_ms, 20);
        assert_eq!(config.games.len(), 1);
        assert!(config.game("pc").is_none());
    }

    #[test]
    fn test_rejects_zero_timeouts_and_empty_keys() {
        assert!(Config::parse("[collector]\nrecv_timeout_ms = 0").is_err());
        assert!(Config::parse("[collector]\nquiet_period_ms = 0").is_err());
        assert!(Config::parse("[master]\nread_timeout_ms = 0").is_err());
        assert!(Config::parse("[[games]]\ncode = \"x\"\ngamename = \"x\"\nkey = \"\"").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        assert!(Config::load("/nonexistent/halostat.toml").is_err());
    }
}
