use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::time::Duration;
use crate::analysis::types::{ContractKind, ContractSpec};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub connection: ConnectionConfig,
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    #[serde(default = "default_app_id")]
    pub app_id: u32,
    #[serde(default = "default_auth_timeout")]
    pub auth_timeout_secs: u64,
    #[serde(default = "default_history_timeout")]
    pub history_timeout_secs: u64,
    /// 0 disables the periodic ping; one ping is always sent after auth.
    #[serde(default)]
    pub keepalive_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    pub symbol: String,
    pub tick_count: u64,
    pub contract: ContractKind,
    #[serde(default)]
    pub target_digit: Option<u8>,
    #[serde(default = "default_max_ticks")]
    pub max_ticks: u32,
    #[serde(default = "default_runs")]
    pub runs: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default)]
    pub csv_logging: bool,
    #[serde(default = "default_csv_log_path")]
    pub csv_log_path: String,
}

fn default_ws_url() -> String { "wss://ws.derivws.com/websockets/v3".to_string() }
fn default_app_id() -> u32 { 1089 }
fn default_auth_timeout() -> u64 { 30 }
fn default_history_timeout() -> u64 { 60 }
fn default_max_ticks() -> u32 { 5000 }
fn default_runs() -> u32 { 1 }
fn default_csv_log_path() -> String { "analysis_log.csv".to_string() }

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            app_id: default_app_id(),
            auth_timeout_secs: default_auth_timeout(),
            history_timeout_secs: default_history_timeout(),
            keepalive_interval_secs: 0,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            csv_logging: false,
            csv_log_path: default_csv_log_path(),
        }
    }
}

impl ConnectionConfig {
    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }

    pub fn history_timeout(&self) -> Duration {
        Duration::from_secs(self.history_timeout_secs)
    }

    pub fn keepalive_interval(&self) -> Option<Duration> {
        (self.keepalive_interval_secs > 0).then(|| Duration::from_secs(self.keepalive_interval_secs))
    }
}

impl AnalysisConfig {
    pub fn contract_spec(&self) -> ContractSpec {
        ContractSpec::new(self.contract, self.target_digit)
    }
}

#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub api_token: String,
    pub ws_url: Option<String>,
    pub app_id: Option<u32>,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        Ok(config)
    }

    /// WebSocket endpoint with the app id query, env overrides applied.
    pub fn endpoint(&self, env: &EnvConfig) -> String {
        let base = env.ws_url.as_deref().unwrap_or(&self.connection.ws_url);
        let app_id = env.app_id.unwrap_or(self.connection.app_id);
        format!("{}?app_id={}", base, app_id)
    }
}

impl EnvConfig {
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        Ok(Self {
            api_token: std::env::var("DERIV_API_TOKEN")
                .context("DERIV_API_TOKEN not set")?,
            ws_url: std::env::var("DERIV_WS_URL").ok(),
            app_id: std::env::var("DERIV_APP_ID")
                .ok()
                .and_then(|v| v.parse().ok()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let config = Config::parse(
            r#"
            [analysis]
            symbol = "R_100"
            tick_count = 1000
            contract = "OVER_UNDER"
            target_digit = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.analysis.contract_spec(), ContractSpec::over_under(4));
        assert_eq!(config.analysis.max_ticks, 5000);
        assert_eq!(config.analysis.runs, 1);
        assert_eq!(config.connection.app_id, 1089);
        assert_eq!(config.connection.keepalive_interval(), None);
        assert!(!config.monitoring.csv_logging);
    }

    #[test]
    fn test_endpoint_overrides() {
        let config = Config::parse(
            r#"
            [connection]
            ws_url = "wss://example.test/ws"
            app_id = 7
            keepalive_interval_secs = 30

            [analysis]
            symbol = "R_50"
            tick_count = 10
            contract = "EVEN_ODD"
            "#,
        )
        .unwrap();

        let env = EnvConfig {
            api_token: "t".to_string(),
            ws_url: None,
            app_id: None,
        };
        assert_eq!(config.endpoint(&env), "wss://example.test/ws?app_id=7");
        assert_eq!(config.connection.keepalive_interval(), Some(Duration::from_secs(30)));

        let env = EnvConfig {
            api_token: "t".to_string(),
            ws_url: Some("wss://other.test".to_string()),
            app_id: Some(99),
        };
        assert_eq!(config.endpoint(&env), "wss://other.test?app_id=99");
    }

    #[test]
    fn test_unknown_contract_is_rejected() {
        let result = Config::parse(
            r#"
            [analysis]
            symbol = "R_50"
            tick_count = 10
            contract = "DIGIT_SUM"
            "#,
        );
        assert!(result.is_err());
    }
}
