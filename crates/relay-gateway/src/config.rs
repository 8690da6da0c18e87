//! Process configuration. Grounded in the teacher's layered-config pattern
//! (`config` crate reading environment with a `RELAY_`/`MCP_`-style prefix),
//! overlaid with a `clap` CLI surface for flags that matter at the shell
//! (`--port`, `--store-url`) per SPEC_FULL.md §10.3.

use clap::Parser;
use relay_auth::AuthMode;
use serde::Deserialize;

use crate::error::GatewayError;

#[derive(Debug, Parser)]
#[command(name = "relay-gateway", about = "Horizontally-scalable MCP relay gateway")]
pub struct Cli {
    #[arg(long, env = "RELAY_PORT")]
    pub port: Option<u16>,

    #[arg(long, env = "RELAY_BASE_URI")]
    pub base_uri: Option<String>,

    #[arg(long, env = "RELAY_STORE_URL")]
    pub store_url: Option<String>,

    #[arg(long, env = "RELAY_AUTH_MODE", value_enum)]
    pub auth_mode: Option<CliAuthMode>,

    #[arg(long, env = "RELAY_EXTERNAL_AUTH_URL")]
    pub external_auth_url: Option<String>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum CliAuthMode {
    Internal,
    External,
}

#[derive(Debug, Deserialize)]
struct FileConfig {
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_base_uri")]
    base_uri: String,
    #[serde(default = "default_store_url")]
    store_url: String,
    #[serde(default)]
    auth_mode: Option<String>,
    #[serde(default)]
    external_auth_url: Option<String>,
}

fn default_port() -> u16 {
    8080
}

fn default_base_uri() -> String {
    "http://localhost:8080".to_string()
}

fn default_store_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub port: u16,
    pub base_uri: String,
    pub store_url: String,
    pub auth_mode: AuthMode,
    pub external_introspection_url: Option<String>,
}

impl GatewayConfig {
    /// Layers `config::Environment` (prefix `RELAY`) under the parsed CLI
    /// flags, with CLI taking precedence — the same override order the
    /// teacher's binaries use for env-vs-flag conflicts.
    pub fn load(cli: Cli) -> Result<Self, GatewayError> {
        let builder = config::Config::builder()
            .set_default("port", 8080)
            .and_then(|b| b.set_default("base_uri", "http://localhost:8080"))
            .and_then(|b| b.set_default("store_url", "redis://127.0.0.1:6379"))
            .map_err(GatewayError::Config)?
            .add_source(config::Environment::with_prefix("RELAY"));

        let file_cfg: FileConfig = builder
            .build()
            .map_err(GatewayError::Config)?
            .try_deserialize()
            .map_err(GatewayError::Config)?;

        let auth_mode_raw = cli
            .auth_mode
            .map(|m| match m {
                CliAuthMode::Internal => "internal".to_string(),
                CliAuthMode::External => "external".to_string(),
            })
            .or(file_cfg.auth_mode)
            .unwrap_or_else(|| "internal".to_string());

        let auth_mode = match auth_mode_raw.to_ascii_lowercase().as_str() {
            "internal" => AuthMode::Internal,
            "external" => AuthMode::External,
            other => {
                return Err(GatewayError::InvalidConfig(format!("unknown auth mode: {other}")));
            }
        };

        let external_introspection_url = cli.external_auth_url.or(file_cfg.external_auth_url);
        if matches!(auth_mode, AuthMode::External) && external_introspection_url.is_none() {
            return Err(GatewayError::InvalidConfig(
                "RELAY_EXTERNAL_AUTH_URL is required when RELAY_AUTH_MODE=external".into(),
            ));
        }

        Ok(Self {
            port: cli.port.unwrap_or(file_cfg.port),
            base_uri: cli.base_uri.unwrap_or(file_cfg.base_uri),
            store_url: cli.store_url.unwrap_or(file_cfg.store_url),
            auth_mode,
            external_introspection_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flags_override_env_defaults() {
        let cli = Cli {
            port: Some(9090),
            base_uri: Some("https://relay.example".into()),
            store_url: None,
            auth_mode: None,
            external_auth_url: None,
        };
        let cfg = GatewayConfig::load(cli).unwrap();
        assert_eq!(cfg.port, 9090);
        assert_eq!(cfg.base_uri, "https://relay.example");
    }

    #[test]
    fn external_mode_without_url_is_rejected() {
        let cli = Cli {
            port: None,
            base_uri: None,
            store_url: None,
            auth_mode: Some(CliAuthMode::External),
            external_auth_url: None,
        };
        assert!(matches!(GatewayConfig::load(cli), Err(GatewayError::InvalidConfig(_))));
    }
}
