use anyhow::{Context, Result};
use conduit_channels::RouterConfig;
use conduit_gateway::GatewayConfig as GatewaySettings;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConduitConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub router: RouterSection,
}

// ── Gateway Config ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    /// Per-session outbound queue bound
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// 0 disables the timeout
    #[serde(default = "default_processor_timeout_secs")]
    pub processor_timeout_secs: u64,
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    18789
}

fn default_queue_capacity() -> usize {
    256
}

fn default_processor_timeout_secs() -> u64 {
    120
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_gateway_bind(),
            port: default_gateway_port(),
            queue_capacity: default_queue_capacity(),
            processor_timeout_secs: default_processor_timeout_secs(),
        }
    }
}

// ── Router Config ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterSection {
    #[serde(default = "default_processor_timeout_secs")]
    pub processor_timeout_secs: u64,
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            processor_timeout_secs: default_processor_timeout_secs(),
        }
    }
}

fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".conduit")
}

impl ConduitConfig {
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        let path = custom_path
            .clone()
            .unwrap_or_else(|| config_dir().join("config.toml"));

        if !path.exists() {
            warn!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;

        // Expand environment variables before parsing
        let expanded = expand_env_vars(&content);

        let config: Self = toml::from_str(&expanded)
            .with_context(|| format!("Failed to parse config at {}", path.display()))?;

        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn gateway_settings(&self) -> Result<GatewaySettings> {
        let ip: IpAddr = self
            .gateway
            .bind
            .parse()
            .with_context(|| format!("Invalid gateway bind address '{}'", self.gateway.bind))?;

        if self.gateway.queue_capacity == 0 {
            warn!("gateway.queue_capacity = 0 is not allowed, using 1");
        }

        Ok(GatewaySettings {
            bind: SocketAddr::new(ip, self.gateway.port),
            queue_capacity: self.gateway.queue_capacity.max(1),
            processor_timeout: timeout_from_secs(self.gateway.processor_timeout_secs),
        })
    }

    pub fn router_settings(&self) -> RouterConfig {
        RouterConfig {
            processor_timeout: timeout_from_secs(self.router.processor_timeout_secs),
        }
    }
}

const ALLOWED_ENV_VARS: &[&str] = &[
    "CONDUIT_GATEWAY_BIND",
    "CONDUIT_GATEWAY_PORT",
    "HOME",
    "USER",
];

/// Substitutes allowlisted `${VAR}` references in a single left-to-right
/// pass. Substituted values are never rescanned.
fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(open) = rest.find("${") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let name = &after[..close];
        if ALLOWED_ENV_VARS.contains(&name) {
            out.push_str(&std::env::var(name).unwrap_or_default());
        } else {
            warn!(var = %name, "Config references an env var outside the allowlist, left unexpanded");
            out.push_str(&rest[open..open + 2 + close + 1]);
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}
