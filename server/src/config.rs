use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use nmos_query_proto::ApiVersion;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/nmos-query/config.json";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(deserialize_with = "de_priority")]
    pub priority: u32,
    pub https_mode: HttpsMode,
    pub enable_mdns: bool,
    /// Address the HTTP/WebSocket listener binds.
    pub bind: SocketAddr,
    /// Hostname clients should use in returned `ws_href`s and in mDNS
    /// adverts; defaults to this machine's hostname.
    pub host: Option<String>,
    pub registry: RegistryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            priority: 100,
            https_mode: HttpsMode::Disabled,
            enable_mdns: true,
            bind: SocketAddr::from(([0, 0, 0, 0], 8870)),
            host: None,
            registry: RegistryConfig::default(),
        }
    }
}

impl Config {
    /// Read the config file, falling back to defaults when it is absent.
    pub fn load(path: &Path) -> anyhow::Result<Config> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using defaults");
                Ok(Config::default())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// The API versions this deployment serves. v1.0 predates HTTPS support
    /// and is withheld when HTTPS is mandatory.
    pub fn enabled_versions(&self) -> Vec<ApiVersion> {
        ApiVersion::ALL
            .into_iter()
            .filter(|v| self.https_mode != HttpsMode::Enabled || *v != ApiVersion::V1_0)
            .collect()
    }

    pub fn advertised_host(&self) -> String {
        if let Some(host) = &self.host {
            return host.clone();
        }
        hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "localhost".to_string())
    }

    /// Scheme and authority of the WebSocket URLs handed to subscribers.
    pub fn ws_base(&self) -> String {
        let scheme = if self.https_mode == HttpsMode::Enabled { "wss" } else { "ws" };
        format!("{}://{}:{}", scheme, self.advertised_host(), self.bind.port())
    }
}

/// `enabled` means HTTPS-only URLs and adverts, `mixed` keeps HTTP URLs but
/// additionally advertises an HTTPS endpoint for discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpsMode {
    Disabled,
    Enabled,
    Mixed,
}

impl HttpsMode {
    pub fn advertises_http(self) -> bool {
        self != HttpsMode::Enabled
    }

    pub fn advertises_https(self) -> bool {
        self != HttpsMode::Disabled
    }
}

/// Which registry backend to attach to.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RegistryConfig {
    Etcd {
        #[serde(default = "default_registry_host")]
        host: String,
        #[serde(default = "default_registry_port")]
        port: u16,
    },
    Sled {
        path: PathBuf,
        #[serde(default = "default_poll_interval_secs")]
        poll_interval_secs: u64,
        #[serde(default = "default_replay_window_secs")]
        replay_window_secs: u64,
    },
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig::Etcd { host: default_registry_host(), port: default_registry_port() }
    }
}

fn default_registry_host() -> String {
    "localhost".to_string()
}

fn default_registry_port() -> u16 {
    4001
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_replay_window_secs() -> u64 {
    15 * 60
}

/// Priorities arrive as numbers or strings; anything that is not a string
/// of digits becomes 0.
fn de_priority<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let raw = Value::deserialize(deserializer)?;
    Ok(match raw {
        Value::Number(n) => n.as_u64().map(|n| n.min(u32::MAX as u64) as u32).unwrap_or(0),
        Value::String(s) => s.parse().unwrap_or(0),
        _ => 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(body: Value) -> Config {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn defaults() {
        let cfg = config(json!({}));
        assert_eq!(cfg.priority, 100);
        assert_eq!(cfg.https_mode, HttpsMode::Disabled);
        assert!(cfg.enable_mdns);
        assert_eq!(cfg.enabled_versions(), ApiVersion::ALL.to_vec());
        assert!(matches!(cfg.registry, RegistryConfig::Etcd { .. }));
    }

    #[test]
    fn non_digit_priority_becomes_zero() {
        assert_eq!(config(json!({"priority": "high"})).priority, 0);
        assert_eq!(config(json!({"priority": -3})).priority, 0);
        assert_eq!(config(json!({"priority": "42"})).priority, 42);
        assert_eq!(config(json!({"priority": 7})).priority, 7);
    }

    #[test]
    fn https_enabled_withdraws_v1_0() {
        let cfg = config(json!({"https_mode": "enabled"}));
        assert_eq!(cfg.enabled_versions(), vec![ApiVersion::V1_1, ApiVersion::V1_2, ApiVersion::V1_3]);
        assert!(cfg.ws_base().starts_with("wss://"));
    }

    #[test]
    fn mixed_mode_keeps_http_urls() {
        let cfg = config(json!({"https_mode": "mixed", "host": "qs.example.com"}));
        assert_eq!(cfg.enabled_versions(), ApiVersion::ALL.to_vec());
        assert_eq!(cfg.ws_base(), "ws://qs.example.com:8870");
        assert!(cfg.https_mode.advertises_http());
        assert!(cfg.https_mode.advertises_https());
    }

    #[test]
    fn sled_registry_selector() {
        let cfg = config(json!({"registry": {"type": "sled", "path": "/var/lib/nmos-query"}}));
        match cfg.registry {
            RegistryConfig::Sled { path, poll_interval_secs, replay_window_secs } => {
                assert_eq!(path, PathBuf::from("/var/lib/nmos-query"));
                assert_eq!(poll_interval_secs, 5);
                assert_eq!(replay_window_secs, 900);
            }
            other => panic!("unexpected registry config: {other:?}"),
        }
    }
}
