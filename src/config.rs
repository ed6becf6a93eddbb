use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Application configuration, loaded from a TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub autopeer: AutopeerConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub bgp: BgpSettings,
}

/// `[autopeer]` section: identity the front-end drops to, registry
/// location, database directory and the local ASN.
#[derive(Debug, Clone, Deserialize)]
pub struct AutopeerConfig {
    pub user: String,
    pub group: String,
    pub registry: PathBuf,
    pub db_dir: PathBuf,
    pub asn: u32,
}

/// `[http]` section for the front-end listener.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

/// `[bgp]` section: host-specific parameters of the bgpd template.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BgpSettings {
    pub router_id: String,
    pub networks: Vec<String>,
    pub roa: String,
}

impl Default for BgpSettings {
    fn default() -> Self {
        BgpSettings {
            router_id: "172.22.109.97".to_string(),
            networks: vec![
                "172.22.109.96/27".to_string(),
                "fd5e:e6ff:d44::4242/48".to_string(),
            ],
            roa: "/var/db/dn42/roa-obgp.conf".to_string(),
        }
    }
}

impl AppConfig {
    /// Load and parse the configuration file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Listener address for the HTTP front-end.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.http.host, self.http.port)
    }
}
