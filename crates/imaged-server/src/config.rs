use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use imaged_protocol::MAX_MESSAGE_SIZE;
use imaged_store::StoreConfig;
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

pub const DEFAULT_PORT: u16 = 9991;

/// Server settings. Every field may be omitted in a TOML file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Store root directory.
    pub root: PathBuf,
    pub tls: Option<TlsConfig>,
    /// Write a self-signed certificate under `<root>/tls` and serve HTTPS
    /// with it. Ignored when `tls` is set.
    pub generate_self_signed: bool,
    /// Largest accepted request payload in bytes.
    pub max_message_size: usize,
    /// Settings for the served store, under `[store]`.
    pub store: StoreConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            root: PathBuf::from("."),
            tls: None,
            generate_self_signed: false,
            max_message_size: MAX_MESSAGE_SIZE,
            store: StoreConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(text: &str) -> ServerResult<Self> {
        toml::from_str(text).map_err(|e| ServerError::Config(e.to_string()))
    }

    pub fn from_toml_file(path: &Path) -> ServerResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Whether the server will speak HTTPS.
    pub fn uses_tls(&self) -> bool {
        self.tls.is_some() || self.generate_self_signed
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}
