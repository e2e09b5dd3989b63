use crate::net::support::{ClientError, ClientResult};
use serde_derive::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_PORT: u16 = 7400;
pub const DEFAULT_TIMEOUT_MS: u32 = 5_000;

/// TLS 1.3 session parameters. Supplying both `cert_path` and `key_path`
/// enables mutual authentication.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct TlsConfig {
    /// PEM bundle of trust anchors. When absent, only `verify_peer = false`
    /// sessions can be established.
    pub ca_path: Option<PathBuf>,
    /// PEM client certificate chain for mutual authentication.
    pub cert_path: Option<PathBuf>,
    /// PEM private key matching `cert_path`.
    pub key_path: Option<PathBuf>,
    /// Name checked against the server certificate instead of `host`.
    /// Needed when connecting by IP address.
    pub server_name: Option<String>,
    /// Disables certificate verification entirely when false.
    pub verify_peer: bool,
}

impl Default for TlsConfig {
    fn default() -> TlsConfig {
        TlsConfig {
            ca_path: None,
            cert_path: None,
            key_path: None,
            server_name: None,
            verify_peer: true,
        }
    }
}

/// Connection parameters consumed by `Client::connect`.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// Bounds connection establishment, socket reads/writes and the wait
    /// deadline of the synchronous operations. `0` disables all of them.
    pub timeout_ms: u32,
    pub tls: Option<TlsConfig>,
}

impl Default for ClientConfig {
    fn default() -> ClientConfig {
        ClientConfig {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            tls: None,
        }
    }
}

impl ClientConfig {
    pub fn new<H: Into<String>>(host: H, port: u16) -> ClientConfig {
        ClientConfig {
            host: host.into(),
            port,
            ..ClientConfig::default()
        }
    }

    /// Loads the configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> ClientResult<ClientConfig> {
        let config: ClientConfig =
            serdeconv::from_toml_file(path).map_err(|_| ClientError::Param)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ClientResult<()> {
        if self.host.is_empty() || self.port == 0 {
            return Err(ClientError::Param);
        }

        if let Some(tls) = &self.tls {
            // A client certificate and its key only work as a pair.
            if tls.cert_path.is_some() != tls.key_path.is_some() {
                return Err(ClientError::Param);
            }
        }

        Ok(())
    }
}
