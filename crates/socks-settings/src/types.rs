//! Settings tree.

use serde::{Deserialize, Serialize};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SocksSettings {
    /// Listener and WebSocket settings.
    pub server: ServerSettings,
    /// Certificate material.
    pub tls: TlsSettings,
    /// Log level and file sink.
    pub logging: LoggingSettings,
}

/// Listener and WebSocket settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Close a subscriber after this many seconds without an inbound frame.
    pub idle_timeout_secs: u64,
    /// Max WebSocket message size in bytes. `None` means uncapped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_message_size: Option<usize>,
    /// Capacity of each connection's outbound queue.
    pub send_queue: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9093,
            idle_timeout_secs: 300,
            max_message_size: None,
            send_queue: 256,
        }
    }
}

/// Certificate/key pair used to serve HTTPS and WSS.
///
/// TLS is enabled only when both files exist at startup.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TlsSettings {
    /// PEM certificate chain.
    pub cert_path: String,
    /// PEM private key.
    pub key_path: String,
}

impl Default for TlsSettings {
    fn default() -> Self {
        Self {
            cert_path: "cert.pem".to_string(),
            key_path: "key.pem".to_string(),
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level for the socks crates (`trace` .. `error`).
    pub level: String,
    /// Whether to also append logs to [`LoggingSettings::file`].
    pub log_to_file: bool,
    /// Log file path.
    pub file: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_to_file: true,
            file: "socks.log".to_string(),
        }
    }
}
