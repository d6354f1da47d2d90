//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use socks_settings::ServerSettings;

/// Runtime configuration for [`SocksServer`](crate::SocksServer).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Close a subscriber after this many seconds without inbound frames. `0` disables.
    pub idle_timeout_secs: u64,
    /// Max inbound WebSocket message size in bytes. `None` means no cap.
    pub max_message_size: Option<usize>,
    /// Outbound queue capacity per subscriber.
    pub send_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            idle_timeout_secs: 300,
            max_message_size: None,
            send_queue: 256,
        }
    }
}

impl ServerConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            idle_timeout_secs: settings.idle_timeout_secs,
            max_message_size: settings.max_message_size,
            send_queue: settings.send_queue,
        }
    }

    /// Idle timeout as a duration, if enabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    /// `host:port` bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
