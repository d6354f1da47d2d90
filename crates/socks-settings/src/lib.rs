//! # socks-settings
//!
//! Configuration for the socks relay.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`SocksSettings::default()`]
//! 2. **Settings file**: `socks.json` (deep-merged over defaults)
//! 3. **Environment variables**: `SOCKS_*` overrides (highest priority)
//!
//! The publish secret is kept out of the settings tree and loaded on its
//! own through [`load_secret`].

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod secret;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use secret::{SECRET_ENV, load_secret, secret_from};
pub use types::{LoggingSettings, ServerSettings, SocksSettings, TlsSettings};
