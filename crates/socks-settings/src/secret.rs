//! Publish secret loading.

use secrecy::SecretString;

use crate::errors::{Result, SettingsError};

/// Environment variable holding the shared publish secret.
pub const SECRET_ENV: &str = "SOCKS_SECRET";

/// Read the publish secret from the process environment.
///
/// Call after any `.env` file has been loaded into the environment.
pub fn load_secret() -> Result<SecretString> {
    secret_from(std::env::var(SECRET_ENV).ok())
}

/// Wrap a raw secret value. Absent and empty values are both rejected.
pub fn secret_from(value: Option<String>) -> Result<SecretString> {
    match value {
        Some(v) if !v.is_empty() => Ok(SecretString::from(v)),
        _ => Err(SettingsError::MissingSecret(SECRET_ENV)),
    }
}
