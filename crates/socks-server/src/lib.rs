//! # socks-server
//!
//! Axum HTTP + `WebSocket` relay core.
//!
//! - `GET /v1/ws`: subscriber sessions that declare channel interest
//! - `POST /v1/send`: shared-secret publish endpoint
//! - [`registry::ConnectionRegistry`]: live subscribers and their channel sets
//! - [`broadcast`]: detached, concurrent fan-out of one event to every match
//! - Optional TLS via `rustls`, `/health` and Prometheus `/metrics`

#![deny(unsafe_code)]

pub mod broadcast;
pub mod channels;
pub mod config;
pub mod errors;
pub mod health;
pub mod ids;
pub mod metrics;
pub mod publish;
pub mod registry;
pub mod server;
pub mod tls;
pub mod websocket;

pub use channels::ChannelSet;
pub use config::ServerConfig;
pub use errors::{PublishError, RegistryError, ServerError, TlsError};
pub use ids::ConnectionId;
pub use registry::ConnectionRegistry;
pub use server::SocksServer;
