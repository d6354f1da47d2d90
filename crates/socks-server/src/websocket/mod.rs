//! WebSocket subscriber connections, interest declarations and session lifecycle.

pub mod connection;
pub mod interest;
pub mod session;
