//! Listener and TLS termination

pub mod listener;
pub mod tls;
