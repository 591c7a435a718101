//! Signpost - first-segment reverse proxy
//!
//! Core library: route table loading, request rewriting, and the HTTP
//! engine that forwards rewritten requests.

pub mod config;
pub mod error;
pub mod http;
pub mod proxy;
pub mod routing;
pub mod server;
