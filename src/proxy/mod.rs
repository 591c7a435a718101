//! Reverse proxy functionality
//!
//! Ties the director to the forwarding leg: every request is rewritten
//! against the current route table and, when a route matches, sent to its
//! backend.

pub mod upstream;

pub use upstream::ProxyHandler;

use crate::http::request::Request;
use crate::http::response::Response;
use crate::routing::Director;
use std::net::IpAddr;

/// Everything a connection needs to answer a request.
pub struct ProxyService {
    director: Director,
    handler: ProxyHandler,
}

impl ProxyService {
    pub fn new(director: Director, handler: ProxyHandler) -> Self {
        Self { director, handler }
    }

    /// Route and forward one request. Routing failures are answered without
    /// contacting any backend.
    pub async fn handle(&self, request: Request, client: Option<IpAddr>) -> Response {
        match self.director.direct(request) {
            Ok(forward) => self.handler.forward_request(&forward, client).await,
            Err(response) => response,
        }
    }
}
