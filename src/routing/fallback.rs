//! Outcome for requests that cannot be routed.
//!
//! No backend is contacted and no redirect is issued: an unknown route key
//! is answered with 404, a table entry that cannot be used with 502.

use crate::error::RouteError;
use crate::http::response::{Response, StatusCode};

#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackPolicy;

impl FallbackPolicy {
    /// Response for a route key that has no table entry.
    pub fn on_miss(&self, key: &str) -> Response {
        tracing::info!(key, "No route for request");
        Response::plain(StatusCode::NotFound, Some(&format!("no route for {key:?}")))
    }

    /// Maps any routing error to the response sent to the client.
    pub fn respond(&self, error: &RouteError) -> Response {
        match error {
            RouteError::RouteMiss { key } => self.on_miss(key),
            RouteError::MisconfiguredDestination { key, destination } => {
                tracing::error!(
                    key = %key,
                    destination = %destination,
                    "Route has an unusable destination"
                );
                Response::plain(status_for(error), None)
            }
        }
    }
}

/// Status the client sees for a routing error.
pub fn status_for(error: &RouteError) -> StatusCode {
    match error {
        RouteError::RouteMiss { .. } => StatusCode::NotFound,
        RouteError::MisconfiguredDestination { .. } => StatusCode::BadGateway,
    }
}
