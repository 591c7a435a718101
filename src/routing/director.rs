//! Request rewriting
//!
//! The director turns an inbound request into the request sent to a backend.
//! The first path segment selects the route; the remaining segments are
//! appended to the destination's base path, the query string travels
//! verbatim, and `Host` is pointed at the destination.
//!
//! The outbound target is assembled from the raw strings. Running it through
//! a URL parser would re-encode the query and resolve `..` segments, and
//! neither may change what the backend receives.

use crate::error::RouteError;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::routing::fallback::FallbackPolicy;
use crate::routing::table::{RouteTable, RouteTableHandle};
use url::{Position, Url};

/// An inbound request after rewriting, ready to be forwarded.
///
/// Produced only by [`rewrite`], which consumes the inbound request, so a
/// request can never be rewritten twice.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    /// Route key that matched
    pub route_key: String,
    /// Table entry the request is sent to; supplies scheme, host and port
    pub destination: Url,
    /// Origin-form request target: base path, remainder and raw query
    pub target: String,
    /// Transport-level host (`host[:port]`), identical to the `Host` header
    pub host: String,
    /// The request with its `Host` and `User-Agent` headers rewritten
    pub request: Request,
}

impl ForwardRequest {
    /// Absolute form of the outbound request, for logs.
    pub fn url(&self) -> String {
        format!("{}://{}{}", self.destination.scheme(), self.host, self.target)
    }

    /// Path part of the outbound target.
    pub fn path(&self) -> &str {
        self.target.split_once('?').map_or(self.target.as_str(), |(path, _)| path)
    }

    /// Raw query of the outbound target, without the `?`.
    pub fn query(&self) -> Option<&str> {
        self.target.split_once('?').map(|(_, query)| query)
    }
}

/// Splits a path into its route key and the remainder after the key's
/// trailing `/`, if there is one.
fn split_route(path: &str) -> (&str, Option<&str>) {
    let path = path.strip_prefix('/').unwrap_or(path);
    match path.split_once('/') {
        Some((key, remainder)) => (key, Some(remainder)),
        None => (path, None),
    }
}

/// Extracts the route key: the first segment of the path after a single
/// leading `/`.
pub fn route_key(path: &str) -> &str {
    split_route(path).0
}

/// Rewrites `request` against `table`.
pub fn rewrite(table: &RouteTable, mut request: Request) -> Result<ForwardRequest, RouteError> {
    let (key, remainder) = split_route(&request.path);

    let Some(destination) = table.lookup(key) else {
        return Err(RouteError::RouteMiss { key: key.to_string() });
    };

    let misconfigured = || RouteError::MisconfiguredDestination {
        key: key.to_string(),
        destination: destination.to_string(),
    };

    if destination.cannot_be_a_base() {
        return Err(misconfigured());
    }
    let host = authority(destination).ok_or_else(misconfigured)?;

    let mut target = destination.path().trim_end_matches('/').to_string();
    if let Some(remainder) = remainder {
        target.push('/');
        target.push_str(remainder);
    }
    if target.is_empty() {
        target.push('/');
    }
    if let Some(query) = &request.query {
        target.push('?');
        target.push_str(query);
    }

    let route_key = key.to_string();
    let destination = destination.clone();

    // both the header and the transport host must agree
    request.set_header("Host", host.clone());

    if request.header("User-Agent").is_none() {
        request.set_header("User-Agent", "");
    }

    Ok(ForwardRequest {
        route_key,
        destination,
        target,
        host,
        request,
    })
}

/// `host[:port]` of a URL, with the port only when it is explicit and not
/// the scheme default.
fn authority(url: &Url) -> Option<String> {
    url.host_str()?;
    Some(url[Position::BeforeHost..Position::AfterPort].to_string())
}

/// Per-request callback used by the serving engine.
///
/// Holds the shared route table handle and the fallback policy. Each call
/// works on one snapshot of the table.
#[derive(Debug, Clone)]
pub struct Director {
    routes: RouteTableHandle,
    fallback: FallbackPolicy,
}

impl Director {
    pub fn new(routes: RouteTableHandle) -> Self {
        Self {
            routes,
            fallback: FallbackPolicy,
        }
    }

    /// Rewrites the request, or produces the response to send instead when
    /// no backend should be contacted.
    pub fn direct(&self, request: Request) -> Result<ForwardRequest, Response> {
        let table = self.routes.load();

        match rewrite(&table, request) {
            Ok(forward) => {
                tracing::debug!(
                    key = %forward.route_key,
                    target = %forward.url(),
                    "Rewrote request"
                );
                Ok(forward)
            }
            Err(RouteError::RouteMiss { key }) => Err(self.fallback.on_miss(&key)),
            Err(error) => Err(self.fallback.respond(&error)),
        }
    }
}
