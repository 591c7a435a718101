//! Upstream connection and request forwarding
//!
//! This module handles connecting to the backend a request was routed to
//! and relaying its response.

use crate::http::request::Method;
use crate::http::response::{Response, ResponseBuilder, StatusCode};
use crate::routing::director::ForwardRequest;
use anyhow::{Context, Result};
use bytes::{Buf, BytesMut};
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::error::Elapsed;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use url::Host;

/// Default buffer size for streaming
const BUFFER_SIZE: usize = 8192;

/// Largest backend response head we accept
const MAX_HEADER_BYTES: usize = 64 * 1024;

/// Headers that apply to a single connection and are never forwarded.
const HOP_BY_HOP: &[&str] = &[
    "Connection",
    "Keep-Alive",
    "Proxy-Connection",
    "Transfer-Encoding",
    "Upgrade",
    "TE",
    "Trailer",
];

/// Forwards rewritten requests to their backend
pub struct ProxyHandler {
    /// Connection timeout duration
    connection_timeout: Duration,

    /// Timeout for the whole request/response exchange
    request_timeout: Duration,

    /// Connector for `https` destinations
    tls: Option<TlsConnector>,
}

impl ProxyHandler {
    /// Create a new proxy handler
    pub fn new(connection_timeout: Duration, request_timeout: Duration) -> Self {
        Self {
            connection_timeout,
            request_timeout,
            tls: None,
        }
    }

    /// Enable `https` destinations.
    pub fn with_tls(mut self, connector: TlsConnector) -> Self {
        self.tls = Some(connector);
        self
    }

    /// Forward a rewritten request and return the response for the client.
    ///
    /// Failures never escape: they become 502/504 responses.
    pub async fn forward_request(&self, forward: &ForwardRequest, client: Option<IpAddr>) -> Response {
        let request = &forward.request;

        match self.proxy_to_backend(forward, client).await {
            Ok(response) => {
                tracing::info!(
                    key = %forward.route_key,
                    target = %forward.url(),
                    status = response.status.as_u16(),
                    method = request.method.as_str(),
                    "Request forwarded"
                );
                response
            }
            Err(e) => {
                tracing::warn!(
                    key = %forward.route_key,
                    target = %forward.url(),
                    error = %format!("{e:#}"),
                    method = request.method.as_str(),
                    "Failed to proxy request to backend"
                );
                self.handle_proxy_error(&e)
            }
        }
    }

    /// Proxy a request to its backend
    async fn proxy_to_backend(&self, forward: &ForwardRequest, client: Option<IpAddr>) -> Result<Response> {
        let url = &forward.destination;

        let host = match url.host().context("Backend URL missing host")? {
            Host::Domain(domain) => domain.to_string(),
            Host::Ipv4(ip) => ip.to_string(),
            Host::Ipv6(ip) => ip.to_string(),
        };
        let port = url
            .port_or_known_default()
            .context("Backend URL has no port")?;

        // Connect to backend with timeout
        let stream = timeout(
            self.connection_timeout,
            TcpStream::connect((host.as_str(), port)),
        )
        .await
        .context("Connection timeout")?
        .context("Failed to connect to backend")?;

        tracing::trace!(host = %forward.host, "Connected to backend");

        let request_bytes = self.build_http_request(forward, client);
        let head_request = forward.request.method == Method::HEAD;

        if url.scheme() == "https" {
            let connector = self
                .tls
                .as_ref()
                .context("TLS is not configured for https backends")?;
            let server_name = rustls::pki_types::ServerName::try_from(host)
                .context("Invalid TLS server name")?;

            timeout(self.request_timeout, async {
                let stream = connector
                    .connect(server_name, stream)
                    .await
                    .context("TLS handshake with backend failed")?;
                self.exchange(stream, &request_bytes, head_request).await
            })
            .await
            .context("Request timeout")?
        } else {
            timeout(
                self.request_timeout,
                self.exchange(stream, &request_bytes, head_request),
            )
            .await
            .context("Request timeout")?
        }
    }

    /// Send request to backend and receive response
    async fn exchange<S>(&self, mut stream: S, request_bytes: &[u8], head_request: bool) -> Result<Response>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        stream.write_all(request_bytes).await?;
        stream.flush().await?;

        tracing::trace!("Request sent to backend");

        self.read_http_response(&mut stream, head_request).await
    }

    /// Build HTTP request bytes to send to backend
    pub fn build_http_request(&self, forward: &ForwardRequest, client: Option<IpAddr>) -> Vec<u8> {
        let request = &forward.request;
        let mut buffer = Vec::new();

        // Request line
        buffer.extend_from_slice(
            format!(
                "{} {} {}\r\n",
                request.method.as_str(),
                forward.target,
                request.version
            )
            .as_bytes(),
        );

        let mut outbound = request.clone();
        for name in HOP_BY_HOP {
            outbound.remove_header(name);
        }

        outbound.set_header("Host", forward.host.clone());
        outbound.set_header("Connection", "close");

        if let Some(client) = client {
            let forwarded_for = match outbound.header("X-Forwarded-For") {
                Some(prior) => format!("{prior}, {client}"),
                None => client.to_string(),
            };
            outbound.set_header("X-Forwarded-For", forwarded_for);
        }

        if !outbound.body.is_empty() {
            outbound.set_header("Content-Length", outbound.body.len().to_string());
        }

        // Write headers
        for (key, value) in &outbound.headers {
            buffer.extend_from_slice(format!("{}: {}\r\n", key, value).as_bytes());
        }

        // End of headers
        buffer.extend_from_slice(b"\r\n");

        // Body (if present)
        buffer.extend_from_slice(&outbound.body);

        buffer
    }

    /// Read HTTP response from backend
    async fn read_http_response<S>(&self, stream: &mut S, head_request: bool) -> Result<Response>
    where
        S: AsyncRead + Unpin,
    {
        let mut buffer = BytesMut::with_capacity(BUFFER_SIZE);

        // Read response headers
        loop {
            // Check if we've received complete headers (look for \r\n\r\n)
            if let Some(headers_end) = buffer
                .windows(4)
                .position(|window| window == b"\r\n\r\n")
            {
                let headers_bytes = buffer.split_to(headers_end + 4);
                let (status, mut headers) = parse_response_headers(&headers_bytes)?;

                let body = if head_request || status.is_bodiless() {
                    Vec::new()
                } else {
                    read_response_body(stream, &mut buffer, &headers).await?
                };

                for name in HOP_BY_HOP {
                    // a chunked body is relayed as received, so its framing header stays
                    if *name != "Transfer-Encoding" {
                        headers.retain(|k, _| !k.eq_ignore_ascii_case(name));
                    }
                }

                return Ok(ResponseBuilder::new(status)
                    .headers(headers)
                    .body(body)
                    .build());
            }

            // Prevent unbounded header growth
            if buffer.len() > MAX_HEADER_BYTES {
                anyhow::bail!("Response headers too large");
            }

            let n = stream.read_buf(&mut buffer).await?;

            if n == 0 {
                anyhow::bail!("Connection closed before complete response received");
            }
        }
    }

    /// Handle proxy errors and return appropriate HTTP responses
    fn handle_proxy_error(&self, error: &anyhow::Error) -> Response {
        if error.chain().any(|cause| cause.is::<Elapsed>()) {
            Response::plain(
                StatusCode::GatewayTimeout,
                Some("The backend server did not respond in time."),
            )
        } else {
            Response::plain(
                StatusCode::BadGateway,
                Some("Failed to get a response from the backend server."),
            )
        }
    }
}

/// Parse a response status line and headers.
///
/// Repeated header names are joined with `", "`.
pub fn parse_response_headers(headers_bytes: &[u8]) -> Result<(StatusCode, HashMap<String, String>)> {
    let headers_str = std::str::from_utf8(headers_bytes)
        .context("Invalid UTF-8 in response headers")?;

    let mut lines = headers_str.split("\r\n");

    // Parse status line
    let status_line = lines.next().context("Empty response")?;
    let parts: Vec<&str> = status_line.splitn(3, ' ').collect();

    if parts.len() < 2 || !parts[0].starts_with("HTTP/") {
        anyhow::bail!("Invalid status line: {}", status_line);
    }

    let status_code: u16 = parts[1].parse()
        .context("Invalid status code")?;

    if !(100..=599).contains(&status_code) {
        anyhow::bail!("Status code out of range: {}", status_code);
    }

    let mut headers: HashMap<String, String> = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }

        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim();
            let value = value.trim();

            match headers.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(key)) {
                Some((_, existing)) => {
                    existing.push_str(", ");
                    existing.push_str(value);
                }
                None => {
                    headers.insert(key.to_string(), value.to_string());
                }
            }
        }
    }

    Ok((StatusCode::from_u16(status_code), headers))
}

/// Read response body based on Content-Length, or until the backend closes.
async fn read_response_body<S>(
    stream: &mut S,
    buffer: &mut BytesMut,
    headers: &HashMap<String, String>,
) -> Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let content_length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("Content-Length"))
        .map(|(_, v)| v.trim().parse::<usize>().context("Invalid Content-Length"))
        .transpose()?;

    let Some(content_length) = content_length else {
        // No Content-Length: we asked for `Connection: close`, so read to EOF
        let mut body = buffer.split().to_vec();
        loop {
            let n = stream.read_buf(buffer).await?;
            if n == 0 {
                break;
            }
            body.extend_from_slice(&buffer[..n]);
            buffer.clear();
        }
        return Ok(body);
    };

    let mut body = Vec::with_capacity(content_length);

    // Use existing buffer data first
    let from_buffer = buffer.len().min(content_length);
    body.extend_from_slice(&buffer[..from_buffer]);
    buffer.advance(from_buffer);

    // Read remaining bytes
    let mut chunk = vec![0u8; BUFFER_SIZE];
    while body.len() < content_length {
        let to_read = (content_length - body.len()).min(BUFFER_SIZE);
        let n = stream.read(&mut chunk[..to_read]).await?;

        if n == 0 {
            anyhow::bail!("Connection closed before complete body received");
        }

        body.extend_from_slice(&chunk[..n]);
    }

    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_line(routes: &str, raw: &[u8]) -> String {
        let table = crate::routing::loader::parse_lines(routes).table;
        let (request, _) = crate::http::parser::parse_http_request(raw).unwrap();
        let forward = crate::routing::rewrite(&table, request).unwrap();

        let handler = ProxyHandler::new(Duration::from_secs(1), Duration::from_secs(1));
        let bytes = handler.build_http_request(&forward, None);
        let text = String::from_utf8(bytes).unwrap();
        text.split("\r\n").next().unwrap().to_string()
    }

    #[test]
    fn request_line_carries_raw_target() {
        assert_eq!(
            request_line("api http://10.0.0.5:9000/v1", b"GET /api/users?name=O'Brien HTTP/1.1\r\n\r\n"),
            "GET /v1/users?name=O'Brien HTTP/1.1"
        );
        assert_eq!(
            request_line("static http://10.0.0.6", b"GET /static/ HTTP/1.1\r\n\r\n"),
            "GET / HTTP/1.1"
        );
        assert_eq!(
            request_line("api http://10.0.0.5/v1", b"PROPFIND /api/%2e%2e/admin HTTP/1.1\r\n\r\n"),
            "PROPFIND /v1/%2e%2e/admin HTTP/1.1"
        );
    }

    #[test]
    fn repeated_response_headers_are_joined() {
        let head = b"HTTP/1.1 200 OK\r\nVary: Accept\r\nvary: Origin\r\n\r\n";
        let (status, headers) = parse_response_headers(head).unwrap();

        assert_eq!(status, StatusCode::Ok);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.values().next().unwrap(), "Accept, Origin");
    }

    #[test]
    fn timeout_maps_to_gateway_timeout() {
        let handler = ProxyHandler::new(Duration::from_secs(1), Duration::from_secs(1));

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let elapsed = rt.block_on(async {
            timeout(Duration::from_millis(1), std::future::pending::<()>())
                .await
                .unwrap_err()
        });

        let error = anyhow::Error::new(elapsed).context("Request timeout");
        assert_eq!(handler.handle_proxy_error(&error).status, StatusCode::GatewayTimeout);

        let error = anyhow::anyhow!("connection refused");
        assert_eq!(handler.handle_proxy_error(&error).status, StatusCode::BadGateway);
    }
}
