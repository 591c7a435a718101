//! Tests for proxy upstream request handling

use signpost::http::request::{Method, RequestBuilder};
use signpost::proxy::upstream::{parse_response_headers, ProxyHandler};
use signpost::routing::director::{rewrite, ForwardRequest};
use signpost::routing::loader::parse_lines;
use signpost::http::response::StatusCode;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

fn handler() -> ProxyHandler {
    ProxyHandler::new(Duration::from_secs(5), Duration::from_secs(30))
}

fn forward(table: &str, builder: RequestBuilder) -> ForwardRequest {
    let loaded = parse_lines(table);
    rewrite(&loaded.table, builder.build().unwrap()).unwrap()
}

#[test]
fn test_build_http_request() {
    let forward = forward(
        "api http://localhost:3000",
        RequestBuilder::new()
            .method(Method::GET)
            .target("/api/users")
            .version("HTTP/1.1")
            .header("User-Agent", "Test"),
    );

    let request_bytes = handler().build_http_request(&forward, None);
    let request_str = String::from_utf8_lossy(&request_bytes);

    assert!(request_str.starts_with("GET /users HTTP/1.1\r\n"));
    assert!(request_str.contains("Host: localhost:3000"));
    assert!(request_str.contains("User-Agent: Test"));
    assert!(request_str.contains("Connection: close"));
}

#[test]
fn test_build_http_request_with_base_path_and_query() {
    let forward = forward(
        "api http://10.0.0.5:9000/v1",
        RequestBuilder::new()
            .method(Method::POST)
            .target("/api/data?id=3")
            .header("Content-Type", "application/json")
            .body(b"{}".to_vec()),
    );

    let request_bytes = handler().build_http_request(&forward, None);
    let request_str = String::from_utf8_lossy(&request_bytes);

    assert!(request_str.starts_with("POST /v1/data?id=3 HTTP/1.1\r\n"));
    assert!(request_str.contains("Host: 10.0.0.5:9000"));
    assert!(request_str.contains("Content-Type: application/json"));
    assert!(request_str.contains("Content-Length: 2"));
    assert!(request_str.ends_with("\r\n\r\n{}"));
}

#[test]
fn test_build_http_request_removes_hop_by_hop_headers() {
    let forward = forward(
        "api http://localhost:3000",
        RequestBuilder::new()
            .method(Method::GET)
            .target("/api/")
            .header("connection", "keep-alive")
            .header("Upgrade", "websocket")
            .header("Keep-Alive", "timeout=5")
            .header("User-Agent", "Test"),
    );

    let request_bytes = handler().build_http_request(&forward, None);
    let request_str = String::from_utf8_lossy(&request_bytes);

    // Should have Connection: close (replaced)
    assert!(request_str.contains("Connection: close"));
    assert!(!request_str.contains("keep-alive"));
    assert!(!request_str.contains("Upgrade: websocket"));
    assert!(!request_str.contains("Keep-Alive"));
    assert!(request_str.contains("User-Agent: Test"));
}

#[test]
fn test_build_http_request_sends_empty_user_agent() {
    let forward = forward(
        "api http://localhost:3000",
        RequestBuilder::new().method(Method::GET).target("/api"),
    );

    let request_bytes = handler().build_http_request(&forward, None);
    let request_str = String::from_utf8_lossy(&request_bytes);

    assert!(request_str.contains("User-Agent: \r\n"));
}

#[test]
fn test_build_http_request_default_path() {
    let forward = forward(
        "static http://10.0.0.6/",
        RequestBuilder::new().method(Method::GET).target("/static"),
    );

    let request_bytes = handler().build_http_request(&forward, None);
    let request_str = String::from_utf8_lossy(&request_bytes);

    // Empty path should default to "/"
    assert!(request_str.starts_with("GET / HTTP/1.1\r\n"));
    assert!(request_str.contains("Host: 10.0.0.6\r\n"));
}

#[test]
fn test_build_http_request_appends_forwarded_for() {
    let client = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20));

    let fresh = forward(
        "api http://localhost:3000",
        RequestBuilder::new().method(Method::GET).target("/api"),
    );
    let request_bytes = handler().build_http_request(&fresh, Some(client));
    assert!(String::from_utf8_lossy(&request_bytes).contains("X-Forwarded-For: 192.168.1.20\r\n"));

    let chained = forward(
        "api http://localhost:3000",
        RequestBuilder::new()
            .method(Method::GET)
            .target("/api")
            .header("x-forwarded-for", "203.0.113.9"),
    );
    let request_bytes = handler().build_http_request(&chained, Some(client));
    assert!(
        String::from_utf8_lossy(&request_bytes)
            .contains("X-Forwarded-For: 203.0.113.9, 192.168.1.20\r\n")
    );
}

#[test]
fn test_parse_response_headers_relays_unknown_status() {
    let head = b"HTTP/1.1 418 I'm a teapot\r\nContent-Length: 0\r\n\r\n";
    let (status, headers) = parse_response_headers(head).unwrap();

    assert_eq!(status, StatusCode::Other(418));
    assert_eq!(headers.get("Content-Length").unwrap(), "0");
}

#[test]
fn test_parse_response_headers_rejects_garbage() {
    assert!(parse_response_headers(b"garbage\r\n\r\n").is_err());
    assert!(parse_response_headers(b"HTTP/1.1 abc OK\r\n\r\n").is_err());
}
