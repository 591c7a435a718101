use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

use crate::http::parser::{parse_http_request, ParseError};
use crate::http::request::{Method, Request};
use crate::http::response::Response;
use crate::http::writer::ResponseWriter;
use crate::proxy::ProxyService;

/// Largest request (head plus body) buffered from a client
const MAX_REQUEST_BYTES: usize = 16 * 1024 * 1024;

pub struct Connection<S> {
    stream: S,
    peer: Option<SocketAddr>,
    buffer: Vec<u8>,
    state: ConnectionState,
    service: Arc<ProxyService>,
}

pub enum ConnectionState {
    Reading,
    Processing(Request),
    Writing(ResponseWriter, bool), // bool = keep_alive?
    Closed,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, peer: Option<SocketAddr>, service: Arc<ProxyService>) -> Self {
        Self {
            stream,
            peer,
            buffer: Vec::with_capacity(4096),
            state: ConnectionState::Reading,
            service,
        }
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        loop {
            match std::mem::replace(&mut self.state, ConnectionState::Closed) {
                ConnectionState::Reading => {
                    self.state = match self.read_request().await? {
                        Ok(Some(req)) => ConnectionState::Processing(req),
                        Ok(None) => ConnectionState::Closed,
                        Err(e) => {
                            tracing::warn!(peer = ?self.peer, error = ?e, "Malformed request");
                            let mut response = Response::bad_request();
                            response.headers.insert("Connection".to_string(), "close".to_string());
                            ConnectionState::Writing(ResponseWriter::new(&response), false)
                        }
                    };
                }

                ConnectionState::Processing(req) => {
                    let (response, keep_alive) = self.handle_request(req).await;

                    let writer = ResponseWriter::new(&response);
                    self.state = ConnectionState::Writing(writer, keep_alive);
                }

                ConnectionState::Writing(mut writer, keep_alive) => {
                    writer.write_to_stream(&mut self.stream).await?;

                    if keep_alive {
                        self.state = ConnectionState::Reading; // go back for next request
                    }
                }

                ConnectionState::Closed => {
                    break;
                }
            }
        }

        Ok(())
    }

    /// Reads the next request.
    ///
    /// The outer error is an I/O failure; the inner one a request the client
    /// got wrong, which is answered before closing.
    pub async fn read_request(&mut self) -> anyhow::Result<Result<Option<Request>, ParseError>> {
        loop {
            // Try parsing whatever we already have
            match parse_http_request(&self.buffer) {
                Ok((request, consumed)) => {
                    // Remove consumed bytes
                    self.buffer.drain(..consumed);
                    return Ok(Ok(Some(request)));
                }

                Err(ParseError::Incomplete) => {
                    if self.buffer.len() > MAX_REQUEST_BYTES {
                        return Ok(Err(ParseError::InvalidRequest));
                    }
                    // Need more data → fall through to read
                }

                Err(e) => {
                    return Ok(Err(e));
                }
            }

            // Read more data
            let mut temp = [0u8; 4096];
            let n = self.stream.read(&mut temp).await?;

            if n == 0 {
                // Client closed connection
                return Ok(Ok(None));
            }

            self.buffer.extend_from_slice(&temp[..n]);
        }
    }

    async fn handle_request(&self, req: Request) -> (Response, bool) {
        let keep_alive = req.keep_alive();
        let head_request = req.method == Method::HEAD;

        let mut response = self
            .service
            .handle(req, self.peer.map(|peer| peer.ip()))
            .await;

        if head_request {
            response.body.clear();
        }
        if !keep_alive {
            response.headers.insert("Connection".to_string(), "close".to_string());
        }

        (response, keep_alive)
    }
}
