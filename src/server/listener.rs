use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::info;

use crate::config::Config;
use crate::http::connection::Connection;
use crate::proxy::ProxyService;

pub async fn run(cfg: &Config, service: Arc<ProxyService>, tls: Option<TlsAcceptor>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(cfg.listen_addr()).await?;
    info!(
        addr = %listener.local_addr()?,
        tls = tls.is_some(),
        "Listening"
    );

    serve(listener, service, tls).await
}

/// Accept connections forever, one task per connection.
pub async fn serve(listener: TcpListener, service: Arc<ProxyService>, tls: Option<TlsAcceptor>) -> anyhow::Result<()> {
    loop {
        let (socket, peer) = listener.accept().await?;
        tracing::debug!("Accepted connection from {}", peer);

        let service = service.clone();
        let tls = tls.clone();
        tokio::spawn(async move {
            let result = match tls {
                Some(acceptor) => match acceptor.accept(socket).await {
                    Ok(stream) => {
                        let mut conn = Connection::new(stream, Some(peer), service);
                        conn.run().await
                    }
                    Err(e) => Err(anyhow::anyhow!("TLS handshake failed: {}", e)),
                },
                None => {
                    let mut conn = Connection::new(socket, Some(peer), service);
                    conn.run().await
                }
            };

            if let Err(e) = result {
                tracing::error!("Connection error from {}: {}", peer, e);
            }
        });
    }
}
