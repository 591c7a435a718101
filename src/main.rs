use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use signpost::config::Config;
use signpost::proxy::{ProxyHandler, ProxyService};
use signpost::routing::{self, Director, RouteTableHandle};
use signpost::server;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load();
    tracing::info!("signpost will run on {}", cfg.listen_addr());

    // No table, no proxy: a load failure here aborts startup
    let loaded = routing::load_file(&cfg.routetable)
        .with_context(|| format!("cannot start without route table {}", cfg.routetable.display()))?;
    let routes = RouteTableHandle::new(loaded.table);

    let mut handler = ProxyHandler::new(cfg.connect_timeout(), cfg.request_timeout());
    match server::tls::create_tls_connector() {
        Ok(connector) => handler = handler.with_tls(connector),
        Err(e) => tracing::warn!(error = %e, "https destinations are unavailable"),
    }

    let acceptor = if cfg.tls {
        Some(server::tls::create_tls_acceptor(&cfg.cert, &cfg.key)?)
    } else {
        None
    };

    let service = Arc::new(ProxyService::new(Director::new(routes.clone()), handler));

    tokio::spawn(reload_on_hangup(cfg.routetable.clone(), routes));

    tokio::select! {
        res = server::listener::run(&cfg, service, acceptor) => {
            res?;
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}

/// Reload the route table on SIGHUP. A failed reload keeps the current table.
#[cfg(unix)]
async fn reload_on_hangup(path: PathBuf, routes: RouteTableHandle) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            tracing::warn!(error = %e, "Route table reload on SIGHUP is unavailable");
            return;
        }
    };

    while hangup.recv().await.is_some() {
        match routing::load_file(&path) {
            Ok(loaded) => {
                routes.store(loaded.table);
                tracing::info!(path = %path.display(), "Route table reloaded");
            }
            Err(e) => {
                tracing::error!(error = %e, "Route table reload failed, keeping current table");
            }
        }
    }
}

#[cfg(not(unix))]
async fn reload_on_hangup(_path: PathBuf, _routes: RouteTableHandle) {}
