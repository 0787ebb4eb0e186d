//! HTTP server assembly
//!
//! One router, three entries: the landing redirect, the metrics
//! snapshot, and the morph fallback that handles every repository
//! path. Panic recovery and response timing wrap the whole stack.

mod goget;
pub mod handlers;
mod healthcheck;
pub mod metrics;
pub mod upstream;

use anyhow::{Context, Result};
use axum::{middleware, routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpSocket;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::{error, info};

use crate::config::Config;
use crate::logging;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
}

pub struct MorpherServer {
    config: Arc<Config>,
}

impl MorpherServer {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Router with the full middleware stack
    pub fn router(&self) -> Router {
        let state = AppState {
            config: self.config.clone(),
        };

        Router::new()
            .route("/", get(handlers::root))
            .route("/_metrics", get(handlers::metrics_snapshot))
            .fallback(handlers::morph)
            .with_state(state)
            .layer(CatchPanicLayer::custom(handlers::handle_panic))
            .layer(middleware::from_fn(handlers::timing))
    }

    pub async fn run(self) -> Result<()> {
        if let Some(url) = &self.config.healthcheck.url {
            healthcheck::spawn(url.clone());
        }

        spawn_hup_handler();

        let addr: SocketAddr = self
            .config
            .bind_addr()
            .parse()
            .with_context(|| format!("Invalid bind address {}", self.config.bind_addr()))?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .context("Can't create listener socket")?;

        socket.set_reuseaddr(true)?;

        #[cfg(unix)]
        if self.config.http.reuseport {
            socket.set_reuseport(true)?;
        }

        socket
            .bind(addr)
            .with_context(|| format!("Can't bind to {addr}"))?;

        let listener = socket.listen(1024).context("Can't listen")?;

        info!("Morpher HTTP server started on {}", addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("HTTP server failed")?;

        Ok(())
    }
}

/// Wait for SIGTERM or SIGINT; in-flight handlers are allowed to finish
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Can't install SIGINT handler: {}", err);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => error!("Can't install SIGTERM handler: {}", err),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received shutdown signal, stopping accept loop...");
}

/// SIGHUP reopens the log file without dropping connections
#[cfg(unix)]
fn spawn_hup_handler() {
    tokio::spawn(async {
        let mut hup =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) {
                Ok(hup) => hup,
                Err(err) => {
                    error!("Can't install SIGHUP handler: {}", err);
                    return;
                }
            };

        while hup.recv().await.is_some() {
            info!("Received HUP signal, log will be reopened...");

            if let Err(err) = logging::reopen() {
                error!("Can't reopen log file: {}", err);
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_hup_handler() {}
