use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinError;
use tracing::{error, info, warn};

use crate::assets;
use crate::backends::{build_backends, BackendOptions};
use crate::config::Config;
use crate::controller::MessageController;
use crate::error::RobotError;
use crate::keyword::KeywordTable;
use crate::web::{build_router, WebState};

/// How long in-flight requests may run once shutdown starts.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every connection drained before the deadline.
    Graceful,
    /// The deadline passed and the server task was aborted.
    TimedOut,
}

fn server_exit(joined: Result<std::io::Result<()>, JoinError>) -> Result<(), RobotError> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(RobotError::Server(e.to_string())),
        Err(e) => Err(RobotError::Server(format!("server task failed: {e}"))),
    }
}

/// Serve `router` until `shutdown` resolves, then drain for at most
/// `drain_timeout`. A server error before shutdown is returned as-is.
pub async fn serve_until<F>(
    listener: TcpListener,
    router: Router,
    shutdown: F,
    drain_timeout: Duration,
) -> Result<ShutdownOutcome, RobotError>
where
    F: Future<Output = ()> + Send,
{
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.await;
            })
            .await
    });

    tokio::select! {
        joined = &mut server => {
            server_exit(joined)?;
            return Err(RobotError::Server("server stopped unexpectedly".into()));
        }
        _ = shutdown => {
            info!("Shutdown requested; draining connections");
        }
    }

    let _ = stop_tx.send(());
    match tokio::time::timeout(drain_timeout, &mut server).await {
        Ok(joined) => {
            server_exit(joined)?;
            Ok(ShutdownOutcome::Graceful)
        }
        Err(_) => {
            server.abort();
            warn!(
                "Server did not drain within {}ms; aborting",
                drain_timeout.as_millis()
            );
            Ok(ShutdownOutcome::TimedOut)
        }
    }
}

fn load_keyword_table() -> Result<KeywordTable, RobotError> {
    let payload = assets::keyword_payload()
        .ok_or_else(|| RobotError::Keyword("embedded keyword table is missing".into()))?;
    KeywordTable::from_json(payload)
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    run_with_lookup(config, |key| std::env::var(key).ok()).await
}

/// `run` with backend settings resolved through `lookup` instead of the
/// process environment. Settings are validated before the listener binds.
pub async fn run_with_lookup<F>(config: Config, lookup: F) -> anyhow::Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let keywords = load_keyword_table()?;
    info!("Loaded {} keyword rules", keywords.len());

    let options = BackendOptions::from_lookup(lookup)?;
    let backends = build_backends(
        &options,
        Duration::from_secs(config.app.backend_timeout_secs),
    )?;
    let controller = Arc::new(MessageController::new(
        config.wechat.token.clone(),
        Arc::new(keywords),
        backends,
    ));
    info!("Reply chain: keywords -> {:?}", controller.backend_names());

    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow!("Failed to bind {addr}: {e}"))?;
    info!("Listening on {addr} (mode: {:?})", config.app.mode);

    let router = build_router(WebState::new(controller));
    match serve_until(listener, router, ctrl_c(), SHUTDOWN_TIMEOUT).await? {
        ShutdownOutcome::Graceful => info!("Server stopped"),
        ShutdownOutcome::TimedOut => warn!("Server stopped after forced abort"),
    }
    Ok(())
}
