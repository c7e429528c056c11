use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use vntl_server::{AppState, ServerArgs, router, sweeper, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ServerArgs::parse();
    telemetry::init();

    let job_root = args.job_root();
    let state = AppState::from_args(&args)
        .with_context(|| format!("opening job root {}", job_root.display()))?;
    let sweeper = sweeper::spawn(
        Arc::clone(state.manager.store()),
        args.job_ttl(),
        args.sweep_interval(),
    );

    let app = router(Arc::clone(&state), args.cors_origins());
    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("binding {}", args.bind))?;
    info!(
        addr = %args.bind,
        job_root = %job_root.display(),
        ttl_secs = args.job_ttl_seconds,
        decompiler = %args.decompiler,
        "vntl-server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    sweeper.abort();
    info!("bye");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown requested");
}
