/// hltv-ics — team match calendar server
///
/// Co dělá:
///   1. GET /team/{id}/{slug}.ics → HLTV team page → ICS feed
///   2. Stránky tahá přímo, nebo přes FlareSolverr (FETCH_MODE=proxied)
///   3. Raw HTML cache 60 min, žádné retry
///
/// Spuštění:
///   FLARESOLVERR_URL=http://localhost:8191 cargo run --bin hltv-ics

use anyhow::{Context, Result};
use dotenv::dotenv;
use hltv_ics::{router, AppState, Config, FeedAssembler};
use hltv_scraper::{FetchGateway, FetchMode, ResponseCache, SessionHandle};
use logger::{now_iso, BypassSessionEvent, EventLogger};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

/// Upper bound for bypass session teardown on exit.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let config = Config::from_env()?;

    info!("=== hltv-ics ===");
    info!("Fetch mode: {:?}", config.fetch_mode);
    info!("Origin: {}", config.origin_base);
    match &config.log_dir {
        Some(dir) => info!("Audit log: {}", dir.display()),
        None => info!("Audit log: disabled"),
    }

    let audit = config.log_dir.as_ref().map(|dir| Arc::new(EventLogger::new(dir)));

    let gateway = Arc::new(FetchGateway::new(
        config.fetch_mode.clone(),
        Arc::new(ResponseCache::new()),
        Arc::new(SessionHandle::new()),
    )?);

    gateway.start().await;
    if matches!(config.fetch_mode, FetchMode::Proxied { .. }) {
        let session = gateway.session().current().await;
        let action = if session.is_some() { "created" } else { "unavailable" };
        log_session(audit.as_deref(), action, session);
    }

    let assembler = Arc::new(FeedAssembler::new(gateway.clone(), config.origin_base.clone()));
    let app = router(AppState::new(assembler, audit.clone()));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await.context("bind failed")?;
    info!("hltv-ics listening on http://{} (GET /health, /team/{{id}}/{{slug}}.ics)", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    info!("Shutting down, releasing bypass session...");
    let session = gateway.session().current().await;
    match tokio::time::timeout(SHUTDOWN_GRACE, gateway.stop()).await {
        Ok(()) => {
            if session.is_some() {
                log_session(audit.as_deref(), "destroyed", session);
            }
        }
        Err(_) => warn!("bypass session teardown timed out after {:?}", SHUTDOWN_GRACE),
    }

    Ok(())
}

fn log_session(audit: Option<&EventLogger>, action: &str, session: Option<String>) {
    if let Some(audit) = audit {
        audit.log_or_warn(&BypassSessionEvent {
            ts: now_iso(),
            event: "BYPASS_SESSION",
            action: action.to_string(),
            session,
        });
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c"),
        _ = terminate => info!("received SIGTERM"),
    }
}
