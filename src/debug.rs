use anyhow::{Context, Result};
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct RequestStats {
    total: AtomicU64,
    failed: AtomicU64,
    last_elapsed_ms: AtomicU64,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub struct RequestStatsSnapshot {
    pub total: u64,
    pub failed: u64,
    pub last_elapsed_ms: u64,
}

impl RequestStats {
    pub fn record(&self, elapsed: Duration, succeeded: bool) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if !succeeded {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        let millis = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.last_elapsed_ms.store(millis, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RequestStatsSnapshot {
        RequestStatsSnapshot {
            total: self.total.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            last_elapsed_ms: self.last_elapsed_ms.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone)]
struct DebugState {
    stats: Arc<RequestStats>,
    started: Instant,
}

#[derive(Debug, Serialize)]
struct RequestsReport {
    #[serde(flatten)]
    stats: RequestStatsSnapshot,
    uptime_secs: u64,
}

fn router(stats: Arc<RequestStats>) -> Router {
    Router::new()
        .route("/debug/health", get(health))
        .route("/debug/requests", get(requests))
        .with_state(DebugState {
            stats,
            started: Instant::now(),
        })
}

/// Binds `addr` up front so a bad address fails startup, then serves on a background task.
pub async fn spawn(addr: &str, stats: Arc<RequestStats>) -> Result<JoinHandle<()>> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind debug endpoint on {addr}"))?;
    let local = listener
        .local_addr()
        .context("failed to read debug endpoint address")?;
    info!(%local, "debug endpoint listening");

    let app = router(stats);
    Ok(tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, app).await {
            warn!(%error, "debug endpoint stopped");
        }
    }))
}

async fn health() -> &'static str {
    "ok"
}

async fn requests(State(state): State<DebugState>) -> Json<RequestsReport> {
    Json(RequestsReport {
        stats: state.stats.snapshot(),
        uptime_secs: state.started.elapsed().as_secs(),
    })
}
