//! Read-only HTTP status surface. Job submission and executor traffic go
//! through the transport layer in front of [`ControlPlane`](crate::control::ControlPlane),
//! never through here.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::orchestrator::JobOrchestrator;
use crate::pool::ExecutorPool;
use crate::sched::TaskScheduler;

#[derive(Clone)]
pub struct DashboardState {
    pub pool: Arc<ExecutorPool>,
    pub scheduler: Arc<TaskScheduler>,
    pub orchestrator: Arc<JobOrchestrator>,
}

#[derive(Serialize)]
struct StatusResponse {
    pool: crate::pool::PoolStats,
    scheduler: crate::sched::SchedulerStats,
    jobs: crate::orchestrator::OrchestratorStats,
}

#[derive(Serialize)]
struct JobResponse {
    id: String,
    client_id: String,
    status: String,
    map_tasks: usize,
    reduce_tasks: usize,
    created_at: String,
}

pub async fn run_dashboard(addr: SocketAddr, state: DashboardState, shutdown: CancellationToken) {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/status", get(status_handler))
        .route("/api/executors", get(executors_handler))
        .route("/api/jobs", get(jobs_handler))
        .layer(cors)
        .with_state(state);

    tracing::info!(addr = %addr, "Starting dashboard server");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind dashboard server");
            return;
        }
    };

    let serve = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await });
    if let Err(e) = serve.await {
        tracing::error!(error = %e, "Dashboard server failed");
    }
}

async fn status_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    Json(StatusResponse {
        pool: state.pool.stats().await,
        scheduler: state.scheduler.stats().await,
        jobs: state.orchestrator.stats().await,
    })
}

async fn executors_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    Json(state.pool.snapshot_records().await)
}

async fn jobs_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    let jobs: Vec<JobResponse> = state
        .orchestrator
        .active_jobs()
        .await
        .into_iter()
        .map(|job| JobResponse {
            id: job.id.to_string(),
            client_id: job.client_id.clone(),
            status: job.status.to_string(),
            map_tasks: job.map_tasks.len(),
            reduce_tasks: job.reduce_tasks.len(),
            created_at: job.created_at.to_rfc3339(),
        })
        .collect();
    Json(jobs)
}
