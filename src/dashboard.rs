//! Read-only HTTP view of the visualisation state.
//!
//! `GET /api/stats` returns the counters, `GET /api/lookup?x=&y=` the
//! representative address of a pixel. Nothing here writes to the raster.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::curve::AddressMapper;
use crate::models::dto::{LookupDTO, StatsDTO};
use crate::state::VisualizationState;

#[derive(Clone)]
pub struct DashboardState {
    pub state: Arc<VisualizationState>,
    pub mapper: AddressMapper,
}

#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    x: i64,
    y: i64,
}

pub fn router(state: DashboardState) -> Router {
    Router::new()
        .route("/api/stats", get(api_stats))
        .route("/api/lookup", get(api_lookup))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: DashboardState, shutdown: CancellationToken) -> Result<()> {
    let server = axum::Server::try_bind(&addr)
        .with_context(|| format!("binding dashboard on {addr}"))?
        .serve(router(state).into_make_service());
    info!(%addr, "dashboard listening");
    server
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("dashboard server failed")
}

async fn api_stats(State(dash): State<DashboardState>) -> Json<StatsDTO> {
    Json(dash.state.stats().into())
}

async fn api_lookup(
    State(dash): State<DashboardState>,
    Query(query): Query<LookupQuery>,
) -> Json<LookupDTO> {
    Json(LookupDTO {
        x: query.x,
        y: query.y,
        address: dash.mapper.lookup(query.x, query.y),
    })
}
