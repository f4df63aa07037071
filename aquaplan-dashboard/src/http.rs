/**
 * API REST AQUAPLAN - Surface HTTP du tableau de bord
 *
 * RÔLE :
 * Expose à la couche UI le snapshot d'utilisation (lecture seule), l'état
 * du workflow d'allocation et les actions opérateur.
 *
 * FONCTIONNEMENT :
 * - Routes : /health, /snapshot, /status, /topology, /allocate, /refresh,
 *   /sources, /zones, /connections
 * - Sérialisation JSON automatique des réponses
 * - 503 tant qu'aucun snapshot n'a été calculé, 502 quand le serveur de
 *   ressources échoue
 *
 * CONCURRENCE :
 * - Un seul calcul d'allocation à la fois : un second POST /allocate
 *   répond {"started": false} sans appeler le serveur distant
 */

use crate::client::ResourceApi;
use crate::dashboard::Dashboard;
use crate::error::DashboardError;
use crate::workflow::TriggerOutcome;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AllocateView {
    started: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    zones: Option<usize>,
}

fn to_view(outcome: TriggerOutcome) -> AllocateView {
    match outcome {
        TriggerOutcome::Completed { zones } => AllocateView { started: true, zones: Some(zones) },
        TriggerOutcome::AlreadyAllocating => AllocateView { started: false, zones: None },
    }
}

/// Code HTTP d'une erreur moteur
fn error_status(err: &DashboardError) -> StatusCode {
    match err {
        DashboardError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        DashboardError::DegenerateZoneDemand { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::BAD_GATEWAY,
    }
}

fn error_response(err: DashboardError) -> Response {
    warn!("request failed: {err}");
    (
        error_status(&err),
        Json(json!({ "ok": false, "kind": err.kind(), "error": err.to_string() })),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
pub struct SourceForm {
    pub capacity: f64,
}

#[derive(Debug, Deserialize)]
pub struct ZoneForm {
    pub demand: f64,
    pub priority: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionForm {
    pub source_id: i64,
    pub zone_id: i64,
    pub cost_per_unit: f64,
}

pub fn build_router<A: ResourceApi>(dashboard: Dashboard<A>) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/snapshot", get(get_snapshot::<A>))
        .route("/status", get(get_status::<A>))
        .route("/topology", get(get_topology::<A>))
        .route("/allocate", post(allocate::<A>))
        .route("/refresh", post(refresh::<A>))
        .route("/sources", post(create_source::<A>))
        .route("/zones", post(create_zone::<A>))
        .route("/connections", post(create_connection::<A>))
        .with_state(dashboard)
}

// GET /snapshot
async fn get_snapshot<A: ResourceApi>(State(dashboard): State<Dashboard<A>>) -> Response {
    match dashboard.snapshot() {
        Some(snapshot) => Json(snapshot.as_ref().clone()).into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "ok": false, "error": "no snapshot computed yet" })),
        )
            .into_response(),
    }
}

// GET /status
async fn get_status<A: ResourceApi>(State(dashboard): State<Dashboard<A>>) -> Response {
    Json(dashboard.status()).into_response()
}

// GET /topology
async fn get_topology<A: ResourceApi>(State(dashboard): State<Dashboard<A>>) -> Response {
    Json(dashboard.topology()).into_response()
}

// POST /allocate
async fn allocate<A: ResourceApi>(State(dashboard): State<Dashboard<A>>) -> Response {
    match dashboard.trigger_allocation().await {
        Ok(outcome) => Json(to_view(outcome)).into_response(),
        Err(e) => error_response(e),
    }
}

// POST /refresh
async fn refresh<A: ResourceApi>(State(dashboard): State<Dashboard<A>>) -> Response {
    match dashboard.refresh_topology().await {
        Ok(()) => Json(json!({ "ok": true })).into_response(),
        Err(e) => error_response(e),
    }
}

// POST /sources
async fn create_source<A: ResourceApi>(
    State(dashboard): State<Dashboard<A>>,
    Json(form): Json<SourceForm>,
) -> Response {
    match dashboard.create_source(form.capacity).await {
        Ok(()) => (StatusCode::CREATED, Json(json!({ "ok": true }))).into_response(),
        Err(e) => error_response(e),
    }
}

// POST /zones
async fn create_zone<A: ResourceApi>(
    State(dashboard): State<Dashboard<A>>,
    Json(form): Json<ZoneForm>,
) -> Response {
    match dashboard.create_zone(form.demand, form.priority).await {
        Ok(()) => (StatusCode::CREATED, Json(json!({ "ok": true }))).into_response(),
        Err(e) => error_response(e),
    }
}

// POST /connections
async fn create_connection<A: ResourceApi>(
    State(dashboard): State<Dashboard<A>>,
    Json(form): Json<ConnectionForm>,
) -> Response {
    match dashboard
        .create_connection(form.source_id, form.zone_id, form.cost_per_unit)
        .await
    {
        Ok(()) => (StatusCode::CREATED, Json(json!({ "ok": true }))).into_response(),
        Err(e) => error_response(e),
    }
}
