/*!
Serveur HAL de développement

Sert les données d'un `MockResourceApi` sur un vrai port TCP, au format du
serveur de ressources (`_embedded`, `_links`), pour tester le client HTTP et
lancer le tableau de bord sans backend.
*/

use crate::mock_api::MockResourceApi;
use aquaplan_dashboard::client::{ApiError, ResourceApi};
use aquaplan_dashboard::models::{NewConnection, NewSource, NewZone};
use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::info;

/// Serveur lancé en tâche de fond; arrêté au drop
pub struct StubServer {
    pub addr: SocketAddr,
    pub api: MockResourceApi,
    handle: JoinHandle<()>,
}

impl StubServer {
    /// Bind on 127.0.0.1 (random port) and re-point the mock's hrefs at it.
    pub async fn start(api: MockResourceApi) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        api.set_base_url(&format!("http://{addr}"));

        let app = router(api.clone());
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::warn!("stub server stopped: {e}");
            }
        });
        info!("HAL stub listening on http://{addr}");
        Ok(Self { addr, api, handle })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub fn router(api: MockResourceApi) -> Router {
    Router::new()
        .route("/api/sources", get(list_sources).post(create_source))
        .route("/api/zones", get(list_zones).post(create_zone))
        .route("/api/connections", get(list_connections).post(create_connection))
        .route("/api/connections/{id}/{rel}", get(linked))
        .route("/allocate-water", get(allocate))
        .with_state(api)
}

fn api_error(err: ApiError) -> Response {
    let status = match &err {
        ApiError::Status { status, .. } => {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
        }
        _ => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

fn collection<T: Serialize>(rel: &str, items: Vec<T>) -> Response {
    let mut embedded = serde_json::Map::new();
    embedded.insert(rel.to_string(), json!(items));
    Json(json!({ "_embedded": embedded })).into_response()
}

async fn list_sources(State(api): State<MockResourceApi>) -> Response {
    match api.list_sources().await {
        Ok(items) => collection("sources", items),
        Err(e) => api_error(e),
    }
}

async fn list_zones(State(api): State<MockResourceApi>) -> Response {
    match api.list_zones().await {
        Ok(items) => collection("zones", items),
        Err(e) => api_error(e),
    }
}

async fn list_connections(State(api): State<MockResourceApi>) -> Response {
    match api.list_connections().await {
        Ok(items) => collection("connections", items),
        Err(e) => api_error(e),
    }
}

async fn linked(
    State(api): State<MockResourceApi>,
    Path((id, rel)): Path<(i64, String)>,
) -> Response {
    let href = format!("{}/api/connections/{id}/{rel}", api.base_url());
    match api.fetch_linked(&href).await {
        Ok(resource) => Json(resource).into_response(),
        Err(e) => api_error(e),
    }
}

async fn create_source(State(api): State<MockResourceApi>, Json(body): Json<NewSource>) -> Response {
    match api.create_source(&body).await {
        Ok(()) => StatusCode::CREATED.into_response(),
        Err(e) => api_error(e),
    }
}

async fn create_zone(State(api): State<MockResourceApi>, Json(body): Json<NewZone>) -> Response {
    match api.create_zone(&body).await {
        Ok(()) => StatusCode::CREATED.into_response(),
        Err(e) => api_error(e),
    }
}

async fn create_connection(
    State(api): State<MockResourceApi>,
    Json(body): Json<NewConnection>,
) -> Response {
    match api.create_connection(&body).await {
        Ok(()) => StatusCode::CREATED.into_response(),
        Err(e) => api_error(e),
    }
}

async fn allocate(State(api): State<MockResourceApi>) -> Response {
    match api.allocate().await {
        Ok(response) => Json(response).into_response(),
        Err(e) => api_error(e),
    }
}
