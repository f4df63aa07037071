/**
 * AQUAPLAN DASHBOARD - Point d'entrée du tableau de bord
 *
 * RÔLE : Orchestration : config, client du serveur de ressources, moteur de
 * réconciliation, surface HTTP pour l'UI, publication MQTT optionnelle.
 *
 * DÉMARRAGE : chargement initial de la topologie (non bloquant en cas
 * d'échec), puis polling optionnel et serveur HTTP.
 */

use anyhow::{Context, Result};
use aquaplan_dashboard::config::load_config;
use aquaplan_dashboard::http::build_router;
use aquaplan_dashboard::publisher::spawn_snapshot_publisher;
use aquaplan_dashboard::{Dashboard, HttpResourceClient};
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("aquaplan_dashboard=info")),
        )
        .init();

    let cfg = load_config().await;
    info!("resource server: {}", cfg.api.base_url);

    let client = HttpResourceClient::new(&cfg.api).context("failed to build HTTP client")?;
    let dashboard = Dashboard::new(client, cfg.attribution);

    // chargement initial; le serveur démarre même si le backend est absent
    if let Err(e) = dashboard.refresh_topology().await {
        warn!("initial topology load failed: {e}");
    }

    if let Some(secs) = cfg.refresh.poll_interval_secs.filter(|s| *s > 0) {
        info!("polling topology every {secs}s");
        dashboard.spawn_poller(Duration::from_secs(secs));
    }

    if let Some(mqtt) = cfg.mqtt.clone() {
        spawn_snapshot_publisher(mqtt, dashboard.subscribe());
    }

    let app = build_router(dashboard);
    let listener = TcpListener::bind(&cfg.server.listen)
        .await
        .with_context(|| format!("failed to bind {}", cfg.server.listen))?;
    info!("listening on http://{}", cfg.server.listen);
    axum::serve(listener, app).await.context("HTTP server failed")?;
    Ok(())
}
