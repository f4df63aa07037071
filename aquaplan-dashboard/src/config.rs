use crate::aggregator::AttributionMode;
use crate::error::DashboardError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::warn;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DashboardConfig {
    #[serde(default)]
    pub api: ApiConf,
    #[serde(default)]
    pub server: ServerConf,
    #[serde(default)]
    pub attribution: AttributionMode,
    #[serde(default)]
    pub refresh: RefreshConf,
    pub mqtt: Option<MqttConf>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ApiConf {
    pub base_url: String, // ex: "http://localhost:8080"
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ServerConf {
    pub listen: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct RefreshConf {
    /// Rafraîchissement périodique de la topologie; désactivé si absent
    pub poll_interval_secs: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

fn default_timeout() -> u64 {
    10
}

fn default_topic() -> String {
    "aquaplan/utilization/snapshot@v1".into()
}

fn default_keep_alive() -> u64 {
    15
}

impl Default for ApiConf {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".into(),
            request_timeout_secs: default_timeout(),
        }
    }
}

impl Default for ServerConf {
    fn default() -> Self {
        Self { listen: "0.0.0.0:3000".into() }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            api: ApiConf::default(),
            server: ServerConf::default(),
            attribution: AttributionMode::default(),
            refresh: RefreshConf::default(),
            mqtt: None,
        }
    }
}

impl DashboardConfig {
    /// Applique les surcharges d'environnement (AQUAPLAN_API_URL)
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("AQUAPLAN_API_URL") {
            if !url.trim().is_empty() {
                self.api.base_url = url.trim().to_string();
            }
        }
        self
    }
}

/// Lit et valide un fichier YAML; un fichier vide donne la config par défaut
pub async fn load_config_from(path: &Path) -> Result<DashboardConfig, DashboardError> {
    let txt = fs::read_to_string(path)
        .await
        .map_err(|e| DashboardError::Config(format!("{}: {e}", path.display())))?;
    if txt.trim().is_empty() {
        return Ok(DashboardConfig::default());
    }
    serde_yaml::from_str(&txt).map_err(|e| DashboardError::Config(format!("{}: {e}", path.display())))
}

pub async fn load_config() -> DashboardConfig {
    let path = std::env::var("AQUAPLAN_CONFIG").unwrap_or_else(|_| "dashboard.yaml".into());
    let cfg = if Path::new(&path).exists() {
        load_config_from(Path::new(&path)).await.unwrap_or_else(|e| {
            warn!("invalid config, using defaults: {e}");
            DashboardConfig::default()
        })
    } else {
        warn!("no {path}, using default config");
        DashboardConfig::default()
    };
    cfg.with_env_overrides()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let cfg = DashboardConfig::default();
        assert_eq!(cfg.api.base_url, "http://localhost:8080");
        assert_eq!(cfg.api.request_timeout_secs, 10);
        assert_eq!(cfg.attribution, AttributionMode::ZoneTotal);
        assert!(cfg.mqtt.is_none());
        assert!(cfg.refresh.poll_interval_secs.is_none());
    }

    #[tokio::test]
    async fn test_load_config_from_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "api:\n  base_url: http://planner:9000\nattribution: per_connection\nrefresh:\n  poll_interval_secs: 30\nmqtt:\n  host: broker\n  port: 1884\n"
        )
        .unwrap();

        let cfg = load_config_from(file.path()).await.unwrap();
        assert_eq!(cfg.api.base_url, "http://planner:9000");
        assert_eq!(cfg.api.request_timeout_secs, 10);
        assert_eq!(cfg.attribution, AttributionMode::PerConnection);
        assert_eq!(cfg.refresh.poll_interval_secs, Some(30));
        let mqtt = cfg.mqtt.unwrap();
        assert_eq!(mqtt.port, 1884);
        assert_eq!(mqtt.topic, "aquaplan/utilization/snapshot@v1");
        assert_eq!(cfg.server.listen, "0.0.0.0:3000");
    }

    #[tokio::test]
    async fn test_empty_and_invalid_files() {
        let empty = tempfile::NamedTempFile::new().unwrap();
        assert_eq!(load_config_from(empty.path()).await.unwrap(), DashboardConfig::default());

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        writeln!(bad, "attribution: [not, a, mode]").unwrap();
        let err = load_config_from(bad.path()).await.unwrap_err();
        assert_eq!(err.kind(), "config");
    }
}
