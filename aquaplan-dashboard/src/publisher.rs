use crate::aggregator::UtilizationSnapshot;
use crate::config::MqttConf;
use crate::dashboard::SnapshotReceiver;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use serde::Serialize;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::task::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Message publié à chaque nouveau snapshot
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotEnvelope<'a> {
    pub published_at: String,
    pub snapshot: &'a UtilizationSnapshot,
}

pub fn envelope(snapshot: &UtilizationSnapshot, now: OffsetDateTime) -> SnapshotEnvelope<'_> {
    SnapshotEnvelope {
        published_at: now.format(&Rfc3339).unwrap_or_default(),
        snapshot,
    }
}

/// Démarre la publication MQTT des snapshots
pub fn spawn_snapshot_publisher(conf: MqttConf, mut snapshots: SnapshotReceiver) -> JoinHandle<()> {
    task::spawn(async move {
        let client_id = format!("aquaplan-dashboard-{}", uuid::Uuid::new_v4().simple());
        let mut opts = MqttOptions::new(client_id, &conf.host, conf.port);
        opts.set_keep_alive(Duration::from_secs(conf.keep_alive_secs));

        let (client, mut eventloop) = AsyncClient::new(opts, 10);
        info!("snapshot publisher -> {}:{} topic {}", conf.host, conf.port, conf.topic);

        loop {
            tokio::select! {
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        info!("snapshot channel closed, publisher stopping");
                        break;
                    }
                    // le guard du watch ne doit pas traverser l'await du publish
                    let payload = {
                        let current = snapshots.borrow_and_update();
                        let Some(snapshot) = current.as_ref() else { continue };
                        serde_json::to_vec(&envelope(snapshot, OffsetDateTime::now_utc()))
                    };
                    match payload {
                        Ok(bytes) => {
                            if let Err(e) = client.publish(conf.topic.as_str(), QoS::AtLeastOnce, false, bytes).await {
                                warn!("failed to publish snapshot: {e:?}");
                            } else {
                                debug!("snapshot published on {}", conf.topic);
                            }
                        }
                        Err(e) => warn!("snapshot serialization failed: {e}"),
                    }
                },
                event = eventloop.poll() => {
                    if let Err(e) = event {
                        warn!("MQTT error: {e:?}");
                        tokio::time::sleep(Duration::from_secs(2)).await;
                    }
                }
            }
        }
    })
}
