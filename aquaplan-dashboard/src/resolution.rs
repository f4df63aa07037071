//! Link Resolution Cache
//!
//! Each connection only carries association links to its source and zone.
//! A resolution batch dereferences both links of every connection in
//! parallel, then the whole mapping is published at once:
//! - one failing connection is excluded, the others still resolve
//! - starting a new batch bumps the generation; a batch that completes after
//!   being superseded is discarded at publish time
//! - the mapping is only "ready" when it belongs to the current generation

use crate::client::{ApiError, ResourceApi};
use crate::error::DashboardError;
use crate::models::{ConnectionEndpoints, ConnectionId, ConnectionRecord};
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Connection excluded from a published mapping.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionFailure {
    pub connection_id: ConnectionId,
    pub reason: String,
}

/// Mapping published by one completed batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedLinks {
    pub generation: u64,
    pub endpoints: BTreeMap<ConnectionId, ConnectionEndpoints>,
    pub failures: Vec<ResolutionFailure>,
}

impl ResolvedLinks {
    pub fn get(&self, connection_id: ConnectionId) -> Option<&ConnectionEndpoints> {
        self.endpoints.get(&connection_id)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

/// One parallel round of dereferencing, stamped with the generation that
/// started it.
#[derive(Debug, Clone)]
pub struct ResolutionBatch {
    generation: u64,
    connections: Vec<ConnectionRecord>,
}

/// Completed batch, not yet published.
#[derive(Debug)]
pub struct BatchOutcome {
    generation: u64,
    endpoints: BTreeMap<ConnectionId, ConnectionEndpoints>,
    failures: Vec<ResolutionFailure>,
    errors: Vec<DashboardError>,
}

impl BatchOutcome {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn errors(&self) -> &[DashboardError] {
        &self.errors
    }

    /// Hands the per-connection errors over before publishing.
    pub fn take_errors(&mut self) -> Vec<DashboardError> {
        std::mem::take(&mut self.errors)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStatus {
    Published { generation: u64, resolved: usize },
    /// A newer batch was started; this result was dropped.
    Superseded { batch: u64, current: u64 },
    /// The task running the batch was cancelled before publishing.
    Abandoned { batch: u64 },
}

#[derive(Debug, Default)]
pub struct LinkResolutionCache {
    generation: u64,
    published: Option<ResolvedLinks>,
}

impl LinkResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generation of the most recently started batch (0 = none yet).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Start a batch for `connections`, invalidating any batch in flight.
    pub fn begin(&mut self, connections: &[ConnectionRecord]) -> ResolutionBatch {
        self.generation += 1;
        debug!(
            "resolution batch {} started for {} connections",
            self.generation,
            connections.len()
        );
        ResolutionBatch {
            generation: self.generation,
            connections: connections.to_vec(),
        }
    }

    /// Publish a completed batch if it still matches the current generation.
    pub fn publish(&mut self, outcome: BatchOutcome) -> PublishStatus {
        if outcome.generation != self.generation {
            info!(
                "discarding stale resolution batch {} (current {})",
                outcome.generation, self.generation
            );
            return PublishStatus::Superseded {
                batch: outcome.generation,
                current: self.generation,
            };
        }

        let resolved = outcome.endpoints.len();
        self.published = Some(ResolvedLinks {
            generation: outcome.generation,
            endpoints: outcome.endpoints,
            failures: outcome.failures,
        });
        PublishStatus::Published {
            generation: self.generation,
            resolved,
        }
    }

    /// The mapping for the current connection set, or `None` while a batch is
    /// still pending.
    pub fn ready(&self) -> Option<&ResolvedLinks> {
        self.published
            .as_ref()
            .filter(|links| links.generation == self.generation && self.generation > 0)
    }

    pub fn is_ready(&self) -> bool {
        self.ready().is_some()
    }

    /// True when no mapping is ready for the current generation, or when the
    /// ready one excluded failed connections that deserve another attempt.
    pub fn needs_resolution(&self) -> bool {
        match self.ready() {
            Some(links) => !links.failures.is_empty(),
            None => true,
        }
    }

    /// Last published mapping, even if superseded by a pending batch.
    pub fn last_published(&self) -> Option<&ResolvedLinks> {
        self.published.as_ref()
    }
}

impl ResolutionBatch {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn connections(&self) -> &[ConnectionRecord] {
        &self.connections
    }

    /// Dereference every endpoint of the batch in parallel and join.
    pub async fn run<A: ResourceApi>(self, api: &A) -> BatchOutcome {
        let lookups = self.connections.iter().map(|conn| resolve_connection(api, conn));
        let results = join_all(lookups).await;

        let mut endpoints = BTreeMap::new();
        let mut failures = Vec::new();
        let mut errors = Vec::new();
        for (conn, result) in self.connections.iter().zip(results) {
            match result {
                Ok(resolved) => {
                    endpoints.insert(resolved.connection_id, resolved);
                }
                Err(e) => {
                    warn!("{e}");
                    failures.push(ResolutionFailure {
                        connection_id: conn.id,
                        reason: e.to_string(),
                    });
                    errors.push(e);
                }
            }
        }

        debug!(
            "resolution batch {} done: {} resolved, {} failed",
            self.generation,
            endpoints.len(),
            errors.len()
        );
        BatchOutcome {
            generation: self.generation,
            endpoints,
            failures,
            errors,
        }
    }
}

async fn resolve_connection<A: ResourceApi>(
    api: &A,
    conn: &ConnectionRecord,
) -> Result<ConnectionEndpoints, DashboardError> {
    let failed = |source: ApiError| DashboardError::EndpointResolution {
        connection_id: conn.id,
        source,
    };

    let (source, zone) = tokio::try_join!(
        api.fetch_linked(&conn.source_href),
        api.fetch_linked(&conn.zone_href)
    )
    .map_err(failed)?;

    let source_id = source
        .links
        .self_link
        .id()
        .ok_or_else(|| failed(ApiError::InvalidLink(source.links.self_link.href.clone())))?;
    let zone_id = zone
        .links
        .self_link
        .id()
        .ok_or_else(|| failed(ApiError::InvalidLink(zone.links.self_link.href.clone())))?;

    Ok(ConnectionEndpoints {
        connection_id: conn.id,
        source_id,
        zone_id,
    })
}
