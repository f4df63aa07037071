//! Aquaplan dashboard engine
//!
//! Reconciles the HAL topology served by the planning backend (sources,
//! zones, costed connections) with the flat result of the remote allocation,
//! and derives per-source and per-zone utilization snapshots.

pub mod aggregator;
pub mod client;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod hal;
pub mod http;
pub mod models;
pub mod publisher;
pub mod resolution;
pub mod state;
pub mod summary;
pub mod topology;
pub mod workflow;

pub use aggregator::{compute_snapshot, AttributionMode, UtilizationSnapshot};
pub use client::{ApiError, HttpResourceClient, ResourceApi, ResourceKind};
pub use dashboard::Dashboard;
pub use error::DashboardError;
