//! Resource server client
//!
//! Handles:
//! - HAL collection reads (`/api/sources`, `/api/zones`, `/api/connections`)
//! - dereferencing association links (connection -> source / zone)
//! - operator creation forms (POST)
//! - triggering the remote optimisation (`/allocate-water`)

use crate::config::ApiConf;
use crate::hal::{
    Collection, ConnectionResource, LinkedResource, SourceResource, ZoneResource,
};
use crate::models::{AllocationResponse, NewConnection, NewSource, NewZone};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("malformed payload from {url}: {reason}")]
    Payload { url: String, reason: String },
    #[error("invalid resource link: {0}")]
    InvalidLink(String),
    #[error("resource server unavailable: {0}")]
    Unavailable(String),
}

/// Kind of top-level resource, used to build canonical locators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Source,
    Zone,
    Connection,
}

impl ResourceKind {
    /// Collection path segment, also the `_embedded` relation name.
    pub fn collection(self) -> &'static str {
        match self {
            ResourceKind::Source => "sources",
            ResourceKind::Zone => "zones",
            ResourceKind::Connection => "connections",
        }
    }
}

/// Everything the engine needs from the resource server.
///
/// Implemented by [`HttpResourceClient`] in production and by in-memory mocks
/// in tests.
pub trait ResourceApi: Send + Sync + 'static {
    fn list_sources(&self) -> impl Future<Output = Result<Vec<SourceResource>, ApiError>> + Send;

    fn list_zones(&self) -> impl Future<Output = Result<Vec<ZoneResource>, ApiError>> + Send;

    fn list_connections(
        &self,
    ) -> impl Future<Output = Result<Vec<ConnectionResource>, ApiError>> + Send;

    /// Dereference an association link (e.g. `/api/connections/5/source`).
    fn fetch_linked(
        &self,
        href: &str,
    ) -> impl Future<Output = Result<LinkedResource, ApiError>> + Send;

    fn create_source(&self, body: &NewSource) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn create_zone(&self, body: &NewZone) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn create_connection(
        &self,
        body: &NewConnection,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Run the remote optimisation.
    fn allocate(&self) -> impl Future<Output = Result<AllocationResponse, ApiError>> + Send;

    /// Canonical locator of a resource, as expected in creation bodies.
    fn resource_href(&self, kind: ResourceKind, id: i64) -> String;
}

/// Client HTTP vers le serveur de ressources HAL
#[derive(Clone)]
pub struct HttpResourceClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpResourceClient {
    pub fn new(conf: &ApiConf) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(conf.request_timeout_secs))
            .user_agent(concat!("aquaplan-dashboard/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| ApiError::Transport {
                url: conf.base_url.clone(),
                source,
            })?;
        Ok(Self {
            http,
            base_url: conf.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        debug!("GET {}", url);
        let response = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT, "application/hal+json, application/json")
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                url: url.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(ApiError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        response.json::<T>().await.map_err(|e| ApiError::Payload {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    async fn post_json<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<(), ApiError> {
        debug!("POST {}", url);
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                url: url.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(ApiError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }

    async fn list<T: DeserializeOwned>(&self, kind: ResourceKind) -> Result<Vec<T>, ApiError> {
        let url = self.url(&format!("/api/{}", kind.collection()));
        let collection: Collection<T> = self.get_json(&url).await?;
        Ok(collection.into_items(kind.collection()))
    }
}

impl ResourceApi for HttpResourceClient {
    async fn list_sources(&self) -> Result<Vec<SourceResource>, ApiError> {
        self.list(ResourceKind::Source).await
    }

    async fn list_zones(&self) -> Result<Vec<ZoneResource>, ApiError> {
        self.list(ResourceKind::Zone).await
    }

    async fn list_connections(&self) -> Result<Vec<ConnectionResource>, ApiError> {
        self.list(ResourceKind::Connection).await
    }

    async fn fetch_linked(&self, href: &str) -> Result<LinkedResource, ApiError> {
        if !href.starts_with("http://") && !href.starts_with("https://") {
            return Err(ApiError::InvalidLink(href.to_string()));
        }
        self.get_json(href).await
    }

    async fn create_source(&self, body: &NewSource) -> Result<(), ApiError> {
        self.post_json(&self.url("/api/sources"), body).await
    }

    async fn create_zone(&self, body: &NewZone) -> Result<(), ApiError> {
        self.post_json(&self.url("/api/zones"), body).await
    }

    async fn create_connection(&self, body: &NewConnection) -> Result<(), ApiError> {
        self.post_json(&self.url("/api/connections"), body).await
    }

    async fn allocate(&self) -> Result<AllocationResponse, ApiError> {
        self.get_json(&self.url("/allocate-water")).await
    }

    fn resource_href(&self, kind: ResourceKind, id: i64) -> String {
        self.url(&format!("/api/{}/{}", kind.collection(), id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_href() {
        let client = HttpResourceClient::new(&ApiConf {
            base_url: "http://localhost:8080/".into(),
            request_timeout_secs: 5,
        })
        .unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert_eq!(
            client.resource_href(ResourceKind::Source, 3),
            "http://localhost:8080/api/sources/3"
        );
        assert_eq!(
            client.resource_href(ResourceKind::Zone, 9),
            "http://localhost:8080/api/zones/9"
        );
    }

    #[tokio::test]
    async fn test_fetch_linked_rejects_relative_href() {
        let client = HttpResourceClient::new(&ApiConf::default()).unwrap();
        let err = client.fetch_linked("api/sources/1").await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidLink(_)));
    }
}
