//! HAL wire format of the resource server
//!
//! The resource server exposes Spring-style HAL collections:
//! - `{ "_embedded": { "<rel>": [...] } }` for lists
//! - every resource carries `_links.self.href`; identities live in the
//!   trailing path segment of that href
//! - connections only carry association links (`_links.source`,
//!   `_links.zone`) that must be dereferenced to learn the endpoint ids

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub href: String,
}

impl Link {
    pub fn new(href: impl Into<String>) -> Self {
        Self { href: href.into() }
    }

    /// Identity encoded in the trailing path segment.
    pub fn id(&self) -> Option<i64> {
        extract_id(&self.href)
    }
}

/// `_links` object; `self` is the only relation every resource must carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Links {
    #[serde(rename = "self")]
    pub self_link: Link,
    #[serde(flatten)]
    pub related: BTreeMap<String, Link>,
}

impl Links {
    pub fn new(self_href: impl Into<String>) -> Self {
        Self {
            self_link: Link::new(self_href),
            related: BTreeMap::new(),
        }
    }

    pub fn with(mut self, rel: &str, href: impl Into<String>) -> Self {
        self.related.insert(rel.to_string(), Link::new(href));
        self
    }

    pub fn get(&self, rel: &str) -> Option<&Link> {
        self.related.get(rel)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceResource {
    pub capacity: f64,
    #[serde(rename = "_links")]
    pub links: Links,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneResource {
    pub demand: f64,
    pub priority: i32,
    #[serde(default)]
    pub filled_capacity: Option<f64>,
    #[serde(rename = "_links")]
    pub links: Links,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionResource {
    pub cost_per_unit: f64,
    #[serde(rename = "_links")]
    pub links: Links,
}

/// Any resource reached through an association link; only its self link matters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedResource {
    #[serde(rename = "_links")]
    pub links: Links,
}

/// `{ "_embedded": { "<rel>": [...] } }`
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Collection<T> {
    #[serde(rename = "_embedded", default)]
    embedded: BTreeMap<String, Vec<T>>,
}

impl<T> Collection<T> {
    /// Items under `rel`; a missing `_embedded` or relation is an empty list.
    pub fn into_items(mut self, rel: &str) -> Vec<T> {
        self.embedded.remove(rel).unwrap_or_default()
    }
}

/// Extrait l'identifiant depuis le dernier segment d'un href
/// Ex: "http://localhost:8080/api/sources/12" -> Some(12)
pub fn extract_id(href: &str) -> Option<i64> {
    let path = href.split(['?', '#']).next().unwrap_or(href);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .and_then(|segment| segment.parse::<i64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_id() {
        assert_eq!(extract_id("http://localhost:8080/api/sources/12"), Some(12));
        assert_eq!(extract_id("http://localhost:8080/api/zones/3/"), Some(3));
        assert_eq!(extract_id("/api/connections/7?projection=full"), Some(7));
        assert_eq!(extract_id("7"), Some(7));
        assert_eq!(extract_id("http://localhost:8080/api/connections/5/source"), None);
        assert_eq!(extract_id(""), None);
    }

    #[test]
    fn test_collection_without_embedded_is_empty() {
        let json = r#"{ "_links": { "self": { "href": "http://x/api/sources" } } }"#;
        let col: Collection<SourceResource> = serde_json::from_str(json).unwrap();
        assert!(col.into_items("sources").is_empty());
    }

    fn items<T: serde::de::DeserializeOwned>(json: &str, rel: &str) -> Vec<T> {
        serde_json::from_str::<Collection<T>>(json).unwrap().into_items(rel)
    }

    #[test]
    fn test_collection_of_any_resource() {
        let json = r#"{ "_embedded": { "sources": [
            { "_links": { "self": { "href": "http://x/api/sources/4" } } }
        ] } }"#;
        let linked: Vec<LinkedResource> = items(json, "sources");
        assert_eq!(linked[0].links.self_link.id(), Some(4));
        assert!(items::<LinkedResource>("{}", "sources").is_empty());
    }

    #[test]
    fn test_connection_links_parse() {
        let json = r#"{
            "_embedded": { "connections": [ {
                "costPerUnit": 2.5,
                "weightedCost": 0.0,
                "_links": {
                    "self": { "href": "http://x/api/connections/5" },
                    "connection": { "href": "http://x/api/connections/5" },
                    "source": { "href": "http://x/api/connections/5/source" },
                    "zone": { "href": "http://x/api/connections/5/zone" }
                }
            } ] }
        }"#;
        let col: Collection<ConnectionResource> = serde_json::from_str(json).unwrap();
        let items = col.into_items("connections");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].links.self_link.id(), Some(5));
        assert_eq!(
            items[0].links.get("source").map(|l| l.href.as_str()),
            Some("http://x/api/connections/5/source")
        );
    }
}
