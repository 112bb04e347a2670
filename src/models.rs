//! Core data models used throughout starlog.
//!
//! These types represent the repositories pulled from the upstream catalog,
//! the visit events recorded by the analytics endpoint, and the views of
//! both that are handed back to callers.

use serde::{Deserialize, Serialize};

/// One repository summary as returned by a [`CatalogFetcher`](crate::traits::CatalogFetcher).
///
/// Fields are already normalized: absent upstream values arrive as empty
/// strings or an empty topic list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CatalogEntry {
    pub external_id: i64,
    pub name: String,
    pub url: String,
    pub homepage: String,
    pub description: String,
    pub topics: Vec<String>,
}

/// A repository known to the local catalog, one per `external_id`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryRecord {
    pub external_id: i64,
    pub name: String,
    pub url: String,
    pub homepage: String,
    pub description: String,
    pub topics: Vec<String>,
}

impl RepositoryRecord {
    /// An empty record for an identifier the store has never seen.
    pub fn empty(external_id: i64) -> Self {
        Self {
            external_id,
            ..Default::default()
        }
    }

    /// Returns true if any tracked field differs from the fetched entry.
    pub fn differs_from(&self, entry: &CatalogEntry) -> bool {
        self.name != entry.name
            || self.url != entry.url
            || self.homepage != entry.homepage
            || self.description != entry.description
            || topics_changed(&entry.topics, &self.topics)
    }

    /// Overwrites every tracked field with the fetched values.
    ///
    /// `external_id` is left untouched; it is the lookup key.
    pub fn apply(&mut self, entry: &CatalogEntry) {
        self.name = entry.name.clone();
        self.url = entry.url.clone();
        self.homepage = entry.homepage.clone();
        self.description = entry.description.clone();
        self.topics = entry.topics.clone();
    }
}

/// Order-sensitive topic comparison.
///
/// Changed when the lengths differ, or when any position holds a different
/// topic in `fetched` than in `stored`.
pub fn topics_changed(fetched: &[String], stored: &[String]) -> bool {
    if fetched.len() != stored.len() {
        return true;
    }
    fetched.iter().zip(stored.iter()).any(|(f, s)| f != s)
}

/// Result of one synchronization run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub change_detected: bool,
    pub items: Vec<RepositoryRecord>,
    /// External ids whose upsert failed during this run.
    #[serde(skip)]
    pub failed: Vec<i64>,
}

/// Location and connectivity attributes resolved for an IP address.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeoLocation {
    pub country: String,
    pub region: String,
    pub city: String,
    pub postal_code: String,
    pub latitude: f64,
    pub longitude: f64,
    pub isp: String,
    pub organization: String,
}

/// Request metadata needed to record a visit.
///
/// Every field may be empty; nothing beyond presence is validated.
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    pub ip_address: String,
    pub visitor_token: String,
    pub origin: String,
    pub referring_origin: String,
    pub user_agent: String,
    pub referrer: String,
}

/// A visit ready for insertion; the store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewVisit {
    pub ip_address: String,
    pub origin: String,
    pub user_agent: String,
    pub referrer: String,
    pub unique_visitor_token: String,
    pub geo: GeoLocation,
}

/// A persisted, immutable visit event.
#[derive(Debug, Clone, PartialEq)]
pub struct VisitEvent {
    pub id: String,
    pub ip_address: String,
    pub origin: String,
    pub user_agent: String,
    pub referrer: String,
    pub unique_visitor_token: String,
    pub geo: GeoLocation,
    /// Milliseconds since the Unix epoch, strictly increasing per insert.
    pub created_at: i64,
}

/// Conjunctive filter over stored visits. Empty values are not applied.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VisitFilter {
    #[serde(default)]
    pub visitor_token: Option<String>,
    #[serde(default)]
    pub origin: Option<String>,
}

impl VisitFilter {
    pub fn visitor_token(&self) -> Option<&str> {
        self.visitor_token.as_deref().filter(|s| !s.is_empty())
    }

    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref().filter(|s| !s.is_empty())
    }

    /// Whether `event` satisfies every non-empty criterion.
    pub fn matches(&self, event: &VisitEvent) -> bool {
        self.visitor_token()
            .map_or(true, |t| event.unique_visitor_token == t)
            && self.origin().map_or(true, |o| event.origin == o)
    }
}

/// A visit as shown to a requester, after the IP-disclosure policy.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitPublicView {
    pub id: String,
    pub ip_address: String,
    pub origin: String,
    pub user_agent: String,
    pub referrer: String,
    pub unique_visitor_token: String,
    pub country: String,
    pub region: String,
    pub city: String,
    pub postal_code: String,
    pub latitude: f64,
    pub longitude: f64,
    pub isp: String,
    pub organization: String,
    pub created_at: String, // ISO8601
}

impl VisitPublicView {
    /// Builds the public view, disclosing the stored IP only when it equals
    /// `requester_ip`.
    pub fn for_requester(event: VisitEvent, requester_ip: &str) -> Self {
        let ip_address = if event.ip_address == requester_ip {
            event.ip_address
        } else {
            String::new()
        };
        Self {
            id: event.id,
            ip_address,
            origin: event.origin,
            user_agent: event.user_agent,
            referrer: event.referrer,
            unique_visitor_token: event.unique_visitor_token,
            country: event.geo.country,
            region: event.geo.region,
            city: event.geo.city,
            postal_code: event.geo.postal_code,
            latitude: event.geo.latitude,
            longitude: event.geo.longitude,
            isp: event.geo.isp,
            organization: event.geo.organization,
            created_at: format_ts_iso(event.created_at),
        }
    }
}

/// Response shape of a visit query.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitPage {
    pub total_items: i64,
    pub items: Vec<VisitPublicView>,
}

fn format_ts_iso(ts_millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ts_millis)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
        .unwrap_or_else(|| ts_millis.to_string())
}
