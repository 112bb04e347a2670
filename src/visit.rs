//! Visit recording.
//!
//! Turns request metadata into a [`VisitEvent`], enriched with whatever the
//! [`GeoResolver`] returns for the requester's IP. Geolocation is
//! best-effort: a failed or slow lookup leaves the geo fields empty and the
//! visit is still stored. The insert itself is not retried.

use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::models::{GeoLocation, NewVisit, RequestInfo, VisitEvent};
use crate::store::Store;
use crate::traits::GeoResolver;

const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Pick the origin to store: an explicit referring origin wins over the
/// `Origin` header; empty values count as absent.
pub fn resolve_origin(referring_origin: &str, origin: &str) -> String {
    if !referring_origin.is_empty() {
        referring_origin.to_string()
    } else {
        origin.to_string()
    }
}

pub struct VisitRecorder {
    resolver: Arc<dyn GeoResolver>,
    store: Arc<dyn Store>,
    resolve_timeout: Duration,
}

impl VisitRecorder {
    pub fn new(resolver: Arc<dyn GeoResolver>, store: Arc<dyn Store>) -> Self {
        Self {
            resolver,
            store,
            resolve_timeout: DEFAULT_RESOLVE_TIMEOUT,
        }
    }

    pub fn with_resolve_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout = timeout;
        self
    }

    /// Record one visit. Only a store write failure is returned as an error.
    pub async fn record(&self, request: &RequestInfo) -> Result<VisitEvent> {
        let geo = self.lookup(&request.ip_address).await;

        let visit = NewVisit {
            ip_address: request.ip_address.clone(),
            origin: resolve_origin(&request.referring_origin, &request.origin),
            user_agent: request.user_agent.clone(),
            referrer: request.referrer.clone(),
            unique_visitor_token: request.visitor_token.clone(),
            geo,
        };

        let event = self.store.insert_visit(&visit).await.map_err(|e| {
            tracing::error!(error = %e, "failed to store visit");
            e
        })?;
        tracing::info!(
            visit_id = %event.id,
            origin = %event.origin,
            country = %event.geo.country,
            "visit recorded"
        );
        Ok(event)
    }

    async fn lookup(&self, ip: &str) -> GeoLocation {
        match tokio::time::timeout(self.resolve_timeout, self.resolver.resolve(ip)).await {
            Ok(Ok(geo)) => geo,
            Ok(Err(e)) => {
                tracing::warn!(resolver = self.resolver.name(), ip, error = %e, "geolocation unavailable");
                GeoLocation::default()
            }
            Err(_) => {
                tracing::warn!(resolver = self.resolver.name(), ip, "geolocation timed out");
                GeoLocation::default()
            }
        }
    }
}
