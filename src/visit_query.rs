//! Visitor-scoped visit queries.
//!
//! Every returned row passes through the IP-disclosure policy in
//! [`VisitPublicView::for_requester`]: a stored IP is only shown to a
//! requester currently connecting from that same IP. Each row is judged on
//! its own, so a visitor token seen from several addresses only reveals the
//! rows matching the current one.
//!
//! Three entry points:
//!
//! | Method | Filter | Rows |
//! |--------|--------|------|
//! | [`query`](VisitorQueryEngine::query) | as given | always |
//! | [`query_public`](VisitorQueryEngine::query_public) | as given | only when a visitor token is given |
//! | [`query_for_visitor`](VisitorQueryEngine::query_for_visitor) | token required | always |

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::models::{VisitFilter, VisitPage, VisitPublicView};
use crate::store::Store;

const DEFAULT_LIMIT: i64 = 20;

pub struct VisitorQueryEngine {
    store: Arc<dyn Store>,
    limit: i64,
}

impl VisitorQueryEngine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            limit: DEFAULT_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit.max(1);
        self
    }

    /// Count and list the most recent visits matching `filter`.
    pub async fn query(&self, filter: &VisitFilter, requester_ip: &str) -> Result<VisitPage> {
        let total_items = self.store.count_visits(filter).await?;
        let items = self
            .store
            .query_visits(filter, self.limit)
            .await?
            .into_iter()
            .map(|event| VisitPublicView::for_requester(event, requester_ip))
            .collect();

        tracing::debug!(
            visitor_token = filter.visitor_token().unwrap_or(""),
            origin = filter.origin().unwrap_or(""),
            total_items,
            "visits queried"
        );
        Ok(VisitPage { total_items, items })
    }

    /// Unauthenticated lookup: without a visitor token only the count is
    /// returned, the rows are withheld.
    pub async fn query_public(&self, filter: &VisitFilter, requester_ip: &str) -> Result<VisitPage> {
        if filter.visitor_token().is_some() {
            return self.query(filter, requester_ip).await;
        }
        let total_items = self.store.count_visits(filter).await?;
        Ok(VisitPage {
            total_items,
            items: Vec::new(),
        })
    }

    /// Token-scoped lookup. A missing or empty token is rejected before the
    /// store is touched.
    pub async fn query_for_visitor(
        &self,
        visitor_token: Option<&str>,
        origin: Option<&str>,
        requester_ip: &str,
    ) -> Result<VisitPage> {
        let token = visitor_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Validation("visitor token header is required".to_string()))?;

        let filter = VisitFilter {
            visitor_token: Some(token.to_string()),
            origin: origin.map(str::to_string),
        };
        self.query(&filter, requester_ip).await
    }
}
