//! In-memory [`Store`] implementation for tests and throwaway runs.
//!
//! Uses a `BTreeMap` and a `Vec` behind `std::sync::RwLock`. Visits are kept
//! in insertion order, which is also `created_at` order.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{NewVisit, RepositoryRecord, VisitEvent, VisitFilter};

use super::Store;

/// In-memory store.
pub struct InMemoryStore {
    repos: RwLock<BTreeMap<i64, RepositoryRecord>>,
    visits: RwLock<Vec<VisitEvent>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            repos: RwLock::new(BTreeMap::new()),
            visits: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: PoisonError<T>) -> String {
    "in-memory store lock poisoned".to_string()
}

#[async_trait]
impl Store for InMemoryStore {
    async fn find_repository(&self, external_id: i64) -> Result<Option<RepositoryRecord>> {
        let repos = self.repos.read().map_err(|e| Error::Query(poisoned(e)))?;
        Ok(repos.get(&external_id).cloned())
    }

    async fn upsert_repository(&self, record: &RepositoryRecord) -> Result<bool> {
        let mut repos = self.repos.write().map_err(|e| Error::Write(poisoned(e)))?;
        if repos.get(&record.external_id) == Some(record) {
            return Ok(false);
        }
        repos.insert(record.external_id, record.clone());
        Ok(true)
    }

    async fn list_repositories(&self) -> Result<Vec<RepositoryRecord>> {
        let repos = self.repos.read().map_err(|e| Error::Query(poisoned(e)))?;
        Ok(repos.values().cloned().collect())
    }

    async fn insert_visit(&self, visit: &NewVisit) -> Result<VisitEvent> {
        let mut visits = self.visits.write().map_err(|e| Error::Write(poisoned(e)))?;
        let now = chrono::Utc::now().timestamp_millis();
        let created_at = match visits.last() {
            Some(last) if last.created_at >= now => last.created_at + 1,
            _ => now,
        };
        let event = VisitEvent {
            id: Uuid::new_v4().to_string(),
            ip_address: visit.ip_address.clone(),
            origin: visit.origin.clone(),
            user_agent: visit.user_agent.clone(),
            referrer: visit.referrer.clone(),
            unique_visitor_token: visit.unique_visitor_token.clone(),
            geo: visit.geo.clone(),
            created_at,
        };
        visits.push(event.clone());
        Ok(event)
    }

    async fn query_visits(&self, filter: &VisitFilter, limit: i64) -> Result<Vec<VisitEvent>> {
        let visits = self.visits.read().map_err(|e| Error::Query(poisoned(e)))?;
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        Ok(visits
            .iter()
            .rev()
            .filter(|v| filter.matches(v))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count_visits(&self, filter: &VisitFilter) -> Result<i64> {
        let visits = self.visits.read().map_err(|e| Error::Query(poisoned(e)))?;
        Ok(visits.iter().filter(|v| filter.matches(v)).count() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visit(token: &str) -> NewVisit {
        NewVisit {
            ip_address: "10.0.0.1".into(),
            unique_visitor_token: token.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_created_at_strictly_increases() {
        let store = InMemoryStore::new();
        let mut last = i64::MIN;
        for _ in 0..20 {
            let event = store.insert_visit(&visit("t")).await.unwrap();
            assert!(event.created_at > last);
            last = event.created_at;
        }
    }

    #[tokio::test]
    async fn test_query_newest_first_with_limit() {
        let store = InMemoryStore::new();
        let first = store.insert_visit(&visit("t")).await.unwrap();
        let second = store.insert_visit(&visit("t")).await.unwrap();
        store.insert_visit(&visit("other")).await.unwrap();

        let filter = VisitFilter {
            visitor_token: Some("t".into()),
            origin: None,
        };
        let rows = store.query_visits(&filter, 10).await.unwrap();
        assert_eq!(rows, vec![second.clone(), first]);

        let rows = store.query_visits(&filter, 1).await.unwrap();
        assert_eq!(rows, vec![second]);
        assert_eq!(store.count_visits(&filter).await.unwrap(), 2);
        assert_eq!(store.count_visits(&VisitFilter::default()).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_external_id() {
        let store = InMemoryStore::new();
        let mut record = RepositoryRecord::empty(3);
        record.name = "old".into();
        assert!(store.upsert_repository(&record).await.unwrap());
        assert!(!store.upsert_repository(&record).await.unwrap());
        record.name = "new".into();
        assert!(store.upsert_repository(&record).await.unwrap());

        let all = store.list_repositories().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "new");
    }
}
