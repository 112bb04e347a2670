//! Repository catalog synchronization.
//!
//! Pulls the upstream list through a [`CatalogFetcher`], diffs each entry
//! against the stored record with the same external id, and upserts the
//! ones that are new or changed. The run reports whether anything was
//! actually written.
//!
//! # Flow
//!
//! ```text
//! fetch (timeout-bounded, fatal on failure)
//!   └─▶ for each entry, in upstream order
//!         find_repository(id) ─▶ none?     → new record, write
//!                             ─▶ differs?  → apply fields, write
//!                             ─▶ identical → keep, no write
//! ```
//!
//! A failed lookup or write only affects its own record; the run carries on
//! and lists the id in [`SyncOutcome::failed`].
//!
//! Runs are serialized: a second caller waits for the first to finish, so
//! change detection always compares against the previous run's writes.
//! Across synchronizers sharing one store (the `sync` command next to a
//! running server), the store's upsert is a compare-and-set and only the
//! run that actually wrote a record counts it as a change.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::models::{RepositoryRecord, SyncOutcome};
use crate::store::Store;
use crate::traits::CatalogFetcher;

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

pub struct RepoCatalogSynchronizer {
    fetcher: Arc<dyn CatalogFetcher>,
    store: Arc<dyn Store>,
    fetch_timeout: Duration,
    in_flight: Mutex<()>,
}

impl RepoCatalogSynchronizer {
    pub fn new(fetcher: Arc<dyn CatalogFetcher>, store: Arc<dyn Store>) -> Self {
        Self {
            fetcher,
            store,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            in_flight: Mutex::new(()),
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Run one synchronization against the upstream catalog.
    ///
    /// Returns every resulting record, in upstream order, and whether at
    /// least one record was created or updated. Fails only when the fetch
    /// itself fails.
    pub async fn synchronize(&self) -> Result<SyncOutcome> {
        let _guard = self.in_flight.lock().await;
        let fetcher = self.fetcher.name();

        tracing::info!(fetcher, "synchronizing catalog");
        let entries = match tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(Error::Fetch(format!(
                    "{} timed out after {}s",
                    fetcher,
                    self.fetch_timeout.as_secs_f64()
                )))
            }
        };

        let mut outcome = SyncOutcome {
            change_detected: false,
            items: Vec::with_capacity(entries.len()),
            failed: Vec::new(),
        };

        for entry in &entries {
            let id = entry.external_id;

            let stored = match self.store.find_repository(id).await {
                Ok(stored) => stored,
                Err(e) => {
                    tracing::warn!(external_id = id, error = %e, "repository lookup failed; skipping");
                    let mut record = RepositoryRecord::empty(id);
                    record.apply(entry);
                    outcome.failed.push(id);
                    outcome.items.push(record);
                    continue;
                }
            };

            let (mut record, is_new) = match stored {
                Some(record) => (record, false),
                None => (RepositoryRecord::empty(id), true),
            };

            if !is_new && !record.differs_from(entry) {
                outcome.items.push(record);
                continue;
            }

            record.apply(entry);
            match self.store.upsert_repository(&record).await {
                Ok(true) => {
                    tracing::debug!(external_id = id, name = %record.name, is_new, "repository written");
                    outcome.change_detected = true;
                    outcome.items.push(record);
                }
                Ok(false) => {
                    tracing::debug!(external_id = id, "repository already up to date");
                    outcome.items.push(record);
                }
                Err(e) => {
                    tracing::warn!(external_id = id, error = %e, "repository upsert failed");
                    outcome.failed.push(id);
                    outcome.items.push(record);
                }
            }
        }

        tracing::info!(
            fetcher,
            fetched = entries.len(),
            changed = outcome.change_detected,
            failed = outcome.failed.len(),
            "catalog synchronized"
        );
        Ok(outcome)
    }
}
