//! Storage abstraction for starlog.
//!
//! The [`Store`] trait covers every persistence operation the synchronizer,
//! recorder, and query engine need, so the SQLite backend
//! ([`SqliteStore`](crate::sqlite_store::SqliteStore)) and the in-memory
//! backend ([`InMemoryStore`]) are interchangeable.
//!
//! Implementations must be `Send + Sync` to be shared across request
//! handlers.

pub mod memory;

pub use memory::InMemoryStore;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{NewVisit, RepositoryRecord, VisitEvent, VisitFilter};

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose | Failure kind |
/// |--------|---------|--------------|
/// | [`find_repository`](Store::find_repository) | Look up a record by external id | `Query` |
/// | [`upsert_repository`](Store::upsert_repository) | Insert or update by external id; reports whether it wrote | `Write` |
/// | [`list_repositories`](Store::list_repositories) | All records, by external id | `Query` |
/// | [`insert_visit`](Store::insert_visit) | Persist a new visit | `Write` |
/// | [`query_visits`](Store::query_visits) | Matching visits, newest first | `Query` |
/// | [`count_visits`](Store::count_visits) | Number of matching visits | `Query` |
#[async_trait]
pub trait Store: Send + Sync {
    async fn find_repository(&self, external_id: i64) -> Result<Option<RepositoryRecord>>;

    /// Insert or update the record keyed by its `external_id`.
    ///
    /// The compare and the write are one atomic step: returns `true` when
    /// the row was created or at least one field changed, `false` when the
    /// stored row already matched `record`. Concurrent writers of the same
    /// values therefore see `true` exactly once.
    async fn upsert_repository(&self, record: &RepositoryRecord) -> Result<bool>;

    async fn list_repositories(&self) -> Result<Vec<RepositoryRecord>>;

    /// Persist a visit. The store assigns the id and a `created_at` strictly
    /// greater than that of every earlier visit.
    async fn insert_visit(&self, visit: &NewVisit) -> Result<VisitEvent>;

    /// Visits matching `filter`, ordered by `created_at` descending, at most
    /// `limit` rows.
    async fn query_visits(&self, filter: &VisitFilter, limit: i64) -> Result<Vec<VisitEvent>>;

    async fn count_visits(&self, filter: &VisitFilter) -> Result<i64>;
}
