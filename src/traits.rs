//! Collaborator traits for the upstream catalog and geolocation lookups.
//!
//! The synchronizer and the visit recorder never talk to HTTP directly;
//! they depend on these two traits so that the concrete providers
//! ([`GitHubStarredFetcher`](crate::catalog::GitHubStarredFetcher),
//! [`AbstractApiResolver`](crate::geo::AbstractApiResolver)) can be swapped
//! for in-process fakes in tests.
//!
//! ```text
//!  CatalogFetcher ──▶ RepoCatalogSynchronizer ──▶ Store
//!  GeoResolver    ──▶ VisitRecorder           ──▶ Store
//! ```

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{CatalogEntry, GeoLocation};

// ═══════════════════════════════════════════════════════════════════════
// CatalogFetcher Trait
// ═══════════════════════════════════════════════════════════════════════

/// Read-only source of the upstream repository list.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use starlog::error::Result;
/// use starlog::models::CatalogEntry;
/// use starlog::traits::CatalogFetcher;
///
/// pub struct FixedCatalog(Vec<CatalogEntry>);
///
/// #[async_trait]
/// impl CatalogFetcher for FixedCatalog {
///     fn name(&self) -> &str { "fixed" }
///
///     async fn fetch(&self) -> Result<Vec<CatalogEntry>> {
///         Ok(self.0.clone())
///     }
/// }
/// ```
#[async_trait]
pub trait CatalogFetcher: Send + Sync {
    /// Short identifier used in log output (e.g. `"github:moojigc"`).
    fn name(&self) -> &str;

    /// Return the current upstream list, in upstream order.
    ///
    /// Any failure (network, status, malformed body) is an
    /// [`Error::Fetch`](crate::error::Error::Fetch); no partial list is
    /// returned.
    async fn fetch(&self) -> Result<Vec<CatalogEntry>>;
}

// ═══════════════════════════════════════════════════════════════════════
// GeoResolver Trait
// ═══════════════════════════════════════════════════════════════════════

/// Read-only lookup of location and connectivity data for an IP address.
#[async_trait]
pub trait GeoResolver: Send + Sync {
    /// Short identifier used in log output.
    fn name(&self) -> &str;

    /// Resolve `ip`, or fail with
    /// [`Error::Resolution`](crate::error::Error::Resolution).
    async fn resolve(&self, ip: &str) -> Result<GeoLocation>;
}
