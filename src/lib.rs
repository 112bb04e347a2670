//! # starlog
//!
//! Keeps a local catalog of starred repositories in sync with GitHub and
//! records site visits enriched with IP geolocation.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐   ┌─────────────────────────┐
//! │ CatalogFetcher │──▶│ RepoCatalogSynchronizer │──┐
//! │   (GitHub)     │   └─────────────────────────┘  │   ┌──────────┐
//! └────────────────┘                                ├──▶│  Store   │
//! ┌────────────────┐   ┌─────────────────────────┐  │   │ (SQLite) │
//! │  GeoResolver   │──▶│      VisitRecorder      │──┘   └────┬─────┘
//! └────────────────┘   └─────────────────────────┘           │
//!                      ┌─────────────────────────┐           │
//!                      │   VisitorQueryEngine    │◀──────────┘
//!                      └─────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! starlog init                 # create database
//! starlog sync                 # pull starred repositories once
//! starlog repos                # list stored repositories
//! starlog serve                # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error kinds |
//! | [`models`] | Core data types |
//! | [`traits`] | Catalog and geolocation collaborator traits |
//! | [`store`] | Storage trait and in-memory backend |
//! | [`sqlite_store`] | SQLite storage backend |
//! | [`catalog`] | GitHub starred-repositories fetcher |
//! | [`geo`] | Geolocation providers |
//! | [`sync`] | Catalog synchronization |
//! | [`visit`] | Visit recording |
//! | [`visit_query`] | Visit queries and IP disclosure |
//! | [`server`] | HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod geo;
pub mod migrate;
pub mod models;
pub mod server;
pub mod sqlite_store;
pub mod store;
pub mod sync;
pub mod traits;
pub mod visit;
pub mod visit_query;

pub use error::{Error, Result};
