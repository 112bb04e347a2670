//! Integration tests against a real SQLite database and local stand-ins for
//! the GitHub and geolocation HTTP APIs.

use axum::{extract::Query, http::StatusCode, routing::get, Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use starlog::catalog::GitHubStarredFetcher;
use starlog::config::{Config, GeoConfig};
use starlog::geo::AbstractApiResolver;
use starlog::models::{NewVisit, RepositoryRecord, VisitFilter};
use starlog::sqlite_store::SqliteStore;
use starlog::store::Store;
use starlog::sync::RepoCatalogSynchronizer;
use starlog::traits::GeoResolver;
use starlog::{db, migrate};

// ─── Helpers ────────────────────────────────────────────────────────

fn test_config(tmp: &TempDir, api_base: &str) -> Config {
    let db_path = tmp.path().join("data").join("starlog.sqlite");
    let content = format!(
        r#"
[db]
path = "{}"

[server]
bind = "127.0.0.1:0"

[catalog]
username = "octocat"
api_base = "{}"
timeout_secs = 5
"#,
        db_path.display(),
        api_base
    );
    toml::from_str(&content).unwrap()
}

async fn sqlite_store(cfg: &Config) -> Arc<SqliteStore> {
    migrate::run_migrations(cfg).await.unwrap();
    let pool = db::connect(cfg).await.unwrap();
    Arc::new(SqliteStore::new(pool))
}

/// Serve `router` on an ephemeral port and return its base URL.
async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    format!("http://{}", addr)
}

type Shared = Arc<Mutex<(StatusCode, Value)>>;

/// A stand-in for `GET /users/{user}/starred` whose response can be swapped.
async fn fake_github(initial: Value) -> (String, Shared) {
    let shared: Shared = Arc::new(Mutex::new((StatusCode::OK, initial)));
    let state = shared.clone();
    let router = Router::new().route(
        "/users/{user}/starred",
        get(move || {
            let state = state.clone();
            async move {
                let (status, body) = state.lock().unwrap().clone();
                (status, Json(body))
            }
        }),
    );
    (serve(router).await, shared)
}

fn repo(id: i64, name: &str, description: Option<&str>, topics: &[&str]) -> Value {
    json!({
        "id": id,
        "name": name,
        "html_url": format!("https://github.com/octocat/{}", name),
        "homepage": null,
        "description": description,
        "topics": topics,
    })
}

// ─── Catalog ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_sync_from_github_then_idempotent() {
    let (base, upstream) = fake_github(json!([repo(1, "a", None, &[])])).await;
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp, &base);
    let store = sqlite_store(&cfg).await;

    let fetcher = Arc::new(GitHubStarredFetcher::new(&cfg.catalog).unwrap());
    let sync = RepoCatalogSynchronizer::new(fetcher, store.clone());

    let first = sync.synchronize().await.unwrap();
    assert!(first.change_detected);
    assert_eq!(first.items.len(), 1);
    assert_eq!(first.items[0].external_id, 1);
    assert_eq!(first.items[0].name, "a");

    let second = sync.synchronize().await.unwrap();
    assert!(!second.change_detected);
    assert_eq!(second.items, first.items);

    // Upstream edits a description and adds a repository
    upstream.lock().unwrap().1 = json!([
        repo(1, "a", Some("now described"), &["rust", "cli"]),
        repo(2, "b", None, &[]),
    ]);
    let third = sync.synchronize().await.unwrap();
    assert!(third.change_detected);

    let stored = store.find_repository(1).await.unwrap().unwrap();
    assert_eq!(stored.description, "now described");
    assert_eq!(stored.topics, vec!["rust", "cli"]);
    assert_eq!(store.list_repositories().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_topic_reorder_is_a_change() {
    let (base, upstream) = fake_github(json!([repo(1, "a", None, &["x", "y"])])).await;
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp, &base);
    let store = sqlite_store(&cfg).await;
    let sync = RepoCatalogSynchronizer::new(
        Arc::new(GitHubStarredFetcher::new(&cfg.catalog).unwrap()),
        store.clone(),
    );
    sync.synchronize().await.unwrap();

    upstream.lock().unwrap().1 = json!([repo(1, "a", None, &["y", "x"])]);
    assert!(sync.synchronize().await.unwrap().change_detected);
}

#[tokio::test]
async fn test_upstream_error_aborts_sync() {
    let (base, upstream) = fake_github(json!([repo(1, "a", None, &[])])).await;
    *upstream.lock().unwrap() = (
        StatusCode::FORBIDDEN,
        json!({"message": "API rate limit exceeded"}),
    );

    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp, &base);
    let store = sqlite_store(&cfg).await;
    let sync = RepoCatalogSynchronizer::new(
        Arc::new(GitHubStarredFetcher::new(&cfg.catalog).unwrap()),
        store.clone(),
    );

    let err = sync.synchronize().await.unwrap_err();
    assert_eq!(err.kind(), "fetch");
    assert!(err.to_string().contains("403"));
    assert!(store.list_repositories().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unreachable_upstream_is_fetch_error() {
    let tmp = TempDir::new().unwrap();
    // Nothing listens on the loopback discard port
    let cfg = test_config(&tmp, "http://127.0.0.1:9");
    let store = sqlite_store(&cfg).await;
    let sync = RepoCatalogSynchronizer::new(
        Arc::new(GitHubStarredFetcher::new(&cfg.catalog).unwrap()),
        store,
    );
    assert_eq!(sync.synchronize().await.unwrap_err().kind(), "fetch");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_synchronizers_on_one_database_report_change_once() {
    let (base, _upstream) = fake_github(json!([
        repo(1, "a", Some("first"), &["rust"]),
        repo(2, "b", None, &[]),
    ]))
    .await;
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp, &base);

    // Separate pools stand in for the `sync` command and a running server.
    let store_a = sqlite_store(&cfg).await;
    let store_b = sqlite_store(&cfg).await;
    let sync_a = RepoCatalogSynchronizer::new(
        Arc::new(GitHubStarredFetcher::new(&cfg.catalog).unwrap()),
        store_a.clone(),
    );
    let sync_b = RepoCatalogSynchronizer::new(
        Arc::new(GitHubStarredFetcher::new(&cfg.catalog).unwrap()),
        store_b,
    );

    let (a, b) = tokio::join!(sync_a.synchronize(), sync_b.synchronize());
    let (a, b) = (a.unwrap(), b.unwrap());
    assert!(a.change_detected != b.change_detected);
    assert!(a.failed.is_empty() && b.failed.is_empty());
    assert_eq!(store_a.list_repositories().await.unwrap().len(), 2);
}

// ─── Store ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_sqlite_upsert_is_compare_and_set() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp, "http://127.0.0.1:9");
    let first = sqlite_store(&cfg).await;
    let second = sqlite_store(&cfg).await;

    // Both writers saw no row for id 1 and now write the same values
    let mut record = RepositoryRecord::empty(1);
    record.name = "a".into();
    record.topics = vec!["rust".into()];
    assert!(first.upsert_repository(&record).await.unwrap());
    assert!(!second.upsert_repository(&record).await.unwrap());

    record.topics = vec!["rust".into(), "cli".into()];
    assert!(second.upsert_repository(&record).await.unwrap());
    assert!(!first.upsert_repository(&record).await.unwrap());
    assert_eq!(first.find_repository(1).await.unwrap().unwrap(), record);
}

#[tokio::test]
async fn test_migrations_idempotent() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp, "http://127.0.0.1:9");
    migrate::run_migrations(&cfg).await.unwrap();
    migrate::run_migrations(&cfg).await.unwrap();
    assert!(cfg.db.path.exists());
}

#[tokio::test]
async fn test_sqlite_visits_filtered_and_ordered() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp, "http://127.0.0.1:9");
    let store = sqlite_store(&cfg).await;

    let mut created = Vec::new();
    for (token, origin) in [("t1", "https://a"), ("t2", "https://a"), ("t1", "https://b")] {
        let event = store
            .insert_visit(&NewVisit {
                ip_address: "1.2.3.4".into(),
                unique_visitor_token: token.into(),
                origin: origin.into(),
                ..Default::default()
            })
            .await
            .unwrap();
        created.push(event);
    }
    assert!(created.windows(2).all(|w| w[0].created_at < w[1].created_at));

    let t1 = VisitFilter {
        visitor_token: Some("t1".into()),
        origin: None,
    };
    let rows = store.query_visits(&t1, 10).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].id, created[2].id);
    assert_eq!(rows[1].id, created[0].id);
    assert_eq!(store.count_visits(&t1).await.unwrap(), 2);

    let origin_a = VisitFilter {
        visitor_token: None,
        origin: Some("https://a".into()),
    };
    assert_eq!(store.count_visits(&origin_a).await.unwrap(), 2);

    let empty_token = VisitFilter {
        visitor_token: Some(String::new()),
        origin: None,
    };
    assert_eq!(store.count_visits(&empty_token).await.unwrap(), 3);
    assert_eq!(store.query_visits(&empty_token, 1).await.unwrap().len(), 1);
}

// ─── Geolocation ────────────────────────────────────────────────────

#[tokio::test]
async fn test_abstract_resolver_against_fake_provider() {
    let router = Router::new().route(
        "/v1",
        get(|Query(params): Query<HashMap<String, String>>| async move {
            if params.get("api_key").map(String::as_str) != Some("secret") {
                return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad key"})));
            }
            (
                StatusCode::OK,
                Json(json!({
                    "ip_address": params.get("ip_address").cloned().unwrap_or_default(),
                    "country": "Mongolia",
                    "region": "Ulaanbaatar",
                    "city": "Ulaanbaatar",
                    "postal_code": null,
                    "latitude": 47.9,
                    "longitude": 106.9,
                    "connection": {"isp_name": "Unitel", "organization_name": null}
                })),
            )
        }),
    );
    let base = serve(router).await;
    let geo_config = GeoConfig {
        provider: "abstract".into(),
        endpoint: format!("{}/v1", base),
        ..Default::default()
    };

    let resolver = AbstractApiResolver::new(&geo_config, "secret").unwrap();
    let geo = resolver.resolve("202.131.0.1").await.unwrap();
    assert_eq!(geo.country, "Mongolia");
    assert_eq!(geo.postal_code, "");
    assert_eq!(geo.isp, "Unitel");
    assert_eq!(geo.organization, "");

    let wrong_key = AbstractApiResolver::new(&geo_config, "nope").unwrap();
    let err = wrong_key.resolve("202.131.0.1").await.unwrap_err();
    assert_eq!(err.kind(), "resolution");
}
