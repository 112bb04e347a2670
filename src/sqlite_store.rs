//! SQLite-backed [`Store`] implementation.
//!
//! Maps each [`Store`] operation onto the `repositories` and `visits`
//! tables created by [`migrate`](crate::migrate).

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{GeoLocation, NewVisit, RepositoryRecord, VisitEvent, VisitFilter};
use crate::store::Store;

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const VISIT_COLUMNS: &str = "id, ip_address, origin, user_agent, referrer, unique_visitor_token, \
     country, region, city, postal_code, latitude, longitude, isp, organization, created_at";

fn repository_from_row(row: &SqliteRow) -> Result<RepositoryRecord> {
    let topics_json: String = row.get("topics_json");
    let topics: Vec<String> = serde_json::from_str(&topics_json).map_err(Error::query)?;
    Ok(RepositoryRecord {
        external_id: row.get("external_id"),
        name: row.get("name"),
        url: row.get("url"),
        homepage: row.get("homepage"),
        description: row.get("description"),
        topics,
    })
}

fn visit_from_row(row: &SqliteRow) -> VisitEvent {
    VisitEvent {
        id: row.get("id"),
        ip_address: row.get("ip_address"),
        origin: row.get("origin"),
        user_agent: row.get("user_agent"),
        referrer: row.get("referrer"),
        unique_visitor_token: row.get("unique_visitor_token"),
        geo: GeoLocation {
            country: row.get("country"),
            region: row.get("region"),
            city: row.get("city"),
            postal_code: row.get("postal_code"),
            latitude: row.get("latitude"),
            longitude: row.get("longitude"),
            isp: row.get("isp"),
            organization: row.get("organization"),
        },
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn find_repository(&self, external_id: i64) -> Result<Option<RepositoryRecord>> {
        let row = sqlx::query(
            "SELECT external_id, name, url, homepage, description, topics_json FROM repositories WHERE external_id = ?",
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::query)?;

        row.as_ref().map(repository_from_row).transpose()
    }

    async fn upsert_repository(&self, record: &RepositoryRecord) -> Result<bool> {
        let topics_json = serde_json::to_string(&record.topics).map_err(Error::write)?;
        let now = chrono::Utc::now().timestamp();

        // The WHERE clause turns an identical row into a no-op, so the affected
        // row count tells whether anything was written.
        let result = sqlx::query(
            r#"
            INSERT INTO repositories (external_id, name, url, homepage, description, topics_json, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(external_id) DO UPDATE SET
                name = excluded.name,
                url = excluded.url,
                homepage = excluded.homepage,
                description = excluded.description,
                topics_json = excluded.topics_json,
                updated_at = excluded.updated_at
            WHERE name IS NOT excluded.name
               OR url IS NOT excluded.url
               OR homepage IS NOT excluded.homepage
               OR description IS NOT excluded.description
               OR topics_json IS NOT excluded.topics_json
            "#,
        )
        .bind(record.external_id)
        .bind(&record.name)
        .bind(&record.url)
        .bind(&record.homepage)
        .bind(&record.description)
        .bind(&topics_json)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::write)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_repositories(&self) -> Result<Vec<RepositoryRecord>> {
        let rows = sqlx::query(
            "SELECT external_id, name, url, homepage, description, topics_json FROM repositories ORDER BY external_id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::query)?;

        rows.iter().map(repository_from_row).collect()
    }

    async fn insert_visit(&self, visit: &NewVisit) -> Result<VisitEvent> {
        let id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp_millis();

        // created_at is computed inside the statement so it stays strictly
        // increasing even when two inserts land in the same millisecond.
        let created_at = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO visits (id, ip_address, origin, user_agent, referrer, unique_visitor_token,
                                country, region, city, postal_code, latitude, longitude,
                                isp, organization, created_at)
            SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                   MAX(?, COALESCE((SELECT MAX(created_at) FROM visits), 0) + 1)
            RETURNING created_at
            "#,
        )
        .bind(&id)
        .bind(&visit.ip_address)
        .bind(&visit.origin)
        .bind(&visit.user_agent)
        .bind(&visit.referrer)
        .bind(&visit.unique_visitor_token)
        .bind(&visit.geo.country)
        .bind(&visit.geo.region)
        .bind(&visit.geo.city)
        .bind(&visit.geo.postal_code)
        .bind(visit.geo.latitude)
        .bind(visit.geo.longitude)
        .bind(&visit.geo.isp)
        .bind(&visit.geo.organization)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::write)?;

        Ok(VisitEvent {
            id,
            ip_address: visit.ip_address.clone(),
            origin: visit.origin.clone(),
            user_agent: visit.user_agent.clone(),
            referrer: visit.referrer.clone(),
            unique_visitor_token: visit.unique_visitor_token.clone(),
            geo: visit.geo.clone(),
            created_at,
        })
    }

    async fn query_visits(&self, filter: &VisitFilter, limit: i64) -> Result<Vec<VisitEvent>> {
        let sql = format!(
            "SELECT {} FROM visits \
             WHERE (?1 IS NULL OR unique_visitor_token = ?1) AND (?2 IS NULL OR origin = ?2) \
             ORDER BY created_at DESC LIMIT ?3",
            VISIT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(filter.visitor_token())
            .bind(filter.origin())
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::query)?;

        Ok(rows.iter().map(visit_from_row).collect())
    }

    async fn count_visits(&self, filter: &VisitFilter) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM visits \
             WHERE (?1 IS NULL OR unique_visitor_token = ?1) AND (?2 IS NULL OR origin = ?2)",
        )
        .bind(filter.visitor_token())
        .bind(filter.origin())
        .fetch_one(&self.pool)
        .await
        .map_err(Error::query)
    }
}
