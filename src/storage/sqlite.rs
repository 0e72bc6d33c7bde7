//! SQLite run store implementation
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Dashboards keep reading while runs are written
//! - **Atomic runs**: A run and its children are inserted in one transaction
//! - **Cascading deletes**: Removing a run removes its page results, failures
//!   and request errors (`ON DELETE CASCADE`, foreign keys enabled per connection)
//! - **Migrations**: Automatic schema versioning with sqlx
//!
//! Timestamps are stored as Unix milliseconds.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use crate::model::{
    Failure, NewRun, Page, PageResult, RequestError, Run, RunId, RunRecord, Site, SiteId, Stamped,
};

use super::backend::{HealthStatus, RunStore};
use super::error::{StorageError, StorageResult};

const RUN_COLUMNS: &str = "id, site_id, started_at, ended_at, status, \
                           critical_count, major_count, minor_count, summary";

/// SQLite run store
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteStore {
    /// Open (or create) the database and run migrations
    ///
    /// ```no_run
    /// # use synthetic_monitoring::storage::sqlite::SqliteStore;
    /// # async fn example() -> anyhow::Result<()> {
    /// let store = SqliteStore::new("./monitoring.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite store at: {}", db_path_str);

        if let Some(parent) = db_path
            .as_ref()
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }

    fn column<T: TryFrom<i64>>(row: &SqliteRow, name: &str) -> StorageResult<T> {
        Self::narrow(name, row.get::<i64, _>(name))
    }

    fn optional_column<T: TryFrom<i64>>(row: &SqliteRow, name: &str) -> StorageResult<Option<T>> {
        row.get::<Option<i64>, _>(name)
            .map(|value| Self::narrow(name, value))
            .transpose()
    }

    fn narrow<T: TryFrom<i64>>(name: &str, value: i64) -> StorageResult<T> {
        T::try_from(value)
            .map_err(|_| StorageError::SerializationError(format!("{name} out of range: {value}")))
    }

    fn widen(name: &str, value: u64) -> StorageResult<i64> {
        i64::try_from(value)
            .map_err(|_| StorageError::SerializationError(format!("{name} out of range: {value}")))
    }

    fn site_from_row(row: &SqliteRow, pages: Vec<Page>) -> StorageResult<Site> {
        let recipients: String = row.get("alert_recipients");
        Ok(Site {
            id: row.get("id"),
            name: row.get("name"),
            base_url: row.get("base_url"),
            enabled: row.get("enabled"),
            frequency_seconds: Self::optional_column(row, "frequency_seconds")?,
            alert_recipients: serde_json::from_str(&recipients)?,
            pages,
        })
    }

    fn page_from_row(row: &SqliteRow) -> Page {
        Page {
            id: row.get("id"),
            name: row.get("name"),
            path: row.get("path"),
            enabled: row.get("enabled"),
        }
    }

    fn run_from_row(row: &SqliteRow) -> StorageResult<Run> {
        let status: String = row.get("status");
        Ok(Run {
            id: row.get("id"),
            site_id: row.get("site_id"),
            started_at: Self::millis_to_timestamp(row.get("started_at")),
            ended_at: Self::millis_to_timestamp(row.get("ended_at")),
            status: status.parse()?,
            critical_count: Self::column(row, "critical_count")?,
            major_count: Self::column(row, "major_count")?,
            minor_count: Self::column(row, "minor_count")?,
            summary: row.get("summary"),
        })
    }

    fn page_result_from_row(row: &SqliteRow) -> StorageResult<PageResult> {
        Ok(PageResult {
            page_id: row.get("page_id"),
            final_url: row.get("final_url"),
            ttfb_ms: Self::optional_column(row, "ttfb_ms")?,
            dom_ms: Self::optional_column(row, "dom_ms")?,
            load_ms: Self::optional_column(row, "load_ms")?,
            requests_count: Self::column(row, "requests_count")?,
            total_bytes: Self::column(row, "total_bytes")?,
        })
    }

    fn failure_from_row(row: &SqliteRow) -> StorageResult<Failure> {
        let severity: String = row.get("severity");
        let failure_type: String = row.get("type");
        Ok(Failure {
            page_id: row.get("page_id"),
            severity: severity.parse()?,
            failure_type: failure_type.parse()?,
            message: row.get("message"),
            url: row.get("url"),
        })
    }

    fn request_error_from_row(row: &SqliteRow) -> StorageResult<RequestError> {
        Ok(RequestError {
            page_id: row.get("page_id"),
            resource_type: row.get("resource_type"),
            url: row.get("url"),
            status: Self::optional_column(row, "status")?,
            duration_ms: Self::optional_column(row, "duration_ms")?,
            error_message: row.get("error_message"),
        })
    }

    fn stamp<T>(row: &SqliteRow, item: T) -> Stamped<T> {
        Stamped {
            run_id: row.get("run_id"),
            recorded_at: Self::millis_to_timestamp(row.get("recorded_at")),
            item,
        }
    }

    /// Child rows of one table for the runs of a site within a range
    async fn children_in_range(
        &self,
        table: &str,
        site_id: SiteId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<SqliteRow>> {
        let sql = format!(
            r#"
            SELECT c.*, r.started_at AS recorded_at
            FROM {table} c
            JOIN runs r ON r.id = c.run_id
            WHERE r.site_id = ? AND r.started_at >= ? AND r.started_at <= ?
            ORDER BY r.started_at ASC, r.id ASC, c.id ASC
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(site_id)
            .bind(Self::timestamp_to_millis(&from))
            .bind(Self::timestamp_to_millis(&to))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn children_of_run(&self, table: &str, run_id: RunId) -> StorageResult<Vec<SqliteRow>> {
        let sql = format!("SELECT * FROM {table} WHERE run_id = ? ORDER BY id ASC");
        let rows = sqlx::query(&sql).bind(run_id).fetch_all(&self.pool).await?;
        Ok(rows)
    }

    async fn pages_of(&self, site_id: SiteId) -> StorageResult<Vec<Page>> {
        let rows = sqlx::query("SELECT id, name, path, enabled FROM pages WHERE site_id = ? ORDER BY id")
            .bind(site_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(Self::page_from_row).collect())
    }
}

#[async_trait]
impl RunStore for SqliteStore {
    #[instrument(skip(self, site), fields(site_id = site.id))]
    async fn put_site(&self, site: Site) -> StorageResult<()> {
        let recipients = serde_json::to_string(&site.alert_recipients)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO sites (id, name, base_url, enabled, frequency_seconds, alert_recipients)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                name = excluded.name,
                base_url = excluded.base_url,
                enabled = excluded.enabled,
                frequency_seconds = excluded.frequency_seconds,
                alert_recipients = excluded.alert_recipients
            "#,
        )
        .bind(site.id)
        .bind(&site.name)
        .bind(&site.base_url)
        .bind(site.enabled)
        .bind(
            site.frequency_seconds
                .map(|v| Self::widen("frequency_seconds", v))
                .transpose()?,
        )
        .bind(recipients)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM pages WHERE site_id = ?")
            .bind(site.id)
            .execute(&mut *tx)
            .await?;

        for page in &site.pages {
            sqlx::query(
                r#"
                INSERT INTO pages (id, site_id, name, path, enabled)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT (id) DO UPDATE SET
                    site_id = excluded.site_id,
                    name = excluded.name,
                    path = excluded.path,
                    enabled = excluded.enabled
                "#,
            )
            .bind(page.id)
            .bind(site.id)
            .bind(&page.name)
            .bind(&page.path)
            .bind(page.enabled)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("stored site with {} pages", site.pages.len());
        Ok(())
    }

    async fn get_site(&self, site_id: SiteId) -> StorageResult<Option<Site>> {
        let row = sqlx::query("SELECT * FROM sites WHERE id = ?")
            .bind(site_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let pages = self.pages_of(site_id).await?;
                Ok(Some(Self::site_from_row(&row, pages)?))
            }
            None => Ok(None),
        }
    }

    async fn list_sites(&self) -> StorageResult<Vec<Site>> {
        let site_rows = sqlx::query("SELECT * FROM sites ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        let page_rows = sqlx::query("SELECT id, site_id, name, path, enabled FROM pages ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        let mut pages: HashMap<SiteId, Vec<Page>> = HashMap::new();
        for row in &page_rows {
            pages
                .entry(row.get("site_id"))
                .or_default()
                .push(Self::page_from_row(row));
        }

        site_rows
            .iter()
            .map(|row| {
                let id: SiteId = row.get("id");
                Self::site_from_row(row, pages.remove(&id).unwrap_or_default())
            })
            .collect()
    }

    async fn latest_run(&self, site_id: SiteId) -> StorageResult<Option<Run>> {
        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM runs WHERE site_id = ? \
             ORDER BY started_at DESC, id DESC LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(site_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::run_from_row).transpose()
    }

    #[instrument(skip(self, new_run), fields(site_id = new_run.site_id))]
    async fn insert_run(&self, new_run: NewRun) -> StorageResult<Run> {
        let mut tx = self.pool.begin().await?;

        let exists = sqlx::query("SELECT 1 FROM sites WHERE id = ?")
            .bind(new_run.site_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(StorageError::NotFound(format!("site {}", new_run.site_id)));
        }

        let result = sqlx::query(
            r#"
            INSERT INTO runs (
                site_id, started_at, ended_at, status,
                critical_count, major_count, minor_count, summary
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(new_run.site_id)
        .bind(Self::timestamp_to_millis(&new_run.started_at))
        .bind(Self::timestamp_to_millis(&new_run.ended_at))
        .bind(new_run.status.as_str())
        .bind(i64::from(new_run.counts.critical))
        .bind(i64::from(new_run.counts.major))
        .bind(i64::from(new_run.counts.minor))
        .bind(&new_run.summary)
        .execute(&mut *tx)
        .await?;

        let run_id = result.last_insert_rowid();

        for page in &new_run.page_results {
            sqlx::query(
                r#"
                INSERT INTO page_results (
                    run_id, page_id, final_url, ttfb_ms, dom_ms, load_ms,
                    requests_count, total_bytes
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(run_id)
            .bind(page.page_id)
            .bind(&page.final_url)
            .bind(page.ttfb_ms.map(i64::from))
            .bind(page.dom_ms.map(i64::from))
            .bind(page.load_ms.map(i64::from))
            .bind(i64::from(page.requests_count))
            .bind(Self::widen("total_bytes", page.total_bytes)?)
            .execute(&mut *tx)
            .await?;
        }

        for failure in &new_run.failures {
            sqlx::query(
                r#"
                INSERT INTO failures (run_id, page_id, severity, type, message, url)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(run_id)
            .bind(failure.page_id)
            .bind(failure.severity.as_str())
            .bind(failure.failure_type.as_str())
            .bind(&failure.message)
            .bind(&failure.url)
            .execute(&mut *tx)
            .await?;
        }

        for error in &new_run.request_errors {
            sqlx::query(
                r#"
                INSERT INTO request_errors (
                    run_id, page_id, resource_type, url, status, duration_ms, error_message
                )
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(run_id)
            .bind(error.page_id)
            .bind(&error.resource_type)
            .bind(&error.url)
            .bind(error.status.map(i64::from))
            .bind(
                error
                    .duration_ms
                    .map(|v| Self::widen("duration_ms", v))
                    .transpose()?,
            )
            .bind(&error.error_message)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(
            "stored run {run_id} with {} page results, {} failures, {} request errors",
            new_run.page_results.len(),
            new_run.failures.len(),
            new_run.request_errors.len()
        );

        Ok(Run {
            id: run_id,
            site_id: new_run.site_id,
            started_at: new_run.started_at,
            ended_at: new_run.ended_at,
            status: new_run.status,
            critical_count: new_run.counts.critical,
            major_count: new_run.counts.major,
            minor_count: new_run.counts.minor,
            summary: new_run.summary,
        })
    }

    async fn get_run(&self, run_id: RunId) -> StorageResult<Option<RunRecord>> {
        let sql = format!("SELECT {RUN_COLUMNS} FROM runs WHERE id = ?");
        let Some(row) = sqlx::query(&sql)
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let run = Self::run_from_row(&row)?;

        let page_results = self
            .children_of_run("page_results", run_id)
            .await?
            .iter()
            .map(Self::page_result_from_row)
            .collect::<StorageResult<Vec<_>>>()?;
        let failures = self
            .children_of_run("failures", run_id)
            .await?
            .iter()
            .map(Self::failure_from_row)
            .collect::<StorageResult<Vec<_>>>()?;
        let request_errors = self
            .children_of_run("request_errors", run_id)
            .await?
            .iter()
            .map(Self::request_error_from_row)
            .collect::<StorageResult<Vec<_>>>()?;

        Ok(Some(RunRecord {
            run,
            page_results,
            failures,
            request_errors,
        }))
    }

    #[instrument(skip(self))]
    async fn runs_in_range(
        &self,
        site_id: SiteId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<Run>> {
        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM runs \
             WHERE site_id = ? AND started_at >= ? AND started_at <= ? \
             ORDER BY started_at ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(site_id)
            .bind(Self::timestamp_to_millis(&from))
            .bind(Self::timestamp_to_millis(&to))
            .fetch_all(&self.pool)
            .await?;

        let runs = rows
            .iter()
            .map(Self::run_from_row)
            .collect::<StorageResult<Vec<_>>>()?;
        debug!("query returned {} runs", runs.len());
        Ok(runs)
    }

    async fn failures_in_range(
        &self,
        site_id: SiteId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<Stamped<Failure>>> {
        self.children_in_range("failures", site_id, from, to)
            .await?
            .iter()
            .map(|row| Ok(Self::stamp(row, Self::failure_from_row(row)?)))
            .collect()
    }

    async fn page_results_in_range(
        &self,
        site_id: SiteId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<Stamped<PageResult>>> {
        self.children_in_range("page_results", site_id, from, to)
            .await?
            .iter()
            .map(|row| Ok(Self::stamp(row, Self::page_result_from_row(row)?)))
            .collect()
    }

    async fn request_errors_in_range(
        &self,
        site_id: SiteId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<Stamped<RequestError>>> {
        self.children_in_range("request_errors", site_id, from, to)
            .await?
            .iter()
            .map(|row| Ok(Self::stamp(row, Self::request_error_from_row(row)?)))
            .collect()
    }

    #[instrument(skip(self), fields(before = %before))]
    async fn delete_runs_before(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        info!("cleaning up runs older than {}", before);

        let result = sqlx::query("DELETE FROM runs WHERE started_at < ?")
            .bind(Self::timestamp_to_millis(&before))
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() as usize;
        info!("deleted {} old runs", deleted);

        Ok(deleted)
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        match sqlx::query("SELECT COUNT(*) AS runs FROM runs")
            .fetch_one(&self.pool)
            .await
        {
            Ok(row) => {
                let runs: i64 = row.get("runs");
                Ok(HealthStatus {
                    healthy: true,
                    message: "SQLite backend operational".to_string(),
                    metadata: HashMap::from([
                        ("backend".to_string(), "sqlite".to_string()),
                        ("db_path".to_string(), self.db_path.clone()),
                        ("runs".to_string(), runs.to_string()),
                    ]),
                })
            }
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }
}
