//! Granule/count/status persistence using PostgreSQL.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};

use pipeline_common::{
    DownloadMessage, Granule, GranuleCount, GranuleStatus, NewGranule, Platform, PipelineError,
    PipelineResult, DEFAULT_LEASE_SECONDS,
};

/// Database connection pool and granule-pipeline operations.
pub struct Catalog {
    pool: PgPool,
}

/// Outcome of an admission attempt (§4.2.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionOutcome {
    /// The granule id was new; a row was inserted and a download message
    /// should be published.
    Inserted,
    /// The granule id already existed; no-op, nothing to publish.
    AlreadyPresent,
}

/// Outcome of a lease-claim attempt on a single granule (§4.3 step 1–2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// Lease acquired; caller proceeds with the download.
    Claimed(Granule),
    /// Granule not found; drop the message.
    NotFound,
    /// Already downloaded; drop the message.
    AlreadyDownloaded,
    /// Another worker currently holds a live lease.
    LeaseHeld,
    /// `download_retries >= MAX_RETRIES`; abandoned, drop the message.
    RetriesExhausted,
}

impl Catalog {
    /// Create a new catalog connection from database URL with default pool size.
    pub async fn connect(database_url: &str) -> PipelineResult<Self> {
        Self::connect_with_pool_size(database_url, 10).await
    }

    /// Create a new catalog connection from database URL with custom pool size.
    pub async fn connect_with_pool_size(
        database_url: &str,
        max_connections: u32,
    ) -> PipelineResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| PipelineError::Database(format!("connection failed: {e}")))?;

        Ok(Self { pool })
    }

    /// Run database migrations (idempotent: `CREATE TABLE IF NOT EXISTS`).
    pub async fn migrate(&self) -> PipelineResult<()> {
        for statement in SCHEMA_SQL.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| PipelineError::Database(format!("migration failed: {e}")))?;
            }
        }

        Ok(())
    }

    /// Admit a granule: conditional insert keyed on `id` (§4.2.3).
    ///
    /// Returns [`AdmissionOutcome::Inserted`] only when this call's insert
    /// won the race; the caller should publish a download message in that
    /// case and only that case, keeping admission exactly-once.
    pub async fn admit_granule(&self, granule: &NewGranule) -> PipelineResult<AdmissionOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO granule (
                id, filename, tileid, size, checksum,
                beginposition, endposition, ingestiondate, download_url,
                downloaded, in_progress, download_retries, expired, status
            ) VALUES (
                $1, $2, $3, $4, $5,
                $6, $7, $8, $9,
                false, false, 0, false, 'pending'
            )
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&granule.id)
        .bind(&granule.filename)
        .bind(&granule.tileid)
        .bind(granule.size)
        .bind(&granule.checksum)
        .bind(granule.beginposition)
        .bind(granule.endposition)
        .bind(granule.ingestiondate)
        .bind(&granule.download_url)
        .execute(&self.pool)
        .await
        .map_err(|e| PipelineError::Database(format!("admission insert failed: {e}")))?;

        if result.rows_affected() == 1 {
            Ok(AdmissionOutcome::Inserted)
        } else {
            Ok(AdmissionOutcome::AlreadyPresent)
        }
    }

    /// Load a granule by id.
    pub async fn get_granule(&self, id: &str) -> PipelineResult<Option<Granule>> {
        let row = sqlx::query_as::<_, GranuleRow>(GRANULE_SELECT_BY_ID)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PipelineError::Database(format!("query failed: {e}")))?;

        Ok(row.map(Into::into))
    }

    /// Attempt to claim the download lease for `id` (§4.3 steps 1–2).
    ///
    /// A conditional `UPDATE ... WHERE` so at most one caller observes
    /// `Claimed`, even under concurrent workers; stale leases
    /// (`in_progress = true AND lease_expires_at < now()`) are treated as
    /// claimable, folding a hard-killed worker's row back to available
    /// without operator intervention.
    pub async fn claim_lease(&self, id: &str, max_retries: i32) -> PipelineResult<ClaimOutcome> {
        let granule = match self.get_granule(id).await? {
            Some(g) => g,
            None => return Ok(ClaimOutcome::NotFound),
        };

        if granule.downloaded {
            return Ok(ClaimOutcome::AlreadyDownloaded);
        }

        if granule.download_retries >= max_retries {
            // Clear any stale in_progress flag while abandoning.
            self.abandon(id).await?;
            return Ok(ClaimOutcome::RetriesExhausted);
        }

        let lease_expires_at = Utc::now() + chrono::Duration::seconds(DEFAULT_LEASE_SECONDS);

        let result = sqlx::query(
            r#"
            UPDATE granule
            SET in_progress = true,
                download_started = COALESCE(download_started, now()),
                lease_expires_at = $2,
                status = 'in_progress'
            WHERE id = $1
              AND downloaded = false
              AND (in_progress = false OR lease_expires_at < now())
            "#,
        )
        .bind(id)
        .bind(lease_expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| PipelineError::Database(format!("lease claim failed: {e}")))?;

        if result.rows_affected() == 1 {
            let claimed = self
                .get_granule(id)
                .await?
                .ok_or_else(|| PipelineError::Internal("granule vanished after claim".into()))?;
            Ok(ClaimOutcome::Claimed(claimed))
        } else {
            Ok(ClaimOutcome::LeaseHeld)
        }
    }

    /// Update the granule's checksum if upstream reports a different value
    /// (§9, "checksum drift"). Called on every download attempt.
    pub async fn update_checksum(&self, id: &str, checksum: &str) -> PipelineResult<()> {
        sqlx::query("UPDATE granule SET checksum = $2 WHERE id = $1")
            .bind(id)
            .bind(checksum)
            .execute(&self.pool)
            .await
            .map_err(|e| PipelineError::Database(format!("checksum update failed: {e}")))?;

        Ok(())
    }

    /// Optionally rewrite the download URL (§4.3 step 4, IntHub2 routing).
    pub async fn update_download_url(&self, id: &str, download_url: &str) -> PipelineResult<()> {
        sqlx::query("UPDATE granule SET download_url = $2 WHERE id = $1")
            .bind(id)
            .bind(download_url)
            .execute(&self.pool)
            .await
            .map_err(|e| PipelineError::Database(format!("download_url update failed: {e}")))?;

        Ok(())
    }

    /// Commit a successful download (§4.3 step 6).
    pub async fn mark_downloaded(&self, id: &str, object_location: &str) -> PipelineResult<()> {
        sqlx::query(
            r#"
            UPDATE granule
            SET downloaded = true,
                in_progress = false,
                download_finished = now(),
                uploaded_granule_file_location = $2,
                status = 'done',
                lease_expires_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(object_location)
        .execute(&self.pool)
        .await
        .map_err(|e| PipelineError::Database(format!("mark_downloaded failed: {e}")))?;

        Ok(())
    }

    /// Record a transient failure: clear the lease, increment retries
    /// (§4.3 step 7). The caller re-publishes the queue message separately.
    pub async fn record_transient_failure(&self, id: &str) -> PipelineResult<i32> {
        let row: (i32,) = sqlx::query_as(
            r#"
            UPDATE granule
            SET in_progress = false,
                download_retries = download_retries + 1,
                status = 'pending',
                lease_expires_at = NULL
            WHERE id = $1
            RETURNING download_retries
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| PipelineError::Database(format!("transient failure update failed: {e}")))?;

        Ok(row.0)
    }

    /// Mark a granule expired (upstream 404/410, §4.3 state machine).
    pub async fn mark_expired(&self, id: &str) -> PipelineResult<()> {
        sqlx::query(
            r#"
            UPDATE granule
            SET expired = true,
                in_progress = false,
                status = 'expired',
                lease_expires_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| PipelineError::Database(format!("mark_expired failed: {e}")))?;

        Ok(())
    }

    /// Abandon a granule that has exhausted its retry budget: terminal,
    /// no requeue, `downloaded=false`.
    pub async fn abandon(&self, id: &str) -> PipelineResult<()> {
        sqlx::query(
            r#"
            UPDATE granule
            SET in_progress = false,
                status = 'abandoned',
                lease_expires_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| PipelineError::Database(format!("abandon failed: {e}")))?;

        Ok(())
    }

    /// Granules with `downloaded = false` for a given ingestion date, for
    /// the requeuer (§4.4).
    pub async fn find_undownloaded_for_date(&self, date: NaiveDate) -> PipelineResult<Vec<Granule>> {
        let rows = sqlx::query_as::<_, GranuleRow>(&format!(
            "{GRANULE_SELECT_BASE} WHERE ingestiondate = $1 AND downloaded = false ORDER BY id"
        ))
        .bind(date)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PipelineError::Database(format!("query failed: {e}")))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Load (or default-initialize) the discovery cursor state for a
    /// (date, platform) pair, stored in `granule_count`.
    pub async fn get_granule_count(
        &self,
        date: NaiveDate,
        platform: Platform,
    ) -> PipelineResult<GranuleCount> {
        let row = sqlx::query_as::<_, GranuleCountRow>(
            "SELECT date, platform, available_links, fetched_links, last_fetched_at \
             FROM granule_count WHERE date = $1 AND platform = $2",
        )
        .bind(date)
        .bind(platform.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PipelineError::Database(format!("query failed: {e}")))?;

        Ok(row.map(Into::into).unwrap_or(GranuleCount {
            date,
            platform,
            available_links: 0,
            fetched_links: 0,
            last_fetched_at: None,
        }))
    }

    /// Upsert `granule_count` for a (date, platform) pair (§4.2.1 steps 1, 4, 8).
    pub async fn upsert_granule_count(
        &self,
        date: NaiveDate,
        platform: Platform,
        available_links: i64,
        fetched_links: i64,
    ) -> PipelineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO granule_count (date, platform, available_links, fetched_links, last_fetched_at)
            VALUES ($1, $2, $3, $4, now())
            ON CONFLICT (date, platform) DO UPDATE SET
                available_links = EXCLUDED.available_links,
                fetched_links = EXCLUDED.fetched_links,
                last_fetched_at = EXCLUDED.last_fetched_at
            "#,
        )
        .bind(date)
        .bind(platform.as_str())
        .bind(available_links)
        .bind(fetched_links)
        .execute(&self.pool)
        .await
        .map_err(|e| PipelineError::Database(format!("count upsert failed: {e}")))?;

        Ok(())
    }

    /// Read a `status` table entry by key (e.g. the page cursor).
    pub async fn get_status(&self, key: &str) -> PipelineResult<Option<String>> {
        let value: Option<(String,)> = sqlx::query_as("SELECT value FROM status WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PipelineError::Database(format!("query failed: {e}")))?;

        Ok(value.map(|(v,)| v))
    }

    /// Upsert a `status` table entry (§3, "Status entries are upserted on
    /// each fetcher step").
    pub async fn set_status(&self, key: &str, value: &str) -> PipelineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO status (key, value) VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| PipelineError::Database(format!("status upsert failed: {e}")))?;

        Ok(())
    }
}

/// Build the to-download queue message for a freshly-admitted granule.
pub fn download_message_for(granule: &NewGranule) -> DownloadMessage {
    DownloadMessage::from(granule)
}

const GRANULE_SELECT_BASE: &str = "SELECT id, filename, tileid, size, checksum, \
    beginposition, endposition, ingestiondate, download_url, \
    downloaded, in_progress, uploaded_granule_file_location, \
    download_started, download_finished, download_retries, expired, \
    status, lease_expires_at FROM granule";

const GRANULE_SELECT_BY_ID: &str = "SELECT id, filename, tileid, size, checksum, \
    beginposition, endposition, ingestiondate, download_url, \
    downloaded, in_progress, uploaded_granule_file_location, \
    download_started, download_finished, download_retries, expired, \
    status, lease_expires_at FROM granule WHERE id = $1";

#[derive(FromRow)]
struct GranuleRow {
    id: String,
    filename: String,
    tileid: String,
    size: i64,
    checksum: String,
    beginposition: DateTime<Utc>,
    endposition: DateTime<Utc>,
    ingestiondate: NaiveDate,
    download_url: String,
    downloaded: bool,
    in_progress: bool,
    uploaded_granule_file_location: Option<String>,
    download_started: Option<DateTime<Utc>>,
    download_finished: Option<DateTime<Utc>>,
    download_retries: i32,
    expired: bool,
    status: String,
    lease_expires_at: Option<DateTime<Utc>>,
}

impl From<GranuleRow> for Granule {
    fn from(row: GranuleRow) -> Self {
        Granule {
            id: row.id,
            filename: row.filename,
            tileid: row.tileid,
            size: row.size,
            checksum: row.checksum,
            beginposition: row.beginposition,
            endposition: row.endposition,
            ingestiondate: row.ingestiondate,
            download_url: row.download_url,
            downloaded: row.downloaded,
            in_progress: row.in_progress,
            uploaded_granule_file_location: row.uploaded_granule_file_location,
            download_started: row.download_started,
            download_finished: row.download_finished,
            download_retries: row.download_retries,
            expired: row.expired,
            status: row.status.parse().unwrap_or(GranuleStatus::Pending),
            lease_expires_at: row.lease_expires_at,
        }
    }
}

#[derive(FromRow)]
struct GranuleCountRow {
    date: NaiveDate,
    platform: String,
    available_links: i64,
    fetched_links: i64,
    last_fetched_at: Option<DateTime<Utc>>,
}

impl From<GranuleCountRow> for GranuleCount {
    fn from(row: GranuleCountRow) -> Self {
        GranuleCount {
            date: row.date,
            platform: row.platform.parse().unwrap_or(Platform::S2A),
            available_links: row.available_links,
            fetched_links: row.fetched_links,
            last_fetched_at: row.last_fetched_at,
        }
    }
}

/// Database schema SQL, applied idempotently via `Catalog::migrate`.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS granule (
    id TEXT PRIMARY KEY,
    filename TEXT NOT NULL,
    tileid VARCHAR(5) NOT NULL,
    size BIGINT NOT NULL,
    checksum TEXT NOT NULL,
    beginposition TIMESTAMPTZ NOT NULL,
    endposition TIMESTAMPTZ NOT NULL,
    ingestiondate DATE NOT NULL,
    download_url TEXT NOT NULL,
    downloaded BOOLEAN NOT NULL DEFAULT false,
    in_progress BOOLEAN NOT NULL DEFAULT false,
    uploaded_granule_file_location TEXT,
    download_started TIMESTAMPTZ,
    download_finished TIMESTAMPTZ,
    download_retries INTEGER NOT NULL DEFAULT 0,
    expired BOOLEAN NOT NULL DEFAULT false,
    status VARCHAR(20) NOT NULL DEFAULT 'pending',
    lease_expires_at TIMESTAMPTZ
);

CREATE INDEX IF NOT EXISTS idx_granule_ingestiondate ON granule(ingestiondate);
CREATE INDEX IF NOT EXISTS idx_granule_tileid ON granule(tileid);
CREATE INDEX IF NOT EXISTS idx_granule_status ON granule(status);
CREATE INDEX IF NOT EXISTS idx_granule_downloaded ON granule(downloaded);

CREATE TABLE IF NOT EXISTS granule_count (
    date DATE NOT NULL,
    platform VARCHAR(10) NOT NULL,
    available_links BIGINT NOT NULL DEFAULT 0,
    fetched_links BIGINT NOT NULL DEFAULT 0,
    last_fetched_at TIMESTAMPTZ,

    PRIMARY KEY (date, platform)
);

CREATE TABLE IF NOT EXISTS status (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_sql_splits_into_statements() {
        let statements: Vec<_> = SCHEMA_SQL
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        assert!(statements.len() >= 5);
        assert!(statements[0].starts_with("CREATE TABLE IF NOT EXISTS granule"));
    }
}
