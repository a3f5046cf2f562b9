use crate::config::DatabaseConfig;
use crate::models::{NewSensorRecord, NewVlogRecord, RecordQuery, SensorKind, SensorRecord, VlogRecord};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use tracing::{debug, info, instrument};

/// Document store holding sensor readings and vlog metadata
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Append a sensor reading to the collection for `kind`
    async fn insert_sensor(&self, kind: SensorKind, record: NewSensorRecord) -> Result<()>;

    /// List sensor readings ordered by server time
    async fn list_sensors(&self, kind: SensorKind, query: RecordQuery) -> Result<Vec<SensorRecord>>;

    /// Append vlog metadata
    async fn insert_vlog(&self, record: NewVlogRecord) -> Result<()>;

    /// List vlog metadata ordered by server time
    async fn list_vlogs(&self, query: RecordQuery) -> Result<Vec<VlogRecord>>;

    /// Check connectivity
    async fn ping(&self) -> Result<()>;
}

/// PostgreSQL-backed record store. Each collection is a table and the
/// free-form reading content is kept as JSONB.
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    /// Create a new record store with connection pool
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout())
            .idle_timeout(Some(config.idle_timeout()))
            .connect(&config.url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!("Connected to PostgreSQL database");

        Ok(Self { pool })
    }

    /// Create the collection tables if they do not exist yet
    pub async fn ensure_schema(&self) -> Result<()> {
        info!("Ensuring record tables exist");

        for kind in [SensorKind::Gps, SensorKind::Sentiment] {
            let table = kind.collection();

            sqlx::query(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    id BIGSERIAL PRIMARY KEY,
                    type TEXT NOT NULL,
                    content JSONB NOT NULL,
                    client_timestamp TEXT,
                    server_time TIMESTAMPTZ
                )
                "#
            ))
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to create {table} table"))?;

            sqlx::query(&format!(
                "CREATE INDEX IF NOT EXISTS {table}_server_time_idx ON {table} (server_time)"
            ))
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to index {table} table"))?;
        }

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS vlogs (
                id BIGSERIAL PRIMARY KEY,
                filename TEXT NOT NULL,
                file_id TEXT NOT NULL,
                description TEXT,
                server_time TIMESTAMPTZ
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create vlogs table")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS vlogs_server_time_idx ON vlogs (server_time)")
            .execute(&self.pool)
            .await
            .context("Failed to index vlogs table")?;

        info!("Record tables ready");
        Ok(())
    }
}

/// Append ORDER BY and LIMIT clauses for a listing
fn push_listing_clauses(sql: &mut String, query: &RecordQuery) {
    if query.ascending {
        sql.push_str(" ORDER BY server_time ASC NULLS FIRST, id ASC");
    } else {
        sql.push_str(" ORDER BY server_time DESC NULLS LAST, id DESC");
    }

    if query.limit.is_some() {
        sql.push_str(" LIMIT $1");
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    #[instrument(skip(self, record), fields(collection = kind.collection()))]
    async fn insert_sensor(&self, kind: SensorKind, record: NewSensorRecord) -> Result<()> {
        sqlx::query(&format!(
            r#"
            INSERT INTO {} (type, content, client_timestamp, server_time)
            VALUES ($1, $2, $3, $4)
            "#,
            kind.collection()
        ))
        .bind(&record.kind)
        .bind(Json(&record.content))
        .bind(&record.client_timestamp)
        .bind(record.server_time)
        .execute(&self.pool)
        .await
        .context("Failed to insert sensor record")?;

        debug!(collection = kind.collection(), "Sensor record stored");

        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_sensors(&self, kind: SensorKind, query: RecordQuery) -> Result<Vec<SensorRecord>> {
        let mut sql = format!(
            "SELECT type, content, client_timestamp, server_time FROM {}",
            kind.collection()
        );
        push_listing_clauses(&mut sql, &query);

        let mut query_builder = sqlx::query_as::<_, SensorRecord>(&sql);
        if let Some(limit) = query.limit {
            query_builder = query_builder.bind(limit);
        }

        let records = query_builder
            .fetch_all(&self.pool)
            .await
            .context("Failed to query sensor records")?;

        Ok(records)
    }

    #[instrument(skip(self, record), fields(file_id = %record.blob_ref))]
    async fn insert_vlog(&self, record: NewVlogRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO vlogs (filename, file_id, description, server_time)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&record.filename)
        .bind(&record.blob_ref)
        .bind(&record.description)
        .bind(record.server_time)
        .execute(&self.pool)
        .await
        .context("Failed to insert vlog record")?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_vlogs(&self, query: RecordQuery) -> Result<Vec<VlogRecord>> {
        let mut sql = String::from("SELECT filename, file_id, description, server_time FROM vlogs");
        push_listing_clauses(&mut sql, &query);

        let mut query_builder = sqlx::query_as::<_, VlogRecord>(&sql);
        if let Some(limit) = query.limit {
            query_builder = query_builder.bind(limit);
        }

        let vlogs = query_builder
            .fetch_all(&self.pool)
            .await
            .context("Failed to query vlog records")?;

        Ok(vlogs)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("Database ping failed")?;

        Ok(())
    }
}
