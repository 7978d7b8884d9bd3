use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::{FromRow, PgPool};
use tracing::info;
use uuid::Uuid;

use rolestore_application::{MetadataBackend, MetadataRecord, RecordWrite, WriteCondition};
use rolestore_core::{AppError, AppResult, ObjVersion};

use crate::record_attrs::{decode_attrs, encode_attrs};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// PostgreSQL-backed metadata backend over the `metadata_records` table.
#[derive(Clone)]
pub struct PostgresMetadataBackend {
    pool: PgPool,
}

impl PostgresMetadataBackend {
    /// Creates a backend with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies pending schema migrations for the `metadata_records` table.
    pub async fn run_migrations(&self) -> AppResult<()> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|error| AppError::Backend(format!("failed to run migrations: {error}")))?;
        info!("metadata record migrations applied");
        Ok(())
    }
}

#[derive(Debug, FromRow)]
struct MetadataRecordRow {
    data: Vec<u8>,
    attrs: String,
    version_ver: i64,
    version_tag: String,
    mtime: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct VersionRow {
    version_ver: i64,
    version_tag: String,
}

impl VersionRow {
    fn into_version(self) -> AppResult<ObjVersion> {
        let ver = u64::try_from(self.version_ver).map_err(|error| {
            AppError::Decode(format!("invalid stored version {}: {error}", self.version_ver))
        })?;
        Ok(ObjVersion::new(ver, self.version_tag))
    }
}

fn stored_ver(version: &ObjVersion) -> AppResult<i64> {
    i64::try_from(version.ver)
        .map_err(|error| AppError::Validation(format!("version {version} is out of range: {error}")))
}

#[async_trait]
impl MetadataBackend for PostgresMetadataBackend {
    async fn get(&self, key: &str) -> AppResult<MetadataRecord> {
        let row = sqlx::query_as::<_, MetadataRecordRow>(
            r#"
            SELECT data, attrs, version_ver, version_tag, mtime
            FROM metadata_records
            WHERE record_key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Backend(format!("failed to read metadata record '{key}': {error}"))
        })?
        .ok_or_else(|| AppError::NotFound(format!("metadata record '{key}' does not exist")))?;

        let version = VersionRow {
            version_ver: row.version_ver,
            version_tag: row.version_tag,
        }
        .into_version()?;

        Ok(MetadataRecord {
            data: Bytes::from(row.data),
            attrs: decode_attrs(row.attrs.as_str())?,
            version,
            mtime: row.mtime,
        })
    }

    async fn put(
        &self,
        key: &str,
        write: RecordWrite,
        condition: WriteCondition,
    ) -> AppResult<ObjVersion> {
        let attrs = encode_attrs(&write.attrs)?;
        let data = write.data.to_vec();

        let row = match &condition {
            WriteCondition::Unconditional => sqlx::query_as::<_, VersionRow>(
                r#"
                INSERT INTO metadata_records (record_key, data, attrs, version_ver, version_tag, mtime)
                VALUES ($1, $2, $3, 1, $4, $5)
                ON CONFLICT (record_key) DO UPDATE
                SET data = EXCLUDED.data,
                    attrs = EXCLUDED.attrs,
                    mtime = EXCLUDED.mtime,
                    version_ver = metadata_records.version_ver + 1
                RETURNING version_ver, version_tag
                "#,
            )
            .bind(key)
            .bind(data)
            .bind(attrs)
            .bind(Uuid::new_v4().simple().to_string())
            .bind(write.mtime)
            .fetch_optional(&self.pool)
            .await,
            WriteCondition::Exclusive => sqlx::query_as::<_, VersionRow>(
                r#"
                INSERT INTO metadata_records (record_key, data, attrs, version_ver, version_tag, mtime)
                VALUES ($1, $2, $3, 1, $4, $5)
                ON CONFLICT (record_key) DO NOTHING
                RETURNING version_ver, version_tag
                "#,
            )
            .bind(key)
            .bind(data)
            .bind(attrs)
            .bind(Uuid::new_v4().simple().to_string())
            .bind(write.mtime)
            .fetch_optional(&self.pool)
            .await,
            WriteCondition::IfVersion(expected) => sqlx::query_as::<_, VersionRow>(
                r#"
                UPDATE metadata_records
                SET data = $2,
                    attrs = $3,
                    mtime = $4,
                    version_ver = version_ver + 1
                WHERE record_key = $1
                    AND version_ver = $5
                    AND version_tag = $6
                RETURNING version_ver, version_tag
                "#,
            )
            .bind(key)
            .bind(data)
            .bind(attrs)
            .bind(write.mtime)
            .bind(stored_ver(expected)?)
            .bind(expected.tag.as_str())
            .fetch_optional(&self.pool)
            .await,
        }
        .map_err(|error| {
            AppError::Backend(format!("failed to write metadata record '{key}': {error}"))
        })?;

        match (row, &condition) {
            (Some(row), _) => row.into_version(),
            (None, WriteCondition::Exclusive) => Err(AppError::AlreadyExists(format!(
                "metadata record '{key}' already exists"
            ))),
            (None, WriteCondition::IfVersion(expected)) => Err(AppError::Conflict(format!(
                "metadata record '{key}' is missing or not at version {expected}"
            ))),
            (None, WriteCondition::Unconditional) => Err(AppError::Backend(format!(
                "upsert of metadata record '{key}' returned no row"
            ))),
        }
    }

    async fn remove(&self, key: &str, expected: Option<&ObjVersion>) -> AppResult<()> {
        let expected_ver = expected.map(stored_ver).transpose()?;
        let expected_tag = expected.map(|version| version.tag.clone());

        let deleted = sqlx::query_scalar::<_, String>(
            r#"
            DELETE FROM metadata_records
            WHERE record_key = $1
                AND ($2::BIGINT IS NULL OR (version_ver = $2 AND version_tag = $3))
            RETURNING record_key
            "#,
        )
        .bind(key)
        .bind(expected_ver)
        .bind(expected_tag)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Backend(format!("failed to remove metadata record '{key}': {error}"))
        })?;

        if deleted.is_some() {
            return Ok(());
        }

        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM metadata_records WHERE record_key = $1)",
        )
        .bind(key)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| {
            AppError::Backend(format!("failed to check metadata record '{key}': {error}"))
        })?;

        if exists {
            Err(AppError::Conflict(format!(
                "metadata record '{key}' changed since it was read"
            )))
        } else {
            Err(AppError::NotFound(format!(
                "metadata record '{key}' does not exist"
            )))
        }
    }

    async fn list_keys(&self, prefix: &str) -> AppResult<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT record_key
            FROM metadata_records
            WHERE starts_with(record_key, $1)
            ORDER BY record_key COLLATE "C"
            "#,
        )
        .bind(prefix)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Backend(format!("failed to list metadata keys: {error}")))
    }
}
