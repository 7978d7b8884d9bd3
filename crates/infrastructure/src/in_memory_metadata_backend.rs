use std::collections::BTreeMap;
use std::ops::Bound;

use async_trait::async_trait;
use rolestore_application::{MetadataBackend, MetadataRecord, RecordWrite, WriteCondition};
use rolestore_core::{AppError, AppResult, ObjVersion};
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory metadata backend implementation.
///
/// Every check and write happens under one write lock, so conditional
/// writes are atomic per key.
#[derive(Debug, Default)]
pub struct InMemoryMetadataBackend {
    records: RwLock<BTreeMap<String, MetadataRecord>>,
}

impl InMemoryMetadataBackend {
    /// Creates an empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
        }
    }

    /// Returns the number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Returns whether no records are stored.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl MetadataBackend for InMemoryMetadataBackend {
    async fn get(&self, key: &str) -> AppResult<MetadataRecord> {
        self.records
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("metadata record '{key}' does not exist")))
    }

    async fn put(
        &self,
        key: &str,
        write: RecordWrite,
        condition: WriteCondition,
    ) -> AppResult<ObjVersion> {
        let mut records = self.records.write().await;
        let current = records.get(key).map(|record| &record.version);

        let version = match (&condition, current) {
            (WriteCondition::Exclusive, Some(_)) => {
                return Err(AppError::AlreadyExists(format!(
                    "metadata record '{key}' already exists"
                )));
            }
            (WriteCondition::IfVersion(expected), None) => {
                return Err(AppError::Conflict(format!(
                    "metadata record '{key}' does not exist, expected version {expected}"
                )));
            }
            (WriteCondition::IfVersion(expected), Some(current)) if expected != current => {
                return Err(AppError::Conflict(format!(
                    "metadata record '{key}' is at version {current}, expected {expected}"
                )));
            }
            (_, Some(current)) => current.next(),
            (_, None) => ObjVersion::new(1, Uuid::new_v4().simple().to_string()),
        };

        records.insert(
            key.to_owned(),
            MetadataRecord {
                data: write.data,
                attrs: write.attrs,
                version: version.clone(),
                mtime: write.mtime,
            },
        );

        Ok(version)
    }

    async fn remove(&self, key: &str, expected: Option<&ObjVersion>) -> AppResult<()> {
        let mut records = self.records.write().await;
        let Some(record) = records.get(key) else {
            return Err(AppError::NotFound(format!(
                "metadata record '{key}' does not exist"
            )));
        };

        if let Some(expected) = expected {
            if expected != &record.version {
                return Err(AppError::Conflict(format!(
                    "metadata record '{key}' is at version {}, expected {expected}",
                    record.version
                )));
            }
        }

        records.remove(key);
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> AppResult<Vec<String>> {
        Ok(self
            .records
            .read()
            .await
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }
}
