use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use rolestore_core::{AppError, AppResult, ObjVersion};

use crate::metadata_backend::{MetadataBackend, MetadataRecord, RecordWrite, WriteCondition};

/// Backend fake keeping records in a sorted map.
///
/// Writes whose key starts with `failing_prefix` fail with a backend error,
/// which lets tests interrupt multi-record sequences midway.
#[derive(Default)]
pub(crate) struct FakeMetadataBackend {
    pub(crate) records: Mutex<BTreeMap<String, MetadataRecord>>,
    pub(crate) failing_prefix: Mutex<Option<String>>,
    pub(crate) calls: AtomicUsize,
    next_tag: AtomicUsize,
}

impl FakeMetadataBackend {
    pub(crate) fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) async fn fail_writes_under(&self, prefix: &str) {
        *self.failing_prefix.lock().await = Some(prefix.to_owned());
    }

    pub(crate) async fn keys(&self) -> Vec<String> {
        self.records.lock().await.keys().cloned().collect()
    }

    async fn check_failure(&self, key: &str) -> AppResult<()> {
        match self.failing_prefix.lock().await.as_deref() {
            Some(prefix) if key.starts_with(prefix) => {
                Err(AppError::Backend(format!("injected failure for '{key}'")))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl MetadataBackend for FakeMetadataBackend {
    async fn get(&self, key: &str) -> AppResult<MetadataRecord> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.records
            .lock()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("record '{key}' does not exist")))
    }

    async fn put(
        &self,
        key: &str,
        write: RecordWrite,
        condition: WriteCondition,
    ) -> AppResult<ObjVersion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure(key).await?;

        let mut records = self.records.lock().await;
        let current = records.get(key).map(|record| record.version.clone());
        let version = match (condition, current) {
            (WriteCondition::Exclusive, Some(_)) => {
                return Err(AppError::AlreadyExists(format!("record '{key}' exists")));
            }
            (WriteCondition::IfVersion(_), None) => {
                return Err(AppError::Conflict(format!("record '{key}' does not exist")));
            }
            (WriteCondition::IfVersion(expected), Some(current)) if expected != current => {
                return Err(AppError::Conflict(format!(
                    "record '{key}' is at version {current}, expected {expected}"
                )));
            }
            (_, Some(current)) => current.next(),
            (_, None) => {
                let tag = self.next_tag.fetch_add(1, Ordering::SeqCst);
                ObjVersion::new(1, format!("tag-{tag}"))
            }
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
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure(key).await?;

        let mut records = self.records.lock().await;
        let Some(record) = records.get(key) else {
            return Err(AppError::NotFound(format!("record '{key}' does not exist")));
        };
        if let Some(expected) = expected {
            if expected != &record.version {
                return Err(AppError::Conflict(format!(
                    "record '{key}' is at version {}, expected {expected}",
                    record.version
                )));
            }
        }

        records.remove(key);
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> AppResult<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .records
            .lock()
            .await
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}
