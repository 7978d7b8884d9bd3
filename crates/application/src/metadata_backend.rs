use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use rolestore_core::{AppResult, ObjVersion};

/// One stored record as returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataRecord {
    /// Encoded record body.
    pub data: Bytes,
    /// Opaque attributes stored beside the body.
    pub attrs: BTreeMap<String, Bytes>,
    /// Current version token.
    pub version: ObjVersion,
    /// Modification time recorded by the last write.
    pub mtime: DateTime<Utc>,
}

/// Payload of a single-record write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordWrite {
    /// Encoded record body.
    pub data: Bytes,
    /// Attributes replacing the stored attribute set.
    pub attrs: BTreeMap<String, Bytes>,
    /// Modification time to record.
    pub mtime: DateTime<Utc>,
}

/// Precondition checked atomically with a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteCondition {
    /// Create or overwrite.
    Unconditional,
    /// Fail with already-exists when the key is present.
    Exclusive,
    /// Fail with conflict unless the stored version equals this one.
    IfVersion(ObjVersion),
}

/// Port over the key/value metadata store.
///
/// Every method touches exactly one key; nothing is atomic across keys.
#[async_trait]
pub trait MetadataBackend: Send + Sync {
    /// Reads one record. Missing keys fail with not-found.
    async fn get(&self, key: &str) -> AppResult<MetadataRecord>;

    /// Writes one record under `condition` and returns its new version.
    ///
    /// A new record starts at version 1 with a fresh tag; an overwrite
    /// increments the version and keeps the tag. `IfVersion` against a
    /// missing key is a conflict.
    async fn put(
        &self,
        key: &str,
        write: RecordWrite,
        condition: WriteCondition,
    ) -> AppResult<ObjVersion>;

    /// Removes one record, optionally only at the expected version.
    ///
    /// Missing keys fail with not-found before any version check.
    async fn remove(&self, key: &str, expected: Option<&ObjVersion>) -> AppResult<()>;

    /// Lists keys starting with `prefix`, sorted.
    async fn list_keys(&self, prefix: &str) -> AppResult<Vec<String>>;
}
