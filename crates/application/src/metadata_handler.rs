use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use rolestore_core::{AppError, AppResult, ObjVersion, ObjVersionTracker};
use rolestore_domain::RoleCompleteInfo;

/// Metadata sections served by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetadataSection {
    /// Identity roles, entries addressed by role id.
    Roles,
}

impl MetadataSection {
    /// Returns the stable section name used in metadata keys.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Roles => "roles",
        }
    }

    /// Parses a section name.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "roles" => Ok(Self::Roles),
            _ => Err(AppError::NotFound(format!(
                "unknown metadata section '{value}'"
            ))),
        }
    }
}

/// How an incoming write is reconciled with the stored record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MetadataSyncType {
    /// Always write.
    #[default]
    ApplyAlways,
    /// Write only over the same incarnation at a strictly lower version.
    ApplyUpdates,
    /// Write only when strictly newer than the stored mtime.
    ApplyNewer,
    /// Write only when nothing is stored.
    ApplyExclusive,
}

impl MetadataSyncType {
    /// Decides whether an incoming object at `incoming`/`incoming_mtime`
    /// replaces the stored record, if any.
    #[must_use]
    pub fn should_apply(
        &self,
        stored: Option<(&ObjVersion, DateTime<Utc>)>,
        incoming: &ObjVersion,
        incoming_mtime: DateTime<Utc>,
    ) -> bool {
        let Some((stored_version, stored_mtime)) = stored else {
            return true;
        };

        match self {
            Self::ApplyAlways => true,
            Self::ApplyUpdates => {
                stored_version.tag == incoming.tag && stored_version.ver < incoming.ver
            }
            Self::ApplyNewer => stored_mtime < incoming_mtime,
            Self::ApplyExclusive => false,
        }
    }
}

/// Outcome of a metadata put.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutStatus {
    /// The object was written.
    Applied,
    /// The sync policy rejected the object; nothing was written.
    NoApply,
}

/// Role payload of a metadata object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleMetadataObject {
    /// Role with its pass-through attributes.
    pub info: RoleCompleteInfo,
    /// Version of the by-id record.
    pub version: ObjVersion,
    /// Modification time of the by-id record.
    pub mtime: DateTime<Utc>,
}

/// Entity-kind variants carried through the metadata registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataObject {
    /// An identity role.
    Role(RoleMetadataObject),
}

impl MetadataObject {
    /// Returns the section this object belongs to.
    #[must_use]
    pub fn section(&self) -> MetadataSection {
        match self {
            Self::Role(_) => MetadataSection::Roles,
        }
    }

    /// Returns the object version.
    #[must_use]
    pub fn version(&self) -> &ObjVersion {
        match self {
            Self::Role(object) => &object.version,
        }
    }

    /// Returns the object modification time.
    #[must_use]
    pub fn mtime(&self) -> DateTime<Utc> {
        match self {
            Self::Role(object) => object.mtime,
        }
    }

    /// Serializes the object payload.
    pub fn dump(&self) -> AppResult<Value> {
        match self {
            Self::Role(object) => object.info.to_json(),
        }
    }
}

/// JSON envelope exchanged through the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataEnvelope {
    /// `section:entry` key.
    pub key: String,
    /// Object version.
    pub ver: ObjVersion,
    /// Object modification time.
    pub mtime: DateTime<Utc>,
    /// Section-specific payload.
    pub data: Value,
}

/// Capability interface implemented once per metadata section.
#[async_trait]
pub trait MetadataHandler: Send + Sync {
    /// Section served by this handler.
    fn section(&self) -> MetadataSection;

    /// Builds a section object from an envelope payload.
    fn decode_object(
        &self,
        version: ObjVersion,
        mtime: DateTime<Utc>,
        data: Value,
    ) -> AppResult<MetadataObject>;

    /// Reads one entry.
    async fn get(&self, entry: &str) -> AppResult<MetadataObject>;

    /// Writes one entry under the given sync policy.
    ///
    /// `tracker` supplies the version a local write expects and receives
    /// the version the write produced.
    async fn put(
        &self,
        entry: &str,
        object: MetadataObject,
        tracker: &mut ObjVersionTracker,
        sync_type: MetadataSyncType,
        from_remote_zone: bool,
    ) -> AppResult<PutStatus>;

    /// Removes one entry after checking the tracker's read version.
    async fn remove(&self, entry: &str, tracker: &mut ObjVersionTracker) -> AppResult<()>;

    /// Lists all entries of the section.
    async fn list_keys(&self) -> AppResult<Vec<String>>;
}
