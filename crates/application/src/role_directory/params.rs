use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use rolestore_core::{AppError, AppResult, ObjVersion};

use crate::metadata_backend::WriteCondition;

/// Options for a single-record write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutParams {
    /// Modification time to record; now when absent.
    pub mtime: Option<DateTime<Utc>>,
    /// Fail with already-exists when the record is present.
    pub exclusive: bool,
    /// Fail with conflict unless the stored record is at this version.
    pub expected_version: Option<ObjVersion>,
    /// Attributes stored beside the record body.
    pub attrs: BTreeMap<String, Bytes>,
}

impl PutParams {
    /// Parameters for an exclusive create.
    #[must_use]
    pub fn exclusive() -> Self {
        Self {
            exclusive: true,
            ..Self::default()
        }
    }

    /// Parameters for an overwrite of the given version.
    #[must_use]
    pub fn expecting(version: ObjVersion) -> Self {
        Self {
            expected_version: Some(version),
            ..Self::default()
        }
    }

    pub(crate) fn write_condition(&self) -> AppResult<WriteCondition> {
        match (self.exclusive, &self.expected_version) {
            (true, Some(_)) => Err(AppError::Validation(
                "an exclusive write cannot also expect an existing version".to_owned(),
            )),
            (true, None) => Ok(WriteCondition::Exclusive),
            (false, Some(version)) => Ok(WriteCondition::IfVersion(version.clone())),
            (false, None) => Ok(WriteCondition::Unconditional),
        }
    }

    pub(crate) fn mtime_or_now(&self) -> DateTime<Utc> {
        self.mtime.unwrap_or_else(Utc::now)
    }
}

/// Options for a single-record read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetParams {
    /// Fail with conflict unless the stored record is at this version.
    pub expected_version: Option<ObjVersion>,
}

/// Options for a single-record removal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoveParams {
    /// Fail with conflict unless the stored record is at this version.
    pub expected_version: Option<ObjVersion>,
}

impl RemoveParams {
    /// Parameters for a removal of the given version.
    #[must_use]
    pub fn expecting(version: ObjVersion) -> Self {
        Self {
            expected_version: Some(version),
        }
    }
}

/// A decoded record with the version and mtime it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    /// Decoded record.
    pub value: T,
    /// Version token at read time.
    pub version: ObjVersion,
    /// Modification time at read time.
    pub mtime: DateTime<Utc>,
}
