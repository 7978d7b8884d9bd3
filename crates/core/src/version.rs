use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Version token of one stored record.
///
/// `tag` is chosen when the record is first written and survives overwrites;
/// `ver` increments on every write. Tokens match only when both fields match,
/// so a record that was removed and written again never matches a token taken
/// before the removal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjVersion {
    /// Monotonic write counter.
    pub ver: u64,
    /// Identity of the record incarnation.
    pub tag: String,
}

impl ObjVersion {
    /// Creates a version token.
    #[must_use]
    pub fn new(ver: u64, tag: impl Into<String>) -> Self {
        Self {
            ver,
            tag: tag.into(),
        }
    }

    /// Returns the token of the write following this one.
    #[must_use]
    pub fn next(&self) -> Self {
        Self {
            ver: self.ver.saturating_add(1),
            tag: self.tag.clone(),
        }
    }
}

impl Display for ObjVersion {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}:{}", self.tag, self.ver)
    }
}

/// Tracks the version a caller read and the version its last write produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjVersionTracker {
    /// Version observed by the last read, expected by the next write.
    pub read_version: Option<ObjVersion>,
    /// Version produced by the last successful write.
    pub write_version: Option<ObjVersion>,
}

impl ObjVersionTracker {
    /// Creates an empty tracker that places no expectation on writes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tracker expecting the given version.
    #[must_use]
    pub fn expecting(version: ObjVersion) -> Self {
        Self {
            read_version: Some(version),
            write_version: None,
        }
    }

    /// Records the version returned by a read.
    pub fn observe_read(&mut self, version: ObjVersion) {
        self.read_version = Some(version);
    }

    /// Records a successful write; later writes expect the new version.
    pub fn apply_write(&mut self, version: ObjVersion) {
        self.write_version = Some(version.clone());
        self.read_version = Some(version);
    }

    /// Returns the version the next write must match, if any.
    #[must_use]
    pub fn expected_version(&self) -> Option<&ObjVersion> {
        self.read_version.as_ref()
    }
}
