use bytes::Bytes;
use rolestore_core::AppResult;

use crate::codec::{RecordDecoder, RecordEncoder};

const POINTER_SCHEMA_VERSION: u8 = 1;

/// Index record resolving a name or path entry to a role id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePointer {
    role_id: String,
}

impl RolePointer {
    /// Creates a pointer to the given role.
    #[must_use]
    pub fn new(role_id: impl Into<String>) -> Self {
        Self {
            role_id: role_id.into(),
        }
    }

    /// Returns the referenced role id.
    #[must_use]
    pub fn role_id(&self) -> &str {
        self.role_id.as_str()
    }

    /// Consumes the pointer, returning the role id.
    #[must_use]
    pub fn into_role_id(self) -> String {
        self.role_id
    }

    /// Encodes the pointer record.
    pub fn encode(&self) -> AppResult<Bytes> {
        let mut encoder = RecordEncoder::new();
        encoder.put_versioned(POINTER_SCHEMA_VERSION, POINTER_SCHEMA_VERSION, |body| {
            body.put_str(self.role_id.as_str())
        })?;
        Ok(encoder.finish())
    }

    /// Decodes a pointer record.
    pub fn decode(data: Bytes) -> AppResult<Self> {
        let mut decoder = RecordDecoder::new(data);
        let role_id = decoder.get_versioned(POINTER_SCHEMA_VERSION, |body, _| body.get_string())?;
        decoder.finish()?;
        Ok(Self { role_id })
    }
}
