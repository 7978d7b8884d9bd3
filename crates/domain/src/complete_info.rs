use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use rolestore_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::RoleDocument;
use crate::role::Role;

/// Record attribute holding the encoded tag set.
pub const ROLE_TAGS_ATTR: &str = "tagging";

/// A role together with the opaque attributes stored beside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleCompleteInfo {
    /// The role.
    pub info: Role,
    /// Backend attributes passed through unmodified.
    pub attrs: BTreeMap<String, Bytes>,
}

#[derive(Serialize, Deserialize)]
struct CompleteInfoDocument {
    info: RoleDocument,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attrs: BTreeMap<String, String>,
}

impl RoleCompleteInfo {
    /// Wraps a role without attributes.
    #[must_use]
    pub fn new(info: Role) -> Self {
        Self {
            info,
            attrs: BTreeMap::new(),
        }
    }

    /// Returns whether any attributes are attached.
    #[must_use]
    pub fn has_attrs(&self) -> bool {
        !self.attrs.is_empty()
    }

    /// Serializes to `{ "info": <role>, "attrs": { name: base64 } }`.
    pub fn to_json(&self) -> AppResult<Value> {
        let document = CompleteInfoDocument {
            info: RoleDocument::from(&self.info),
            attrs: self
                .attrs
                .iter()
                .map(|(name, value)| (name.clone(), STANDARD.encode(value)))
                .collect(),
        };

        serde_json::to_value(document)
            .map_err(|error| AppError::Internal(format!("failed to serialize role: {error}")))
    }

    /// Parses and validates the JSON form.
    pub fn from_json(value: Value) -> AppResult<Self> {
        let document = serde_json::from_value::<CompleteInfoDocument>(value)
            .map_err(|error| AppError::Decode(format!("malformed role document: {error}")))?;

        let mut attrs = BTreeMap::new();
        for (name, encoded) in document.attrs {
            let decoded = STANDARD.decode(encoded.as_bytes()).map_err(|error| {
                AppError::Decode(format!("attribute '{name}' is not valid base64: {error}"))
            })?;
            attrs.insert(name, Bytes::from(decoded));
        }

        Ok(Self {
            info: Role::try_from(document.info)?,
            attrs,
        })
    }
}
