//! Text form of record attributes shared by the Redis and PostgreSQL adapters.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use rolestore_core::{AppError, AppResult};

/// Encodes attributes as a JSON object of base64 strings.
pub(crate) fn encode_attrs(attrs: &BTreeMap<String, Bytes>) -> AppResult<String> {
    let encoded: BTreeMap<&str, String> = attrs
        .iter()
        .map(|(name, value)| (name.as_str(), STANDARD.encode(value)))
        .collect();

    serde_json::to_string(&encoded)
        .map_err(|error| AppError::Internal(format!("failed to encode record attrs: {error}")))
}

/// Decodes attributes written by [`encode_attrs`].
pub(crate) fn decode_attrs(text: &str) -> AppResult<BTreeMap<String, Bytes>> {
    let encoded = serde_json::from_str::<BTreeMap<String, String>>(text)
        .map_err(|error| AppError::Decode(format!("stored record attrs are malformed: {error}")))?;

    encoded
        .into_iter()
        .map(|(name, value)| {
            STANDARD
                .decode(value.as_bytes())
                .map(|decoded| (name.clone(), Bytes::from(decoded)))
                .map_err(|error| {
                    AppError::Decode(format!("stored attr '{name}' is not base64: {error}"))
                })
        })
        .collect()
}
