use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use rolestore_core::{AppError, AppResult, ObjVersionTracker};

use crate::metadata_handler::{
    MetadataEnvelope, MetadataHandler, MetadataSection, MetadataSyncType, PutStatus,
};

/// Registry dispatching `section:entry` metadata keys to section handlers.
#[derive(Clone, Default)]
pub struct MetadataManager {
    handlers: BTreeMap<MetadataSection, Arc<dyn MetadataHandler>>,
}

impl MetadataManager {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the handler for its section. Each section registers once.
    pub fn register(&mut self, handler: Arc<dyn MetadataHandler>) -> AppResult<()> {
        let section = handler.section();
        if self.handlers.contains_key(&section) {
            return Err(AppError::Validation(format!(
                "metadata section '{}' is already registered",
                section.as_str()
            )));
        }

        self.handlers.insert(section, handler);
        Ok(())
    }

    /// Reads an entry and returns its JSON envelope.
    pub async fn get(&self, key: &str) -> AppResult<Value> {
        let (handler, entry) = self.resolve(key)?;
        let object = handler.get(entry).await?;

        let envelope = MetadataEnvelope {
            key: key.to_owned(),
            ver: object.version().clone(),
            mtime: object.mtime(),
            data: object.dump()?,
        };

        serde_json::to_value(envelope)
            .map_err(|error| AppError::Internal(format!("failed to serialize envelope: {error}")))
    }

    /// Writes an entry from its JSON envelope.
    ///
    /// A local put is conditioned on the envelope's `ver`, so an envelope
    /// taken before a later write fails with conflict; `ApplyExclusive`
    /// creates instead. Remote-zone puts are decided by `sync_type` against
    /// the stored record.
    pub async fn put(
        &self,
        key: &str,
        envelope: Value,
        sync_type: MetadataSyncType,
        from_remote_zone: bool,
    ) -> AppResult<PutStatus> {
        let (handler, entry) = self.resolve(key)?;
        let envelope = serde_json::from_value::<MetadataEnvelope>(envelope)
            .map_err(|error| AppError::Decode(format!("malformed metadata envelope: {error}")))?;
        if envelope.key != key {
            return Err(AppError::Validation(format!(
                "envelope key '{}' does not match '{key}'",
                envelope.key
            )));
        }

        let mut tracker = if from_remote_zone || sync_type == MetadataSyncType::ApplyExclusive {
            ObjVersionTracker::new()
        } else {
            ObjVersionTracker::expecting(envelope.ver.clone())
        };
        let object = handler.decode_object(envelope.ver, envelope.mtime, envelope.data)?;
        handler
            .put(entry, object, &mut tracker, sync_type, from_remote_zone)
            .await
    }

    /// Removes an entry, checking the tracker's read version when set.
    pub async fn remove(&self, key: &str, tracker: &mut ObjVersionTracker) -> AppResult<()> {
        let (handler, entry) = self.resolve(key)?;
        handler.remove(entry, tracker).await
    }

    /// Lists entries of a section.
    pub async fn list_keys(&self, section: MetadataSection) -> AppResult<Vec<String>> {
        self.handler(section)?.list_keys().await
    }

    fn handler(&self, section: MetadataSection) -> AppResult<&dyn MetadataHandler> {
        self.handlers
            .get(&section)
            .map(|handler| handler.as_ref())
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "metadata section '{}' is not registered",
                    section.as_str()
                ))
            })
    }

    fn resolve<'a>(&self, key: &'a str) -> AppResult<(&dyn MetadataHandler, &'a str)> {
        let Some((section, entry)) = key.split_once(':') else {
            return Err(AppError::Validation(format!(
                "metadata key '{key}' must have the form section:entry"
            )));
        };
        if entry.is_empty() {
            return Err(AppError::Validation(format!(
                "metadata key '{key}' has an empty entry"
            )));
        }

        let handler = self.handler(MetadataSection::parse(section)?)?;
        Ok((handler, entry))
    }
}
