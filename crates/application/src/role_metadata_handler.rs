use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use rolestore_core::{AppError, AppResult, ObjVersion, ObjVersionTracker};
use rolestore_domain::{Role, RoleCompleteInfo};

use crate::metadata_handler::{
    MetadataHandler, MetadataObject, MetadataSection, MetadataSyncType, PutStatus,
    RoleMetadataObject,
};
use crate::role_directory::{GetParams, PutParams, RemoveParams, RoleDirectory};

/// Record attribute holding the version a remote zone assigned to a synced role.
pub const ROLE_SYNC_VERSION_ATTR: &str = "sync_version";

/// Serves the `roles` metadata section on top of the role directory.
///
/// Entries are role ids. A put writes the by-id record, refreshes the role's
/// name and path pointers and drops the pointers of a previous name or path;
/// a remove deletes all three.
///
/// Remote-zone writes keep the sender's version in [`ROLE_SYNC_VERSION_ATTR`]
/// and later remote writes are compared against it rather than against the
/// local record version. A local write clears it.
#[derive(Clone)]
pub struct RoleMetadataHandler {
    directory: RoleDirectory,
}

impl RoleMetadataHandler {
    /// Creates a handler over the given directory.
    #[must_use]
    pub fn new(directory: RoleDirectory) -> Self {
        Self { directory }
    }

    async fn stored_role(&self, role_id: &str) -> AppResult<Option<StoredRole>> {
        let stored = match self.directory.read_info(role_id, GetParams::default()).await {
            Ok(stored) => stored,
            Err(AppError::NotFound(_)) => return Ok(None),
            Err(error) => return Err(error),
        };

        let sync_version = match stored.value.attrs.get(ROLE_SYNC_VERSION_ATTR) {
            Some(data) => decode_sync_version(data)?,
            None => stored.version.clone(),
        };

        Ok(Some(StoredRole {
            role: stored.value.info,
            version: stored.version,
            sync_version,
            mtime: stored.mtime,
        }))
    }

    async fn refresh_pointers(&self, info: &RoleCompleteInfo) -> AppResult<()> {
        let role = &info.info;
        if let Err(error) = self
            .directory
            .store_name(role.id(), role.name(), role.tenant(), PutParams::default())
            .await
        {
            warn!(role_id = %role.id(), error = %error, "role stored but name pointer write failed");
            return Err(error);
        }

        if let Err(error) = self
            .directory
            .store_path(role.id(), role.path(), role.tenant(), PutParams::default())
            .await
        {
            warn!(role_id = %role.id(), error = %error, "role stored but path pointer write failed");
            return Err(error);
        }

        Ok(())
    }

    async fn drop_moved_pointers(&self, previous: &Role, current: &Role) -> AppResult<()> {
        if previous.tenant() != current.tenant() || previous.name() != current.name() {
            match self
                .directory
                .read_name(previous.name(), previous.tenant(), GetParams::default())
                .await
            {
                Ok(pointer) if pointer.value == current.id() => {
                    let removed = self
                        .directory
                        .delete_name(
                            previous.name(),
                            previous.tenant(),
                            RemoveParams::expecting(pointer.version),
                        )
                        .await;
                    if let Err(error) = removed {
                        warn!(
                            role_id = %current.id(),
                            name = %previous.name(),
                            error = %error,
                            "role renamed but old name pointer removal failed"
                        );
                        return Err(error);
                    }
                }
                Ok(_) | Err(AppError::NotFound(_)) => {}
                Err(error) => return Err(error),
            }
        }

        if previous.tenant() != current.tenant() || previous.path() != current.path() {
            match self
                .directory
                .delete_path(
                    previous.id(),
                    previous.path(),
                    previous.tenant(),
                    RemoveParams::default(),
                )
                .await
            {
                Ok(()) | Err(AppError::NotFound(_)) => {}
                Err(error) => {
                    warn!(
                        role_id = %current.id(),
                        path = %previous.path(),
                        error = %error,
                        "role moved but old path pointer removal failed"
                    );
                    return Err(error);
                }
            }
        }

        Ok(())
    }
}

struct StoredRole {
    role: Role,
    version: ObjVersion,
    sync_version: ObjVersion,
    mtime: DateTime<Utc>,
}

fn encode_sync_version(version: &ObjVersion) -> AppResult<Bytes> {
    serde_json::to_vec(version)
        .map(Bytes::from)
        .map_err(|error| AppError::Internal(format!("failed to encode sync version: {error}")))
}

fn decode_sync_version(data: &Bytes) -> AppResult<ObjVersion> {
    serde_json::from_slice(data)
        .map_err(|error| AppError::Decode(format!("stored sync version is malformed: {error}")))
}

#[async_trait]
impl MetadataHandler for RoleMetadataHandler {
    fn section(&self) -> MetadataSection {
        MetadataSection::Roles
    }

    fn decode_object(
        &self,
        version: ObjVersion,
        mtime: DateTime<Utc>,
        data: Value,
    ) -> AppResult<MetadataObject> {
        Ok(MetadataObject::Role(RoleMetadataObject {
            info: RoleCompleteInfo::from_json(data)?,
            version,
            mtime,
        }))
    }

    async fn get(&self, entry: &str) -> AppResult<MetadataObject> {
        let stored = self.directory.read_info(entry, GetParams::default()).await?;

        Ok(MetadataObject::Role(RoleMetadataObject {
            info: stored.value,
            version: stored.version,
            mtime: stored.mtime,
        }))
    }

    async fn put(
        &self,
        entry: &str,
        object: MetadataObject,
        tracker: &mut ObjVersionTracker,
        sync_type: MetadataSyncType,
        from_remote_zone: bool,
    ) -> AppResult<PutStatus> {
        let MetadataObject::Role(mut object) = object;
        if object.info.info.id().is_empty() {
            object.info.info.set_id(entry);
        } else if object.info.info.id() != entry {
            return Err(AppError::Validation(format!(
                "role id '{}' does not match metadata entry '{entry}'",
                object.info.info.id()
            )));
        }

        let stored = self.stored_role(entry).await?;
        let mut params = PutParams {
            mtime: Some(object.mtime),
            attrs: object.info.attrs.clone(),
            ..PutParams::default()
        };
        params.attrs.remove(ROLE_SYNC_VERSION_ATTR);

        if from_remote_zone {
            let compared = stored
                .as_ref()
                .map(|stored| (&stored.sync_version, stored.mtime));
            if !sync_type.should_apply(compared, &object.version, object.mtime) {
                debug!(
                    role_id = %entry,
                    incoming = %object.version,
                    sync_type = ?sync_type,
                    "skipping remote role write"
                );
                return Ok(PutStatus::NoApply);
            }

            match &stored {
                Some(stored) => params.expected_version = Some(stored.version.clone()),
                None => params.exclusive = true,
            }
            params.attrs.insert(
                ROLE_SYNC_VERSION_ATTR.to_owned(),
                encode_sync_version(&object.version)?,
            );
        } else if sync_type == MetadataSyncType::ApplyExclusive {
            params.exclusive = true;
        } else {
            params.expected_version = tracker.expected_version().cloned();
        }

        let version = self.directory.store_info(&object.info.info, params).await?;
        tracker.apply_write(version);

        self.refresh_pointers(&object.info).await?;
        if let Some(previous) = stored {
            self.drop_moved_pointers(&previous.role, &object.info.info)
                .await?;
        }

        Ok(PutStatus::Applied)
    }

    async fn remove(&self, entry: &str, tracker: &mut ObjVersionTracker) -> AppResult<()> {
        let stored = self.directory.read_info(entry, GetParams::default()).await?;
        if let Some(expected) = tracker.expected_version() {
            if expected != &stored.version {
                return Err(AppError::Conflict(format!(
                    "role '{entry}' is at version {}, expected {expected}",
                    stored.version
                )));
            }
        }

        self.directory
            .delete_info(entry, RemoveParams::expecting(stored.version.clone()))
            .await?;
        tracker.observe_read(stored.version);

        let role = &stored.value.info;
        match self
            .directory
            .read_name(role.name(), role.tenant(), GetParams::default())
            .await
        {
            Ok(pointer) if pointer.value == entry => {
                if let Err(error) = self
                    .directory
                    .delete_name(
                        role.name(),
                        role.tenant(),
                        RemoveParams::expecting(pointer.version),
                    )
                    .await
                {
                    warn!(role_id = %entry, error = %error, "failed to remove role name pointer");
                }
            }
            Ok(pointer) => {
                debug!(
                    role_id = %entry,
                    other_role_id = %pointer.value,
                    "role name pointer belongs to another role"
                );
            }
            Err(AppError::NotFound(_)) => {
                warn!(role_id = %entry, "role name pointer already missing");
            }
            Err(error) => return Err(error),
        }

        match self
            .directory
            .delete_path(role.id(), role.path(), role.tenant(), RemoveParams::default())
            .await
        {
            Ok(()) => Ok(()),
            Err(AppError::NotFound(_)) => {
                warn!(role_id = %entry, "role path pointer already missing");
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    async fn list_keys(&self) -> AppResult<Vec<String>> {
        self.directory.list_role_ids().await
    }
}

#[cfg(test)]
mod tests;
