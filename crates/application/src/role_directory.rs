//! Role directory: maps one role onto its by-id, by-name and by-path records.
//!
//! The by-id record (`roles.<id>`) is the source of truth and holds the
//! encoded role. The by-name (`role_names.<tenant>$<name>`) and by-path
//! (`role_paths.<tenant>$<path><id>`) records are pointers holding only the
//! id. Each record carries its own version token and every operation here
//! touches exactly one record; callers sequence multi-record changes and own
//! the consequences of a partial sequence.

mod keys;
mod params;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use rolestore_core::{AppError, AppResult, ObjVersion, Tenant};
use rolestore_domain::{
    ROLE_TAGS_ATTR, Role, RoleCompleteInfo, RolePointer, validate_role_name, validate_role_path,
};

use crate::metadata_backend::{MetadataBackend, MetadataRecord, RecordWrite};

pub use keys::{NameEntry, PathEntry, ROLE_NAME_OID_PREFIX, ROLE_OID_PREFIX, ROLE_PATH_OID_PREFIX};
pub use params::{GetParams, PutParams, RemoveParams, Versioned};

/// ARN prefix used when none is configured.
pub const DEFAULT_ROLE_ARN_PREFIX: &str = "arn:aws:iam::";

/// Directory configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleDirectoryConfig {
    /// Prefix of derived role ARNs.
    pub arn_prefix: String,
}

impl Default for RoleDirectoryConfig {
    fn default() -> Self {
        Self {
            arn_prefix: DEFAULT_ROLE_ARN_PREFIX.to_owned(),
        }
    }
}

/// Orchestrates role records over a metadata backend.
#[derive(Clone)]
pub struct RoleDirectory {
    backend: Arc<dyn MetadataBackend>,
    config: RoleDirectoryConfig,
}

impl RoleDirectory {
    /// Creates a directory over the given backend.
    #[must_use]
    pub fn new(backend: Arc<dyn MetadataBackend>, config: RoleDirectoryConfig) -> Self {
        Self { backend, config }
    }

    /// Returns the directory configuration.
    #[must_use]
    pub fn config(&self) -> &RoleDirectoryConfig {
        &self.config
    }

    /// Validates a new role, assigns its id, ARN and creation date, and
    /// writes its by-id record.
    ///
    /// Pointers are not written here; the id is only final once this write
    /// succeeds. A role whose pointers were never stored is reachable by id
    /// only until a reconciliation pass restores them.
    pub async fn create(&self, role: &mut Role, params: PutParams) -> AppResult<ObjVersion> {
        role.validate()?;
        params.write_condition()?;

        if role.id().is_empty() {
            role.set_id(Uuid::new_v4().to_string());
        }
        role.set_arn(role.derive_arn(self.config.arn_prefix.as_str()));
        role.set_creation_date(format_creation_date(params.mtime_or_now()));

        self.store_info(role, params).await
    }

    /// Writes the by-id record only, leaving pointers untouched.
    pub async fn store_info(&self, role: &Role, params: PutParams) -> AppResult<ObjVersion> {
        role.validate()?;
        keys::validate_role_id(role.id())?;
        let condition = params.write_condition()?;

        let mut attrs = params.attrs.clone();
        match role.encode_tags()? {
            Some(tags) => {
                attrs.insert(ROLE_TAGS_ATTR.to_owned(), tags);
            }
            None => {
                attrs.remove(ROLE_TAGS_ATTR);
            }
        }

        let key = keys::info_key(role.id());
        let write = RecordWrite {
            data: role.encode()?,
            attrs,
            mtime: params.mtime_or_now(),
        };
        let version = self.backend.put(key.as_str(), write, condition).await?;
        debug!(key = %key, version = %version, "stored role record");

        Ok(version)
    }

    /// Writes the by-name pointer for `(tenant, name)`.
    pub async fn store_name(
        &self,
        role_id: &str,
        name: &str,
        tenant: &Tenant,
        params: PutParams,
    ) -> AppResult<ObjVersion> {
        validate_role_name(name)?;
        keys::validate_role_id(role_id)?;
        self.store_pointer(keys::name_key(tenant, name), role_id, params)
            .await
    }

    /// Writes the by-path pointer for `(tenant, path, id)`.
    pub async fn store_path(
        &self,
        role_id: &str,
        path: &str,
        tenant: &Tenant,
        params: PutParams,
    ) -> AppResult<ObjVersion> {
        validate_role_path(path)?;
        keys::validate_role_id(role_id)?;
        self.store_pointer(keys::path_key(tenant, path, role_id), role_id, params)
            .await
    }

    /// Reads and decodes the by-id record.
    pub async fn read_info(
        &self,
        role_id: &str,
        params: GetParams,
    ) -> AppResult<Versioned<RoleCompleteInfo>> {
        keys::validate_role_id(role_id)?;
        let key = keys::info_key(role_id);
        let record = self.read_record(key.as_str(), &params).await?;

        let mut role = Role::decode(record.data)?;
        if let Some(tags) = record.attrs.get(ROLE_TAGS_ATTR) {
            role.restore_tags(tags.clone())?;
        }

        Ok(Versioned {
            value: RoleCompleteInfo {
                info: role,
                attrs: record.attrs,
            },
            version: record.version,
            mtime: record.mtime,
        })
    }

    /// Resolves `(tenant, name)` to a role id through the by-name pointer.
    pub async fn read_name(
        &self,
        name: &str,
        tenant: &Tenant,
        params: GetParams,
    ) -> AppResult<Versioned<String>> {
        validate_role_name(name)?;
        self.read_pointer(keys::name_key(tenant, name), &params)
            .await
    }

    /// Reads the by-path pointer for `(tenant, path, id)`.
    pub async fn read_path(
        &self,
        role_id: &str,
        path: &str,
        tenant: &Tenant,
        params: GetParams,
    ) -> AppResult<Versioned<String>> {
        validate_role_path(path)?;
        keys::validate_role_id(role_id)?;
        self.read_pointer(keys::path_key(tenant, path, role_id), &params)
            .await
    }

    /// Removes the by-id record.
    pub async fn delete_info(&self, role_id: &str, params: RemoveParams) -> AppResult<()> {
        keys::validate_role_id(role_id)?;
        self.remove_record(keys::info_key(role_id), params).await
    }

    /// Removes the by-name pointer.
    pub async fn delete_name(
        &self,
        name: &str,
        tenant: &Tenant,
        params: RemoveParams,
    ) -> AppResult<()> {
        validate_role_name(name)?;
        self.remove_record(keys::name_key(tenant, name), params)
            .await
    }

    /// Removes the by-path pointer.
    pub async fn delete_path(
        &self,
        role_id: &str,
        path: &str,
        tenant: &Tenant,
        params: RemoveParams,
    ) -> AppResult<()> {
        validate_role_path(path)?;
        keys::validate_role_id(role_id)?;
        self.remove_record(keys::path_key(tenant, path, role_id), params)
            .await
    }

    /// Lists the ids of all by-id records.
    pub async fn list_role_ids(&self) -> AppResult<Vec<String>> {
        let keys = self.backend.list_keys(ROLE_OID_PREFIX).await?;
        Ok(keys
            .iter()
            .filter_map(|key| {
                let parsed = keys::parse_info_key(key);
                if parsed.is_none() {
                    warn!(key = %key, "skipping malformed role record key");
                }
                parsed.map(str::to_owned)
            })
            .collect())
    }

    /// Lists all by-name pointers.
    pub async fn list_name_entries(&self) -> AppResult<Vec<NameEntry>> {
        let keys = self.backend.list_keys(ROLE_NAME_OID_PREFIX).await?;
        Ok(keys
            .iter()
            .filter_map(|key| {
                let parsed = keys::parse_name_key(key);
                if parsed.is_none() {
                    warn!(key = %key, "skipping malformed role name key");
                }
                parsed
            })
            .collect())
    }

    /// Lists by-path pointers whose path starts with `path_prefix`, ordered
    /// by tenant, path and id. Without a tenant every tenant is listed.
    pub async fn list_path_entries(
        &self,
        tenant: Option<&Tenant>,
        path_prefix: &str,
    ) -> AppResult<Vec<PathEntry>> {
        if !path_prefix.starts_with('/') {
            return Err(AppError::Validation(format!(
                "path prefix '{path_prefix}' must start with '/'"
            )));
        }

        let scan_prefix = match tenant {
            Some(tenant) => keys::path_prefix_key(tenant, path_prefix),
            None => ROLE_PATH_OID_PREFIX.to_owned(),
        };

        let keys = self.backend.list_keys(scan_prefix.as_str()).await?;
        let mut entries: Vec<PathEntry> = keys
            .iter()
            .filter_map(|key| {
                let parsed = keys::parse_path_key(key);
                if parsed.is_none() {
                    warn!(key = %key, "skipping malformed role path key");
                }
                parsed
            })
            .filter(|entry| entry.path.starts_with(path_prefix))
            .collect();
        entries.sort_by(|left, right| {
            (&left.tenant, &left.path, &left.role_id).cmp(&(
                &right.tenant,
                &right.path,
                &right.role_id,
            ))
        });

        Ok(entries)
    }

    async fn store_pointer(
        &self,
        key: String,
        role_id: &str,
        params: PutParams,
    ) -> AppResult<ObjVersion> {
        let condition = params.write_condition()?;
        let write = RecordWrite {
            data: RolePointer::new(role_id).encode()?,
            attrs: params.attrs.clone(),
            mtime: params.mtime_or_now(),
        };

        let version = self.backend.put(key.as_str(), write, condition).await?;
        debug!(key = %key, role_id = %role_id, version = %version, "stored role pointer");

        Ok(version)
    }

    async fn read_pointer(&self, key: String, params: &GetParams) -> AppResult<Versioned<String>> {
        let record = self.read_record(key.as_str(), params).await?;
        let pointer = RolePointer::decode(record.data)?;

        Ok(Versioned {
            value: pointer.into_role_id(),
            version: record.version,
            mtime: record.mtime,
        })
    }

    async fn read_record(&self, key: &str, params: &GetParams) -> AppResult<MetadataRecord> {
        let record = self.backend.get(key).await?;
        if let Some(expected) = &params.expected_version {
            if expected != &record.version {
                return Err(AppError::Conflict(format!(
                    "record '{key}' is at version {}, expected {expected}",
                    record.version
                )));
            }
        }

        Ok(record)
    }

    async fn remove_record(&self, key: String, params: RemoveParams) -> AppResult<()> {
        self.backend
            .remove(key.as_str(), params.expected_version.as_ref())
            .await?;
        debug!(key = %key, "removed role record");

        Ok(())
    }
}

/// Formats a timestamp as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
#[must_use]
pub fn format_creation_date(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}
