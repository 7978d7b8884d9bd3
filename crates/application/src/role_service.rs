//! Request-facing role operations composed from single-record directory calls.
//!
//! Every read-modify-write here writes back conditioned on the version it
//! read, so a concurrent writer surfaces as a conflict. Nothing is retried.

use rolestore_core::{AppError, AppResult, ObjVersion, Tenant};
use rolestore_domain::{Role, RoleCompleteInfo, extract_name_tenant};
use tracing::warn;

use crate::role_directory::{GetParams, PutParams, RoleDirectory, Versioned};

mod lifecycle;
mod policies;

/// Role administration on top of the role directory.
#[derive(Clone)]
pub struct RoleService {
    directory: RoleDirectory,
}

impl RoleService {
    /// Creates a service over the given directory.
    #[must_use]
    pub fn new(directory: RoleDirectory) -> Self {
        Self { directory }
    }

    /// Returns the underlying directory.
    #[must_use]
    pub fn directory(&self) -> &RoleDirectory {
        &self.directory
    }

    /// Resolves `(tenant, name)` and reads the role it points at.
    pub async fn get_role(
        &self,
        name: &str,
        tenant: &Tenant,
    ) -> AppResult<Versioned<RoleCompleteInfo>> {
        let (tenant, name) = qualify(name, tenant)?;
        let pointer = self
            .directory
            .read_name(name, &tenant, GetParams::default())
            .await?;

        self.directory
            .read_info(pointer.value.as_str(), GetParams::default())
            .await
    }

    /// Reads a role by id.
    pub async fn get_role_by_id(&self, role_id: &str) -> AppResult<Versioned<RoleCompleteInfo>> {
        self.directory
            .read_info(role_id, GetParams::default())
            .await
    }

    async fn modify<T, F>(&self, name: &str, tenant: &Tenant, mutate: F) -> AppResult<(T, ObjVersion)>
    where
        F: FnOnce(&mut Role) -> AppResult<T> + Send,
        T: Send,
    {
        let stored = self.get_role(name, tenant).await?;
        let RoleCompleteInfo { mut info, attrs } = stored.value;
        let output = mutate(&mut info)?;

        let version = self
            .directory
            .store_info(
                &info,
                PutParams {
                    expected_version: Some(stored.version),
                    attrs,
                    ..PutParams::default()
                },
            )
            .await?;

        Ok((output, version))
    }
}

/// Applies a `tenant$name` qualifier over the supplied tenant.
fn qualify<'a>(name: &'a str, tenant: &Tenant) -> AppResult<(Tenant, &'a str)> {
    match extract_name_tenant(name) {
        (Some(qualifier), name) => Ok((Tenant::new(qualifier)?, name)),
        (None, name) => Ok((tenant.clone(), name)),
    }
}

fn log_missing_pointer(result: AppResult<()>, role_id: &str, pointer: &str) -> AppResult<()> {
    match result {
        Err(AppError::NotFound(_)) => {
            warn!(role_id = %role_id, pointer = %pointer, "role pointer already missing");
            Ok(())
        }
        other => other,
    }
}
