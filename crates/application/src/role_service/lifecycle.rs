use super::*;

use chrono::Utc;
use rolestore_domain::RoleInput;
use tracing::info;

use crate::role_directory::RemoveParams;

impl RoleService {
    /// Creates a role and both of its pointers.
    ///
    /// The by-id record is written first, then the name and path pointers,
    /// each exclusively. A failing pointer write is logged and returned; the
    /// records already written stay in place for the reconciler to repair.
    pub async fn create_role(&self, input: RoleInput) -> AppResult<Versioned<Role>> {
        let mut role = Role::new(input)?;

        match self
            .directory
            .read_name(role.name(), role.tenant(), GetParams::default())
            .await
        {
            Ok(existing) => {
                return Err(AppError::AlreadyExists(format!(
                    "role '{}' already exists in tenant '{}' as '{}'",
                    role.name(),
                    role.tenant(),
                    existing.value
                )));
            }
            Err(AppError::NotFound(_)) => {}
            Err(error) => return Err(error),
        }

        let mtime = Utc::now();
        let version = self
            .directory
            .create(
                &mut role,
                PutParams {
                    mtime: Some(mtime),
                    exclusive: true,
                    ..PutParams::default()
                },
            )
            .await?;

        if let Err(error) = self
            .directory
            .store_name(role.id(), role.name(), role.tenant(), PutParams::exclusive())
            .await
        {
            warn!(
                role_id = %role.id(),
                name = %role.name(),
                error = %error,
                "role created but name pointer write failed"
            );
            return Err(error);
        }

        if let Err(error) = self
            .directory
            .store_path(role.id(), role.path(), role.tenant(), PutParams::exclusive())
            .await
        {
            warn!(
                role_id = %role.id(),
                path = %role.path(),
                error = %error,
                "role created but path pointer write failed"
            );
            return Err(error);
        }

        info!(role_id = %role.id(), arn = %role.arn(), "created role");

        Ok(Versioned {
            value: role,
            version,
            mtime,
        })
    }

    /// Writes back a role read earlier, conditioned on the version it was read at.
    ///
    /// Only the by-id record is written; renames and path moves are not
    /// reflected in the pointers.
    pub async fn update_role(
        &self,
        info: &RoleCompleteInfo,
        expected_version: ObjVersion,
    ) -> AppResult<ObjVersion> {
        self.directory
            .store_info(
                &info.info,
                PutParams {
                    expected_version: Some(expected_version),
                    attrs: info.attrs.clone(),
                    ..PutParams::default()
                },
            )
            .await
    }

    /// Deletes a role and its pointers.
    ///
    /// Roles with attached permission policies cannot be deleted.
    pub async fn delete_role(&self, name: &str, tenant: &Tenant) -> AppResult<()> {
        let (tenant, name) = qualify(name, tenant)?;
        let pointer = self
            .directory
            .read_name(name, &tenant, GetParams::default())
            .await?;
        let stored = self
            .directory
            .read_info(pointer.value.as_str(), GetParams::default())
            .await?;
        let role = &stored.value.info;

        if !role.perm_policies().is_empty() {
            return Err(AppError::Conflict(format!(
                "role '{name}' still has {} permission policies attached",
                role.perm_policies().len()
            )));
        }

        self.directory
            .delete_info(role.id(), RemoveParams::expecting(stored.version.clone()))
            .await?;

        let name_result = self
            .directory
            .delete_name(name, &tenant, RemoveParams::expecting(pointer.version))
            .await;
        log_missing_pointer(name_result, role.id(), "name")?;

        let path_result = self
            .directory
            .delete_path(role.id(), role.path(), &tenant, RemoveParams::default())
            .await;
        log_missing_pointer(path_result, role.id(), "path")?;

        info!(role_id = %role.id(), "deleted role");
        Ok(())
    }

    /// Lists roles of a tenant whose path starts with `path_prefix`, ordered
    /// by path then id. Path pointers to missing roles are skipped.
    pub async fn list_roles(&self, tenant: &Tenant, path_prefix: &str) -> AppResult<Vec<Role>> {
        let entries = self
            .directory
            .list_path_entries(Some(tenant), path_prefix)
            .await?;

        let mut roles = Vec::with_capacity(entries.len());
        for entry in entries {
            match self
                .directory
                .read_info(entry.role_id.as_str(), GetParams::default())
                .await
            {
                Ok(stored) => roles.push(stored.value.info),
                Err(AppError::NotFound(_)) => {
                    warn!(
                        role_id = %entry.role_id,
                        path = %entry.path,
                        "skipping dangling role path pointer"
                    );
                }
                Err(error) => return Err(error),
            }
        }

        Ok(roles)
    }
}
