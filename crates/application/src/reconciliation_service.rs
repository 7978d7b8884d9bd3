use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use rolestore_core::{AppError, AppResult};
use rolestore_domain::Role;

use crate::role_directory::{GetParams, PutParams, RemoveParams, RoleDirectory};

/// Reconciliation behavior switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Delete pointers whose role record no longer exists.
    pub remove_dangling_pointers: bool,
}

/// Counters collected by one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Role records read.
    pub roles_scanned: usize,
    /// Missing name pointers written back.
    pub name_pointers_restored: usize,
    /// Missing path pointers written back.
    pub path_pointers_restored: usize,
    /// Name pointers found resolving to a different role.
    pub name_collisions: usize,
    /// Name pointers without a role record.
    pub dangling_name_pointers: usize,
    /// Path pointers without a role record.
    pub dangling_path_pointers: usize,
    /// Name pointers whose role now carries another name or tenant.
    pub stale_name_pointers: usize,
    /// Path pointers whose role now lives under another path or tenant.
    pub stale_path_pointers: usize,
    /// Dangling and stale pointers deleted.
    pub dangling_pointers_removed: usize,
}

impl ReconcileReport {
    /// Returns whether the pass found nothing to repair or report.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.name_pointers_restored == 0
            && self.path_pointers_restored == 0
            && self.name_collisions == 0
            && self.dangling_name_pointers == 0
            && self.dangling_path_pointers == 0
            && self.stale_name_pointers == 0
            && self.stale_path_pointers == 0
    }
}

/// Repairs pointer records left inconsistent by interrupted multi-record writes.
///
/// Every role record gets its name and path pointers restored when absent.
/// Pointers naming a role that no longer exists, or a role that has since
/// been renamed or moved, are counted, and deleted when configured to. Writes race with live traffic, so a write rejected
/// by a concurrent change is skipped rather than failing the pass.
#[derive(Clone)]
pub struct RoleIndexReconciler {
    directory: RoleDirectory,
    options: ReconcileOptions,
}

impl RoleIndexReconciler {
    /// Creates a reconciler.
    #[must_use]
    pub fn new(directory: RoleDirectory, options: ReconcileOptions) -> Self {
        Self { directory, options }
    }

    /// Runs one full pass over all role records and pointers.
    pub async fn run_pass(&self) -> AppResult<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let mut known_roles = BTreeMap::new();

        for role_id in self.directory.list_role_ids().await? {
            let role = match self
                .directory
                .read_info(role_id.as_str(), GetParams::default())
                .await
            {
                Ok(stored) => stored.value.info,
                Err(error) if is_race(&error) => {
                    debug!(role_id = %role_id, error = %error, "role vanished during reconciliation");
                    continue;
                }
                Err(error) => return Err(error),
            };

            report.roles_scanned += 1;
            self.reconcile_name_pointer(&role, &mut report).await?;
            self.reconcile_path_pointer(&role, &mut report).await?;
            known_roles.insert(role_id, role);
        }

        self.sweep_name_pointers(&known_roles, &mut report).await?;
        self.sweep_path_pointers(&known_roles, &mut report).await?;

        info!(
            roles_scanned = report.roles_scanned,
            name_pointers_restored = report.name_pointers_restored,
            path_pointers_restored = report.path_pointers_restored,
            name_collisions = report.name_collisions,
            dangling_name_pointers = report.dangling_name_pointers,
            dangling_path_pointers = report.dangling_path_pointers,
            stale_name_pointers = report.stale_name_pointers,
            stale_path_pointers = report.stale_path_pointers,
            dangling_pointers_removed = report.dangling_pointers_removed,
            "role index reconciliation finished"
        );

        Ok(report)
    }

    async fn reconcile_name_pointer(&self, role: &Role, report: &mut ReconcileReport) -> AppResult<()> {
        match self
            .directory
            .read_name(role.name(), role.tenant(), GetParams::default())
            .await
        {
            Ok(pointer) if pointer.value == role.id() => Ok(()),
            Ok(pointer) => {
                report.name_collisions += 1;
                warn!(
                    role_id = %role.id(),
                    name = %role.name(),
                    tenant = %role.tenant(),
                    other_role_id = %pointer.value,
                    "role name is claimed by another role"
                );
                Ok(())
            }
            Err(AppError::NotFound(_)) => {
                let result = self
                    .directory
                    .store_name(role.id(), role.name(), role.tenant(), PutParams::exclusive())
                    .await;
                match result {
                    Ok(_) => {
                        report.name_pointers_restored += 1;
                        info!(role_id = %role.id(), name = %role.name(), "restored role name pointer");
                        Ok(())
                    }
                    Err(error) if is_race(&error) => {
                        warn!(role_id = %role.id(), error = %error, "skipped name pointer restore");
                        Ok(())
                    }
                    Err(error) => Err(error),
                }
            }
            Err(error) => Err(error),
        }
    }

    async fn reconcile_path_pointer(&self, role: &Role, report: &mut ReconcileReport) -> AppResult<()> {
        match self
            .directory
            .read_path(role.id(), role.path(), role.tenant(), GetParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(AppError::NotFound(_)) => {
                let result = self
                    .directory
                    .store_path(role.id(), role.path(), role.tenant(), PutParams::exclusive())
                    .await;
                match result {
                    Ok(_) => {
                        report.path_pointers_restored += 1;
                        info!(role_id = %role.id(), path = %role.path(), "restored role path pointer");
                        Ok(())
                    }
                    Err(error) if is_race(&error) => {
                        warn!(role_id = %role.id(), error = %error, "skipped path pointer restore");
                        Ok(())
                    }
                    Err(error) => Err(error),
                }
            }
            Err(error) => Err(error),
        }
    }

    async fn sweep_name_pointers(
        &self,
        known_roles: &BTreeMap<String, Role>,
        report: &mut ReconcileReport,
    ) -> AppResult<()> {
        for entry in self.directory.list_name_entries().await? {
            let pointer = match self
                .directory
                .read_name(entry.name.as_str(), &entry.tenant, GetParams::default())
                .await
            {
                Ok(pointer) => pointer,
                Err(error) if is_race(&error) => continue,
                Err(error) => return Err(error),
            };
            let names_owner =
                |role: &Role| role.tenant() == &entry.tenant && role.name() == entry.name;
            if known_roles.get(&pointer.value).is_some_and(names_owner) {
                continue;
            }

            match self.current_role(&pointer.value).await? {
                Some(role) if names_owner(&role) => continue,
                Some(role) => {
                    report.stale_name_pointers += 1;
                    warn!(
                        name = %entry.name,
                        tenant = %entry.tenant,
                        role_id = %pointer.value,
                        current_name = %role.name(),
                        "role name pointer no longer matches its role"
                    );
                }
                None => {
                    report.dangling_name_pointers += 1;
                    warn!(
                        name = %entry.name,
                        tenant = %entry.tenant,
                        role_id = %pointer.value,
                        "role name pointer has no role record"
                    );
                }
            }

            if self.options.remove_dangling_pointers {
                let removed = self
                    .directory
                    .delete_name(
                        entry.name.as_str(),
                        &entry.tenant,
                        RemoveParams::expecting(pointer.version),
                    )
                    .await;
                self.count_removal(removed, report)?;
            }
        }

        Ok(())
    }

    async fn sweep_path_pointers(
        &self,
        known_roles: &BTreeMap<String, Role>,
        report: &mut ReconcileReport,
    ) -> AppResult<()> {
        for entry in self.directory.list_path_entries(None, "/").await? {
            let places_owner =
                |role: &Role| role.tenant() == &entry.tenant && role.path() == entry.path;
            if known_roles.get(&entry.role_id).is_some_and(places_owner) {
                continue;
            }

            match self.current_role(&entry.role_id).await? {
                Some(role) if places_owner(&role) => continue,
                Some(role) => {
                    report.stale_path_pointers += 1;
                    warn!(
                        path = %entry.path,
                        tenant = %entry.tenant,
                        role_id = %entry.role_id,
                        current_path = %role.path(),
                        "role path pointer no longer matches its role"
                    );
                }
                None => {
                    report.dangling_path_pointers += 1;
                    warn!(
                        path = %entry.path,
                        tenant = %entry.tenant,
                        role_id = %entry.role_id,
                        "role path pointer has no role record"
                    );
                }
            }

            if self.options.remove_dangling_pointers {
                let removed = self
                    .directory
                    .delete_path(
                        entry.role_id.as_str(),
                        entry.path.as_str(),
                        &entry.tenant,
                        RemoveParams::default(),
                    )
                    .await;
                self.count_removal(removed, report)?;
            }
        }

        Ok(())
    }

    /// Reads the role fresh, so a rename racing the pass is not mistaken
    /// for a stale pointer.
    async fn current_role(&self, role_id: &str) -> AppResult<Option<Role>> {
        match self.directory.read_info(role_id, GetParams::default()).await {
            Ok(stored) => Ok(Some(stored.value.info)),
            Err(AppError::NotFound(_)) | Err(AppError::Validation(_)) => Ok(None),
            Err(error) => Err(error),
        }
    }

    fn count_removal(&self, result: AppResult<()>, report: &mut ReconcileReport) -> AppResult<()> {
        match result {
            Ok(()) => {
                report.dangling_pointers_removed += 1;
                Ok(())
            }
            Err(error) if is_race(&error) => {
                warn!(error = %error, "skipped dangling pointer removal");
                Ok(())
            }
            Err(error) => Err(error),
        }
    }
}

fn is_race(error: &AppError) -> bool {
    matches!(
        error,
        AppError::AlreadyExists(_) | AppError::Conflict(_) | AppError::NotFound(_)
    )
}
