use rolestore_core::{AppError, AppResult, TENANT_SEPARATOR, Tenant};

/// Key prefix of by-id role records.
pub const ROLE_OID_PREFIX: &str = "roles.";

/// Key prefix of by-name pointer records.
pub const ROLE_NAME_OID_PREFIX: &str = "role_names.";

/// Key prefix of by-path pointer records.
pub const ROLE_PATH_OID_PREFIX: &str = "role_paths.";

/// Name pointer parsed from its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameEntry {
    /// Owning tenant.
    pub tenant: Tenant,
    /// Role name.
    pub name: String,
}

/// Path pointer parsed from its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathEntry {
    /// Owning tenant.
    pub tenant: Tenant,
    /// Role path, ending with `/`.
    pub path: String,
    /// Referenced role id.
    pub role_id: String,
}

pub(crate) fn info_key(role_id: &str) -> String {
    format!("{ROLE_OID_PREFIX}{role_id}")
}

pub(crate) fn name_key(tenant: &Tenant, name: &str) -> String {
    format!("{ROLE_NAME_OID_PREFIX}{tenant}{TENANT_SEPARATOR}{name}")
}

pub(crate) fn path_key(tenant: &Tenant, path: &str, role_id: &str) -> String {
    format!("{ROLE_PATH_OID_PREFIX}{tenant}{TENANT_SEPARATOR}{path}{role_id}")
}

pub(crate) fn path_prefix_key(tenant: &Tenant, path_prefix: &str) -> String {
    format!("{ROLE_PATH_OID_PREFIX}{tenant}{TENANT_SEPARATOR}{path_prefix}")
}

/// Role ids end every path key, so they must be non-empty and free of `/`.
pub(crate) fn validate_role_id(role_id: &str) -> AppResult<()> {
    if role_id.is_empty() {
        return Err(AppError::Validation("role id must not be empty".to_owned()));
    }

    if role_id.contains('/') || role_id.contains(TENANT_SEPARATOR) {
        return Err(AppError::Validation(format!(
            "role id '{role_id}' must not contain '/' or '{TENANT_SEPARATOR}'"
        )));
    }

    Ok(())
}

pub(crate) fn parse_info_key(key: &str) -> Option<&str> {
    key.strip_prefix(ROLE_OID_PREFIX)
        .filter(|role_id| !role_id.is_empty())
}

pub(crate) fn parse_name_key(key: &str) -> Option<NameEntry> {
    let rest = key.strip_prefix(ROLE_NAME_OID_PREFIX)?;
    let (tenant, name) = rest.split_once(TENANT_SEPARATOR)?;
    if name.is_empty() {
        return None;
    }

    Some(NameEntry {
        tenant: Tenant::new(tenant).ok()?,
        name: name.to_owned(),
    })
}

pub(crate) fn parse_path_key(key: &str) -> Option<PathEntry> {
    let rest = key.strip_prefix(ROLE_PATH_OID_PREFIX)?;
    let (tenant, path_and_id) = rest.split_once(TENANT_SEPARATOR)?;
    let (path_head, role_id) = path_and_id.rsplit_once('/')?;
    if role_id.is_empty() {
        return None;
    }

    Some(PathEntry {
        tenant: Tenant::new(tenant).ok()?,
        path: format!("{path_head}/"),
        role_id: role_id.to_owned(),
    })
}
