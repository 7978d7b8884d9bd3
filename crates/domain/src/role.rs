//! Identity role entity and its stored representation.

use std::collections::BTreeMap;

use bytes::Bytes;
use rolestore_core::{AppError, AppResult, TENANT_SEPARATOR, Tenant};
use serde::{Deserialize, Serialize};

use crate::codec::{RecordDecoder, RecordEncoder};

/// Maximum role name length in characters.
pub const MAX_ROLE_NAME_LEN: usize = 64;

/// Maximum role path length in characters.
pub const MAX_PATH_NAME_LEN: usize = 512;

/// Shortest allowed maximum session duration, in seconds.
pub const SESSION_DURATION_MIN: u64 = 3600;

/// Longest allowed maximum session duration, in seconds.
pub const SESSION_DURATION_MAX: u64 = 43200;

/// Maximum number of tags attached to one role.
pub const MAX_ROLE_TAGS: usize = 50;

/// Schema version written by [`Role::encode`].
///
/// Version 2 added `tenant`, version 3 added `max_session_duration`.
pub const ROLE_SCHEMA_VERSION: u8 = 3;

const ROLE_COMPAT_VERSION: u8 = 1;
const TAGS_SCHEMA_VERSION: u8 = 1;

/// One key/value tag. Keys may repeat with different values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleTag {
    /// Tag key.
    #[serde(rename = "Key")]
    pub key: String,
    /// Tag value.
    #[serde(rename = "Value")]
    pub value: String,
}

impl RoleTag {
    /// Creates a tag.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Caller-supplied fields for a new role.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleInput {
    /// Role name, optionally tenant-qualified as `tenant$name`.
    pub name: String,
    /// Tenant; overridden by a qualifier in `name`.
    pub tenant: Tenant,
    /// Role path; `/` when absent or empty.
    pub path: Option<String>,
    /// Trust (assume-role) policy document.
    pub trust_policy: String,
    /// Maximum session duration in seconds; the minimum when absent.
    pub max_session_duration: Option<u64>,
    /// Initial tags.
    pub tags: Vec<RoleTag>,
}

/// Identity role with its trust policy, permission policies and tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    id: String,
    name: String,
    tenant: Tenant,
    path: String,
    arn: String,
    creation_date: String,
    trust_policy: String,
    perm_policy_map: BTreeMap<String, String>,
    max_session_duration: u64,
    tags: Vec<RoleTag>,
}

/// Splits a possibly tenant-qualified name into `(tenant, name)`.
///
/// The split happens at the first separator, so the tenant part never
/// contains one. Unqualified input yields no tenant.
#[must_use]
pub fn extract_name_tenant(raw: &str) -> (Option<&str>, &str) {
    match raw.split_once(TENANT_SEPARATOR) {
        Some((tenant, name)) => (Some(tenant), name),
        None => (None, raw),
    }
}

/// Validates a role name: non-empty, bounded and restricted to `[A-Za-z0-9_+=,.@-]`.
pub fn validate_role_name(name: &str) -> AppResult<()> {
    if name.is_empty() {
        return Err(AppError::Validation("role name must not be empty".to_owned()));
    }

    if name.chars().count() > MAX_ROLE_NAME_LEN {
        return Err(AppError::Validation(format!(
            "role name must not exceed {MAX_ROLE_NAME_LEN} characters"
        )));
    }

    if let Some(invalid) = name.chars().find(|character| {
        !(character.is_ascii_alphanumeric() || matches!(character, '_' | '+' | '=' | ',' | '.' | '@' | '-'))
    }) {
        return Err(AppError::Validation(format!(
            "role name '{name}' contains invalid character '{invalid}'"
        )));
    }

    Ok(())
}

/// Validates a role path: bounded, printable ASCII, starting and ending with `/`.
pub fn validate_role_path(path: &str) -> AppResult<()> {
    if path.is_empty() {
        return Err(AppError::Validation("role path must not be empty".to_owned()));
    }

    if path.chars().count() > MAX_PATH_NAME_LEN {
        return Err(AppError::Validation(format!(
            "role path must not exceed {MAX_PATH_NAME_LEN} characters"
        )));
    }

    if !path.starts_with('/') || !path.ends_with('/') {
        return Err(AppError::Validation(format!(
            "role path '{path}' must start and end with '/'"
        )));
    }

    if path.chars().any(|character| !('!'..='~').contains(&character)) {
        return Err(AppError::Validation(format!(
            "role path '{path}' must contain only printable ASCII characters"
        )));
    }

    Ok(())
}

/// Validates a maximum session duration against the allowed range.
pub fn validate_session_duration(seconds: u64) -> AppResult<()> {
    if !(SESSION_DURATION_MIN..=SESSION_DURATION_MAX).contains(&seconds) {
        return Err(AppError::Validation(format!(
            "max session duration {seconds} must be between {SESSION_DURATION_MIN} and \
             {SESSION_DURATION_MAX} seconds"
        )));
    }

    Ok(())
}

impl Role {
    /// Creates a validated role from caller input.
    ///
    /// The returned role has no id, ARN or creation date yet; those are
    /// assigned when the role is created in the directory.
    pub fn new(input: RoleInput) -> AppResult<Self> {
        let (qualified_tenant, name) = extract_name_tenant(input.name.as_str());
        let tenant = match qualified_tenant {
            Some(tenant) => Tenant::new(tenant)?,
            None => input.tenant,
        };
        let path = input
            .path
            .filter(|path| !path.is_empty())
            .unwrap_or_else(|| "/".to_owned());

        let mut role = Self {
            id: String::new(),
            name: name.to_owned(),
            tenant,
            path,
            arn: String::new(),
            creation_date: String::new(),
            trust_policy: input.trust_policy,
            perm_policy_map: BTreeMap::new(),
            max_session_duration: input.max_session_duration.unwrap_or(SESSION_DURATION_MIN),
            tags: Vec::new(),
        };
        role.set_tags(input.tags)?;
        role.validate()?;

        Ok(role)
    }

    /// Checks name, path and session duration invariants.
    pub fn validate(&self) -> AppResult<()> {
        validate_role_name(self.name.as_str())?;
        validate_role_path(self.path.as_str())?;
        validate_session_duration(self.max_session_duration)
    }

    /// Returns the role identifier; empty until assigned.
    #[must_use]
    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Returns the role name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the owning tenant.
    #[must_use]
    pub fn tenant(&self) -> &Tenant {
        &self.tenant
    }

    /// Returns the role path.
    #[must_use]
    pub fn path(&self) -> &str {
        self.path.as_str()
    }

    /// Returns the ARN; empty until assigned.
    #[must_use]
    pub fn arn(&self) -> &str {
        self.arn.as_str()
    }

    /// Returns the creation timestamp; empty until assigned.
    #[must_use]
    pub fn creation_date(&self) -> &str {
        self.creation_date.as_str()
    }

    /// Returns the trust policy document.
    #[must_use]
    pub fn trust_policy(&self) -> &str {
        self.trust_policy.as_str()
    }

    /// Returns the maximum session duration in seconds.
    #[must_use]
    pub fn max_session_duration(&self) -> u64 {
        self.max_session_duration
    }

    /// Returns the attached permission policies by name.
    #[must_use]
    pub fn perm_policies(&self) -> &BTreeMap<String, String> {
        &self.perm_policy_map
    }

    /// Sets the role identifier.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    /// Sets the ARN.
    pub fn set_arn(&mut self, arn: impl Into<String>) {
        self.arn = arn.into();
    }

    /// Sets the creation timestamp.
    pub fn set_creation_date(&mut self, creation_date: impl Into<String>) {
        self.creation_date = creation_date.into();
    }

    /// Builds the ARN for this role under the given prefix.
    #[must_use]
    pub fn derive_arn(&self, arn_prefix: &str) -> String {
        format!("{arn_prefix}{}:role{}{}", self.tenant, self.path, self.name)
    }

    /// Replaces the trust policy document.
    pub fn update_trust_policy(&mut self, trust_policy: impl Into<String>) {
        self.trust_policy = trust_policy.into();
    }

    /// Replaces the maximum session duration after range validation.
    pub fn set_max_session_duration(&mut self, seconds: u64) -> AppResult<()> {
        validate_session_duration(seconds)?;
        self.max_session_duration = seconds;
        Ok(())
    }

    /// Attaches or replaces a permission policy.
    pub fn set_perm_policy(&mut self, policy_name: impl Into<String>, policy: impl Into<String>) {
        self.perm_policy_map.insert(policy_name.into(), policy.into());
    }

    /// Returns the named permission policy document.
    pub fn get_role_policy(&self, policy_name: &str) -> AppResult<&str> {
        self.perm_policy_map
            .get(policy_name)
            .map(String::as_str)
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "policy '{policy_name}' is not attached to role '{}'",
                    self.name
                ))
            })
    }

    /// Detaches the named permission policy.
    ///
    /// Detaching a policy that is not attached is reported as not found.
    pub fn delete_policy(&mut self, policy_name: &str) -> AppResult<()> {
        self.perm_policy_map
            .remove(policy_name)
            .map(|_| ())
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "policy '{policy_name}' is not attached to role '{}'",
                    self.name
                ))
            })
    }

    /// Returns the names of all attached permission policies, sorted.
    #[must_use]
    pub fn get_role_policy_names(&self) -> Vec<String> {
        self.perm_policy_map.keys().cloned().collect()
    }

    /// Replaces the entire tag set.
    pub fn set_tags(&mut self, tags: Vec<RoleTag>) -> AppResult<()> {
        ensure_tag_limit(tags.len())?;
        self.tags = tags;
        self.tags.sort_by(|left, right| left.key.cmp(&right.key));
        Ok(())
    }

    /// Adds tags to the existing set, keeping repeated keys.
    pub fn add_tags(&mut self, tags: Vec<RoleTag>) -> AppResult<()> {
        ensure_tag_limit(self.tags.len().saturating_add(tags.len()))?;
        self.tags.extend(tags);
        self.tags.sort_by(|left, right| left.key.cmp(&right.key));
        Ok(())
    }

    /// Returns the tags, or `None` when the role has none.
    #[must_use]
    pub fn get_tags(&self) -> Option<&[RoleTag]> {
        (!self.tags.is_empty()).then_some(self.tags.as_slice())
    }

    /// Removes every tag whose key is listed, whatever its value.
    pub fn erase_tags<K: AsRef<str>>(&mut self, tag_keys: &[K]) {
        self.tags
            .retain(|tag| !tag_keys.iter().any(|key| key.as_ref() == tag.key));
    }

    /// Encodes the by-id record body at the current schema version.
    ///
    /// Field order: id, name, path, arn, creation date, trust policy,
    /// permission policies, tenant, max session duration.
    pub fn encode(&self) -> AppResult<Bytes> {
        let mut encoder = RecordEncoder::new();
        encoder.put_versioned(ROLE_SCHEMA_VERSION, ROLE_COMPAT_VERSION, |body| {
            body.put_str(self.id.as_str())?;
            body.put_str(self.name.as_str())?;
            body.put_str(self.path.as_str())?;
            body.put_str(self.arn.as_str())?;
            body.put_str(self.creation_date.as_str())?;
            body.put_str(self.trust_policy.as_str())?;
            body.put_pairs(
                self.perm_policy_map
                    .iter()
                    .map(|(name, policy)| (name.as_str(), policy.as_str())),
            )?;
            body.put_str(self.tenant.as_str())?;
            body.put_u64(self.max_session_duration);
            Ok(())
        })?;

        Ok(encoder.finish())
    }

    /// Decodes a by-id record body written by any supported schema version.
    ///
    /// Records older than version 2 decode with the default tenant; records
    /// older than version 3 decode with the minimum session duration. Tags
    /// are not part of the body, see [`Role::restore_tags`].
    pub fn decode(data: Bytes) -> AppResult<Self> {
        let mut decoder = RecordDecoder::new(data);
        let role = decoder.get_versioned(ROLE_SCHEMA_VERSION, |body, struct_v| {
            let id = body.get_string()?;
            let name = body.get_string()?;
            let path = body.get_string()?;
            let arn = body.get_string()?;
            let creation_date = body.get_string()?;
            let trust_policy = body.get_string()?;
            let perm_policy_map = body.get_str_map()?;
            let tenant = if struct_v >= 2 {
                Tenant::new(body.get_string()?).map_err(|error| {
                    AppError::Decode(format!("stored role tenant is invalid: {error}"))
                })?
            } else {
                Tenant::default_tenant()
            };
            let max_session_duration = if struct_v >= 3 {
                let seconds = body.get_u64()?;
                validate_session_duration(seconds).map_err(|error| {
                    AppError::Decode(format!("stored role session duration is invalid: {error}"))
                })?;
                seconds
            } else {
                SESSION_DURATION_MIN
            };

            Ok(Self {
                id,
                name,
                tenant,
                path,
                arn,
                creation_date,
                trust_policy,
                perm_policy_map,
                max_session_duration,
                tags: Vec::new(),
            })
        })?;
        decoder.finish()?;

        Ok(role)
    }

    /// Encodes the tag set for the record attribute map, `None` when empty.
    pub fn encode_tags(&self) -> AppResult<Option<Bytes>> {
        if self.tags.is_empty() {
            return Ok(None);
        }

        let mut encoder = RecordEncoder::new();
        encoder.put_versioned(TAGS_SCHEMA_VERSION, TAGS_SCHEMA_VERSION, |body| {
            body.put_pairs(
                self.tags
                    .iter()
                    .map(|tag| (tag.key.as_str(), tag.value.as_str())),
            )
        })?;

        Ok(Some(encoder.finish()))
    }

    /// Replaces the tag set with tags read from the record attribute map.
    pub fn restore_tags(&mut self, data: Bytes) -> AppResult<()> {
        let mut decoder = RecordDecoder::new(data);
        let pairs = decoder.get_versioned(TAGS_SCHEMA_VERSION, |body, _| body.get_pairs())?;
        decoder.finish()?;

        self.tags = pairs
            .into_iter()
            .map(|(key, value)| RoleTag { key, value })
            .collect();
        self.tags.sort_by(|left, right| left.key.cmp(&right.key));
        Ok(())
    }

    pub(crate) fn from_parts(parts: RoleParts) -> AppResult<Self> {
        let mut role = Self {
            id: parts.id,
            name: parts.name,
            tenant: parts.tenant,
            path: parts.path,
            arn: parts.arn,
            creation_date: parts.creation_date,
            trust_policy: parts.trust_policy,
            perm_policy_map: parts.perm_policy_map,
            max_session_duration: parts.max_session_duration,
            tags: Vec::new(),
        };
        role.set_tags(parts.tags)?;
        role.validate()?;
        Ok(role)
    }
}

/// Unvalidated role fields assembled by a wire decoder.
pub(crate) struct RoleParts {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) tenant: Tenant,
    pub(crate) path: String,
    pub(crate) arn: String,
    pub(crate) creation_date: String,
    pub(crate) trust_policy: String,
    pub(crate) perm_policy_map: BTreeMap<String, String>,
    pub(crate) max_session_duration: u64,
    pub(crate) tags: Vec<RoleTag>,
}

fn ensure_tag_limit(count: usize) -> AppResult<()> {
    if count > MAX_ROLE_TAGS {
        return Err(AppError::Validation(format!(
            "a role carries at most {MAX_ROLE_TAGS} tags, got {count}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests;
