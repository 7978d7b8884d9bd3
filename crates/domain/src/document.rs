//! JSON representation of roles.

use std::collections::BTreeMap;

use rolestore_core::{AppError, AppResult, Tenant};
use serde::{Deserialize, Serialize};

use crate::role::{Role, RoleParts, RoleTag, SESSION_DURATION_MIN};

/// Permission policy entry in a role document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionPolicyDocument {
    /// Policy name, unique within the role.
    #[serde(rename = "PolicyName")]
    pub name: String,
    /// Policy document.
    #[serde(rename = "PolicyDocument")]
    pub document: String,
}

/// Wire schema of a role.
///
/// `Tenant`, `MaxSessionDuration`, `PermissionPolicies` and `Tags` may be
/// absent in documents produced by older writers and take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDocument {
    /// Role identifier.
    #[serde(rename = "RoleId")]
    pub id: String,
    /// Role name.
    #[serde(rename = "RoleName")]
    pub name: String,
    /// Owning tenant.
    #[serde(rename = "Tenant", default)]
    pub tenant: String,
    /// Role path.
    #[serde(rename = "Path")]
    pub path: String,
    /// Role ARN.
    #[serde(rename = "Arn")]
    pub arn: String,
    /// Creation timestamp.
    #[serde(rename = "CreateDate")]
    pub creation_date: String,
    /// Trust policy document.
    #[serde(rename = "AssumeRolePolicyDocument")]
    pub trust_policy: String,
    /// Maximum session duration in seconds.
    #[serde(rename = "MaxSessionDuration", default = "default_max_session_duration")]
    pub max_session_duration: u64,
    /// Attached permission policies.
    #[serde(rename = "PermissionPolicies", default)]
    pub permission_policies: Vec<PermissionPolicyDocument>,
    /// Tags as key/value pairs; keys may repeat.
    #[serde(rename = "Tags", default)]
    pub tags: Vec<RoleTag>,
}

fn default_max_session_duration() -> u64 {
    SESSION_DURATION_MIN
}

impl From<&Role> for RoleDocument {
    fn from(role: &Role) -> Self {
        Self {
            id: role.id().to_owned(),
            name: role.name().to_owned(),
            tenant: role.tenant().as_str().to_owned(),
            path: role.path().to_owned(),
            arn: role.arn().to_owned(),
            creation_date: role.creation_date().to_owned(),
            trust_policy: role.trust_policy().to_owned(),
            max_session_duration: role.max_session_duration(),
            permission_policies: role
                .perm_policies()
                .iter()
                .map(|(name, document)| PermissionPolicyDocument {
                    name: name.clone(),
                    document: document.clone(),
                })
                .collect(),
            tags: role.get_tags().map(<[RoleTag]>::to_vec).unwrap_or_default(),
        }
    }
}

impl TryFrom<RoleDocument> for Role {
    type Error = AppError;

    fn try_from(document: RoleDocument) -> AppResult<Self> {
        let mut perm_policy_map = BTreeMap::new();
        for policy in document.permission_policies {
            if perm_policy_map.contains_key(&policy.name) {
                return Err(AppError::Validation(format!(
                    "duplicate permission policy '{}' in role document",
                    policy.name
                )));
            }
            perm_policy_map.insert(policy.name, policy.document);
        }

        Role::from_parts(RoleParts {
            id: document.id,
            name: document.name,
            tenant: Tenant::new(document.tenant)?,
            path: document.path,
            arn: document.arn,
            creation_date: document.creation_date,
            trust_policy: document.trust_policy,
            perm_policy_map,
            max_session_duration: document.max_session_duration,
            tags: document.tags,
        })
    }
}
