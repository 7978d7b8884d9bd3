//! Role entity, its versioned binary encoding and its JSON representation.

#![forbid(unsafe_code)]

/// Versioned binary record encoding.
pub mod codec;
mod complete_info;
mod document;
mod pointer;
mod role;

pub use complete_info::{ROLE_TAGS_ATTR, RoleCompleteInfo};
pub use document::{PermissionPolicyDocument, RoleDocument};
pub use pointer::RolePointer;
pub use role::{
    MAX_PATH_NAME_LEN, MAX_ROLE_NAME_LEN, MAX_ROLE_TAGS, ROLE_SCHEMA_VERSION, Role, RoleInput,
    RoleTag, SESSION_DURATION_MAX, SESSION_DURATION_MIN, extract_name_tenant, validate_role_name,
    validate_role_path, validate_session_duration,
};
