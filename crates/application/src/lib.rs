//! Role directory, metadata adapters and role services over a metadata backend port.

#![forbid(unsafe_code)]

mod metadata_backend;
mod metadata_handler;
mod metadata_manager;
mod reconciliation_service;
mod role_directory;
mod role_metadata_handler;
mod role_service;

#[cfg(test)]
mod test_support;

pub use metadata_backend::{MetadataBackend, MetadataRecord, RecordWrite, WriteCondition};
pub use metadata_handler::{
    MetadataEnvelope, MetadataHandler, MetadataObject, MetadataSection, MetadataSyncType,
    PutStatus, RoleMetadataObject,
};
pub use metadata_manager::MetadataManager;
pub use reconciliation_service::{ReconcileOptions, ReconcileReport, RoleIndexReconciler};
pub use role_directory::{
    DEFAULT_ROLE_ARN_PREFIX, GetParams, NameEntry, PathEntry, PutParams, ROLE_NAME_OID_PREFIX,
    ROLE_OID_PREFIX, ROLE_PATH_OID_PREFIX, RemoveParams, RoleDirectory, RoleDirectoryConfig,
    Versioned, format_creation_date,
};
pub use role_metadata_handler::{ROLE_SYNC_VERSION_ATTR, RoleMetadataHandler};
pub use role_service::RoleService;
