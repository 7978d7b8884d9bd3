use std::sync::Arc;

use chrono::{Duration, Utc};

use rolestore_core::{AppError, ObjVersion, ObjVersionTracker, Tenant};
use rolestore_domain::{Role, RoleCompleteInfo, RoleInput};

use crate::metadata_handler::{
    MetadataHandler, MetadataObject, MetadataSyncType, PutStatus, RoleMetadataObject,
};
use crate::role_directory::{GetParams, PutParams, RoleDirectory, RoleDirectoryConfig};
use crate::test_support::FakeMetadataBackend;

use super::RoleMetadataHandler;

fn handler() -> (RoleMetadataHandler, RoleDirectory, Arc<FakeMetadataBackend>) {
    let backend = Arc::new(FakeMetadataBackend::default());
    let directory = RoleDirectory::new(backend.clone(), RoleDirectoryConfig::default());
    (RoleMetadataHandler::new(directory.clone()), directory, backend)
}

fn role_object(role_id: &str, trust_policy: &str, version: ObjVersion) -> MetadataObject {
    placed_object(role_id, "acme$replicated", "/sync/", trust_policy, version)
}

fn placed_object(
    role_id: &str,
    name: &str,
    path: &str,
    trust_policy: &str,
    version: ObjVersion,
) -> MetadataObject {
    let mut role = Role::new(RoleInput {
        name: name.to_owned(),
        path: Some(path.to_owned()),
        trust_policy: trust_policy.to_owned(),
        ..RoleInput::default()
    })
    .unwrap_or_else(|_| unreachable!());
    role.set_id(role_id);

    MetadataObject::Role(RoleMetadataObject {
        info: RoleCompleteInfo::new(role),
        version,
        mtime: Utc::now(),
    })
}

fn acme() -> Tenant {
    Tenant::new("acme").unwrap_or_else(|_| unreachable!())
}

#[tokio::test]
async fn local_put_writes_info_and_pointers() {
    let (handler, directory, _) = handler();
    let mut tracker = ObjVersionTracker::new();

    let status = handler
        .put(
            "id-1",
            role_object("id-1", "{}", ObjVersion::new(1, "remote")),
            &mut tracker,
            MetadataSyncType::ApplyAlways,
            false,
        )
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(status, PutStatus::Applied);
    assert!(tracker.write_version.is_some());
    let resolved = directory
        .read_name("replicated", &acme(), GetParams::default())
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(resolved.value, "id-1");
    assert!(directory
        .read_path("id-1", "/sync/", &acme(), GetParams::default())
        .await
        .is_ok());
}

#[tokio::test]
async fn local_put_with_stale_tracker_is_a_conflict() {
    let (handler, _, _) = handler();
    let mut tracker = ObjVersionTracker::new();
    handler
        .put(
            "id-1",
            role_object("id-1", "{}", ObjVersion::new(1, "x")),
            &mut tracker,
            MetadataSyncType::ApplyAlways,
            false,
        )
        .await
        .unwrap_or_else(|_| unreachable!());

    let mut stale = ObjVersionTracker::expecting(ObjVersion::new(1, "unrelated"));
    let result = handler
        .put(
            "id-1",
            role_object("id-1", "changed", ObjVersion::new(2, "x")),
            &mut stale,
            MetadataSyncType::ApplyAlways,
            false,
        )
        .await;

    assert!(matches!(result, Err(AppError::Conflict(_))));
    let MetadataObject::Role(stored) = handler
        .get("id-1")
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(stored.info.info.trust_policy(), "{}");
}

#[tokio::test]
async fn remote_put_skips_writes_the_sync_type_rejects() {
    let (handler, _, _) = handler();
    let mut tracker = ObjVersionTracker::new();
    handler
        .put(
            "id-1",
            role_object("id-1", "{}", ObjVersion::new(1, "x")),
            &mut tracker,
            MetadataSyncType::ApplyAlways,
            false,
        )
        .await
        .unwrap_or_else(|_| unreachable!());

    let mut remote = ObjVersionTracker::new();
    let exclusive = handler
        .put(
            "id-1",
            role_object("id-1", "remote", ObjVersion::new(5, "zone-b")),
            &mut remote,
            MetadataSyncType::ApplyExclusive,
            true,
        )
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(exclusive, PutStatus::NoApply);

    let mut older = role_object("id-1", "remote", ObjVersion::new(5, "zone-b"));
    if let MetadataObject::Role(object) = &mut older {
        object.mtime = Utc::now() - Duration::days(1);
    }
    let newer = handler
        .put(
            "id-1",
            older,
            &mut remote,
            MetadataSyncType::ApplyNewer,
            true,
        )
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(newer, PutStatus::NoApply);
    assert!(remote.write_version.is_none());
}

#[tokio::test]
async fn remote_put_overrides_a_stale_local_tracker() {
    let (handler, _, _) = handler();
    let mut tracker = ObjVersionTracker::new();
    handler
        .put(
            "id-1",
            role_object("id-1", "{}", ObjVersion::new(1, "x")),
            &mut tracker,
            MetadataSyncType::ApplyAlways,
            false,
        )
        .await
        .unwrap_or_else(|_| unreachable!());

    let mut stale = ObjVersionTracker::expecting(ObjVersion::new(1, "unrelated"));
    let status = handler
        .put(
            "id-1",
            role_object("id-1", "remote", ObjVersion::new(9, "zone-b")),
            &mut stale,
            MetadataSyncType::ApplyAlways,
            true,
        )
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(status, PutStatus::Applied);
    let MetadataObject::Role(stored) = handler
        .get("id-1")
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(stored.info.info.trust_policy(), "remote");
}

#[tokio::test]
async fn put_rejects_an_entry_that_does_not_match_the_role() {
    let (handler, _, backend) = handler();
    let mut tracker = ObjVersionTracker::new();

    let result = handler
        .put(
            "id-2",
            role_object("id-1", "{}", ObjVersion::new(1, "x")),
            &mut tracker,
            MetadataSyncType::ApplyAlways,
            false,
        )
        .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn remove_deletes_info_and_owned_pointers() {
    let (handler, directory, backend) = handler();
    let mut tracker = ObjVersionTracker::new();
    handler
        .put(
            "id-1",
            role_object("id-1", "{}", ObjVersion::new(1, "x")),
            &mut tracker,
            MetadataSyncType::ApplyAlways,
            false,
        )
        .await
        .unwrap_or_else(|_| unreachable!());

    handler
        .remove("id-1", &mut tracker)
        .await
        .unwrap_or_else(|_| unreachable!());

    assert!(backend.keys().await.is_empty());
    let missing = directory.read_info("id-1", GetParams::default()).await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn remove_keeps_a_name_pointer_owned_by_another_role() {
    let (handler, directory, _) = handler();
    let mut tracker = ObjVersionTracker::new();
    handler
        .put(
            "id-1",
            role_object("id-1", "{}", ObjVersion::new(1, "x")),
            &mut tracker,
            MetadataSyncType::ApplyAlways,
            false,
        )
        .await
        .unwrap_or_else(|_| unreachable!());
    directory
        .store_name("id-2", "replicated", &acme(), PutParams::default())
        .await
        .unwrap_or_else(|_| unreachable!());

    handler
        .remove("id-1", &mut ObjVersionTracker::new())
        .await
        .unwrap_or_else(|_| unreachable!());

    let resolved = directory
        .read_name("replicated", &acme(), GetParams::default())
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(resolved.value, "id-2");
}

#[tokio::test]
async fn remove_with_stale_tracker_is_a_conflict() {
    let (handler, directory, _) = handler();
    let mut tracker = ObjVersionTracker::new();
    handler
        .put(
            "id-1",
            role_object("id-1", "{}", ObjVersion::new(1, "x")),
            &mut tracker,
            MetadataSyncType::ApplyAlways,
            false,
        )
        .await
        .unwrap_or_else(|_| unreachable!());

    let mut stale = ObjVersionTracker::expecting(ObjVersion::new(42, "old"));
    let result = handler.remove("id-1", &mut stale).await;

    assert!(matches!(result, Err(AppError::Conflict(_))));
    assert!(directory
        .read_info("id-1", GetParams::default())
        .await
        .is_ok());
}

#[tokio::test]
async fn remote_updates_from_the_same_zone_keep_applying() {
    let (handler, _, _) = handler();
    let mut tracker = ObjVersionTracker::new();

    let first = handler
        .put(
            "id-1",
            role_object("id-1", "v1", ObjVersion::new(1, "zone-b")),
            &mut tracker,
            MetadataSyncType::ApplyUpdates,
            true,
        )
        .await
        .unwrap_or_else(|_| unreachable!());
    let second = handler
        .put(
            "id-1",
            role_object("id-1", "v2", ObjVersion::new(2, "zone-b")),
            &mut tracker,
            MetadataSyncType::ApplyUpdates,
            true,
        )
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(first, PutStatus::Applied);
    assert_eq!(second, PutStatus::Applied);
    let MetadataObject::Role(stored) = handler.get("id-1").await.unwrap_or_else(|_| unreachable!());
    assert_eq!(stored.info.info.trust_policy(), "v2");
    assert_eq!(stored.version.ver, 2);

    let replayed = handler
        .put(
            "id-1",
            role_object("id-1", "v1", ObjVersion::new(2, "zone-b")),
            &mut tracker,
            MetadataSyncType::ApplyUpdates,
            true,
        )
        .await
        .unwrap_or_else(|_| unreachable!());
    let other_zone = handler
        .put(
            "id-1",
            role_object("id-1", "v9", ObjVersion::new(9, "zone-c")),
            &mut tracker,
            MetadataSyncType::ApplyUpdates,
            true,
        )
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(replayed, PutStatus::NoApply);
    assert_eq!(other_zone, PutStatus::NoApply);
}

#[tokio::test]
async fn local_write_ends_remote_updates() {
    let (handler, _, _) = handler();
    handler
        .put(
            "id-1",
            role_object("id-1", "v1", ObjVersion::new(1, "zone-b")),
            &mut ObjVersionTracker::new(),
            MetadataSyncType::ApplyUpdates,
            true,
        )
        .await
        .unwrap_or_else(|_| unreachable!());
    handler
        .put(
            "id-1",
            role_object("id-1", "local", ObjVersion::new(1, "zone-b")),
            &mut ObjVersionTracker::new(),
            MetadataSyncType::ApplyAlways,
            false,
        )
        .await
        .unwrap_or_else(|_| unreachable!());

    let status = handler
        .put(
            "id-1",
            role_object("id-1", "v2", ObjVersion::new(2, "zone-b")),
            &mut ObjVersionTracker::new(),
            MetadataSyncType::ApplyUpdates,
            true,
        )
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(status, PutStatus::NoApply);
    let MetadataObject::Role(stored) = handler.get("id-1").await.unwrap_or_else(|_| unreachable!());
    assert_eq!(stored.info.info.trust_policy(), "local");
}

#[tokio::test]
async fn renamed_and_moved_role_drops_its_old_pointers() {
    let (handler, directory, _) = handler();
    handler
        .put(
            "id-1",
            role_object("id-1", "{}", ObjVersion::new(1, "zone-b")),
            &mut ObjVersionTracker::new(),
            MetadataSyncType::ApplyAlways,
            true,
        )
        .await
        .unwrap_or_else(|_| unreachable!());

    handler
        .put(
            "id-1",
            placed_object("id-1", "acme$renamed", "/moved/", "{}", ObjVersion::new(2, "zone-b")),
            &mut ObjVersionTracker::new(),
            MetadataSyncType::ApplyAlways,
            true,
        )
        .await
        .unwrap_or_else(|_| unreachable!());

    let old_name = directory
        .read_name("replicated", &acme(), GetParams::default())
        .await;
    assert!(matches!(old_name, Err(AppError::NotFound(_))));
    let new_name = directory
        .read_name("renamed", &acme(), GetParams::default())
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(new_name.value, "id-1");

    let old_paths = directory
        .list_path_entries(Some(&acme()), "/sync/")
        .await
        .unwrap_or_else(|_| unreachable!());
    let new_paths = directory
        .list_path_entries(Some(&acme()), "/moved/")
        .await
        .unwrap_or_else(|_| unreachable!());
    assert!(old_paths.is_empty());
    assert_eq!(new_paths.len(), 1);
}

#[tokio::test]
async fn rename_leaves_an_old_name_claimed_by_another_role() {
    let (handler, directory, _) = handler();
    handler
        .put(
            "id-1",
            role_object("id-1", "{}", ObjVersion::new(1, "x")),
            &mut ObjVersionTracker::new(),
            MetadataSyncType::ApplyAlways,
            false,
        )
        .await
        .unwrap_or_else(|_| unreachable!());
    directory
        .store_name("id-2", "replicated", &acme(), PutParams::default())
        .await
        .unwrap_or_else(|_| unreachable!());

    handler
        .put(
            "id-1",
            placed_object("id-1", "acme$renamed", "/sync/", "{}", ObjVersion::new(2, "x")),
            &mut ObjVersionTracker::new(),
            MetadataSyncType::ApplyAlways,
            false,
        )
        .await
        .unwrap_or_else(|_| unreachable!());

    let kept = directory
        .read_name("replicated", &acme(), GetParams::default())
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(kept.value, "id-2");
    let paths = directory
        .list_path_entries(Some(&acme()), "/sync/")
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(paths.len(), 1);
}
