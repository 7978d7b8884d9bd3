use bytes::Bytes;
use proptest::prelude::*;
use rolestore_core::{AppError, Tenant};

use super::{
    MAX_PATH_NAME_LEN, MAX_ROLE_NAME_LEN, Role, RoleInput, RoleTag, SESSION_DURATION_MAX,
    SESSION_DURATION_MIN, extract_name_tenant,
};
use crate::codec::{RecordDecoder, RecordEncoder};

fn input(name: &str) -> RoleInput {
    RoleInput {
        name: name.to_owned(),
        trust_policy: r#"{"Statement":[]}"#.to_owned(),
        ..RoleInput::default()
    }
}

fn role(input: RoleInput) -> Role {
    Role::new(input).unwrap_or_else(|_| unreachable!())
}

fn stored_role() -> Role {
    let mut role = role(RoleInput {
        tenant: Tenant::new("acme").unwrap_or_else(|_| unreachable!()),
        path: Some("/ops/".to_owned()),
        max_session_duration: Some(7200),
        ..input("deployer")
    });
    role.set_id("0b5f9f6c-1f0e-4e53-9c7e-2f2d8c0f2a11");
    role.set_arn(role.derive_arn("arn:aws:iam::"));
    role.set_creation_date("2026-01-02T03:04:05.006Z");
    role.set_perm_policy("s3-read", r#"{"Effect":"Allow"}"#);
    role
}

#[test]
fn absent_fields_take_defaults() {
    let role = role(input("reader"));
    assert_eq!(role.path(), "/");
    assert_eq!(role.max_session_duration(), SESSION_DURATION_MIN);
    assert!(role.tenant().is_default());
    assert!(role.get_tags().is_none());
}

#[test]
fn session_duration_bounds_are_inclusive() {
    for accepted in [SESSION_DURATION_MIN, SESSION_DURATION_MAX] {
        let result = Role::new(RoleInput {
            max_session_duration: Some(accepted),
            ..input("reader")
        });
        assert!(result.is_ok(), "{accepted} should be accepted");
    }

    for rejected in [SESSION_DURATION_MIN - 1, SESSION_DURATION_MAX + 1, 0] {
        let result = Role::new(RoleInput {
            max_session_duration: Some(rejected),
            ..input("reader")
        });
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}

#[test]
fn name_length_limit() {
    assert!(Role::new(input(&"a".repeat(MAX_ROLE_NAME_LEN))).is_ok());
    assert!(matches!(
        Role::new(input(&"a".repeat(MAX_ROLE_NAME_LEN + 1))),
        Err(AppError::Validation(_))
    ));
    assert!(matches!(Role::new(input("")), Err(AppError::Validation(_))));
}

#[test]
fn name_charset_is_enforced() {
    assert!(Role::new(input("svc_role+ci=1,a.b@c-d")).is_ok());
    assert!(matches!(
        Role::new(input("bad name")),
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        Role::new(input("a$b$c")),
        Err(AppError::Validation(_))
    ));
}

#[test]
fn path_length_and_shape() {
    let exact = format!("/{}/", "p".repeat(MAX_PATH_NAME_LEN - 2));
    let too_long = format!("/{}/", "p".repeat(MAX_PATH_NAME_LEN - 1));

    let with_path = |path: &str| {
        Role::new(RoleInput {
            path: Some(path.to_owned()),
            ..input("reader")
        })
    };

    assert!(with_path(&exact).is_ok());
    assert!(matches!(with_path(&too_long), Err(AppError::Validation(_))));
    assert!(matches!(with_path("ops/"), Err(AppError::Validation(_))));
    assert!(matches!(with_path("/ops"), Err(AppError::Validation(_))));
    assert!(matches!(with_path("/o ps/"), Err(AppError::Validation(_))));
}

#[test]
fn extract_name_tenant_splits_at_first_separator() {
    assert_eq!(extract_name_tenant("acme$admin"), (Some("acme"), "admin"));
    assert_eq!(extract_name_tenant("admin"), (None, "admin"));
    assert_eq!(extract_name_tenant("$admin"), (Some(""), "admin"));
}

#[test]
fn qualified_name_overrides_tenant() {
    let role = role(RoleInput {
        tenant: Tenant::new("other").unwrap_or_else(|_| unreachable!()),
        ..input("acme$admin")
    });
    assert_eq!(role.tenant().as_str(), "acme");
    assert_eq!(role.name(), "admin");
}

#[test]
fn arn_places_tenant_before_path_and_name() {
    let role = stored_role();
    assert_eq!(role.arn(), "arn:aws:iam::acme:role/ops/deployer");
}

#[test]
fn encode_decode_reencode_is_identical() {
    let original = stored_role();
    let encoded = original.encode().unwrap_or_else(|_| unreachable!());
    let decoded = Role::decode(encoded.clone()).unwrap_or_else(|_| unreachable!());
    let reencoded = decoded.encode().unwrap_or_else(|_| unreachable!());

    assert_eq!(encoded, reencoded);
    assert_eq!(decoded, original);
}

fn encode_v1(role: &Role) -> Bytes {
    let mut encoder = RecordEncoder::new();
    let written = encoder.put_versioned(1, 1, |body| {
        body.put_str(role.id())?;
        body.put_str(role.name())?;
        body.put_str(role.path())?;
        body.put_str(role.arn())?;
        body.put_str(role.creation_date())?;
        body.put_str(role.trust_policy())?;
        body.put_pairs(
            role.perm_policies()
                .iter()
                .map(|(name, policy)| (name.as_str(), policy.as_str())),
        )
    });
    assert!(written.is_ok());
    encoder.finish()
}

#[test]
fn version_one_records_decode_with_defaults() {
    let original = stored_role();
    let decoded = Role::decode(encode_v1(&original)).unwrap_or_else(|_| unreachable!());

    assert!(decoded.tenant().is_default());
    assert_eq!(decoded.max_session_duration(), SESSION_DURATION_MIN);
    assert_eq!(decoded.name(), original.name());
    assert_eq!(decoded.perm_policies(), original.perm_policies());
}

#[test]
fn version_two_records_keep_tenant() {
    let original = stored_role();
    let mut encoder = RecordEncoder::new();
    let written = encoder.put_versioned(2, 1, |body| {
        body.put_str(original.id())?;
        body.put_str(original.name())?;
        body.put_str(original.path())?;
        body.put_str(original.arn())?;
        body.put_str(original.creation_date())?;
        body.put_str(original.trust_policy())?;
        body.put_pairs(std::iter::empty())?;
        body.put_str(original.tenant().as_str())
    });
    assert!(written.is_ok());

    let decoded = Role::decode(encoder.finish()).unwrap_or_else(|_| unreachable!());
    assert_eq!(decoded.tenant().as_str(), "acme");
    assert_eq!(decoded.max_session_duration(), SESSION_DURATION_MIN);
}

#[test]
fn stored_session_duration_out_of_range_is_corrupt() {
    let original = stored_role();
    for seconds in [SESSION_DURATION_MIN - 1, SESSION_DURATION_MAX + 1] {
        let mut encoder = RecordEncoder::new();
        let written = encoder.put_versioned(3, 1, |body| {
            for field in [original.id(), original.name(), original.path()] {
                body.put_str(field)?;
            }
            for field in [original.arn(), original.creation_date(), original.trust_policy()] {
                body.put_str(field)?;
            }
            body.put_pairs(std::iter::empty())?;
            body.put_str(original.tenant().as_str())?;
            body.put_u64(seconds);
            Ok(())
        });
        assert!(written.is_ok());

        assert!(matches!(
            Role::decode(encoder.finish()),
            Err(AppError::Decode(_))
        ));
    }
}

#[test]
fn version_one_frame_with_extra_fields_is_corrupt() {
    let original = stored_role();
    let mut encoder = RecordEncoder::new();
    let written = encoder.put_versioned(1, 1, |body| {
        for field in [original.id(), original.name(), original.path()] {
            body.put_str(field)?;
        }
        for field in [original.arn(), original.creation_date(), original.trust_policy()] {
            body.put_str(field)?;
        }
        body.put_pairs(std::iter::empty())?;
        body.put_str("acme")
    });
    assert!(written.is_ok());

    assert!(matches!(
        Role::decode(encoder.finish()),
        Err(AppError::Decode(_))
    ));
}

#[test]
fn empty_record_is_corrupt() {
    let mut decoder = RecordDecoder::new(Bytes::new());
    assert!(decoder.get_u64().is_err());
    assert!(matches!(Role::decode(Bytes::new()), Err(AppError::Decode(_))));
}

#[test]
fn erase_tags_removes_every_value_of_a_key() {
    let mut role = role(input("reader"));
    let tags = vec![
        RoleTag::new("env", "prod"),
        RoleTag::new("env", "dev"),
        RoleTag::new("team", "x"),
    ];
    assert!(role.set_tags(tags).is_ok());

    role.erase_tags(&["env"]);
    assert_eq!(role.get_tags(), Some([RoleTag::new("team", "x")].as_slice()));
}

#[test]
fn set_tags_replaces_and_add_tags_appends() {
    let mut role = role(input("reader"));
    assert!(role.set_tags(vec![RoleTag::new("a", "1")]).is_ok());
    assert!(role.set_tags(vec![RoleTag::new("b", "2")]).is_ok());
    assert_eq!(role.get_tags(), Some([RoleTag::new("b", "2")].as_slice()));

    assert!(role.add_tags(vec![RoleTag::new("a", "1"), RoleTag::new("b", "3")]).is_ok());
    assert_eq!(
        role.get_tags(),
        Some(
            [
                RoleTag::new("a", "1"),
                RoleTag::new("b", "2"),
                RoleTag::new("b", "3")
            ]
            .as_slice()
        )
    );
}

#[test]
fn tag_limit_leaves_existing_tags_untouched() {
    let mut role = role(input("reader"));
    assert!(role.set_tags(vec![RoleTag::new("keep", "me")]).is_ok());

    let too_many: Vec<RoleTag> = (0..50).map(|index| RoleTag::new(format!("k{index}"), "v")).collect();
    assert!(matches!(role.add_tags(too_many), Err(AppError::Validation(_))));
    assert_eq!(role.get_tags().map(<[RoleTag]>::len), Some(1));
}

#[test]
fn tags_roundtrip_through_attribute_encoding() {
    let mut original = role(input("reader"));
    assert!(original.set_tags(vec![RoleTag::new("env", "prod"), RoleTag::new("env", "dev")]).is_ok());

    let encoded = original.encode_tags().unwrap_or_else(|_| unreachable!());
    let mut restored = role(input("reader"));
    assert!(restored.restore_tags(encoded.unwrap_or_default()).is_ok());
    assert_eq!(restored.get_tags(), original.get_tags());

    assert!(matches!(restored.encode_tags(), Ok(Some(_))));
    restored.erase_tags(&["env"]);
    assert!(matches!(restored.encode_tags(), Ok(None)));
}

#[test]
fn missing_policy_is_not_found() {
    let mut role = stored_role();
    assert!(matches!(role.delete_policy("absent"), Err(AppError::NotFound(_))));
    assert!(matches!(role.get_role_policy("absent"), Err(AppError::NotFound(_))));

    assert!(role.delete_policy("s3-read").is_ok());
    assert!(role.get_role_policy_names().is_empty());
    assert!(matches!(role.delete_policy("s3-read"), Err(AppError::NotFound(_))));
}

#[test]
fn policy_names_are_sorted() {
    let mut role = role(input("reader"));
    role.set_perm_policy("zeta", "{}");
    role.set_perm_policy("alpha", "{}");
    role.set_perm_policy("alpha", r#"{"v":2}"#);

    assert_eq!(role.get_role_policy_names(), vec!["alpha", "zeta"]);
    assert_eq!(role.get_role_policy("alpha").ok(), Some(r#"{"v":2}"#));
}

proptest! {
    #[test]
    fn encoding_is_stable_across_decode(
        name in "[A-Za-z0-9_+=,.@-]{1,64}",
        tenant in "[a-z0-9_-]{0,12}",
        segment in "[a-z]{0,24}",
        duration in SESSION_DURATION_MIN..=SESSION_DURATION_MAX,
        trust_policy in ".{0,40}",
        policies in proptest::collection::btree_map("[a-z]{1,8}", ".{0,24}", 0..4),
    ) {
        let path = if segment.is_empty() { "/".to_owned() } else { format!("/{segment}/") };
        let mut role = Role::new(RoleInput {
            name,
            tenant: Tenant::new(tenant).map_err(|error| TestCaseError::fail(error.to_string()))?,
            path: Some(path),
            trust_policy,
            max_session_duration: Some(duration),
            tags: Vec::new(),
        })
        .map_err(|error| TestCaseError::fail(error.to_string()))?;
        role.set_id("id-1");
        for (policy_name, policy) in policies {
            role.set_perm_policy(policy_name, policy);
        }

        let first = role.encode().map_err(|error| TestCaseError::fail(error.to_string()))?;
        let decoded = Role::decode(first.clone()).map_err(|error| TestCaseError::fail(error.to_string()))?;
        let second = decoded.encode().map_err(|error| TestCaseError::fail(error.to_string()))?;

        prop_assert_eq!(first, second);
        prop_assert_eq!(decoded, role);
    }
}
