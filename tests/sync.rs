//! The role table stays a faithful copy of the capabilities blobs.

mod common;

use common::Fixture;
use roletable::store::Store;
use roletable::sync::{Backfill, BackfillEvent, BackfillMode, Synchronizer};
use roletable::types::{NewUser, TenantId, capabilities_key, decode_role_blob, encode_role_blob};

const MAIN: TenantId = TenantId::DEFAULT;

fn assert_mirrors_blob(fx: &Fixture, user_id: i64, tenant: TenantId) {
    let blob = fx
        .store
        .get_user_meta(user_id, &capabilities_key(tenant))
        .unwrap()
        .unwrap_or_default();
    let expected: Vec<String> = decode_role_blob(&blob)
        .unwrap_or_default()
        .into_iter()
        .collect();
    assert_eq!(fx.roles_of(user_id, tenant), expected, "user {user_id}");
}

#[test]
fn test_rows_follow_blob_writes_and_deletes() {
    let fx = Fixture::new();
    let id = fx.add_user("writer", &["role1", "role2"]);
    assert_eq!(fx.roles_of(id, MAIN), vec!["role1", "role2"]);

    fx.set_roles(id, MAIN, &["role3"]);
    assert_eq!(fx.roles_of(id, MAIN), vec!["role3"]);
    assert_mirrors_blob(&fx, id, MAIN);

    fx.set_roles(id, MAIN, &[]);
    assert!(fx.roles_of(id, MAIN).is_empty());

    fx.set_roles(id, MAIN, &["editor"]);
    fx.store.delete_user_meta(id, "capabilities").unwrap();
    Synchronizer::new(&fx.store)
        .meta_deleted(id, "capabilities")
        .unwrap();
    assert!(fx.roles_of(id, MAIN).is_empty());
}

#[test]
fn test_unrelated_meta_is_ignored() {
    let fx = Fixture::new();
    let id = fx.add_user("meta", &["role1"]);

    let sync = Synchronizer::new(&fx.store);
    sync.meta_written(id, "nickname", "{\"role9\":true}").unwrap();
    sync.meta_deleted(id, "nickname").unwrap();
    sync.meta_written(id, "1_capabilities", "{\"role9\":true}").unwrap();

    assert_eq!(fx.roles_of(id, MAIN), vec!["role1"]);
}

#[test]
fn test_backfill_mirrors_every_blob() {
    let fx = Fixture::new();
    let cases: [&[&str]; 4] = [&["role1"], &["role2", "role3"], &[], &["editor", "role1"]];
    let mut ids = Vec::new();
    for (i, roles) in cases.into_iter().enumerate() {
        let id = fx.store.create_user(&NewUser::new(format!("u{i}"))).unwrap();
        fx.write_blob(id, MAIN, &encode_role_blob(roles.iter().copied()));
        ids.push(id);
    }
    assert_eq!(fx.store.count_role_assignments().unwrap(), 0);

    fx.backfill(BackfillMode::Truncate);
    for id in ids {
        assert_mirrors_blob(&fx, id, MAIN);
    }
    assert_eq!(fx.store.count_role_assignments().unwrap(), 5);
}

#[test]
fn test_preserve_keeps_rows_of_untouched_users() {
    let fx = Fixture::new();
    let kept = fx.add_user("kept", &["role1"]);
    let stale = fx.add_user("stale", &["role2"]);
    // The blob goes away without the hook firing.
    fx.store.delete_user_meta(stale, "capabilities").unwrap();
    let fresh = fx.store.create_user(&NewUser::new("fresh")).unwrap();
    fx.write_blob(fresh, MAIN, r#"{"role3":true}"#);

    fx.backfill(BackfillMode::Preserve);
    assert_eq!(fx.roles_of(kept, MAIN), vec!["role1"]);
    assert_eq!(fx.roles_of(stale, MAIN), vec!["role2"]);
    assert_eq!(fx.roles_of(fresh, MAIN), vec!["role3"]);

    fx.backfill(BackfillMode::Truncate);
    assert!(fx.roles_of(stale, MAIN).is_empty());
    assert_eq!(fx.store.count_role_assignments().unwrap(), 2);
}

#[test]
fn test_malformed_blob_does_not_stop_backfill() {
    let fx = Fixture::new();
    let broken = fx.store.create_user(&NewUser::new("broken")).unwrap();
    fx.write_blob(broken, MAIN, "a:1:{s:6:\"role1\";b:1;}");
    let fine = fx.store.create_user(&NewUser::new("fine")).unwrap();
    fx.write_blob(fine, MAIN, r#"{"role2":true}"#);

    let progress: Vec<(i64, Vec<String>)> =
        Backfill::new(&fx.store, &fx.settings, BackfillMode::Truncate)
            .filter_map(|event| match event.unwrap() {
                BackfillEvent::Progress { user_id, roles, .. } => Some((user_id, roles)),
                _ => None,
            })
            .collect();

    assert_eq!(
        progress,
        vec![(broken, Vec::new()), (fine, vec!["role2".to_string()])]
    );
    assert!(fx.roles_of(broken, MAIN).is_empty());
}

#[test]
fn test_malformed_write_clears_rows() {
    let fx = Fixture::new();
    let id = fx.add_user("garbled", &["role1"]);

    Synchronizer::new(&fx.store)
        .meta_written(id, "capabilities", "[\"role1\"]")
        .unwrap();
    assert!(fx.roles_of(id, MAIN).is_empty());
}

#[test]
fn test_user_removal_scopes() {
    let fx = Fixture::multi_tenant();
    let second = fx.store.create_tenant("second").unwrap();
    let id = fx.add_user("roamer", &["role1"]);
    fx.set_roles(id, second, &["role2"]);

    let sync = Synchronizer::new(&fx.store);
    assert_eq!(sync.user_removed(id, Some(second)).unwrap(), 1);
    assert_eq!(fx.roles_of(id, MAIN), vec!["role1"]);
    assert!(fx.roles_of(id, second).is_empty());

    fx.set_roles(id, second, &["role2", "role3"]);
    assert_eq!(sync.user_removed(id, None).unwrap(), 3);
    assert!(fx.store.list_role_assignments(id).unwrap().is_empty());
}

#[test]
fn test_deleting_user_cascades_blob_not_rows() {
    let fx = Fixture::new();
    let id = fx.add_user("gone", &["role1"]);

    assert!(fx.store.delete_user(id).unwrap());
    assert!(fx.store.get_user_meta(id, "capabilities").unwrap().is_none());
    // Rows stay until the host reports the removal.
    assert_eq!(fx.roles_of(id, MAIN), vec!["role1"]);
    Synchronizer::new(&fx.store).user_removed(id, None).unwrap();
    assert!(fx.roles_of(id, MAIN).is_empty());
}
