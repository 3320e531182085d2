#![allow(dead_code)]

use chrono::Utc;
use roletable::config::Settings;
use roletable::query::{QueryVars, RoleQueryInterceptor};
use roletable::roles::StaticRoleRegistry;
use roletable::search::{NoHooks, UserQueryResult, UserSearch};
use roletable::state::RoleTableState;
use roletable::store::{SqliteStore, Store};
use roletable::sync::{Backfill, BackfillMode, Synchronizer, install};
use roletable::types::{NewUser, RoleDefinition, TenantId, capabilities_key, encode_role_blob};
use serde_json::Value;
use tempfile::TempDir;

/// A file-backed store with the role table installed and a small role catalogue.
pub struct Fixture {
    pub store: SqliteStore,
    pub settings: Settings,
    pub roles: StaticRoleRegistry,
    _temp: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_settings(Settings::default())
    }

    pub fn multi_tenant() -> Self {
        Self::with_settings(Settings {
            multi_tenant: true,
            ..Settings::default()
        })
    }

    pub fn with_settings(mut settings: Settings) -> Self {
        let temp = TempDir::new().expect("create temp dir");
        settings.data_dir = temp.path().to_path_buf();

        let store = SqliteStore::new(settings.db_path()).expect("open store");
        store.initialize().expect("initialize host schema");
        install(&store, false).expect("install role table");

        let roles = StaticRoleRegistry::new()
            .with_role(RoleDefinition::new("role1", ["read", "test_cap1"]))
            .with_role(RoleDefinition::new("role2", ["read", "test_cap2"]))
            .with_role(RoleDefinition::new("role3", ["test_cap3"]))
            .with_role(RoleDefinition::new("editor", ["read", "edit"]));

        Self {
            store,
            settings,
            roles,
            _temp: temp,
        }
    }

    /// Creates a user and writes its blob on the default tenant.
    pub fn add_user(&self, login: &str, roles: &[&str]) -> i64 {
        let id = self.store.create_user(&NewUser::new(login)).expect("create user");
        self.set_roles(id, TenantId::DEFAULT, roles);
        id
    }

    /// Writes the user's blob for `tenant` and syncs it, as the host would.
    pub fn set_roles(&self, user_id: i64, tenant: TenantId, roles: &[&str]) {
        let key = capabilities_key(tenant);
        let blob = encode_role_blob(roles.iter().copied());
        self.store.set_user_meta(user_id, &key, &blob).expect("write blob");
        Synchronizer::new(&self.store)
            .meta_written(user_id, &key, &blob)
            .expect("sync blob");
    }

    /// Writes a raw blob without syncing, as data predating the role table would be.
    pub fn write_blob(&self, user_id: i64, tenant: TenantId, blob: &str) {
        self.store
            .set_user_meta(user_id, &capabilities_key(tenant), blob)
            .expect("write blob");
    }

    pub fn backfill(&self, mode: BackfillMode) {
        for event in Backfill::new(&self.store, &self.settings, mode) {
            event.expect("backfill event");
        }
    }

    /// Marks the table as backfilled without touching its rows.
    pub fn mark_backfilled(&self) {
        RoleTableState::new(&self.store)
            .record_backfill(Utc::now())
            .expect("record backfill");
    }

    pub fn roles_of(&self, user_id: i64, tenant: TenantId) -> Vec<String> {
        self.store.list_user_roles(user_id, tenant).expect("list roles")
    }

    /// Runs `vars` through the blob-matching search.
    pub fn legacy(&self, vars: Value) -> UserQueryResult {
        UserSearch::new(&self.store, &self.roles, &self.settings, &NoHooks)
            .run(QueryVars::from_json(vars))
            .expect("legacy search")
    }

    /// Runs `vars` through the search with the role table interceptor.
    pub fn table(&self, vars: Value) -> UserQueryResult {
        let interceptor = RoleQueryInterceptor::new(&self.store, &self.roles, &self.settings);
        UserSearch::new(&self.store, &self.roles, &self.settings, &interceptor)
            .run(QueryVars::from_json(vars))
            .expect("table search")
    }

    /// Asserts both search paths agree on users and totals, returning the ids.
    pub fn assert_parity(&self, vars: Value) -> Vec<i64> {
        let legacy = self.legacy(vars.clone());
        let table = self.table(vars.clone());
        assert_eq!(legacy.users, table.users, "users differ for {vars}");
        assert_eq!(legacy.total, table.total, "totals differ for {vars}");
        table.ids()
    }
}
