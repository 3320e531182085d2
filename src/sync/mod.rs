//! Keeps the `user_roles` table a materialized view of the capabilities blobs.

mod backfill;
mod install;

pub use backfill::{Backfill, BackfillEvent, BackfillMode};
pub use install::{InstallOutcome, install};

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::error::Result;
use crate::store::Store;
use crate::types::{TenantId, decode_role_blob, tenant_from_key};

/// Write-path hooks invoked by the host after its metadata store changes.
pub struct Synchronizer<'a, S: Store + ?Sized> {
    store: &'a S,
}

impl<'a, S: Store + ?Sized> Synchronizer<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Called after any user meta write. Keys other than capabilities blobs are ignored.
    pub fn meta_written(&self, user_id: i64, key: &str, value: &str) -> Result<()> {
        if let Some(tenant) = tenant_from_key(key) {
            self.blob_written(user_id, tenant, value)?;
        }
        Ok(())
    }

    /// Called after any user meta delete.
    pub fn meta_deleted(&self, user_id: i64, key: &str) -> Result<()> {
        if let Some(tenant) = tenant_from_key(key) {
            self.blob_deleted(user_id, tenant)?;
        }
        Ok(())
    }

    /// Replaces the user's rows for `tenant` with the roles decoded from `blob`.
    ///
    /// A malformed blob syncs as an empty role set. Returns the roles written.
    pub fn blob_written(&self, user_id: i64, tenant: TenantId, blob: &str) -> Result<Vec<String>> {
        let roles: Vec<String> = decode_or_empty(user_id, tenant, blob).into_iter().collect();
        self.store.replace_user_roles(user_id, tenant, &roles)?;
        debug!(user_id, %tenant, ?roles, "synced role assignments");
        Ok(roles)
    }

    pub fn blob_deleted(&self, user_id: i64, tenant: TenantId) -> Result<usize> {
        let removed = self.store.delete_user_roles(user_id, Some(tenant))?;
        debug!(user_id, %tenant, removed, "cleared role assignments");
        Ok(removed)
    }

    /// Called when a user leaves one tenant, or the whole installation when `tenant` is `None`.
    pub fn user_removed(&self, user_id: i64, tenant: Option<TenantId>) -> Result<usize> {
        self.store.delete_user_roles(user_id, tenant)
    }
}

pub(crate) fn decode_or_empty(user_id: i64, tenant: TenantId, blob: &str) -> BTreeSet<String> {
    decode_role_blob(blob).unwrap_or_else(|e| {
        warn!(user_id, %tenant, "treating role blob as empty: {e}");
        BTreeSet::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use crate::types::{NewUser, capabilities_key, encode_role_blob};

    fn store() -> SqliteStore {
        let store = SqliteStore::in_memory().unwrap();
        store.initialize().unwrap();
        store.create_role_table().unwrap();
        store
    }

    #[test]
    fn test_meta_written_routes_by_key() {
        let store = store();
        let sync = Synchronizer::new(&store);
        let id = store.create_user(&NewUser::new("alice")).unwrap();

        sync.meta_written(id, "nickname", r#"{"editor":true}"#).unwrap();
        assert_eq!(store.count_role_assignments().unwrap(), 0);

        sync.meta_written(id, &capabilities_key(TenantId(3)), &encode_role_blob(["editor"]))
            .unwrap();
        assert_eq!(store.list_user_roles(id, TenantId(3)).unwrap(), vec!["editor"]);
        assert!(store.list_user_roles(id, TenantId(1)).unwrap().is_empty());
    }

    #[test]
    fn test_blob_rewrite_replaces_previous_roles() {
        let store = store();
        let sync = Synchronizer::new(&store);

        sync.blob_written(5, TenantId(1), &encode_role_blob(["a", "b"])).unwrap();
        sync.blob_written(5, TenantId(1), &encode_role_blob(["b", "c"])).unwrap();

        assert_eq!(store.list_user_roles(5, TenantId(1)).unwrap(), vec!["b", "c"]);
    }

    #[test]
    fn test_malformed_blob_syncs_as_empty() {
        let store = store();
        let sync = Synchronizer::new(&store);

        sync.blob_written(5, TenantId(1), &encode_role_blob(["a"])).unwrap();
        let written = sync.blob_written(5, TenantId(1), "not json").unwrap();

        assert!(written.is_empty());
        assert!(store.list_user_roles(5, TenantId(1)).unwrap().is_empty());
    }

    #[test]
    fn test_delete_is_noop_without_rows() {
        let store = store();
        let sync = Synchronizer::new(&store);

        assert_eq!(sync.blob_deleted(9, TenantId(1)).unwrap(), 0);
        sync.meta_deleted(9, "capabilities").unwrap();
    }

    #[test]
    fn test_user_removed_from_one_tenant_or_all() {
        let store = store();
        let sync = Synchronizer::new(&store);

        sync.blob_written(4, TenantId(1), &encode_role_blob(["a", "b"])).unwrap();
        sync.blob_written(4, TenantId(2), &encode_role_blob(["c"])).unwrap();

        assert_eq!(sync.user_removed(4, Some(TenantId(2))).unwrap(), 1);
        assert_eq!(store.list_role_assignments(4).unwrap().len(), 2);

        assert_eq!(sync.user_removed(4, None).unwrap(), 2);
        assert!(store.list_role_assignments(4).unwrap().is_empty());
    }
}
