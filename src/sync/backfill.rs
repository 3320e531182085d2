use std::collections::VecDeque;
use std::iter::FusedIterator;

use chrono::Utc;
use tracing::info;

use super::decode_or_empty;
use crate::config::Settings;
use crate::error::Result;
use crate::state::RoleTableState;
use crate::store::Store;
use crate::types::{TenantId, capabilities_key};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackfillMode {
    /// Empty the role table before migrating.
    #[default]
    Truncate,
    /// Keep existing rows; users seen in this run have their rows overwritten.
    Preserve,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackfillEvent {
    Message(String),
    Start {
        total: u64,
    },
    Progress {
        user_id: i64,
        tenant: TenantId,
        roles: Vec<String>,
    },
    Finish {
        migrated: u64,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Truncate,
    Count,
    NextTenant,
    Users,
    Finish,
    Done,
}

/// Single-pass backfill of the role table from every user's blob.
///
/// Work happens as events are pulled: each `Progress` event is produced after
/// that user's rows are written, so dropping the iterator early leaves the
/// remaining users unmigrated. The backfill timestamp is only recorded when
/// `Finish` is produced.
pub struct Backfill<'a, S: Store + ?Sized> {
    store: &'a S,
    mode: BackfillMode,
    multi_tenant: bool,
    default_tenant: TenantId,
    batch_size: u32,
    stage: Stage,
    tenants: VecDeque<TenantId>,
    tenant: TenantId,
    cursor: i64,
    page: VecDeque<(i64, String)>,
    migrated: u64,
}

impl<'a, S: Store + ?Sized> Backfill<'a, S> {
    pub fn new(store: &'a S, settings: &Settings, mode: BackfillMode) -> Self {
        Self {
            store,
            mode,
            multi_tenant: settings.multi_tenant,
            default_tenant: settings.default_tenant,
            batch_size: settings.backfill_batch_size.max(1),
            stage: Stage::Truncate,
            tenants: VecDeque::new(),
            tenant: settings.default_tenant,
            cursor: 0,
            page: VecDeque::new(),
            migrated: 0,
        }
    }

    fn tenant_ids(&self) -> Result<Vec<TenantId>> {
        if self.multi_tenant {
            Ok(self.store.list_tenants()?.into_iter().map(|t| t.id).collect())
        } else {
            Ok(vec![self.default_tenant])
        }
    }

    fn step(&mut self) -> Result<Option<BackfillEvent>> {
        loop {
            match self.stage {
                Stage::Truncate => {
                    self.stage = Stage::Count;
                    if self.mode == BackfillMode::Truncate {
                        self.store.truncate_user_roles()?;
                        return Ok(Some(BackfillEvent::Message(
                            "Truncated the user roles table.".to_string(),
                        )));
                    }
                }
                Stage::Count => {
                    let tenants = self.tenant_ids()?;
                    let mut total = 0u64;
                    for tenant in &tenants {
                        let count = self.store.count_meta_values(&capabilities_key(*tenant))?;
                        total += u64::try_from(count).unwrap_or(0);
                    }

                    info!(total, tenants = tenants.len(), mode = ?self.mode, "starting role backfill");
                    self.tenants = tenants.into();
                    self.stage = Stage::NextTenant;
                    return Ok(Some(BackfillEvent::Start { total }));
                }
                Stage::NextTenant => match self.tenants.pop_front() {
                    Some(tenant) => {
                        self.tenant = tenant;
                        self.cursor = 0;
                        self.page.clear();
                        self.stage = Stage::Users;
                        if self.multi_tenant {
                            return Ok(Some(BackfillEvent::Message(format!(
                                "Migrating user roles for tenant {tenant}..."
                            ))));
                        }
                    }
                    None => self.stage = Stage::Finish,
                },
                Stage::Users => {
                    if self.page.is_empty() {
                        let key = capabilities_key(self.tenant);
                        let page = self
                            .store
                            .list_meta_values(&key, self.cursor, self.batch_size)?;
                        if page.is_empty() {
                            self.stage = Stage::NextTenant;
                            continue;
                        }
                        self.page = page.into();
                    }

                    let Some((user_id, blob)) = self.page.pop_front() else {
                        continue;
                    };
                    self.cursor = user_id;

                    let roles: Vec<String> =
                        decode_or_empty(user_id, self.tenant, &blob).into_iter().collect();
                    self.store.replace_user_roles(user_id, self.tenant, &roles)?;
                    self.migrated += 1;

                    return Ok(Some(BackfillEvent::Progress {
                        user_id,
                        tenant: self.tenant,
                        roles,
                    }));
                }
                Stage::Finish => {
                    RoleTableState::new(self.store).record_backfill(Utc::now())?;
                    self.stage = Stage::Done;

                    info!(migrated = self.migrated, "role backfill complete");
                    return Ok(Some(BackfillEvent::Finish {
                        migrated: self.migrated,
                        message: format!(
                            "Migrated {} {} to the user roles table.",
                            self.migrated,
                            pluralize(self.migrated, "user", "users")
                        ),
                    }));
                }
                Stage::Done => return Ok(None),
            }
        }
    }
}

impl<S: Store + ?Sized> Iterator for Backfill<'_, S> {
    type Item = Result<BackfillEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.step() {
            Ok(event) => event.map(Ok),
            Err(e) => {
                self.stage = Stage::Done;
                Some(Err(e))
            }
        }
    }
}

impl<S: Store + ?Sized> FusedIterator for Backfill<'_, S> {}

fn pluralize<'s>(count: u64, singular: &'s str, plural: &'s str) -> &'s str {
    if count == 1 { singular } else { plural }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use crate::sync::install;
    use crate::types::{NewUser, encode_role_blob};

    fn store() -> SqliteStore {
        let store = SqliteStore::in_memory().unwrap();
        store.initialize().unwrap();
        install(&store, false).unwrap();
        store
    }

    fn add_user(store: &SqliteStore, login: &str, roles: &[&str]) -> i64 {
        let id = store.create_user(&NewUser::new(login)).unwrap();
        store
            .set_user_meta(id, "capabilities", &encode_role_blob(roles.iter().copied()))
            .unwrap();
        id
    }

    #[test]
    fn test_event_sequence() {
        let store = store();
        let a = add_user(&store, "a", &["editor"]);
        let b = add_user(&store, "b", &["author", "editor"]);

        let events: Vec<_> = Backfill::new(&store, &Settings::default(), BackfillMode::Truncate)
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(
            events,
            vec![
                BackfillEvent::Message("Truncated the user roles table.".to_string()),
                BackfillEvent::Start { total: 2 },
                BackfillEvent::Progress {
                    user_id: a,
                    tenant: TenantId(1),
                    roles: vec!["editor".to_string()],
                },
                BackfillEvent::Progress {
                    user_id: b,
                    tenant: TenantId(1),
                    roles: vec!["author".to_string(), "editor".to_string()],
                },
                BackfillEvent::Finish {
                    migrated: 2,
                    message: "Migrated 2 users to the user roles table.".to_string(),
                },
            ]
        );
        assert!(RoleTableState::new(&store).has_backfilled().unwrap());
    }

    #[test]
    fn test_pages_through_small_batches() {
        let store = store();
        for i in 0..7 {
            add_user(&store, &format!("user{i}"), &["subscriber"]);
        }
        let settings = Settings {
            backfill_batch_size: 3,
            ..Settings::default()
        };

        let progress = Backfill::new(&store, &settings, BackfillMode::Truncate)
            .filter_map(|event| match event.unwrap() {
                BackfillEvent::Progress { user_id, .. } => Some(user_id),
                _ => None,
            })
            .collect::<Vec<_>>();

        assert_eq!(progress.len(), 7);
        assert!(progress.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(store.count_role_assignments().unwrap(), 7);
    }

    #[test]
    fn test_stopping_early_leaves_rest_unmigrated() {
        let store = store();
        let first = add_user(&store, "first", &["editor"]);
        let second = add_user(&store, "second", &["editor"]);

        let mut backfill = Backfill::new(&store, &Settings::default(), BackfillMode::Preserve);
        assert!(matches!(backfill.next(), Some(Ok(BackfillEvent::Start { total: 2 }))));
        assert!(matches!(backfill.next(), Some(Ok(BackfillEvent::Progress { .. }))));
        drop(backfill);

        assert_eq!(store.list_user_roles(first, TenantId(1)).unwrap(), vec!["editor"]);
        assert!(store.list_user_roles(second, TenantId(1)).unwrap().is_empty());
        assert!(!RoleTableState::new(&store).has_backfilled().unwrap());
    }

    #[test]
    fn test_singular_summary() {
        let store = store();
        add_user(&store, "solo", &["editor"]);

        let finish = Backfill::new(&store, &Settings::default(), BackfillMode::Preserve)
            .map(|e| e.unwrap())
            .last()
            .unwrap();

        assert_eq!(
            finish,
            BackfillEvent::Finish {
                migrated: 1,
                message: "Migrated 1 user to the user roles table.".to_string(),
            }
        );
    }

    #[test]
    fn test_engine_error_ends_iteration() {
        let store = SqliteStore::in_memory().unwrap();
        store.initialize().unwrap();

        let mut backfill = Backfill::new(&store, &Settings::default(), BackfillMode::Truncate);
        assert!(matches!(backfill.next(), Some(Err(_))));
        assert!(backfill.next().is_none());
    }
}
