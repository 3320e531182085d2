use tracing::debug;

use super::filters::RoleFilters;
use super::meta::MetaQuery;
use super::rewrite::{TenantScope, rewrite};
use crate::config::Settings;
use crate::error::Result;
use crate::roles::RoleRegistry;
use crate::search::{UserQuery, UserQueryHooks};
use crate::state::RoleTableState;
use crate::store::Store;
use crate::types::capabilities_key;

/// Query var a caller sets to force the role-table path for one search.
pub const ROLES_TABLE_VAR: &str = "roles_table";

type Policy = dyn Fn(&UserQuery) -> bool + Send + Sync;

/// Moves role filtering of user searches from the blob onto `user_roles`.
pub struct RoleQueryInterceptor<'a, S: ?Sized, R: ?Sized> {
    store: &'a S,
    roles: &'a R,
    settings: &'a Settings,
    policy: Option<Box<Policy>>,
}

impl<'a, S, R> RoleQueryInterceptor<'a, S, R>
where
    S: Store + ?Sized,
    R: RoleRegistry + ?Sized,
{
    pub fn new(store: &'a S, roles: &'a R, settings: &'a Settings) -> Self {
        Self {
            store,
            roles,
            settings,
            policy: None,
        }
    }

    /// Replaces the default opt-in answer for queries that do not set `roles_table`.
    #[must_use]
    pub fn with_policy<F>(mut self, policy: F) -> Self
    where
        F: Fn(&UserQuery) -> bool + Send + Sync + 'static,
    {
        self.policy = Some(Box::new(policy));
        self
    }

    /// Whether `query` should be served from the role table.
    ///
    /// Requires a completed backfill, an opt-in (the `roles_table` var or the
    /// policy) and something to filter on.
    pub fn should_intercept(&self, query: &UserQuery) -> Result<bool> {
        if !RoleTableState::new(self.store).has_backfilled()? {
            return Ok(false);
        }

        let vars = query.original_vars();
        let opted_in = vars.get_bool(ROLES_TABLE_VAR)
            || match &self.policy {
                Some(policy) => policy(query),
                None => self.settings.integration_enabled,
            };
        if !opted_in {
            return Ok(false);
        }

        let tenant = query.tenant(self.settings.default_tenant);
        Ok(!RoleFilters::from_vars(vars).is_empty() || self.settings.scopes_tenant(tenant))
    }
}

impl<S, R> UserQueryHooks for RoleQueryInterceptor<'_, S, R>
where
    S: Store + ?Sized,
    R: RoleRegistry + ?Sized,
{
    fn pre_get_users(&self, query: &mut UserQuery) -> Result<()> {
        if query.rewrite_state().is_intercepted() || !self.should_intercept(query)? {
            return Ok(());
        }

        let tenant = query.tenant(self.settings.default_tenant);
        let filters = RoleFilters::from_vars(query.original_vars());
        let definitions = if filters.capabilities.is_empty()
            && filters.capability_in.is_empty()
            && filters.capability_not_in.is_empty()
        {
            Vec::new()
        } else {
            self.roles.role_definitions(tenant)
        };
        let resolved = filters.resolve(&definitions, self.settings.capability_literal_fallback);

        let scope = TenantScope {
            tenant,
            require_membership: filters.is_empty() && self.settings.scopes_tenant(tenant),
        };
        let result = rewrite(&resolved, scope);
        debug!(
            %tenant,
            joins = result.joins.len(),
            where_clauses = result.where_clauses.len(),
            "serving user query from the role table"
        );

        let vars = query.vars_mut();
        for field in &result.cleared_fields {
            vars.remove(field);
        }
        vars.set(ROLES_TABLE_VAR, true);
        query.set_pending_rewrite(result);
        Ok(())
    }

    fn filter_meta_query(&self, query: &UserQuery, meta: MetaQuery) -> MetaQuery {
        if !query.rewrite_state().is_intercepted() {
            return meta;
        }
        let tenant = query.tenant(self.settings.default_tenant);
        meta.without_key(&capabilities_key(tenant))
    }

    fn pre_user_query(&self, query: &mut UserQuery) {
        query.apply_pending_rewrite();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::query::QueryVars;
    use crate::roles::StaticRoleRegistry;
    use crate::search::RewriteState;
    use crate::store::SqliteStore;
    use crate::sync::install;
    use crate::types::TenantId;

    fn store(backfilled: bool) -> SqliteStore {
        let store = SqliteStore::in_memory().unwrap();
        store.initialize().unwrap();
        install(&store, false).unwrap();
        if backfilled {
            RoleTableState::new(&store).record_backfill(Utc::now()).unwrap();
        }
        store
    }

    #[test]
    fn test_skips_until_backfilled() {
        let store = store(false);
        let roles = StaticRoleRegistry::new();
        let settings = Settings::default();
        let interceptor = RoleQueryInterceptor::new(&store, &roles, &settings);

        let query = UserQuery::new(QueryVars::new().with("role", "editor").with("roles_table", true));
        assert!(!interceptor.should_intercept(&query).unwrap());
    }

    #[test]
    fn test_opt_in_sources() {
        let store = store(true);
        let roles = StaticRoleRegistry::new();
        let settings = Settings {
            integration_enabled: false,
            ..Settings::default()
        };

        let filtered = UserQuery::new(QueryVars::new().with("role", "editor"));
        let interceptor = RoleQueryInterceptor::new(&store, &roles, &settings);
        assert!(!interceptor.should_intercept(&filtered).unwrap());

        let forced = UserQuery::new(QueryVars::new().with("role", "editor").with("roles_table", true));
        assert!(interceptor.should_intercept(&forced).unwrap());

        let interceptor = RoleQueryInterceptor::new(&store, &roles, &settings).with_policy(|_| true);
        assert!(interceptor.should_intercept(&filtered).unwrap());

        let unfiltered = UserQuery::new(QueryVars::new().with("search", "bob"));
        assert!(!interceptor.should_intercept(&unfiltered).unwrap());
    }

    #[test]
    fn test_pre_get_users_clears_filters_once() {
        let store = store(true);
        let roles = StaticRoleRegistry::new();
        let settings = Settings::default();
        let interceptor = RoleQueryInterceptor::new(&store, &roles, &settings);

        let mut query = UserQuery::new(
            QueryVars::new()
                .with("role", "editor")
                .with("role__not_in", "banned")
                .with("search", "bob"),
        );
        interceptor.pre_get_users(&mut query).unwrap();

        assert!(query.vars().get("role").is_none());
        assert!(query.vars().get("role__not_in").is_none());
        assert_eq!(query.vars().get_str("search"), Some("bob"));
        assert!(query.vars().get_bool("roles_table"));
        assert_eq!(query.original_vars().get_str("role"), Some("editor"));

        let RewriteState::Pending(pending) = query.rewrite_state().clone() else {
            panic!("expected a pending rewrite");
        };
        assert_eq!(pending.joins.len(), 2);

        interceptor.pre_get_users(&mut query).unwrap();
        assert_eq!(query.rewrite_state(), &RewriteState::Pending(pending));

        interceptor.pre_user_query(&mut query);
        interceptor.pre_user_query(&mut query);
        assert_eq!(query.rewrite_state(), &RewriteState::Applied);
        assert_eq!(query.clauses.from.matches("JOIN").count(), 2);
    }

    #[test]
    fn test_tenant_scope_without_filters() {
        let store = store(true);
        let roles = StaticRoleRegistry::new();
        let settings = Settings {
            multi_tenant: true,
            ..Settings::default()
        };
        let interceptor = RoleQueryInterceptor::new(&store, &roles, &settings);

        let main = UserQuery::new(QueryVars::new());
        assert!(!interceptor.should_intercept(&main).unwrap());

        let mut other = UserQuery::new(QueryVars::new().with("tenant", 2));
        assert_eq!(other.tenant(TenantId(1)), TenantId(2));
        interceptor.pre_get_users(&mut other).unwrap();
        interceptor.pre_user_query(&mut other);
        assert!(other.clauses.from.contains("ur_tenant.tenant_id = 2"));
    }

    #[test]
    fn test_filters_resolving_to_nothing_skip_tenant_scope() {
        let store = store(true);
        let roles = StaticRoleRegistry::new();
        let settings = Settings {
            multi_tenant: true,
            capability_literal_fallback: false,
            ..Settings::default()
        };
        let interceptor = RoleQueryInterceptor::new(&store, &roles, &settings);

        let mut query = UserQuery::new(
            QueryVars::new()
                .with("tenant", 2)
                .with("capability__not_in", "unknown_cap"),
        );
        interceptor.pre_get_users(&mut query).unwrap();
        interceptor.pre_user_query(&mut query);

        assert!(!query.clauses.from.contains("ur_tenant"));
        assert!(query.vars().get("capability__not_in").is_none());
    }
}
