//! The host's user search: builds one SQL statement from query vars.

mod hooks;
mod legacy;

pub use hooks::{NoHooks, UserQueryHooks};

use serde_json::Value;
use tracing::debug;

use crate::config::Settings;
use crate::error::Result;
use crate::query::sql::{escape_like, quote};
use crate::query::{MetaNode, MetaQuery, QueryVars, RewriteResult, RoleFilters};
use crate::roles::RoleRegistry;
use crate::store::{Store, USERS_TABLE};
use crate::types::{TenantId, User, capabilities_key};

/// Query var naming the tenant a search runs against.
pub const TENANT_VAR: &str = "tenant";

const SEARCH_COLUMNS: [&str; 3] = ["login", "email", "display_name"];

/// Where a query stands with respect to the role-table rewrite.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RewriteState {
    #[default]
    Untouched,
    /// Rewritten, waiting for the clauses to be built.
    Pending(RewriteResult),
    /// The rewrite has been spliced into the clauses.
    Applied,
}

impl RewriteState {
    #[must_use]
    pub fn is_intercepted(&self) -> bool {
        !matches!(self, RewriteState::Untouched)
    }
}

/// SQL fragments of a user search, each including its leading keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryClauses {
    pub fields: String,
    pub from: String,
    /// Predicates appended after `WHERE 1=1`, each starting with ` AND `.
    pub where_sql: String,
    pub orderby: String,
    pub limit: String,
}

impl Default for QueryClauses {
    fn default() -> Self {
        Self {
            fields: format!(
                "{USERS_TABLE}.id, {USERS_TABLE}.login, {USERS_TABLE}.email, \
                 {USERS_TABLE}.display_name, {USERS_TABLE}.registered_at"
            ),
            from: format!("FROM {USERS_TABLE}"),
            where_sql: String::new(),
            orderby: String::new(),
            limit: String::new(),
        }
    }
}

impl QueryClauses {
    #[must_use]
    pub fn select_sql(&self) -> String {
        format!(
            "SELECT {} {} WHERE 1=1{}{}{}",
            self.fields, self.from, self.where_sql, self.orderby, self.limit
        )
    }

    /// Counts every row the select would return without its limit.
    #[must_use]
    pub fn count_sql(&self) -> String {
        format!(
            "SELECT COUNT(*) FROM (SELECT {USERS_TABLE}.id {} WHERE 1=1{}{})",
            self.from, self.where_sql, self.orderby
        )
    }

    /// Splices a role-table rewrite into the clauses.
    ///
    /// An existing `GROUP BY` is kept as is.
    pub fn apply_rewrite(&mut self, rewrite: &RewriteResult) {
        for join in &rewrite.joins {
            self.from.push(' ');
            self.from.push_str(join);
        }
        for clause in &rewrite.where_clauses {
            self.where_sql.push_str(" AND ");
            self.where_sql.push_str(clause);
        }
        if let Some(column) = &rewrite.group_by {
            if !self.orderby.contains("GROUP BY") {
                self.orderby = format!(" GROUP BY {column}{}", self.orderby);
            }
        }
    }
}

/// One user search in progress.
#[derive(Debug, Clone)]
pub struct UserQuery {
    vars: QueryVars,
    original_vars: QueryVars,
    pub clauses: QueryClauses,
    rewrite: RewriteState,
}

impl UserQuery {
    #[must_use]
    pub fn new(vars: QueryVars) -> Self {
        Self {
            original_vars: vars.clone(),
            vars,
            clauses: QueryClauses::default(),
            rewrite: RewriteState::Untouched,
        }
    }

    pub fn vars(&self) -> &QueryVars {
        &self.vars
    }

    pub fn vars_mut(&mut self) -> &mut QueryVars {
        &mut self.vars
    }

    /// The vars as the caller passed them, before any hook ran.
    pub fn original_vars(&self) -> &QueryVars {
        &self.original_vars
    }

    #[must_use]
    pub fn tenant(&self, default: TenantId) -> TenantId {
        self.vars
            .get_i64(TENANT_VAR)
            .filter(|id| *id > 0)
            .map_or(default, TenantId)
    }

    pub fn rewrite_state(&self) -> &RewriteState {
        &self.rewrite
    }

    /// Stores a rewrite to apply once the clauses exist. Ignored unless untouched.
    pub fn set_pending_rewrite(&mut self, rewrite: RewriteResult) {
        if self.rewrite == RewriteState::Untouched {
            self.rewrite = RewriteState::Pending(rewrite);
        }
    }

    /// Applies a pending rewrite. Returns false when there was nothing to apply.
    pub fn apply_pending_rewrite(&mut self) -> bool {
        match std::mem::replace(&mut self.rewrite, RewriteState::Applied) {
            RewriteState::Pending(rewrite) => {
                self.clauses.apply_rewrite(&rewrite);
                true
            }
            previous => {
                self.rewrite = previous;
                false
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserQueryResult {
    pub users: Vec<User>,
    /// Rows matched ignoring the limit; `None` when `count_total` is false.
    pub total: Option<i64>,
}

impl UserQueryResult {
    #[must_use]
    pub fn ids(&self) -> Vec<i64> {
        self.users.iter().map(|u| u.id).collect()
    }
}

/// Runs user searches against a store, calling `hooks` along the way.
pub struct UserSearch<'a, S: ?Sized, R: ?Sized, H: ?Sized> {
    store: &'a S,
    roles: &'a R,
    settings: &'a Settings,
    hooks: &'a H,
}

impl<'a, S, R, H> UserSearch<'a, S, R, H>
where
    S: Store + ?Sized,
    R: RoleRegistry + ?Sized,
    H: UserQueryHooks + ?Sized,
{
    pub fn new(store: &'a S, roles: &'a R, settings: &'a Settings, hooks: &'a H) -> Self {
        Self {
            store,
            roles,
            settings,
            hooks,
        }
    }

    pub fn run(&self, vars: QueryVars) -> Result<UserQueryResult> {
        let query = self.prepare(vars)?;
        self.execute(&query)
    }

    /// Builds the statement for `vars` without executing it.
    pub fn prepare(&self, vars: QueryVars) -> Result<UserQuery> {
        let mut query = UserQuery::new(vars);
        self.hooks.pre_get_users(&mut query)?;
        self.prepare_clauses(&mut query);
        self.hooks.pre_user_query(&mut query);
        Ok(query)
    }

    pub fn execute(&self, query: &UserQuery) -> Result<UserQueryResult> {
        let sql = query.clauses.select_sql();
        debug!(%sql, "running user search");
        let users = self.store.search_users(&sql)?;

        let count_total = !matches!(query.vars().get("count_total"), Some(Value::Bool(false)));
        let total = if count_total {
            Some(self.store.count_rows(&query.clauses.count_sql())?)
        } else {
            None
        };

        Ok(UserQueryResult { users, total })
    }

    fn prepare_clauses(&self, query: &mut UserQuery) {
        let tenant = query.tenant(self.settings.default_tenant);
        let key = capabilities_key(tenant);
        let vars = query.vars();

        let mut where_sql = String::new();
        if let Some(search) = vars.get_str("search").and_then(search_clause) {
            where_sql.push_str(" AND ");
            where_sql.push_str(&search);
        }

        let mut meta = MetaQuery::default();
        if let Some(requested) = MetaQuery::from_var(vars.get("meta_query")) {
            if !requested.is_empty() {
                meta.push(MetaNode::Group(requested));
            }
        }

        let filters = RoleFilters::from_vars(vars);
        if !filters.is_empty() {
            let definitions = self.roles.role_definitions(tenant);
            let resolved = filters.resolve(&definitions, self.settings.capability_literal_fallback);
            meta.clauses.extend(legacy::role_clauses(&resolved, &key));
        } else if self.settings.scopes_tenant(tenant) {
            meta.push(legacy::tenant_membership(&key));
        }

        let orderby = orderby_clause(vars);
        let limit = limit_clause(vars);

        let meta = self.hooks.filter_meta_query(query, meta);
        if let Some(sql) = meta.to_sql() {
            where_sql.push_str(" AND ");
            where_sql.push_str(&sql);
        }

        let clauses = &mut query.clauses;
        clauses.where_sql.push_str(&where_sql);
        clauses.orderby = orderby;
        clauses.limit = limit;
    }
}

/// Matches `term` against login, email and display name.
///
/// A leading or trailing `*` anchors the match to the other end; without
/// one the term may appear anywhere.
fn search_clause(term: &str) -> Option<String> {
    let term = term.trim();
    let leading = term.starts_with('*');
    let trailing = term.ends_with('*');
    let core = term.trim_matches('*');
    if core.is_empty() {
        return None;
    }

    let pattern = if leading || trailing {
        format!(
            "{}{}{}",
            if leading { "%" } else { "" },
            escape_like(core),
            if trailing { "%" } else { "" }
        )
    } else {
        format!("%{}%", escape_like(core))
    };
    let pattern = quote(&pattern);

    let columns: Vec<String> = SEARCH_COLUMNS
        .iter()
        .map(|column| format!("{USERS_TABLE}.{column} LIKE {pattern} ESCAPE '\\'"))
        .collect();
    Some(format!("({})", columns.join(" OR ")))
}

fn orderby_clause(vars: &QueryVars) -> String {
    let column = match vars.get_str("orderby").map(str::to_ascii_lowercase).as_deref() {
        Some("id") => "id",
        Some("email") => "email",
        Some("display_name") => "display_name",
        Some("registered") => "registered_at",
        _ => "login",
    };
    let order = match vars.get_str("order") {
        Some(order) if order.eq_ignore_ascii_case("desc") => "DESC",
        _ => "ASC",
    };

    if column == "id" {
        format!(" ORDER BY {USERS_TABLE}.id {order}")
    } else {
        format!(" ORDER BY {USERS_TABLE}.{column} {order}, {USERS_TABLE}.id ASC")
    }
}

fn limit_clause(vars: &QueryVars) -> String {
    let Some(number) = vars.get_i64("number").filter(|n| *n > 0) else {
        return String::new();
    };

    let offset = match vars.get_i64("offset").filter(|o| *o >= 0) {
        Some(offset) => offset,
        None => vars
            .get_i64("paged")
            .filter(|p| *p > 1)
            .and_then(|paged| (paged - 1).checked_mul(number))
            .unwrap_or(0),
    };

    format!(" LIMIT {number} OFFSET {offset}")
}
