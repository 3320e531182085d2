//! Translation of resolved role filters into joins against `user_roles`.

use super::filters::{ROLE_FILTER_KEYS, ResolvedFilters};
use super::sql::{quote, quote_list};
use crate::store::{ROLES_TABLE, USERS_TABLE};
use crate::types::TenantId;

/// Tenant the rewritten query is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantScope {
    pub tenant: TenantId,
    /// Restrict results to users holding any role on `tenant`.
    ///
    /// Only meaningful when the caller supplied no role filter at all; filters
    /// that resolve to nothing still leave membership alone.
    pub require_membership: bool,
}

impl TenantScope {
    #[must_use]
    pub fn new(tenant: TenantId) -> Self {
        Self {
            tenant,
            require_membership: false,
        }
    }
}

/// SQL the host splices into its user query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteResult {
    /// Complete `JOIN` clauses, appended to the FROM clause in order.
    pub joins: Vec<String>,
    /// Predicates ANDed onto the WHERE clause.
    pub where_clauses: Vec<String>,
    /// Column to group on when the joins can multiply rows.
    pub group_by: Option<String>,
    /// Query vars the host must clear so the blob filters do not run as well.
    pub cleared_fields: Vec<&'static str>,
}

impl RewriteResult {
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.joins.is_empty() && self.where_clauses.is_empty()
    }
}

/// Builds the join/where fragments equivalent to `filters` on the role table.
///
/// Deterministic: the same filters and scope always produce the same SQL.
#[must_use]
pub fn rewrite(filters: &ResolvedFilters, scope: TenantScope) -> RewriteResult {
    let mut joins = Vec::new();
    let mut where_clauses = Vec::new();

    let join_on = |alias: &str| {
        format!(
            "{USERS_TABLE}.id = {alias}.user_id AND {alias}.tenant_id = {}",
            scope.tenant
        )
    };

    // Each exact role narrows the result set: one join per role.
    for (index, role) in filters.roles.iter().enumerate() {
        let alias = format!("ur{index}");
        joins.push(format!(
            "INNER JOIN {ROLES_TABLE} {alias} ON {} AND {alias}.role = {}",
            join_on(&alias),
            quote(role)
        ));
    }

    if let Some(role_in) = &filters.role_in {
        if role_in.is_empty() {
            where_clauses.push("1 = 0".to_string());
        } else {
            joins.push(format!(
                "INNER JOIN {ROLES_TABLE} ur_in ON {} AND ur_in.role IN ({})",
                join_on("ur_in"),
                quote_list(role_in)
            ));
        }
    }

    if !filters.role_not_in.is_empty() {
        joins.push(format!(
            "LEFT JOIN {ROLES_TABLE} ur_not_in ON {} AND ur_not_in.role IN ({})",
            join_on("ur_not_in"),
            quote_list(&filters.role_not_in)
        ));
        where_clauses.push("ur_not_in.role IS NULL".to_string());
    }

    for (index, requirement) in filters.capabilities.iter().enumerate() {
        let alias = format!("ur_caps{index}");

        if requirement.granted_by.is_empty() {
            if requirement.literal_fallback {
                joins.push(format!(
                    "INNER JOIN {ROLES_TABLE} {alias} ON {} AND {alias}.role = {}",
                    join_on(&alias),
                    quote(&requirement.capability)
                ));
            } else {
                where_clauses.push("1 = 0".to_string());
            }
            continue;
        }

        let mut options = Vec::with_capacity(2);
        if requirement.literal_fallback {
            options.push(format!("({alias}.role = {})", quote(&requirement.capability)));
        }
        options.push(format!(
            "({alias}.role IN ({}))",
            quote_list(&requirement.granted_by)
        ));

        joins.push(format!(
            "INNER JOIN {ROLES_TABLE} {alias} ON {}",
            join_on(&alias)
        ));
        where_clauses.push(format!("({})", options.join(" OR ")));
    }

    if scope.require_membership {
        joins.push(format!(
            "INNER JOIN {ROLES_TABLE} ur_tenant ON {}",
            join_on("ur_tenant")
        ));
    }

    let mut result = RewriteResult {
        joins,
        where_clauses,
        group_by: None,
        cleared_fields: ROLE_FILTER_KEYS.to_vec(),
    };
    if !result.is_noop() {
        result.group_by = Some(format!("{USERS_TABLE}.id"));
    }
    result
}
