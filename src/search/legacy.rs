//! Role filters expressed against the capabilities blob.
//!
//! Each role is matched by looking for its quoted name inside the tenant's
//! blob, so `"editor"` never matches `"senior_editor"`.

use crate::query::{MetaClause, MetaCompare, MetaNode, MetaQuery, ResolvedFilters};

fn contains_role(key: &str, role: &str) -> MetaNode {
    MetaNode::Clause(MetaClause::like(key, format!("\"{role}\"")))
}

fn any_role(key: &str, roles: &[String]) -> MetaNode {
    if roles.is_empty() {
        return MetaNode::Clause(MetaClause::new(key, MetaCompare::In, Vec::<String>::new()));
    }
    MetaNode::Group(MetaQuery::or(
        roles.iter().map(|role| contains_role(key, role)).collect(),
    ))
}

/// Clauses on `key` equivalent to `filters`, all of which must hold.
pub(crate) fn role_clauses(filters: &ResolvedFilters, key: &str) -> Vec<MetaNode> {
    let mut nodes = Vec::new();

    for role in &filters.roles {
        nodes.push(contains_role(key, role));
    }
    if let Some(role_in) = &filters.role_in {
        nodes.push(any_role(key, role_in));
    }
    for role in &filters.role_not_in {
        nodes.push(MetaNode::Clause(MetaClause::not_like(key, format!("\"{role}\""))));
    }
    for requirement in &filters.capabilities {
        nodes.push(any_role(key, &requirement.candidates()));
    }

    nodes
}

/// Matches users whose blob on `key` holds at least one role.
///
/// Looks for the end of an object key, so lists and bare strings never count.
pub(crate) fn tenant_membership(key: &str) -> MetaNode {
    MetaNode::Clause(MetaClause::like(key, "\":"))
}
