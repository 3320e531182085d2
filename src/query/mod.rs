//! Serves role and capability filters of user searches from `user_roles`.

mod filters;
mod interceptor;
mod meta;
mod rewrite;
pub mod sql;
mod vars;

pub use filters::{
    CAPABILITY, CAPABILITY_IN, CAPABILITY_NOT_IN, CapabilityRequirement, ROLE, ROLE_FILTER_KEYS,
    ROLE_IN, ROLE_NOT_IN, ResolvedFilters, RoleFilters,
};
pub use interceptor::{ROLES_TABLE_VAR, RoleQueryInterceptor};
pub use meta::{MetaClause, MetaCompare, MetaNode, MetaQuery, Relation};
pub use rewrite::{RewriteResult, TenantScope, rewrite};
pub use vars::QueryVars;
