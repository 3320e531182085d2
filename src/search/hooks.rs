use super::UserQuery;
use crate::error::Result;
use crate::query::MetaQuery;

/// Extension points a user search exposes while it builds its SQL.
///
/// Every method defaults to leaving the query untouched.
pub trait UserQueryHooks {
    /// Runs before any clause is built; may rewrite the query vars.
    fn pre_get_users(&self, _query: &mut UserQuery) -> Result<()> {
        Ok(())
    }

    /// Receives the combined metadata filter before it is rendered to SQL.
    fn filter_meta_query(&self, _query: &UserQuery, meta: MetaQuery) -> MetaQuery {
        meta
    }

    /// Runs after the clauses are built and before the statement executes.
    fn pre_user_query(&self, _query: &mut UserQuery) {}
}

/// Plain blob-backed search.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl UserQueryHooks for NoHooks {}
