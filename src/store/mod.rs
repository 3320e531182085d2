mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::types::*;

pub const USERS_TABLE: &str = "users";
pub const USERMETA_TABLE: &str = "usermeta";
pub const ROLES_TABLE: &str = "user_roles";

/// Store defines the database interface.
pub trait Store: Send + Sync {
    /// Creates the host tables. Does not touch the role table.
    fn initialize(&self) -> Result<()>;

    // Tenant operations
    fn create_tenant(&self, name: &str) -> Result<TenantId>;
    fn list_tenants(&self) -> Result<Vec<Tenant>>;

    // User operations
    fn create_user(&self, user: &NewUser) -> Result<i64>;
    fn get_user(&self, id: i64) -> Result<Option<User>>;
    fn delete_user(&self, id: i64) -> Result<bool>;
    fn count_users(&self) -> Result<i64>;

    // User meta operations (legacy key/value store)
    fn get_user_meta(&self, user_id: i64, key: &str) -> Result<Option<String>>;
    fn set_user_meta(&self, user_id: i64, key: &str, value: &str) -> Result<()>;
    fn delete_user_meta(&self, user_id: i64, key: &str) -> Result<bool>;
    /// Pages `(user_id, meta_value)` pairs for `key` in ascending user id order.
    fn list_meta_values(&self, key: &str, after_user_id: i64, limit: u32)
    -> Result<Vec<(i64, String)>>;
    fn count_meta_values(&self, key: &str) -> Result<i64>;

    // Role table operations
    fn create_role_table(&self) -> Result<()>;
    fn role_table_exists(&self) -> Result<bool>;
    /// Atomically swaps the role set of `(user_id, tenant)` for `roles`.
    fn replace_user_roles(&self, user_id: i64, tenant: TenantId, roles: &[String]) -> Result<()>;
    /// Deletes one tenant's rows for the user, or every tenant's rows when `tenant` is `None`.
    fn delete_user_roles(&self, user_id: i64, tenant: Option<TenantId>) -> Result<usize>;
    fn truncate_user_roles(&self) -> Result<()>;
    fn list_user_roles(&self, user_id: i64, tenant: TenantId) -> Result<Vec<String>>;
    fn list_role_assignments(&self, user_id: i64) -> Result<Vec<RoleAssignment>>;
    fn count_role_assignments(&self) -> Result<i64>;

    // Options
    fn get_option(&self, name: &str) -> Result<Option<String>>;
    fn set_option(&self, name: &str, value: &str) -> Result<()>;

    // User search execution
    fn search_users(&self, sql: &str) -> Result<Vec<User>>;
    fn count_rows(&self, sql: &str) -> Result<i64>;
}
