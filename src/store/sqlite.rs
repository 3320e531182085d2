use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::Store;
use super::schema::{ROLE_TABLE_SCHEMA, SCHEMA};
use crate::error::{Error, Result};
use crate::types::*;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens a private in-memory database.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        login: row.get(1)?,
        email: row.get(2)?,
        display_name: row.get(3)?,
        registered_at: parse_datetime(&row.get::<_, String>(4)?),
    })
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // Tenant operations

    fn create_tenant(&self, name: &str) -> Result<TenantId> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO tenants (name, created_at) VALUES (?1, ?2)",
            params![name, format_datetime(&Utc::now())],
        )?;
        Ok(TenantId(conn.last_insert_rowid()))
    }

    fn list_tenants(&self) -> Result<Vec<Tenant>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT id, name, created_at FROM tenants ORDER BY id")?;

        let rows = stmt.query_map([], |row| {
            Ok(Tenant {
                id: TenantId(row.get(0)?),
                name: row.get(1)?,
                created_at: parse_datetime(&row.get::<_, String>(2)?),
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // User operations

    fn create_user(&self, user: &NewUser) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO users (login, email, display_name, registered_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                user.login,
                user.email,
                user.display_name,
                format_datetime(&Utc::now()),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn get_user(&self, id: i64) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, login, email, display_name, registered_at FROM users WHERE id = ?1",
            params![id],
            user_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn delete_user(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM users WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn count_users(&self) -> Result<i64> {
        let count = self
            .conn()
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count)
    }

    // User meta operations

    fn get_user_meta(&self, user_id: i64, key: &str) -> Result<Option<String>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT meta_value FROM usermeta WHERE user_id = ?1 AND meta_key = ?2",
            params![user_id, key],
            |row| row.get(0),
        )
        .optional()
        .map_err(Error::from)
    }

    fn set_user_meta(&self, user_id: i64, key: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO usermeta (user_id, meta_key, meta_value) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id, meta_key) DO UPDATE SET meta_value = excluded.meta_value",
            params![user_id, key, value],
        )?;
        Ok(())
    }

    fn delete_user_meta(&self, user_id: i64, key: &str) -> Result<bool> {
        let rows = self.conn().execute(
            "DELETE FROM usermeta WHERE user_id = ?1 AND meta_key = ?2",
            params![user_id, key],
        )?;
        Ok(rows > 0)
    }

    fn list_meta_values(
        &self,
        key: &str,
        after_user_id: i64,
        limit: u32,
    ) -> Result<Vec<(i64, String)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT users.id, usermeta.meta_value
             FROM users
             INNER JOIN usermeta ON users.id = usermeta.user_id
             WHERE usermeta.meta_key = ?1 AND users.id > ?2
             ORDER BY users.id ASC
             LIMIT ?3",
        )?;

        let rows = stmt.query_map(params![key, after_user_id, limit], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn count_meta_values(&self, key: &str) -> Result<i64> {
        let count = self.conn().query_row(
            "SELECT COUNT(*) FROM usermeta WHERE meta_key = ?1",
            params![key],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // Role table operations

    fn create_role_table(&self) -> Result<()> {
        self.conn().execute_batch(ROLE_TABLE_SCHEMA)?;
        Ok(())
    }

    fn role_table_exists(&self) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'user_roles'",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn replace_user_roles(&self, user_id: i64, tenant: TenantId, roles: &[String]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM user_roles WHERE user_id = ?1 AND tenant_id = ?2",
            params![user_id, tenant.get()],
        )?;

        for role in roles {
            tx.execute(
                "INSERT OR IGNORE INTO user_roles (user_id, tenant_id, role) VALUES (?1, ?2, ?3)",
                params![user_id, tenant.get(), role],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn delete_user_roles(&self, user_id: i64, tenant: Option<TenantId>) -> Result<usize> {
        let conn = self.conn();
        let rows = match tenant {
            Some(tenant) => conn.execute(
                "DELETE FROM user_roles WHERE user_id = ?1 AND tenant_id = ?2",
                params![user_id, tenant.get()],
            )?,
            None => conn.execute(
                "DELETE FROM user_roles WHERE user_id = ?1",
                params![user_id],
            )?,
        };
        Ok(rows)
    }

    fn truncate_user_roles(&self) -> Result<()> {
        self.conn().execute("DELETE FROM user_roles", [])?;
        Ok(())
    }

    fn list_user_roles(&self, user_id: i64, tenant: TenantId) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT role FROM user_roles WHERE user_id = ?1 AND tenant_id = ?2 ORDER BY role",
        )?;

        let rows = stmt.query_map(params![user_id, tenant.get()], |row| row.get(0))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_role_assignments(&self, user_id: i64) -> Result<Vec<RoleAssignment>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, tenant_id, role FROM user_roles WHERE user_id = ?1 ORDER BY id",
        )?;

        let rows = stmt.query_map(params![user_id], |row| {
            Ok(RoleAssignment {
                id: row.get(0)?,
                user_id: row.get(1)?,
                tenant_id: TenantId(row.get(2)?),
                role: row.get(3)?,
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn count_role_assignments(&self) -> Result<i64> {
        let count = self
            .conn()
            .query_row("SELECT COUNT(*) FROM user_roles", [], |row| row.get(0))?;
        Ok(count)
    }

    // Options

    fn get_option(&self, name: &str) -> Result<Option<String>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT value FROM options WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()
        .map_err(Error::from)
    }

    fn set_option(&self, name: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO options (name, value) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET value = excluded.value",
            params![name, value],
        )?;
        Ok(())
    }

    // User search execution

    fn search_users(&self, sql: &str) -> Result<Vec<User>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], user_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn count_rows(&self, sql: &str) -> Result<i64> {
        let count = self.conn().query_row(sql, [], |row| row.get(0))?;
        Ok(count)
    }
}
