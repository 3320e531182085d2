//! # roletable
//!
//! Keeps a normalized `user_roles` table in step with the per-user
//! capabilities blobs of a host user store, and serves role and capability
//! filters of user searches from that table instead of pattern-matching the
//! blobs.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! roletable = { version = "0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use roletable::config::Settings;
//! use roletable::query::{QueryVars, RoleQueryInterceptor};
//! use roletable::roles::StaticRoleRegistry;
//! use roletable::search::UserSearch;
//! use roletable::store::{SqliteStore, Store};
//! use roletable::sync::{Backfill, BackfillMode, Synchronizer, install};
//!
//! let settings = Settings::load("./data")?;
//! let store = SqliteStore::new(settings.db_path())?;
//! store.initialize()?;
//! install(&store, false)?;
//!
//! for event in Backfill::new(&store, &settings, BackfillMode::Truncate) {
//!     event?;
//! }
//!
//! // Keep the table in step with later metadata writes.
//! Synchronizer::new(&store).meta_written(7, "capabilities", r#"{"editor":true}"#)?;
//!
//! let roles = StaticRoleRegistry::from_settings(&settings);
//! let interceptor = RoleQueryInterceptor::new(&store, &roles, &settings);
//! let editors = UserSearch::new(&store, &roles, &settings, &interceptor)
//!     .run(QueryVars::new().with("role", "editor"))?;
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Includes the CLI module. Disable with `default-features = false`.

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod query;
pub mod roles;
pub mod search;
pub mod state;
pub mod store;
pub mod sync;
pub mod types;
