//! Persisted process-wide flags shared by the synchronizer and the query rewriter.

use chrono::{DateTime, TimeZone, Utc};

use crate::error::Result;
use crate::store::Store;

/// Version of the role table schema this build creates.
pub const ROLE_TABLE_VERSION: i64 = 1;

const VERSION_OPTION: &str = "role_table_version";
const BACKFILLED_OPTION: &str = "role_table_backfilled_at";

/// Typed access to the role table's persisted state.
///
/// Install writes the version, a completed backfill writes the timestamp, and
/// the query rewriter only reads the timestamp as its "backfilled at least
/// once" gate.
pub struct RoleTableState<'a, S: Store + ?Sized> {
    store: &'a S,
}

impl<'a, S: Store + ?Sized> RoleTableState<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// The installed schema version; unparsable values read as not installed.
    pub fn installed_version(&self) -> Result<Option<i64>> {
        Ok(self
            .store
            .get_option(VERSION_OPTION)?
            .and_then(|v| v.trim().parse().ok()))
    }

    pub fn record_installed_version(&self) -> Result<()> {
        self.store
            .set_option(VERSION_OPTION, &ROLE_TABLE_VERSION.to_string())
    }

    /// True when the installed table is missing or older than this build's.
    pub fn needs_install(&self) -> Result<bool> {
        Ok(match self.installed_version()? {
            Some(version) => version < ROLE_TABLE_VERSION,
            None => true,
        })
    }

    pub fn backfilled_at(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .store
            .get_option(BACKFILLED_OPTION)?
            .and_then(|v| v.trim().parse::<i64>().ok())
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single()))
    }

    pub fn has_backfilled(&self) -> Result<bool> {
        Ok(self.backfilled_at()?.is_some())
    }

    pub fn record_backfill(&self, at: DateTime<Utc>) -> Result<()> {
        self.store
            .set_option(BACKFILLED_OPTION, &at.timestamp().to_string())
    }
}
