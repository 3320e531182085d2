use tracing::info;

use crate::error::Result;
use crate::state::{ROLE_TABLE_VERSION, RoleTableState};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed,
    UpToDate,
}

/// Creates or upgrades the role table.
///
/// Runs when the recorded version is absent or older than [`ROLE_TABLE_VERSION`],
/// or unconditionally with `force`.
pub fn install<S: Store + ?Sized>(store: &S, force: bool) -> Result<InstallOutcome> {
    let state = RoleTableState::new(store);

    if !force && !state.needs_install()? {
        return Ok(InstallOutcome::UpToDate);
    }

    store.create_role_table()?;
    state.record_installed_version()?;

    info!(version = ROLE_TABLE_VERSION, force, "installed role table");
    Ok(InstallOutcome::Installed)
}
