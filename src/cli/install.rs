use std::fs;

use crate::config::Settings;
use crate::state::ROLE_TABLE_VERSION;
use crate::store::{SqliteStore, Store};
use crate::sync::{InstallOutcome, install};

pub fn run_install(data_dir: String, force: bool) -> anyhow::Result<()> {
    fs::create_dir_all(&data_dir)?;
    let settings = Settings::load(&data_dir)?;

    let store = SqliteStore::new(settings.db_path())?;
    store.initialize()?;

    match install(&store, force)? {
        InstallOutcome::Installed => {
            println!("Installed user roles table (version {ROLE_TABLE_VERSION}).");
        }
        InstallOutcome::UpToDate => {
            println!("User roles table is up to date (version {ROLE_TABLE_VERSION}).");
        }
    }

    Ok(())
}
