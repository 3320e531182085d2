mod commands;
mod info;
mod install;
mod migrate;

pub use commands::Commands;
pub use info::run_info;
pub use install::run_install;
pub use migrate::run_migrate;

use crate::config::Settings;
use crate::store::SqliteStore;

/// Load settings and open the existing database in `data_dir`
pub fn open_store(data_dir: &str) -> anyhow::Result<(Settings, SqliteStore)> {
    let settings = Settings::load(data_dir)?;
    let db_path = settings.db_path();

    if !db_path.exists() {
        anyhow::bail!(
            "Database not found at {}. Run 'roletable install' first.",
            db_path.display()
        );
    }

    let store = SqliteStore::new(&db_path)?;
    Ok((settings, store))
}

/// Request confirmation for a destructive operation
pub fn confirm_action(message: &str, yes: bool) -> anyhow::Result<bool> {
    if yes {
        return Ok(true);
    }
    Ok(inquire::Confirm::new(message)
        .with_default(false)
        .prompt()?)
}
