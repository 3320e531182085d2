mod settings;

pub use settings::{DATABASE_FILE, RoleConfig, SETTINGS_FILE, Settings};
