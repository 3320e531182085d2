use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{RoleDefinition, TenantId};

pub const SETTINGS_FILE: &str = "roletable.toml";
pub const DATABASE_FILE: &str = "roletable.db";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory holding the database and the optional settings file.
    #[serde(skip)]
    pub data_dir: PathBuf,
    pub multi_tenant: bool,
    pub default_tenant: TenantId,
    /// Default answer of the interception policy when a query does not opt in.
    pub integration_enabled: bool,
    /// Lets a capability value also match a role of the same name.
    pub capability_literal_fallback: bool,
    pub backfill_batch_size: u32,
    pub roles: Vec<RoleConfig>,
}

/// A role definition declared in the settings file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleConfig {
    pub name: String,
    /// Restricts the role to one tenant; unset roles exist on every tenant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<TenantId>,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl RoleConfig {
    #[must_use]
    pub fn definition(&self) -> RoleDefinition {
        RoleDefinition::new(self.name.clone(), self.capabilities.iter().cloned())
    }
}

impl Settings {
    /// Loads `roletable.toml` from `data_dir`, falling back to defaults when absent.
    pub fn load<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        let path = data_dir.join(SETTINGS_FILE);

        let mut settings = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            toml::from_str::<Settings>(&raw)?
        } else {
            Settings::default()
        };

        settings.data_dir = data_dir.to_path_buf();
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_tenant.get() < 1 {
            return Err(Error::Config(format!(
                "default_tenant must be positive, got {}",
                self.default_tenant
            )));
        }
        if self.backfill_batch_size == 0 {
            return Err(Error::Config(
                "backfill_batch_size must be at least 1".to_string(),
            ));
        }
        if let Some(role) = self.roles.iter().find(|r| r.name.trim().is_empty()) {
            return Err(Error::Config(format!(
                "role with capabilities {:?} has an empty name",
                role.capabilities
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }

    /// True when `tenant` needs explicit scoping on user searches.
    #[must_use]
    pub fn scopes_tenant(&self, tenant: TenantId) -> bool {
        self.multi_tenant && tenant != self.default_tenant
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            multi_tenant: false,
            default_tenant: TenantId::DEFAULT,
            integration_enabled: true,
            capability_literal_fallback: true,
            backfill_batch_size: 500,
            roles: Vec::new(),
        }
    }
}
