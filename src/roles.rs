use std::collections::BTreeMap;

use crate::config::Settings;
use crate::types::{RoleDefinition, TenantId};

/// Source of role definitions, consulted once per query rewrite.
pub trait RoleRegistry: Send + Sync {
    fn role_definitions(&self, tenant: TenantId) -> Vec<RoleDefinition>;
}

/// An in-memory registry with shared roles plus per-tenant additions.
#[derive(Debug, Clone, Default)]
pub struct StaticRoleRegistry {
    shared: Vec<RoleDefinition>,
    per_tenant: BTreeMap<TenantId, Vec<RoleDefinition>>,
}

impl StaticRoleRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        let mut registry = Self::new();
        for role in &settings.roles {
            match role.tenant {
                Some(tenant) => registry.add_for_tenant(tenant, role.definition()),
                None => registry.add(role.definition()),
            }
        }
        registry
    }

    /// Adds a role available on every tenant, replacing one of the same name.
    pub fn add(&mut self, role: RoleDefinition) {
        upsert(&mut self.shared, role);
    }

    pub fn add_for_tenant(&mut self, tenant: TenantId, role: RoleDefinition) {
        upsert(self.per_tenant.entry(tenant).or_default(), role);
    }

    #[must_use]
    pub fn with_role(mut self, role: RoleDefinition) -> Self {
        self.add(role);
        self
    }
}

fn upsert(roles: &mut Vec<RoleDefinition>, role: RoleDefinition) {
    match roles.iter_mut().find(|r| r.name == role.name) {
        Some(existing) => *existing = role,
        None => roles.push(role),
    }
}

impl RoleRegistry for StaticRoleRegistry {
    fn role_definitions(&self, tenant: TenantId) -> Vec<RoleDefinition> {
        let mut roles = self.shared.clone();
        if let Some(extra) = self.per_tenant.get(&tenant) {
            for role in extra {
                upsert(&mut roles, role.clone());
            }
        }
        roles
    }
}
