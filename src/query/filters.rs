use super::vars::QueryVars;
use crate::types::RoleDefinition;

pub const ROLE: &str = "role";
pub const ROLE_IN: &str = "role__in";
pub const ROLE_NOT_IN: &str = "role__not_in";
pub const CAPABILITY: &str = "capability";
pub const CAPABILITY_IN: &str = "capability__in";
pub const CAPABILITY_NOT_IN: &str = "capability__not_in";

/// Query vars consumed by role filtering, cleared once the table path takes over.
pub const ROLE_FILTER_KEYS: [&str; 6] = [
    ROLE,
    ROLE_IN,
    ROLE_NOT_IN,
    CAPABILITY,
    CAPABILITY_IN,
    CAPABILITY_NOT_IN,
];

/// The role and capability filters of a query, as requested.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleFilters {
    pub roles: Vec<String>,
    pub role_in: Vec<String>,
    pub role_not_in: Vec<String>,
    pub capabilities: Vec<String>,
    pub capability_in: Vec<String>,
    pub capability_not_in: Vec<String>,
}

impl RoleFilters {
    #[must_use]
    pub fn from_vars(vars: &QueryVars) -> Self {
        Self {
            roles: vars.string_list(ROLE),
            role_in: vars.string_list(ROLE_IN),
            role_not_in: vars.string_list(ROLE_NOT_IN),
            capabilities: vars.string_list(CAPABILITY),
            capability_in: vars.string_list(CAPABILITY_IN),
            capability_not_in: vars.string_list(CAPABILITY_NOT_IN),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
            && self.role_in.is_empty()
            && self.role_not_in.is_empty()
            && self.capabilities.is_empty()
            && self.capability_in.is_empty()
            && self.capability_not_in.is_empty()
    }

    /// Expands capability filters into the roles that grant them.
    ///
    /// With `literal_fallback`, a capability name also counts as a role name.
    #[must_use]
    pub fn resolve(&self, roles: &[RoleDefinition], literal_fallback: bool) -> ResolvedFilters {
        let granting = |capability: &str| -> Vec<String> {
            roles
                .iter()
                .filter(|role| role.grants(capability))
                .map(|role| role.name.clone())
                .collect()
        };

        let expand = |direct: &[String], capabilities: &[String]| -> Vec<String> {
            let mut out = direct.to_vec();
            for capability in capabilities {
                extend_unique(&mut out, granting(capability));
            }
            if literal_fallback {
                extend_unique(&mut out, capabilities.iter().cloned());
            }
            dedup(out)
        };

        let role_in = (!self.role_in.is_empty() || !self.capability_in.is_empty())
            .then(|| expand(&self.role_in, &self.capability_in));

        ResolvedFilters {
            roles: self.roles.clone(),
            role_in,
            role_not_in: expand(&self.role_not_in, &self.capability_not_in),
            capabilities: self
                .capabilities
                .iter()
                .map(|capability| CapabilityRequirement {
                    capability: capability.clone(),
                    granted_by: granting(capability),
                    literal_fallback,
                })
                .collect(),
        }
    }
}

/// One capability a user must hold through at least one role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityRequirement {
    pub capability: String,
    pub granted_by: Vec<String>,
    pub literal_fallback: bool,
}

impl CapabilityRequirement {
    /// Role names that satisfy the requirement.
    #[must_use]
    pub fn candidates(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.granted_by.len() + 1);
        if self.literal_fallback {
            out.push(self.capability.clone());
        }
        extend_unique(&mut out, self.granted_by.iter().cloned());
        out
    }
}

/// Role filters after capability expansion, shared by the table and blob paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedFilters {
    /// Every listed role must be held.
    pub roles: Vec<String>,
    /// `Some` when an inclusion set was requested; an empty set matches nobody.
    pub role_in: Option<Vec<String>>,
    /// None of these roles may be held.
    pub role_not_in: Vec<String>,
    /// Every listed capability must be held.
    pub capabilities: Vec<CapabilityRequirement>,
}

impl ResolvedFilters {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
            && self.role_in.is_none()
            && self.role_not_in.is_empty()
            && self.capabilities.is_empty()
    }
}

fn extend_unique(out: &mut Vec<String>, items: impl IntoIterator<Item = String>) {
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
}

fn dedup(items: Vec<String>) -> Vec<String> {
    let mut out = Vec::with_capacity(items.len());
    extend_unique(&mut out, items);
    out
}
