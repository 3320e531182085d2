use serde::Serialize;

use crate::state::{ROLE_TABLE_VERSION, RoleTableState};
use crate::store::Store;
use crate::types::capabilities_key;

use super::open_store;

#[derive(Serialize)]
struct TenantOutput {
    id: i64,
    name: String,
    capabilities_key: String,
}

#[derive(Serialize)]
struct RoleTableInfo {
    installed_version: Option<i64>,
    current_version: i64,
    backfilled_at: Option<String>,
    multi_tenant: bool,
    users: i64,
    role_assignments: i64,
    tenants: Vec<TenantOutput>,
}

pub fn run_info(data_dir: String, json: bool) -> anyhow::Result<()> {
    let (settings, store) = open_store(&data_dir)?;
    let state = RoleTableState::new(&store);

    let installed_version = state.installed_version()?;
    let role_assignments = if store.role_table_exists()? {
        store.count_role_assignments()?
    } else {
        0
    };

    let info = RoleTableInfo {
        installed_version,
        current_version: ROLE_TABLE_VERSION,
        backfilled_at: state.backfilled_at()?.map(|at| at.to_rfc3339()),
        multi_tenant: settings.multi_tenant,
        users: store.count_users()?,
        role_assignments,
        tenants: store
            .list_tenants()?
            .into_iter()
            .map(|tenant| TenantOutput {
                id: tenant.id.get(),
                capabilities_key: capabilities_key(tenant.id),
                name: tenant.name,
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    let version = match info.installed_version {
        Some(v) if v < info.current_version => {
            format!("{v} (upgrade to {} pending)", info.current_version)
        }
        Some(v) => v.to_string(),
        None => "not installed".to_string(),
    };

    println!();
    println!("User Roles Table");
    println!("{}", "─".repeat(16));
    println!("Version:      {version}");
    println!(
        "Backfilled:   {}",
        info.backfilled_at.as_deref().unwrap_or("never")
    );
    println!("Users:        {}", info.users);
    println!("Assignments:  {}", info.role_assignments);
    println!(
        "Tenants:      {}{}",
        info.tenants.len(),
        if info.multi_tenant { "" } else { " (multi-tenancy off)" }
    );
    println!();

    Ok(())
}
