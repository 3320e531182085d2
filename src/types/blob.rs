//! Codec for the legacy capabilities blob stored in user meta.
//!
//! A blob is a JSON object keyed by role identifier, e.g. `{"editor":true}`.
//! Presence of a key denotes membership regardless of its value.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use super::TenantId;
use crate::error::{Error, Result};

const CAPABILITIES_SUFFIX: &str = "capabilities";

/// Returns the user meta key holding the blob for `tenant`.
#[must_use]
pub fn capabilities_key(tenant: TenantId) -> String {
    if tenant == TenantId::DEFAULT {
        CAPABILITIES_SUFFIX.to_string()
    } else {
        format!("{tenant}_{CAPABILITIES_SUFFIX}")
    }
}

/// Maps a user meta key back to its tenant, or `None` for unrelated keys.
#[must_use]
pub fn tenant_from_key(key: &str) -> Option<TenantId> {
    if key == CAPABILITIES_SUFFIX {
        return Some(TenantId::DEFAULT);
    }

    let prefix = key.strip_suffix(CAPABILITIES_SUFFIX)?.strip_suffix('_')?;
    match prefix.parse::<i64>() {
        Ok(id) if id > 1 => Some(TenantId(id)),
        _ => None,
    }
}

/// Decodes the role identifiers held by a blob. Duplicate keys collapse.
pub fn decode_role_blob(payload: &str) -> Result<BTreeSet<String>> {
    let payload = payload.trim();
    if payload.is_empty() {
        return Ok(BTreeSet::new());
    }

    match serde_json::from_str::<Value>(payload) {
        Ok(Value::Object(map)) => Ok(map
            .into_iter()
            .map(|(role, _)| role)
            .filter(|role| !role.trim().is_empty())
            .collect()),
        Ok(other) => Err(Error::MalformedBlob(format!(
            "expected an object, found {}",
            json_kind(&other)
        ))),
        Err(e) => Err(Error::MalformedBlob(e.to_string())),
    }
}

#[must_use]
pub fn encode_role_blob<I, S>(roles: I) -> String
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let map: Map<String, Value> = roles
        .into_iter()
        .map(|role| (role.into(), Value::Bool(true)))
        .collect();
    Value::Object(map).to_string()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
