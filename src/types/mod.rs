mod blob;
mod models;

pub use blob::{capabilities_key, decode_role_blob, encode_role_blob, tenant_from_key};
pub use models::*;
