//! authenticatorGetInfo command
//!
//! Returns a static capability map:
//! - `versions`: `"FIDO_2_0"`
//! - `aaguid`: 16 zero bytes, no distinguishing model identifier is issued
//! - `options`: `{plat: false, rk: true, up: true, uv: true}`
//!
//! Spec: <https://fidoalliance.org/specs/fido-v2.0-ps-20190130/fido-client-to-authenticator-protocol-v2.0-ps-20190130.html#authenticatorGetInfo>

use crate::cbor::MapBuilder;
use crate::error::Result;

/// Protocol version reported to clients
pub const VERSION: &str = "FIDO_2_0";

/// AAGUID reported by GetInfo
pub const AAGUID: [u8; 16] = [0u8; 16];

/// Handle authenticatorGetInfo
///
/// This command takes no input. The response excludes the status byte.
pub fn handle() -> Result<Vec<u8>> {
    // Canonical order sorts "up"/"uv"/"rk" before "plat"
    let options = MapBuilder::new()
        .insert("plat", false)
        .insert("rk", true)
        .insert("up", true)
        .insert("uv", true)
        .build_value();

    MapBuilder::new()
        .insert("versions", VERSION)
        .insert_bytes("aaguid", &AAGUID)
        .insert("options", options)
        .build()
}
