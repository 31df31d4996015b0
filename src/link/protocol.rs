//! Bridge link wire protocol
//!
//! All frames are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum accepted frame body size
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// A named event frame as received from the bridge client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    /// Event name, e.g. "sessionCreated"
    pub event: String,

    /// Event payload; shape depends on the event
    #[serde(default)]
    pub data: Value,
}

/// First frame written to a freshly connected bridge client
///
/// Carries the API credential pair the bridge needs to authorize against
/// the vendor service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    pub client_id: String,
    pub client_secret: String,
}
