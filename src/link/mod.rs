//! Bridge link to the external headset-API client
//!
//! The vendor transport (websocket, authorization, subscription wire
//! format) lives in a separate bridge process. It connects here over a
//! local Unix socket and exchanges length-prefixed JSON frames: named
//! events inbound, lifecycle commands outbound.

mod protocol;
mod server;

pub use protocol::{Hello, RawEvent};
pub use server::BridgeLink;
