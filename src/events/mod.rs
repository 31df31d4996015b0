//! Typed event and command vocabulary for the bridge link
//!
//! Inbound frames from the headset-API bridge are named events; they are
//! decoded here into tagged variants so the lifecycle controller never
//! introspects JSON. Outbound commands serialize as
//! `{"method": ..., "params": ...}` frames.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::link::RawEvent;

/// One classified mental-command sample from the live stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSample {
    /// Classified intent label, e.g. "push" or "neutral"
    pub action: String,
    /// Classifier confidence in [0, 1]
    pub power: f64,
    /// Stream timestamp, in seconds
    pub time: f64,
}

/// Payload of the dual-purpose sensitivity completion event
///
/// The vendor reuses a single event to report both the read result and the
/// write acknowledgement, distinguished only by payload shape. The shape
/// check happens once at decode time; everything downstream dispatches on
/// the variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensitivityPayload {
    /// Read result: current per-action sensitivity values, in active-action order
    Read(Vec<u8>),
    /// Acknowledgement of a completed sensitivity write
    WriteAck,
}

impl SensitivityPayload {
    /// A numeric array is a read result; anything else acknowledges a write.
    fn from_shape(data: &Value) -> Self {
        let values = data
            .as_array()
            .map(|arr| arr.iter().map(Value::as_f64).collect::<Option<Vec<_>>>());
        match values {
            Some(Some(numbers)) => Self::Read(numbers.into_iter().map(|n| n as u8).collect()),
            _ => Self::WriteAck,
        }
    }
}

/// Events emitted by the headset-API bridge
#[derive(Debug, Clone, PartialEq)]
pub enum CortexEvent {
    /// Session/connect step complete
    SessionCreated,
    /// Known profiles enumerated
    CatalogReceived(Vec<String>),
    /// A profile load or unload finished
    LoadUnloadCompleted { is_loaded: bool },
    /// Profile save finished
    ProfileSaved,
    /// Active mental-command set for the loaded profile
    ActiveActionsReceived(Vec<String>),
    /// Sensitivity read result or write acknowledgement
    SensitivityReceived(SensitivityPayload),
    /// One classified sample from the subscribed stream
    SampleReceived(CommandSample),
    /// Asynchronous error from the vendor service
    InformError { code: i64, message: String },
}

impl CortexEvent {
    /// Decode a raw named frame into a typed event.
    pub fn decode(raw: RawEvent) -> Result<Self, DecodeError> {
        let RawEvent { event, data } = raw;
        match event.as_str() {
            "sessionCreated" => Ok(Self::SessionCreated),
            "catalogReceived" => {
                let profiles = parse(&event, data)?;
                Ok(Self::CatalogReceived(profiles))
            }
            "loadUnloadCompleted" => {
                #[derive(Deserialize)]
                #[serde(rename_all = "camelCase")]
                struct Payload {
                    is_loaded: bool,
                }
                let payload: Payload = parse(&event, data)?;
                Ok(Self::LoadUnloadCompleted {
                    is_loaded: payload.is_loaded,
                })
            }
            "profileSaved" => Ok(Self::ProfileSaved),
            "activeActionsReceived" => {
                let actions = parse(&event, data)?;
                Ok(Self::ActiveActionsReceived(actions))
            }
            "sensitivityReceived" => Ok(Self::SensitivityReceived(SensitivityPayload::from_shape(
                &data,
            ))),
            "sampleReceived" => {
                let sample = parse(&event, data)?;
                Ok(Self::SampleReceived(sample))
            }
            "informError" => {
                #[derive(Deserialize)]
                struct Payload {
                    code: i64,
                    message: String,
                }
                let payload: Payload = parse(&event, data)?;
                Ok(Self::InformError {
                    code: payload.code,
                    message: payload.message,
                })
            }
            _ => Err(DecodeError::UnknownEvent(event)),
        }
    }

    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SessionCreated => "sessionCreated",
            Self::CatalogReceived(_) => "catalogReceived",
            Self::LoadUnloadCompleted { .. } => "loadUnloadCompleted",
            Self::ProfileSaved => "profileSaved",
            Self::ActiveActionsReceived(_) => "activeActionsReceived",
            Self::SensitivityReceived(_) => "sensitivityReceived",
            Self::SampleReceived(_) => "sampleReceived",
            Self::InformError { .. } => "informError",
        }
    }
}

fn parse<T: serde::de::DeserializeOwned>(event: &str, data: Value) -> Result<T, DecodeError> {
    serde_json::from_value(data).map_err(|source| DecodeError::Payload {
        event: event.to_string(),
        source,
    })
}

/// Errors turning a raw frame into a typed event
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unknown event '{0}'")]
    UnknownEvent(String),

    #[error("malformed '{event}' payload: {source}")]
    Payload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Data streams available for subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataStream {
    /// Mental commands
    Com,
    /// Facial expressions
    Fac,
    /// Training/system events
    Sys,
}

/// Profile setup modes accepted by the vendor API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileMode {
    Load,
    Unload,
    Save,
    Create,
}

/// Commands issued toward the headset-API bridge
///
/// Fire-and-forget: completion is observed only through the corresponding
/// event, never a return value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "camelCase")]
pub enum CortexCommand {
    #[serde(rename_all = "camelCase")]
    OpenSession {
        profile_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        headset_id: Option<String>,
    },
    QueryProfiles,
    SetupProfile {
        profile: String,
        mode: ProfileMode,
    },
    Subscribe {
        streams: Vec<DataStream>,
    },
    GetActiveActions {
        profile: String,
    },
    GetSensitivity {
        profile: String,
    },
    SetSensitivity {
        profile: String,
        values: Vec<u8>,
    },
    DisconnectHeadset,
}
