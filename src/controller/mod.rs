//! Profile lifecycle controller
//!
//! Sequences the asynchronous steps from session open to a subscribed,
//! sensitivity-configured profile. Each step is issued only after its
//! predecessor's completion event arrives.

mod machine;

pub use machine::{ControllerError, LifecycleController, LifecycleState, ERR_PROFILE_ACCESS_DENIED};
