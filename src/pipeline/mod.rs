//! Command smoothing and forwarding pipeline
//!
//! Converts the continuous, label-noisy classification stream into a
//! confident, rate-limited decision: a bounded history window, a majority
//! vote on a timer gate, and delivery to the remote consumer plus an
//! append-only log.

mod log;
mod smoother;
mod window;

pub use log::DecisionLog;
pub use smoother::{Decision, SmoothingPipeline, GATE_INTERVAL_SECS, MAJORITY_THRESHOLD};
pub use window::{CommandWindow, Vote, TARGET_VOCABULARY, WINDOW_CAPACITY};
