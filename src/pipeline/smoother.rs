//! Smoothing filter and rate-gated decision forwarding
//!
//! The window size and threshold form a low-pass majority filter over the
//! per-sample classification stream; the gate bounds the downstream
//! message rate independently of the sample rate.

use tracing::{debug, info, warn};

use crate::events::CommandSample;
use crate::forward::DeliverySink;

use super::log::DecisionLog;
use super::window::{CommandWindow, Vote};

/// Minimum window count for a label to qualify as a decision
pub const MAJORITY_THRESHOLD: usize = 20;

/// Minimum stream-time seconds between two forwarded decisions
pub const GATE_INTERVAL_SECS: f64 = 8.0;

/// A qualifying decision emitted by the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub label: &'static str,
    pub count: usize,
    /// Whether the payload reached the remote consumer
    pub delivered: bool,
    /// Stream timestamp at which the gate advanced
    pub time: f64,
}

/// Turns the noisy per-sample stream into rate-limited decisions
///
/// Single writer: the window and gate state are owned here and mutated
/// only by `on_sample`.
pub struct SmoothingPipeline {
    window: CommandWindow,
    last_emission: Option<f64>,
    forwarder: Box<dyn DeliverySink>,
    log: DecisionLog,
}

impl SmoothingPipeline {
    pub fn new(forwarder: Box<dyn DeliverySink>, log: DecisionLog) -> Self {
        Self {
            window: CommandWindow::default(),
            last_emission: None,
            forwarder,
            log,
        }
    }

    /// Stream timestamp of the last qualifying decision, if any.
    pub fn last_emission(&self) -> Option<f64> {
        self.last_emission
    }

    /// Feed one classified sample.
    ///
    /// Returns the decision when this sample's gate check produced a
    /// qualifying majority. The gate advances on every qualifying decision
    /// whether or not delivery succeeded; a failed delivery is a dropped
    /// decision, not a retry.
    pub async fn on_sample(&mut self, sample: &CommandSample) -> Option<Decision> {
        let label = sample.action.to_ascii_lowercase();
        debug!(action = %label, power = sample.power, "sample");
        self.window.push(label);

        if let Some(last) = self.last_emission {
            if sample.time - last < GATE_INTERVAL_SECS {
                return None;
            }
        }

        let Vote { label, count } = self.window.majority();
        if count < MAJORITY_THRESHOLD {
            return None;
        }

        if let Err(e) = self.log.append(label).await {
            warn!(?e, "decision log append failed");
        }

        let delivered = match self.forwarder.deliver(label.as_bytes()).await {
            Ok(()) => true,
            Err(e) => {
                warn!(%e, label, "decision delivery failed, dropping");
                false
            }
        };

        self.last_emission = Some(sample.time);
        info!(label, count, delivered, "decision emitted");

        Some(Decision {
            label,
            count,
            delivered,
            time: sample.time,
        })
    }
}
