//! cortex-relay-daemon: live mental-command session driver
//!
//! Drives a trained profile through the vendor lifecycle (session open,
//! profile load/create, sensitivity configuration, save, stream
//! subscription), then smooths the noisy per-sample command stream into
//! rate-limited decisions relayed to a remote consumer.
//!
//! The vendor transport itself lives in an external bridge client that
//! connects on a local Unix socket and speaks length-prefixed JSON frames.

mod config;
mod controller;
mod events;
mod forward;
mod link;
mod pipeline;

use anyhow::Result;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::controller::LifecycleController;
use crate::events::CortexEvent;
use crate::forward::DecisionForwarder;
use crate::link::{BridgeLink, Hello};
use crate::pipeline::{DecisionLog, SmoothingPipeline};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "cortex-relay-daemon starting"
    );

    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(
        profile = %config.profile,
        forward = %config.forward_addr,
        "configuration loaded"
    );

    // Bridge link <-> session wiring
    let (event_tx, mut event_rx) = mpsc::channel::<CortexEvent>(256);
    let (command_tx, command_rx) = mpsc::channel(64);

    let hello = Hello {
        client_id: config.client_id.clone(),
        client_secret: config.client_secret.clone(),
    };
    let link = BridgeLink::bind(&config.socket_path, hello)?;
    let link_task = tokio::spawn(link.run(event_tx, command_rx));

    let mut controller = LifecycleController::new(command_tx, config.sensitivity.clone());
    controller
        .start(&config.profile, config.headset_id.clone())
        .await?;

    let forwarder = DecisionForwarder::new(config.forward_addr.clone(), config.forward_timeout);
    let mut pipeline =
        SmoothingPipeline::new(Box::new(forwarder), DecisionLog::new(&config.decision_log));

    info!("daemon initialized, entering main loop");

    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            maybe_event = event_rx.recv() => match maybe_event {
                Some(CortexEvent::SampleReceived(sample)) => {
                    pipeline.on_sample(&sample).await;
                }
                Some(event) => controller.handle_event(event).await,
                None => {
                    warn!("event channel closed");
                    break;
                }
            },
            _ = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    info!("shutting down...");

    // In-flight link work terminates best-effort
    link_task.abort();

    info!("cortex-relay-daemon stopped");
    Ok(())
}

/// Resolve once SIGTERM or SIGINT arrives.
async fn wait_for_shutdown() {
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to register SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => debug!("received SIGTERM"),
        _ = sigint.recv() => debug!("received SIGINT"),
    }
}
