//! Configuration loading and management

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};

/// Sensitivity written once the current values have been read back
const DEFAULT_SENSITIVITY: [u8; 4] = [5, 5, 7, 7];

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Vendor API credential pair, handed to the bridge client on connect
    pub client_id: String,
    pub client_secret: String,

    /// Trained profile the live session works toward
    pub profile: String,

    /// Specific headset to use; the first available one when unset
    pub headset_id: Option<String>,

    /// Unix socket the headset-API bridge connects to
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// host:port receiving forwarded decisions
    pub forward_addr: String,

    /// Bound on forwarder connect and send
    pub forward_timeout: Duration,

    /// Append-only decision log destination
    pub decision_log: PathBuf,

    /// Target per-action sensitivity vector, each value in 1..=10
    pub sensitivity: Vec<u8>,
}

impl Config {
    /// Load configuration from environment and defaults.
    ///
    /// The credential pair and profile name are required; everything else
    /// has a default.
    pub fn load() -> Result<Self> {
        let client_id =
            std::env::var("CORTEX_CLIENT_ID").context("CORTEX_CLIENT_ID is not set")?;
        let client_secret =
            std::env::var("CORTEX_CLIENT_SECRET").context("CORTEX_CLIENT_SECRET is not set")?;
        let profile = std::env::var("CORTEX_PROFILE").context("CORTEX_PROFILE is not set")?;
        let headset_id = std::env::var("CORTEX_HEADSET_ID")
            .ok()
            .filter(|v| !v.is_empty());

        let home = std::env::var("HOME")?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("cortex-relay");
        let socket_path = data_dir.join("bridge.sock");

        let forward_addr =
            std::env::var("RELAY_FORWARD_ADDR").unwrap_or_else(|_| "127.0.0.1:5000".to_string());

        let forward_timeout = match std::env::var("RELAY_FORWARD_TIMEOUT_MS") {
            Ok(raw) => Duration::from_millis(
                raw.parse()
                    .context("RELAY_FORWARD_TIMEOUT_MS must be an integer")?,
            ),
            Err(_) => Duration::from_millis(2000),
        };

        let decision_log = std::env::var("RELAY_DECISION_LOG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("decisions.log"));

        let sensitivity = match std::env::var("RELAY_SENSITIVITY") {
            Ok(raw) => parse_sensitivity(&raw)?,
            Err(_) => DEFAULT_SENSITIVITY.to_vec(),
        };

        Ok(Self {
            client_id,
            client_secret,
            profile,
            headset_id,
            socket_path,
            data_dir,
            forward_addr,
            forward_timeout,
            decision_log,
            sensitivity,
        })
    }

    /// Ensure runtime directories exist.
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        if let Some(parent) = self.decision_log.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

/// Parse a comma-separated sensitivity vector, each value in 1..=10.
fn parse_sensitivity(raw: &str) -> Result<Vec<u8>> {
    let mut values = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        let value: u8 = part
            .parse()
            .with_context(|| format!("invalid sensitivity value '{part}'"))?;
        if !(1..=10).contains(&value) {
            bail!("sensitivity value {value} out of range 1..=10");
        }
        values.push(value);
    }
    Ok(values)
}
