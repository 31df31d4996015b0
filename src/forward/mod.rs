//! Per-decision TCP delivery to the remote consumer
//!
//! One connection per decision: connect, send the payload, close. No
//! framing, no response, no reuse. Connect and send share the event-loop
//! thread with sample ingestion, so both are time-bounded.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Delivery failures, reported to the pipeline and not retried
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("connect to {addr} timed out")]
    ConnectTimeout { addr: String },

    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("send to {addr} failed: {source}")]
    Send {
        addr: String,
        #[source]
        source: io::Error,
    },
}

/// Destination for qualifying decision payloads
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn deliver(&self, payload: &[u8]) -> Result<(), ForwardError>;
}

/// Opens a short-lived TCP connection per forwarded decision
#[derive(Debug, Clone)]
pub struct DecisionForwarder {
    addr: String,
    timeout: Duration,
}

impl DecisionForwarder {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }
}

#[async_trait]
impl DeliverySink for DecisionForwarder {
    async fn deliver(&self, payload: &[u8]) -> Result<(), ForwardError> {
        let mut stream = timeout(self.timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| ForwardError::ConnectTimeout {
                addr: self.addr.clone(),
            })?
            .map_err(|source| ForwardError::Connect {
                addr: self.addr.clone(),
                source,
            })?;

        // The stream closes on every exit path below, success or not.
        timeout(self.timeout, async {
            stream.write_all(payload).await?;
            stream.shutdown().await
        })
        .await
        .map_err(|_| ForwardError::Send {
            addr: self.addr.clone(),
            source: io::ErrorKind::TimedOut.into(),
        })?
        .map_err(|source| ForwardError::Send {
            addr: self.addr.clone(),
            source,
        })?;

        debug!(addr = %self.addr, bytes = payload.len(), "decision delivered");
        Ok(())
    }
}
