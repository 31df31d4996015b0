//! Unix domain socket server for the headset-API bridge
//!
//! Accepts a single bridge client at a time and runs a duplex frame loop:
//! inbound frames decode to typed events for the session, outbound frames
//! carry lifecycle commands. Commands issued while no bridge is connected
//! stay queued in the command channel.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::unix::OwnedReadHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::events::{CortexCommand, CortexEvent};

use super::protocol::{Hello, RawEvent, MAX_FRAME_LEN};

/// Socket endpoint the bridge client connects to
pub struct BridgeLink {
    socket_path: PathBuf,
    listener: UnixListener,
    hello: Hello,
}

/// Why a bridge connection ended
enum LinkExit {
    /// The bridge client went away; keep listening
    BridgeClosed,
    /// The session side dropped its channel; the link is done
    SessionClosed,
}

impl BridgeLink {
    /// Bind the bridge socket, replacing a stale one if present.
    pub fn bind(socket_path: &Path, hello: Hello) -> Result<Self> {
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind bridge socket")?;

        // Owner-only: the socket carries the API credential pair
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        info!(?socket_path, "bridge link listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener,
            hello,
        })
    }

    /// Run the link until the session side closes its channels.
    ///
    /// A disconnected bridge returns the link to accepting; the session
    /// never observes the reconnect.
    pub async fn run(
        self,
        events: mpsc::Sender<CortexEvent>,
        mut commands: mpsc::Receiver<CortexCommand>,
    ) -> Result<()> {
        loop {
            let (stream, _addr) = self
                .listener
                .accept()
                .await
                .context("bridge accept failed")?;
            info!("bridge client connected");

            match handle_bridge(stream, &self.hello, &events, &mut commands).await {
                Ok(LinkExit::BridgeClosed) => {
                    warn!("bridge client disconnected, awaiting reconnect");
                }
                Ok(LinkExit::SessionClosed) => {
                    info!("session channels closed, bridge link stopping");
                    return Ok(());
                }
                Err(e) => {
                    warn!(?e, "bridge connection error, awaiting reconnect");
                }
            }
        }
    }
}

impl Drop for BridgeLink {
    fn drop(&mut self) {
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove bridge socket file");
            }
        }
    }
}

/// Duplex frame loop for one connected bridge client.
async fn handle_bridge(
    stream: UnixStream,
    hello: &Hello,
    events: &mpsc::Sender<CortexEvent>,
    commands: &mut mpsc::Receiver<CortexCommand>,
) -> Result<LinkExit> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = FrameReader::new(read_half);

    write_frame(&mut write_half, hello)
        .await
        .context("failed to send hello frame")?;

    loop {
        tokio::select! {
            frame = reader.next_frame() => {
                let Some(body) = frame? else {
                    return Ok(LinkExit::BridgeClosed);
                };
                let raw: RawEvent = match serde_json::from_slice(&body) {
                    Ok(raw) => raw,
                    Err(e) => {
                        warn!(?e, "malformed frame from bridge, skipping");
                        continue;
                    }
                };
                match CortexEvent::decode(raw) {
                    Ok(event) => {
                        debug!(event = event.name(), "bridge event");
                        if events.send(event).await.is_err() {
                            return Ok(LinkExit::SessionClosed);
                        }
                    }
                    Err(e) => warn!(%e, "undecodable bridge event, skipping"),
                }
            }

            maybe_cmd = commands.recv() => {
                let Some(cmd) = maybe_cmd else {
                    return Ok(LinkExit::SessionClosed);
                };
                debug!(?cmd, "sending command to bridge");
                write_frame(&mut write_half, &cmd)
                    .await
                    .context("failed to write command frame")?;
            }
        }
    }
}

/// Write one length-prefixed JSON frame.
async fn write_frame<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = serde_json::to_vec(msg)?;
    writer.write_all(&(body.len() as u32).to_le_bytes()).await?;
    writer.write_all(&body).await?;
    Ok(())
}

/// Buffered frame reader
///
/// `next_frame` is cancel-safe: a partially received frame stays buffered
/// across calls, so it can race a command receive in `select!` without
/// tearing.
struct FrameReader {
    read_half: OwnedReadHalf,
    buf: Vec<u8>,
}

impl FrameReader {
    fn new(read_half: OwnedReadHalf) -> Self {
        Self {
            read_half,
            buf: Vec::with_capacity(4096),
        }
    }

    /// Next complete frame body, or `None` on clean EOF.
    async fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            if let Some(frame) = self.take_buffered_frame()? {
                return Ok(Some(frame));
            }

            let n = self.read_half.read_buf(&mut self.buf).await?;
            if n == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                bail!("bridge closed mid-frame ({} bytes pending)", self.buf.len());
            }
        }
    }

    fn take_buffered_frame(&mut self) -> Result<Option<Vec<u8>>> {
        if self.buf.len() < 4 {
            return Ok(None);
        }

        let len = u32::from_le_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;
        if len > MAX_FRAME_LEN {
            bail!("frame of {len} bytes exceeds the {MAX_FRAME_LEN} byte cap");
        }

        if self.buf.len() < 4 + len {
            return Ok(None);
        }

        let body = self.buf[4..4 + len].to_vec();
        self.buf.drain(..4 + len);
        Ok(Some(body))
    }
}
