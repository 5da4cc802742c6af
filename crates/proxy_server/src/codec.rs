//! JSON-frames debug codec.
//!
//! A development stand-in for the real vendor codec: each frame is a
//! big-endian `u32` length followed by one [`Packet`] record as JSON. The
//! first frame of a connection is a login record naming the player. An
//! embedder replaces this module's legs with ones backed by the actual wire
//! codec; nothing outside this module knows the difference.

use crate::transport::{Leg, LegEvent, PacketSink, TransportError};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use waypoint_event_system::{Disconnect, OtherPacket, Packet, TextComponent};

/// Upper bound on a single frame; anything larger is a protocol error.
const MAX_FRAME_LEN: u32 = 1 << 20;

/// Reads one length-prefixed packet frame. `Ok(None)` is clean EOF.
pub async fn read_frame<R>(reader: &mut R) -> std::io::Result<Option<Packet>>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds limit"),
        ));
    }
    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;
    let packet = serde_json::from_slice(&body)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    Ok(Some(packet))
}

/// Writes one length-prefixed packet frame.
pub async fn write_frame<W>(writer: &mut W, packet: &Packet) -> std::io::Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(packet)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    writer.write_all(&(body.len() as u32).to_be_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await
}

/// The login record opening every debug-codec connection.
pub fn login_packet(username: &str) -> Packet {
    Packet::Other(OtherPacket {
        name: "login".to_string(),
        data: serde_json::json!({ "username": username }),
    })
}

/// Extracts the username from a login record.
pub fn login_username(packet: &Packet) -> Option<String> {
    match packet {
        Packet::Other(other) if other.name == "login" => other
            .data
            .get("username")
            .and_then(|value| value.as_str())
            .map(String::from),
        _ => None,
    }
}

enum WriteOp {
    Packet(Packet),
    Close(Option<TextComponent>),
}

struct FramedSink {
    writes: mpsc::Sender<WriteOp>,
}

#[async_trait]
impl PacketSink for FramedSink {
    async fn send(&self, packet: Packet) -> Result<(), TransportError> {
        self.writes
            .send(WriteOp::Packet(packet))
            .await
            .map_err(|_| TransportError::Closed)
    }

    async fn set_compression_threshold(&self, threshold: i32) {
        // JSON frames are never compressed; the real codec applies this.
        debug!("Compression threshold {threshold} noted by debug codec");
    }

    async fn close(&self, reason: Option<TextComponent>) {
        let _ = self.writes.send(WriteOp::Close(reason)).await;
    }
}

/// Turns a connected stream into a [`Leg`]. The leg reports `EnteredPlay`
/// immediately — the login exchange happened before the leg was built.
pub fn spawn_leg(stream: TcpStream) -> Leg {
    let (read_half, write_half) = stream.into_split();
    let (event_tx, event_rx) = mpsc::channel(64);
    let (write_tx, write_rx) = mpsc::channel(64);

    tokio::spawn(read_loop(read_half, event_tx));
    tokio::spawn(write_loop(write_half, write_rx));

    Leg {
        sink: Arc::new(FramedSink { writes: write_tx }),
        events: event_rx,
    }
}

async fn read_loop(mut reader: OwnedReadHalf, events: mpsc::Sender<LegEvent>) {
    if events.send(LegEvent::EnteredPlay).await.is_err() {
        return;
    }
    loop {
        match read_frame(&mut reader).await {
            Ok(Some(packet)) => {
                if events.send(LegEvent::Packet(packet)).await.is_err() {
                    break;
                }
            }
            Ok(None) => {
                let _ = events.send(LegEvent::Closed).await;
                break;
            }
            Err(e) => {
                let _ = events.send(LegEvent::Errored(e.to_string())).await;
                break;
            }
        }
    }
}

async fn write_loop(mut writer: OwnedWriteHalf, mut writes: mpsc::Receiver<WriteOp>) {
    while let Some(op) = writes.recv().await {
        match op {
            WriteOp::Packet(packet) => {
                if let Err(e) = write_frame(&mut writer, &packet).await {
                    warn!("Debug codec write failed: {e}");
                    break;
                }
            }
            WriteOp::Close(reason) => {
                if let Some(component) = reason {
                    let _ = write_frame(
                        &mut writer,
                        &Packet::Disconnect(Disconnect { reason: component }),
                    )
                    .await;
                }
                break;
            }
        }
    }
    let _ = writer.shutdown().await;
}
