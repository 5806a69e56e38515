//! UDP datagram pair to the locally attached POCSAG modem/repeater (C3,
//! §4.3, §6).
//!
//! Grounded on `examples/original_source/UDPSocket.cpp` for the bind-then-
//! resolve-peer-once shape and the first-byte beacon decode, and on the
//! teacher's `net/encrypted.rs` for the async datagram read/write idiom.

use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tracing::warn;

use crate::error::GatewayError;
use crate::message::PagingMessage;

/// Decoded state of a single downstream beacon byte (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Beacon {
    Idle,
    Busy,
}

pub struct DownstreamLink {
    socket: UdpSocket,
    peer: SocketAddr,
}

impl DownstreamLink {
    /// Bind locally and resolve the peer once; peer resolution failure is
    /// fatal (§4.3, §7 "Unresolved peer").
    pub async fn open(
        local_addr: &str,
        local_port: u16,
        remote_addr: &str,
        remote_port: u16,
    ) -> Result<Self, GatewayError> {
        let bind_target = format!("{local_addr}:{local_port}");
        let socket = UdpSocket::bind(&bind_target).await?;

        let remote_target = format!("{remote_addr}:{remote_port}");
        let peer = tokio::net::lookup_host(&remote_target)
            .await
            .map_err(GatewayError::DownstreamUnresolved)?
            .next()
            .ok_or_else(|| {
                GatewayError::DownstreamUnresolved(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no addresses resolved for {remote_target}"),
                ))
            })?;

        Ok(Self { socket, peer })
    }

    /// Receive one datagram without blocking beyond the caller-supplied
    /// timeout, validating the source address (§4.3: "exactly matches the
    /// resolved peer"). Datagrams from any other source are logged and
    /// dropped, reported here as `Ok(None)` so the caller's loop doesn't
    /// stall on an off-path sender.
    pub async fn recv_beacon(
        &self,
        timeout: std::time::Duration,
    ) -> Option<Result<Beacon, std::io::Error>> {
        let mut buf = [0u8; 1];
        let outcome = tokio::time::timeout(timeout, self.socket.recv_from(&mut buf)).await;
        let (n, from) = match outcome {
            Err(_) => return None,
            Ok(Ok(v)) => v,
            Ok(Err(e)) => return Some(Err(e)),
        };

        if from != self.peer {
            warn!(%from, expected = %self.peer, "dropping datagram from unexpected source");
            return None;
        }
        if n == 0 {
            return None;
        }

        match buf[0] {
            0x00 => Some(Ok(Beacon::Idle)),
            0xFF => Some(Ok(Beacon::Busy)),
            other => {
                warn!(byte = other, "unrecognised beacon byte, ignoring");
                None
            }
        }
    }

    /// Send an encoded POCSAG frame. A write error is logged by the caller
    /// and does not fail the dispatcher (§4.3, §7 "Downstream write error").
    pub async fn send(&self, message: &PagingMessage) -> std::io::Result<()> {
        let frame = encode_frame(message);
        self.socket.send_to(&frame, self.peer).await?;
        Ok(())
    }
}

/// Wire-exact outbound frame: `"POCSAG"` + 3-byte big-endian RIC + 1-byte
/// functional + body (§4.3, §6).
pub fn encode_frame(message: &PagingMessage) -> Vec<u8> {
    let mut frame = Vec::with_capacity(10 + message.body.len());
    frame.extend_from_slice(b"POCSAG");
    let ric = message.ric.to_be_bytes();
    frame.extend_from_slice(&ric[1..4]);
    frame.push(message.functional.code());
    frame.extend_from_slice(&message.body);
    frame
}

/// Decode a `POCSAG`-framed datagram back into `(ric, functional, body)`.
/// Not used by the running gateway (the modem only ever talks back with a
/// 1-byte beacon) but is the inverse of [`encode_frame`], exercised by the
/// round-trip property test (R1).
pub fn decode_frame(frame: &[u8]) -> Option<(u32, u8, Vec<u8>)> {
    if frame.len() < 10 || &frame[0..6] != b"POCSAG" {
        return None;
    }
    let ric = u32::from_be_bytes([0, frame[6], frame[7], frame[8]]);
    let functional = frame[9];
    let body = frame[10..].to_vec();
    Some((ric, functional, body))
}
