//! Line-oriented TCP client to the upstream paging backend (C1, §4.1).
//!
//! Grounded on `examples/original_source/TCPSocket.cpp` for the socket setup
//! (`TCP_NODELAY`, `SO_KEEPALIVE`, connect-then-framing) and on the teacher's
//! `net/encrypted.rs` for the split-read/write async idiom over a
//! `tokio::net::TcpStream`.

use std::time::Duration;

use socket2::SockRef;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::error::GatewayError;

/// Fixed reconnect back-off table in seconds (§4.1); the supervisor indexes
/// it by `fail_count`, saturating at the last entry.
pub const BACKOFF_SECONDS: [u64; 10] = [2, 4, 8, 10, 20, 60, 120, 240, 480, 600];

pub fn backoff_for(fail_count: usize) -> Duration {
    let idx = fail_count.min(BACKOFF_SECONDS.len() - 1);
    Duration::from_secs(BACKOFF_SECONDS[idx])
}

/// Outcome of a single non-blocking-with-timeout read (§4.1).
#[derive(Debug)]
pub enum ReadOutcome {
    Line(Vec<u8>),
    Timeout,
    Closed,
    Error(std::io::Error),
}

pub struct UpstreamLink {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl UpstreamLink {
    /// Resolve `host:port` and connect, setting `TCP_NODELAY` and
    /// `SO_KEEPALIVE`. Resolution failure is fatal to the caller (§4.1,
    /// §7 "Unresolved peer").
    pub async fn open(host: &str, port: u16) -> Result<Self, GatewayError> {
        let target = format!("{host}:{port}");
        let mut addrs = tokio::net::lookup_host(&target)
            .await
            .map_err(GatewayError::UpstreamUnresolved)?;
        let addr = addrs.next().ok_or_else(|| {
            GatewayError::UpstreamUnresolved(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no addresses resolved for {target}"),
            ))
        })?;

        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        SockRef::from(&stream).set_keepalive(true)?;

        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        })
    }

    /// Read one `\r\n`-terminated line, waiting at most `timeout`. The
    /// returned bytes have the trailing `\r\n` (or bare `\n`) stripped.
    pub async fn read(&mut self, timeout: Duration) -> ReadOutcome {
        let mut buf = Vec::new();
        match tokio::time::timeout(timeout, self.reader.read_until(b'\n', &mut buf)).await {
            Err(_) => ReadOutcome::Timeout,
            Ok(Ok(0)) => ReadOutcome::Closed,
            Ok(Ok(_)) => {
                while matches!(buf.last(), Some(b'\n') | Some(b'\r')) {
                    buf.pop();
                }
                ReadOutcome::Line(buf)
            }
            Ok(Err(e)) => ReadOutcome::Error(e),
        }
    }

    pub async fn write(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(bytes).await
    }

    pub async fn close(mut self) {
        let _ = self.writer.shutdown().await;
    }
}
