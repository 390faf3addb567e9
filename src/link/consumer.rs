//! Inbound drain.
//!
//! Moves peer -> host bytes to a sink in fixed blocks and, after every
//! drain, gives a paused receive the chance to resume.

use crate::error::Result;
use crate::link::shared::LinkShared;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};

#[derive(Debug)]
pub struct Consumer {
    shared: Arc<LinkShared>,
    block: usize,
    wait: Duration,
}

impl Consumer {
    pub fn new(shared: Arc<LinkShared>, block: usize, wait: Duration) -> Self {
        Self {
            shared,
            block: block.max(1),
            wait,
        }
    }

    /// Drain the inbound stream into `sink` until it is closed and empty.
    ///
    /// Each wait is bounded, so a resume check happens at least once per
    /// `wait` even when no data arrives. Returns the bytes written.
    pub async fn run<W>(self, mut sink: W) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let shared = &self.shared;
        let mut buf = vec![0u8; self.block];
        let mut written = 0u64;

        loop {
            let n = shared.inbound.pop(&mut buf, self.wait).await;
            if n > 0 {
                tracing::trace!(len = n, "inbound data");
                sink.write_all(&buf[..n]).await?;
                sink.flush().await?;
                written += n as u64;
            }

            shared
                .backpressure
                .try_resume(&shared.inbound, &shared.handshake);

            if n == 0 && shared.inbound.is_closed() && shared.inbound.is_empty() {
                break;
            }
        }

        sink.shutdown().await?;
        tracing::debug!(written, "consumer finished");
        Ok(written)
    }
}
