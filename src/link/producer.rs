//! Outbound submission.
//!
//! Task-context side of the host -> peer stream. Blocks on stream capacity,
//! then wakes the state machine if the link is idle.

use crate::error::{LinkError, Result};
use crate::link::machine::TransactionMode;
use crate::link::shared::LinkShared;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};

#[derive(Debug, Clone)]
pub struct Producer {
    shared: Arc<LinkShared>,
    max_submission: usize,
    enqueue_timeout: Option<Duration>,
    // Keeps each submission contiguous in the stream when callers race.
    submit_lock: Arc<tokio::sync::Mutex<()>>,
}

impl Producer {
    pub fn new(
        shared: Arc<LinkShared>,
        max_submission: usize,
        enqueue_timeout: Option<Duration>,
    ) -> Self {
        Self {
            shared,
            max_submission,
            enqueue_timeout,
            submit_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn max_submission(&self) -> usize {
        self.max_submission
    }

    /// Queue `bytes` for the peer.
    ///
    /// Fails with `PayloadTooLarge` before touching the stream, or with
    /// `EnqueueFailed` if the whole payload did not fit within the blocking
    /// budget. In the latter case the bytes that did fit stay queued and no
    /// handshake is raised for them.
    pub async fn submit(&self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.max_submission {
            tracing::error!(
                len = bytes.len(),
                max = self.max_submission,
                "submission too large"
            );
            return Err(LinkError::PayloadTooLarge {
                len: bytes.len(),
                max: self.max_submission,
            });
        }
        if bytes.is_empty() {
            return Ok(());
        }

        let _guard = self.submit_lock.lock().await;
        let queued = self
            .shared
            .outbound
            .push(bytes, self.enqueue_timeout)
            .await;
        if queued != bytes.len() {
            tracing::error!(queued, len = bytes.len(), "outbound enqueue failed");
            return Err(LinkError::EnqueueFailed {
                queued,
                len: bytes.len(),
            });
        }

        let shared = &self.shared;
        shared.with_mode(|mode| {
            if *mode == TransactionMode::Idle {
                tracing::debug!("link idle, raising handshake");
                shared.handshake.assert();
            }
        });
        Ok(())
    }
}

/// Feed a line-oriented input source into the link.
///
/// Each read of up to `block` bytes becomes one submission. Rejected
/// submissions are logged and dropped; the pump keeps going until EOF and
/// returns the number of bytes accepted.
pub async fn pump_lines<R>(mut reader: R, producer: &Producer, block: usize) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; block.clamp(1, producer.max_submission())];
    let mut accepted = 0u64;

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(accepted);
        }
        tracing::trace!(len = n, "input data");
        match producer.submit(&buf[..n]).await {
            Ok(()) => accepted += n as u64,
            Err(e) => tracing::warn!("dropping {} input bytes: {}", n, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LinkConfig;
    use crate::link::handshake::HandshakeLine;

    fn shared(config: &LinkConfig) -> Arc<LinkShared> {
        Arc::new(LinkShared::new(config, HandshakeLine::new()))
    }

    #[tokio::test]
    async fn test_submit_raises_line_when_idle() {
        let shared = shared(&LinkConfig::default());
        let producer = Producer::new(shared.clone(), 4096, None);

        producer.submit(b"hello").await.unwrap();
        assert_eq!(shared.outbound.available(), 5);
        assert!(shared.handshake.take());
    }

    #[tokio::test]
    async fn test_submit_does_not_raise_mid_transaction() {
        let shared = shared(&LinkConfig::default());
        shared.with_mode(|m| *m = TransactionMode::SendingToPeer);
        let producer = Producer::new(shared.clone(), 4096, None);

        producer.submit(b"more").await.unwrap();
        assert!(!shared.handshake.is_raised());
    }

    #[tokio::test]
    async fn test_payload_too_large_has_no_side_effects() {
        let shared = shared(&LinkConfig::default());
        let producer = Producer::new(shared.clone(), 16, None);

        let err = producer.submit(&[0u8; 17]).await.unwrap_err();
        assert!(matches!(err, LinkError::PayloadTooLarge { len: 17, max: 16 }));
        assert!(shared.outbound.is_empty());
        assert!(!shared.handshake.is_raised());
    }

    #[tokio::test]
    async fn test_enqueue_failed_leaves_partial_bytes() {
        let config = LinkConfig {
            outbound_capacity: 64,
            ..LinkConfig::default()
        };
        let shared = shared(&config);
        shared.outbound.try_push(&[0u8; 60]);
        let producer = Producer::new(shared.clone(), 64, Some(Duration::from_millis(10)));

        let err = producer.submit(&[1u8; 10]).await.unwrap_err();
        assert!(matches!(err, LinkError::EnqueueFailed { queued: 4, len: 10 }));
        assert_eq!(shared.outbound.available(), 64);
        assert!(!shared.handshake.is_raised());
    }

    #[tokio::test]
    async fn test_pump_lines_submits_until_eof() {
        let shared = shared(&LinkConfig::default());
        let producer = Producer::new(shared.clone(), 4096, None);

        let input: &[u8] = b"AT\r\nAT+GMR\r\n";
        let accepted = pump_lines(input, &producer, 1024).await.unwrap();

        assert_eq!(accepted, input.len() as u64);
        let mut out = vec![0u8; 64];
        let n = shared.outbound.try_pop(&mut out);
        assert_eq!(&out[..n], input);
    }

    #[tokio::test]
    async fn test_pump_lines_caps_reads_at_submission_limit() {
        let shared = shared(&LinkConfig::default());
        let producer = Producer::new(shared.clone(), 4, None);

        let accepted = pump_lines(&b"0123456789"[..], &producer, 1024).await.unwrap();
        assert_eq!(accepted, 10);
        assert_eq!(shared.outbound.available(), 10);
    }
}
