#[cfg(test)]
mod tests {
    use spilink::link::bus::Command;
    use spilink::{
        HandshakeLine, Link, LinkConfig, LinkError, PeerEvent, SimulatedPeer, TransactionMode,
    };
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, DuplexStream};

    const SETTLE: Duration = Duration::from_secs(5);

    fn start(config: LinkConfig, echo: bool) -> anyhow::Result<(Link, SimulatedPeer, DuplexStream)> {
        let line = HandshakeLine::new();
        let peer = SimulatedPeer::new();
        peer.attach(line.clone());
        peer.set_echo(echo);

        let (sink, reader) = tokio::io::duplex(8192);
        let link = Link::spawn(&config, peer.clone(), line, sink)?;
        Ok((link, peer, reader))
    }

    async fn read_n(reader: &mut DuplexStream, n: usize) -> anyhow::Result<Vec<u8>> {
        let mut out = vec![0u8; n];
        tokio::time::timeout(SETTLE, reader.read_exact(&mut out)).await??;
        Ok(out)
    }

    #[tokio::test]
    async fn test_send_200_bytes_to_peer() -> anyhow::Result<()> {
        let (link, peer, _reader) = start(LinkConfig::default(), false)?;
        let payload: Vec<u8> = (0..200u32).map(|i| (i % 251) as u8).collect();

        link.producer().submit(&payload).await?;
        assert!(link.wait_idle(SETTLE).await);

        assert_eq!(peer.received(), payload);
        assert_eq!(
            peer.events(),
            vec![
                PeerEvent::LengthAnnounced(200),
                PeerEvent::DataWritten(64),
                PeerEvent::DataWritten(64),
                PeerEvent::DataWritten(64),
                PeerEvent::DataWritten(8),
                PeerEvent::LengthAnnounced(0),
            ]
        );

        let stats = link.shutdown().await?;
        assert_eq!(stats.chunks_sent, 4);
        assert_eq!(stats.bytes_sent, 200);
        assert_eq!(stats.sends_completed, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_receive_100_bytes_from_peer() -> anyhow::Result<()> {
        let (link, peer, mut reader) = start(LinkConfig::default(), false)?;
        let payload: Vec<u8> = (100..200u8).collect();

        peer.offer(&payload);
        let got = read_n(&mut reader, 100).await?;
        assert_eq!(got, payload);
        assert!(link.wait_idle(SETTLE).await);
        assert_eq!(link.mode(), TransactionMode::Idle);

        let reads: Vec<usize> = peer
            .events()
            .into_iter()
            .filter_map(|e| match e {
                PeerEvent::DataRead(n) => Some(n),
                _ => None,
            })
            .collect();
        assert_eq!(reads, vec![64, 36]);

        let stats = link.shutdown().await?;
        assert_eq!(stats.receives_completed, 1);
        assert_eq!(stats.bytes_received, 100);
        Ok(())
    }

    #[tokio::test]
    async fn test_slow_consumer_pauses_without_loss() -> anyhow::Result<()> {
        let config = LinkConfig {
            inbound_capacity: 64,
            consumer_block: 16,
            consumer_wait_ms: 10,
            ..LinkConfig::default()
        };
        let line = HandshakeLine::new();
        let peer = SimulatedPeer::new();
        peer.attach(line.clone());
        // A tiny sink the test does not read yet.
        let (sink, mut reader) = tokio::io::duplex(16);
        let link = Link::spawn(&config, peer.clone(), line, sink)?;

        let payload: Vec<u8> = (0..1000u32).map(|i| (i * 13 % 256) as u8).collect();
        peer.offer(&payload);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(link.mode(), TransactionMode::ReceivingFromPeer);
        assert!(link.shared().backpressure.is_paused());
        assert!(peer.pending_tx() > 0);

        let got = read_n(&mut reader, payload.len()).await?;
        assert_eq!(got, payload);
        assert!(link.wait_idle(SETTLE).await);

        let stats = link.shutdown().await?;
        assert!(stats.backpressure_pauses >= 1);
        assert_eq!(stats.backpressure_pauses, stats.backpressure_resumes);
        assert_eq!(stats.bytes_received, 1000);
        Ok(())
    }

    #[tokio::test]
    async fn test_echo_round_trip() -> anyhow::Result<()> {
        let (link, _peer, mut reader) = start(LinkConfig::default(), true)?;

        link.producer().submit(b"AT+GMR\r\n").await?;
        let got = read_n(&mut reader, 8).await?;
        assert_eq!(got, b"AT+GMR\r\n");

        assert!(link.wait_idle(SETTLE).await);
        link.shutdown().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_sustained_echo_preserves_order() -> anyhow::Result<()> {
        let (link, _peer, mut reader) = start(LinkConfig::default(), true)?;
        let producer = link.producer();

        let mut expected = Vec::new();
        for i in 0..40u32 {
            let len = (i * 37 % 300 + 1) as usize;
            let chunk: Vec<u8> = (0..len).map(|j| (i as usize + j) as u8).collect();
            producer.submit(&chunk).await?;
            expected.extend_from_slice(&chunk);
        }

        let got = read_n(&mut reader, expected.len()).await?;
        assert_eq!(got, expected);
        assert!(link.wait_idle(SETTLE).await);

        let stats = link.shutdown().await?;
        assert_eq!(stats.bytes_sent, expected.len() as u64);
        assert_eq!(stats.bytes_received, expected.len() as u64);
        assert_eq!(stats.short_transfers, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_producers_stay_contiguous() -> anyhow::Result<()> {
        let (link, peer, _reader) = start(LinkConfig::default(), false)?;

        let mut tasks = Vec::new();
        for tag in [b'a', b'b', b'c', b'd'] {
            let producer = link.producer();
            tasks.push(tokio::spawn(async move {
                for _ in 0..5 {
                    producer.submit(&[tag; 100]).await?;
                }
                Ok::<_, LinkError>(())
            }));
        }
        for task in tasks {
            task.await??;
        }
        assert!(link.wait_idle(SETTLE).await);

        let received = peer.received();
        assert_eq!(received.len(), 2000);
        for run in received.chunks(100) {
            assert!(run.iter().all(|&b| b == run[0]), "submission was interleaved");
        }
        link.shutdown().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_oversized_submission_is_rejected() -> anyhow::Result<()> {
        let config = LinkConfig {
            max_submission: 64,
            ..LinkConfig::default()
        };
        let (link, peer, _reader) = start(config, false)?;

        let err = link.producer().submit(&[0u8; 65]).await.unwrap_err();
        assert!(matches!(err, LinkError::PayloadTooLarge { len: 65, max: 64 }));
        assert!(link.wait_idle(SETTLE).await);
        assert!(peer.events().is_empty());

        link.shutdown().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_bus_fault_then_retry_on_next_wakeup() -> anyhow::Result<()> {
        let config = LinkConfig {
            outbound_capacity: 64,
            max_submission: 64,
            enqueue_timeout_ms: Some(20),
            ..LinkConfig::default()
        };
        let (link, peer, _reader) = start(config, false)?;
        peer.fail_next(Command::WriteLength);

        let producer = link.producer();
        producer.submit(&[1u8; 64]).await?;
        let deadline = tokio::time::Instant::now() + SETTLE;
        while link.stats().bus_errors == 0 {
            assert!(tokio::time::Instant::now() < deadline, "announce never failed");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        // Outbound is still full and nothing will drain it.
        let err = producer.submit(&[2u8; 10]).await.unwrap_err();
        assert!(matches!(err, LinkError::EnqueueFailed { queued: 0, len: 10 }));

        link.handshake().assert();
        assert!(link.wait_idle(SETTLE).await);
        assert_eq!(peer.received(), vec![1u8; 64]);

        link.shutdown().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_shutdown_flushes_and_closes_sink() -> anyhow::Result<()> {
        let (link, peer, mut reader) = start(LinkConfig::default(), false)?;
        peer.offer(b"bye");
        let got = read_n(&mut reader, 3).await?;
        assert_eq!(got, b"bye");

        link.shutdown().await?;
        let mut rest = Vec::new();
        tokio::time::timeout(SETTLE, reader.read_to_end(&mut rest)).await??;
        assert!(rest.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_spawn_rejects_invalid_config() -> anyhow::Result<()> {
        let config = LinkConfig {
            inbound_capacity: 32,
            ..LinkConfig::default()
        };
        let line = HandshakeLine::new();
        let (sink, _reader) = tokio::io::duplex(64);

        let err = Link::spawn(&config, SimulatedPeer::new(), line, sink).err();
        assert!(matches!(err, Some(LinkError::Config(_))));
        Ok(())
    }
}
