//! Link pipeline.
//!
//! Owns the two long-running tasks: the worker, which services handshake
//! wake-ups with the state machine, and the consumer, which drains the
//! inbound stream into a sink.

use crate::config::LinkConfig;
use crate::error::{LinkError, Result};
use crate::link::bus::Bus;
use crate::link::consumer::Consumer;
use crate::link::handshake::HandshakeLine;
use crate::link::machine::{Step, TransactionMode, TransactionStateMachine};
use crate::link::producer::Producer;
use crate::link::shared::{LinkShared, LinkStats};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWrite;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// How often `wait_idle` re-checks the link.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Handle to a running link.
pub struct Link {
    shared: Arc<LinkShared>,
    producer: Producer,
    shutdown: oneshot::Sender<()>,
    worker: JoinHandle<()>,
    consumer: JoinHandle<Result<u64>>,
}

impl Link {
    /// Start the worker and consumer tasks. Must be called inside a tokio
    /// runtime. `handshake` is the line the peer side of `bus` drives.
    pub fn spawn<B, W>(config: &LinkConfig, bus: B, handshake: HandshakeLine, sink: W) -> Result<Self>
    where
        B: Bus + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        config.validate()?;

        let shared = Arc::new(LinkShared::new(config, handshake));
        let producer = Producer::new(
            shared.clone(),
            config.max_submission,
            config.enqueue_timeout(),
        );
        let (shutdown, shutdown_rx) = oneshot::channel();

        let machine = TransactionStateMachine::new(bus, shared.clone());
        let worker = tokio::spawn(run_worker(machine, shutdown_rx));

        let consumer = Consumer::new(shared.clone(), config.consumer_block, config.consumer_wait());
        let consumer = tokio::spawn(consumer.run(sink));

        tracing::info!(
            outbound = config.outbound_capacity,
            inbound = config.inbound_capacity,
            "link started"
        );

        Ok(Self {
            shared,
            producer,
            shutdown,
            worker,
            consumer,
        })
    }

    /// A submission handle. Clones share one submission lock.
    pub fn producer(&self) -> Producer {
        self.producer.clone()
    }

    pub fn handshake(&self) -> &HandshakeLine {
        &self.shared.handshake
    }

    pub fn shared(&self) -> &Arc<LinkShared> {
        &self.shared
    }

    pub fn mode(&self) -> TransactionMode {
        self.shared.mode()
    }

    pub fn stats(&self) -> LinkStats {
        self.shared.stats()
    }

    /// Wait until nothing is queued or in flight in either direction.
    /// Returns `false` if `timeout` elapses first.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_quiet() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(IDLE_POLL_INTERVAL).await;
        }
    }

    fn is_quiet(&self) -> bool {
        let shared = &self.shared;
        shared.mode() == TransactionMode::Idle
            && !shared.handshake.is_raised()
            && shared.outbound.is_empty()
            && shared.inbound.is_empty()
    }

    /// Stop the worker, let the consumer drain what is left, and return the
    /// final counters.
    pub async fn shutdown(self) -> Result<LinkStats> {
        // Wakes producers still blocked on outbound room.
        self.shared.outbound.close();
        let _ = self.shutdown.send(());
        self.worker.await.map_err(join_error)?;

        self.shared.inbound.close();
        let written = self.consumer.await.map_err(join_error)??;

        let stats = self.shared.stats();
        tracing::info!(
            written,
            sent = stats.bytes_sent,
            received = stats.bytes_received,
            "link stopped"
        );
        Ok(stats)
    }
}

fn join_error(e: tokio::task::JoinError) -> LinkError {
    LinkError::Io(std::io::Error::other(e))
}

async fn run_worker<B: Bus>(
    mut machine: TransactionStateMachine<B>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let line = machine.shared().handshake.clone();

    loop {
        tokio::select! {
            _ = line.wait() => {
                if let Step::Aborted(e) = machine.on_handshake() {
                    tracing::debug!("worker continuing after abort: {}", e);
                }
                // A busy line never suspends `wait`; give the other tasks a turn.
                tokio::task::yield_now().await;
            }
            // Also fires if the `Link` handle is dropped.
            _ = &mut shutdown => break,
        }
    }

    tracing::debug!(mode = ?machine.mode(), "worker stopped");
}
