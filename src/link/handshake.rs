//! Handshake line: the single attention signal shared by host and peer.
//!
//! Modelled as a single-slot notification. Any number of assertions made
//! before the worker picks the line up collapse into one wake-up. External
//! edges from the peer and software self-assertions are the same operation.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Line {
    raised: AtomicBool,
    notify: Notify,
    asserts: AtomicU64,
    wakeups: AtomicU64,
}

/// Cloneable handle to one handshake line.
#[derive(Debug, Clone, Default)]
pub struct HandshakeLine {
    line: Arc<Line>,
}

impl HandshakeLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the line. Idempotent while a wake-up is already pending.
    ///
    /// Returns `true` if this call raised it, `false` if it coalesced with a
    /// pending assertion. Never blocks.
    pub fn assert(&self) -> bool {
        self.line.asserts.fetch_add(1, Ordering::Relaxed);
        if self.line.raised.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.line.notify.notify_one();
        true
    }

    pub fn is_raised(&self) -> bool {
        self.line.raised.load(Ordering::Acquire)
    }

    /// Consume a pending assertion without waiting.
    pub fn take(&self) -> bool {
        let taken = self.line.raised.swap(false, Ordering::AcqRel);
        if taken {
            self.line.wakeups.fetch_add(1, Ordering::Relaxed);
        }
        taken
    }

    /// Wait until the line is raised, then lower it.
    ///
    /// An assertion made after this returns schedules the next wake-up.
    pub async fn wait(&self) {
        loop {
            if self.take() {
                return;
            }
            // A stale permit left behind by `take` just loops once more.
            self.line.notify.notified().await;
        }
    }

    /// Total `assert` calls, including coalesced ones.
    pub fn assert_count(&self) -> u64 {
        self.line.asserts.load(Ordering::Relaxed)
    }

    /// Wake-ups actually delivered.
    pub fn wakeup_count(&self) -> u64 {
        self.line.wakeups.load(Ordering::Relaxed)
    }
}
