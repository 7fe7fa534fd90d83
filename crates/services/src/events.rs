//! In-process "progress changed" notifications.
//!
//! Publishers fire a payload-free signal after a completion lands; listeners
//! re-query whatever aggregate they display. Dropping a subscription
//! unsubscribes it.

use tokio::sync::broadcast;

/// Something about a learner's progress changed. Re-query to find out what.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressChanged;

/// Broadcast channel shared by every publisher and listener in the process.
#[derive(Debug, Clone)]
pub struct ProgressBus {
    sender: broadcast::Sender<ProgressChanged>,
}

impl ProgressBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Notify every live subscriber. Returns how many were reached; zero is
    /// not an error.
    pub fn publish(&self) -> usize {
        let reached = self.sender.send(ProgressChanged).unwrap_or(0);
        tracing::debug!(reached, "progress changed");
        reached
    }

    #[must_use]
    pub fn subscribe(&self) -> ProgressSubscription {
        ProgressSubscription {
            receiver: self.sender.subscribe(),
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new(16)
    }
}

/// One listener's handle on the bus.
#[derive(Debug)]
pub struct ProgressSubscription {
    receiver: broadcast::Receiver<ProgressChanged>,
}

impl ProgressSubscription {
    /// Wait for the next notification.
    ///
    /// A listener that fell behind sees one notification for everything it
    /// missed. Returns `false` once every publisher is gone.
    pub async fn changed(&mut self) -> bool {
        match self.receiver.recv().await {
            Ok(ProgressChanged) => true,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "progress listener lagged");
                true
            }
            Err(broadcast::error::RecvError::Closed) => false,
        }
    }

    /// Drain pending notifications without waiting. Returns whether there
    /// were any.
    pub fn try_changed(&mut self) -> bool {
        let mut seen = false;
        loop {
            match self.receiver.try_recv() {
                Ok(ProgressChanged) | Err(broadcast::error::TryRecvError::Lagged(_)) => {
                    seen = true;
                }
                Err(_) => return seen,
            }
        }
    }
}
