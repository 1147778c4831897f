//! FIFO work queue with visibility-timeout recovery.
//!
//! Semantics follow the ingestion contract: content-based dedup on the
//! payload, per-group serialization (one in-flight message per group),
//! redelivery after the visibility timeout, and a dead-letter queue after
//! the receive limit.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::QueueError;

/// Message group id used by the document ingestion queue.
pub const GROUP_INGESTION: &str = "ingestion";

/// A claimed message; the receipt is required to ack or return it.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub body: String,
    pub receipt: String,
    pub receive_count: u32,
}

#[derive(Debug)]
struct StoredMessage {
    body: String,
    group: Option<String>,
    receive_count: u32,
    invisible_until: Option<Instant>,
    receipt: Option<String>,
}

impl StoredMessage {
    fn visible(&self, now: Instant) -> bool {
        self.invisible_until.map(|t| t <= now).unwrap_or(true)
    }
}

#[derive(Default)]
struct QueueState {
    messages: VecDeque<StoredMessage>,
    dead_letters: Vec<String>,
}

pub struct WorkQueue {
    state: Mutex<QueueState>,
    visibility_timeout: Duration,
    max_receives: u32,
    /// FIFO queues dedup on content and serialize per group.
    fifo: bool,
}

impl WorkQueue {
    pub fn fifo(visibility_timeout: Duration, max_receives: u32) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            visibility_timeout,
            max_receives,
            fifo: true,
        }
    }

    pub fn standard(visibility_timeout: Duration, max_receives: u32) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            visibility_timeout,
            max_receives,
            fifo: false,
        }
    }

    /// Enqueue a message. FIFO queues drop exact-duplicate bodies that are
    /// still pending.
    pub fn send(&self, body: impl Into<String>, group: Option<&str>) {
        let body = body.into();
        let mut state = self.state.lock().expect("queue poisoned");
        if self.fifo && state.messages.iter().any(|m| m.body == body) {
            debug!("duplicate payload dropped by content dedup");
            return;
        }
        state.messages.push_back(StoredMessage {
            body,
            group: group.map(|g| g.to_string()),
            receive_count: 0,
            invisible_until: None,
            receipt: None,
        });
    }

    /// Claim the next deliverable message, honoring group serialization and
    /// moving over-received messages to the dead-letter queue.
    pub fn receive(&self) -> Option<QueueMessage> {
        let now = Instant::now();
        let mut state = self.state.lock().expect("queue poisoned");

        // Over-received messages move to the DLQ before delivery.
        let mut index = 0;
        while index < state.messages.len() {
            let message = &state.messages[index];
            if message.visible(now) && message.receive_count >= self.max_receives {
                let dead = state.messages.remove(index).expect("index in bounds");
                warn!("message exceeded {} receives, dead-lettered", self.max_receives);
                state.dead_letters.push(dead.body);
            } else {
                index += 1;
            }
        }

        let busy_groups: Vec<String> = if self.fifo {
            state
                .messages
                .iter()
                .filter(|m| !m.visible(now))
                .filter_map(|m| m.group.clone())
                .collect()
        } else {
            Vec::new()
        };

        for message in state.messages.iter_mut() {
            if !message.visible(now) {
                continue;
            }
            if let Some(group) = &message.group {
                if busy_groups.contains(group) {
                    continue;
                }
            }
            let receipt = Uuid::new_v4().to_string();
            message.receive_count += 1;
            message.invisible_until = Some(now + self.visibility_timeout);
            message.receipt = Some(receipt.clone());
            return Some(QueueMessage {
                body: message.body.clone(),
                receipt,
                receive_count: message.receive_count,
            });
        }
        None
    }

    /// Ack a claimed message.
    pub fn delete(&self, receipt: &str) -> Result<(), QueueError> {
        let mut state = self.state.lock().expect("queue poisoned");
        let position = state
            .messages
            .iter()
            .position(|m| m.receipt.as_deref() == Some(receipt))
            .ok_or_else(|| QueueError::UnknownReceipt(receipt.to_string()))?;
        let _ = state.messages.remove(position);
        Ok(())
    }

    /// Reset a claimed message's visibility; zero makes it immediately
    /// redeliverable.
    pub fn change_visibility(&self, receipt: &str, timeout: Duration) -> Result<(), QueueError> {
        let mut state = self.state.lock().expect("queue poisoned");
        let message = state
            .messages
            .iter_mut()
            .find(|m| m.receipt.as_deref() == Some(receipt))
            .ok_or_else(|| QueueError::UnknownReceipt(receipt.to_string()))?;
        message.invisible_until = if timeout.is_zero() {
            None
        } else {
            Some(Instant::now() + timeout)
        };
        Ok(())
    }

    pub fn pending(&self) -> usize {
        self.state.lock().expect("queue poisoned").messages.len()
    }

    pub fn dead_letters(&self) -> Vec<String> {
        self.state
            .lock()
            .expect("queue poisoned")
            .dead_letters
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fifo_queue() -> WorkQueue {
        WorkQueue::fifo(Duration::from_secs(60), 2)
    }

    #[test]
    fn delivers_in_order_and_acks() {
        let queue = fifo_queue();
        queue.send("a", None);
        queue.send("b", None);
        let first = queue.receive().unwrap();
        assert_eq!(first.body, "a");
        queue.delete(&first.receipt).unwrap();
        let second = queue.receive().unwrap();
        assert_eq!(second.body, "b");
        assert_eq!(queue.pending(), 1);
    }

    #[test]
    fn content_dedup_drops_identical_pending_bodies() {
        let queue = fifo_queue();
        queue.send("same", Some(GROUP_INGESTION));
        queue.send("same", Some(GROUP_INGESTION));
        assert_eq!(queue.pending(), 1);
    }

    #[test]
    fn group_serializes_inflight_messages() {
        let queue = fifo_queue();
        queue.send("first", Some(GROUP_INGESTION));
        queue.send("second", Some(GROUP_INGESTION));
        queue.send("other", Some("other-group"));

        let claimed = queue.receive().unwrap();
        assert_eq!(claimed.body, "first");
        // Same group is blocked while "first" is in flight; other groups fly.
        let next = queue.receive().unwrap();
        assert_eq!(next.body, "other");
        assert!(queue.receive().is_none());

        queue.delete(&claimed.receipt).unwrap();
        assert_eq!(queue.receive().unwrap().body, "second");
    }

    #[test]
    fn visibility_reset_makes_message_redeliverable() {
        let queue = fifo_queue();
        queue.send("retry me", Some(GROUP_INGESTION));
        let claimed = queue.receive().unwrap();
        assert!(queue.receive().is_none());
        queue
            .change_visibility(&claimed.receipt, Duration::ZERO)
            .unwrap();
        let again = queue.receive().unwrap();
        assert_eq!(again.body, "retry me");
        assert_eq!(again.receive_count, 2);
    }

    #[test]
    fn dead_letter_after_max_receives() {
        let queue = fifo_queue();
        queue.send("poison", Some(GROUP_INGESTION));
        for _ in 0..2 {
            let claimed = queue.receive().unwrap();
            queue
                .change_visibility(&claimed.receipt, Duration::ZERO)
                .unwrap();
        }
        assert!(queue.receive().is_none());
        assert_eq!(queue.dead_letters(), vec!["poison".to_string()]);
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn standard_queue_allows_duplicates_and_parallel_delivery() {
        let queue = WorkQueue::standard(Duration::from_secs(60), 2);
        queue.send("n1", None);
        queue.send("n1", None);
        assert_eq!(queue.pending(), 2);
        assert!(queue.receive().is_some());
        assert!(queue.receive().is_some());
    }

    #[test]
    fn unknown_receipt_is_an_error() {
        let queue = fifo_queue();
        assert!(queue.delete("nope").is_err());
        assert!(queue
            .change_visibility("nope", Duration::ZERO)
            .is_err());
    }
}
