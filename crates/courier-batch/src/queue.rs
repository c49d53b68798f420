// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pending messages and the priority queue they wait in.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use courier_core::{CourierError, MessageId, MessageRecord, NewMessage, Priority};
use tokio::sync::oneshot;
use tokio::time::Instant;

type Outcome = Result<MessageRecord, CourierError>;

/// A message waiting to be written, owned by the processor until it is resolved.
#[derive(Debug)]
pub struct PendingMessage {
    pub id: MessageId,
    pub message: NewMessage,
    pub priority: Priority,
    pub enqueued_at: Instant,
    pub retry_count: u32,
    completion: oneshot::Sender<Outcome>,
}

impl PendingMessage {
    /// Creates a pending message and the handle its caller awaits.
    pub fn new(message: NewMessage, priority: Priority) -> (Self, Completion) {
        let id = MessageId::generate();
        let (tx, rx) = oneshot::channel();
        let pending = Self {
            id: id.clone(),
            message,
            priority,
            enqueued_at: Instant::now(),
            retry_count: 0,
            completion: tx,
        };
        (pending, Completion { message_id: id, rx })
    }

    /// The row written to the store for this message.
    pub fn to_record(&self) -> MessageRecord {
        self.message.clone().into_record(self.id.clone())
    }

    /// Hands the outcome to the caller. Consumes the message, so it can
    /// only happen once.
    pub fn resolve(self, outcome: Outcome) {
        // The caller may have dropped its handle; nothing to do then.
        let _ = self.completion.send(outcome);
    }
}

/// Resolves with the persisted row, or the terminal error, of one enqueued message.
#[derive(Debug)]
pub struct Completion {
    message_id: MessageId,
    rx: oneshot::Receiver<Outcome>,
}

impl Completion {
    pub fn message_id(&self) -> &MessageId {
        &self.message_id
    }
}

impl Future for Completion {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(CourierError::Shutdown)))
    }
}

/// Queue ordered by priority (high first), FIFO within a tier.
#[derive(Debug, Default)]
pub struct PendingQueue {
    items: VecDeque<PendingMessage>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts behind every queued message of equal or higher priority.
    pub fn push(&mut self, message: PendingMessage) {
        let at = self
            .items
            .iter()
            .position(|queued| queued.priority < message.priority)
            .unwrap_or(self.items.len());
        self.items.insert(at, message);
    }

    /// Puts a failed batch back at the head, keeping its internal order.
    pub fn requeue_front(&mut self, batch: Vec<PendingMessage>) {
        for message in batch.into_iter().rev() {
            self.items.push_front(message);
        }
    }

    /// Removes up to `max` messages from the head.
    pub fn take_batch(&mut self, max: usize) -> Vec<PendingMessage> {
        let n = max.min(self.items.len());
        self.items.drain(..n).collect()
    }

    /// Removes everything.
    pub fn drain_all(&mut self) -> Vec<PendingMessage> {
        self.items.drain(..).collect()
    }

    /// Arrival time of the longest-waiting message.
    pub fn oldest_enqueued(&self) -> Option<Instant> {
        self.items.iter().map(|m| m.enqueued_at).min()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingMessage> {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use courier_test_utils::draft;
    use proptest::prelude::*;

    use super::*;

    fn pending(content: &str, priority: Priority) -> PendingMessage {
        PendingMessage::new(draft("conv-1", content), priority).0
    }

    fn contents(queue: &PendingQueue) -> Vec<String> {
        queue.iter().map(|m| m.message.content.clone()).collect()
    }

    #[tokio::test]
    async fn priority_then_fifo() {
        let mut queue = PendingQueue::new();
        queue.push(pending("m1", Priority::Medium));
        queue.push(pending("l1", Priority::Low));
        queue.push(pending("m2", Priority::Medium));
        queue.push(pending("h1", Priority::High));
        queue.push(pending("l2", Priority::Low));
        queue.push(pending("h2", Priority::High));

        assert_eq!(contents(&queue), ["h1", "h2", "m1", "m2", "l1", "l2"]);
    }

    #[tokio::test]
    async fn requeued_batch_goes_back_to_front() {
        let mut queue = PendingQueue::new();
        for c in ["a", "b", "c", "d"] {
            queue.push(pending(c, Priority::Medium));
        }
        let batch = queue.take_batch(2);
        queue.push(pending("e", Priority::Medium));
        queue.requeue_front(batch);

        assert_eq!(contents(&queue), ["a", "b", "c", "d", "e"]);
    }

    #[tokio::test]
    async fn take_batch_is_bounded() {
        let mut queue = PendingQueue::new();
        queue.push(pending("a", Priority::Low));
        assert_eq!(queue.take_batch(5).len(), 1);
        assert!(queue.is_empty());
        assert!(queue.oldest_enqueued().is_none());
    }

    #[tokio::test]
    async fn dropped_sender_resolves_as_shutdown() {
        let (message, completion) = PendingMessage::new(draft("conv-1", "x"), Priority::Low);
        drop(message);
        assert!(matches!(completion.await, Err(CourierError::Shutdown)));
    }

    #[tokio::test]
    async fn resolution_reaches_the_caller() {
        let (message, completion) = PendingMessage::new(draft("conv-1", "x"), Priority::Low);
        let id = completion.message_id().clone();
        let record = message.to_record();
        message.resolve(Ok(record));
        assert_eq!(completion.await.unwrap().id, id);
    }

    fn tier() -> impl Strategy<Value = Priority> {
        prop_oneof![Just(Priority::Low), Just(Priority::Medium), Just(Priority::High)]
    }

    proptest! {
        #[test]
        fn queue_is_sorted_and_stable(tiers in proptest::collection::vec(tier(), 0..40)) {
            let mut queue = PendingQueue::new();
            for (i, p) in tiers.iter().enumerate() {
                queue.push(PendingMessage::new(draft("conv-1", &i.to_string()), *p).0);
            }

            let order: Vec<(Priority, usize)> = queue
                .iter()
                .map(|m| (m.priority, m.message.content.parse().unwrap()))
                .collect();
            for pair in order.windows(2) {
                let (a, b) = (pair[0], pair[1]);
                prop_assert!(a.0 > b.0 || (a.0 == b.0 && a.1 < b.1));
            }
            prop_assert_eq!(order.len(), tiers.len());
        }
    }
}
