// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Auto-expiring typing indicators.
//!
//! At most one timer is outstanding per (organization, conversation, user).
//! Arming a key that already has a timer cancels the old one; the map entry
//! carries a generation so a late expiry can never remove its successor.

use std::sync::atomic::{AtomicU64, Ordering};

use courier_core::{ChannelKey, UserId};
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypingKey {
    pub channel: ChannelKey,
    pub user_id: UserId,
}

struct TypingTimer {
    generation: u64,
    cancel: CancellationToken,
}

/// What the caller should do after arming a timer.
#[derive(Debug, Clone)]
pub(crate) struct Armed {
    pub generation: u64,
    pub token: CancellationToken,
    /// No timer was running, so a "started" broadcast is due.
    pub started: bool,
}

#[derive(Default)]
pub(crate) struct TypingTimers {
    timers: DashMap<TypingKey, TypingTimer>,
    generation: AtomicU64,
}

impl TypingTimers {
    /// Replaces any timer for `key` with a fresh one.
    pub fn arm(&self, key: TypingKey) -> Armed {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let token = CancellationToken::new();
        let previous = self.timers.insert(
            key,
            TypingTimer {
                generation,
                cancel: token.clone(),
            },
        );
        let started = match previous {
            Some(timer) => {
                timer.cancel.cancel();
                false
            }
            None => true,
        };
        Armed {
            generation,
            token,
            started,
        }
    }

    /// Removes the timer for `key` if it is still the one armed as `generation`.
    pub fn expire(&self, key: &TypingKey, generation: u64) -> bool {
        self.timers
            .remove_if(key, |_, timer| timer.generation == generation)
            .is_some()
    }

    /// Cancels and removes the timer for `key`. Returns whether one was running.
    pub fn disarm(&self, key: &TypingKey) -> bool {
        match self.timers.remove(key) {
            Some((_, timer)) => {
                timer.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancels every timer on `channel`.
    pub fn disarm_channel(&self, channel: &ChannelKey) -> usize {
        let mut cancelled = 0;
        self.timers.retain(|key, timer| {
            if &key.channel == channel {
                timer.cancel.cancel();
                cancelled += 1;
                false
            } else {
                true
            }
        });
        cancelled
    }

    /// Cancels every timer.
    pub fn disarm_all(&self) -> usize {
        let mut cancelled = 0;
        self.timers.retain(|_, timer| {
            timer.cancel.cancel();
            cancelled += 1;
            false
        });
        cancelled
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }
}
