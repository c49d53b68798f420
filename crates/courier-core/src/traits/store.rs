// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistent store contract consumed by the batch processor and the cache.

use async_trait::async_trait;

use crate::error::CourierError;
use crate::model::{MessageQuery, MessageRecord};
use crate::traits::adapter::PluginAdapter;

/// Adapter for the durable message store.
///
/// The engine is agnostic to the concrete backend. It only needs an atomic
/// multi-row insert and equality/range filtering.
#[async_trait]
pub trait MessageStore: PluginAdapter {
    /// Inserts every row in one atomic operation and returns the persisted rows
    /// in the same order. Either all rows are written or none are.
    async fn insert_messages(
        &self,
        rows: Vec<MessageRecord>,
    ) -> Result<Vec<MessageRecord>, CourierError>;

    /// Returns the rows matching `query`, oldest first.
    async fn select_messages(
        &self,
        query: &MessageQuery,
    ) -> Result<Vec<MessageRecord>, CourierError>;
}
