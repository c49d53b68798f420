// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A [`MessageStore`] decorator that reads through the query cache.
//!
//! Selects are served from cache within TTL. Inserts go straight to the
//! backing store and, once they succeed, invalidate every cached query of
//! each conversation they touched.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use courier_config::CacheConfig;
use courier_core::{
    AdapterType, CourierError, HealthStatus, MessageQuery, MessageRecord, MessageStore,
    PluginAdapter,
};
use tracing::debug;

use crate::cache::QueryCache;

pub struct CachedStore {
    inner: Arc<dyn MessageStore>,
    cache: QueryCache<Vec<MessageRecord>>,
}

impl CachedStore {
    pub fn new(inner: Arc<dyn MessageStore>, config: &CacheConfig) -> Self {
        Self {
            inner,
            cache: QueryCache::new(config),
        }
    }

    pub fn cache(&self) -> &QueryCache<Vec<MessageRecord>> {
        &self.cache
    }

    /// Select with an explicit TTL instead of the configured default.
    pub async fn select_with_ttl(
        &self,
        query: &MessageQuery,
        ttl: Duration,
    ) -> Result<Vec<MessageRecord>, CourierError> {
        self.cache
            .read(&query.signature(), query.query_type(), Some(ttl), || {
                self.inner.select_messages(query)
            })
            .await
    }

    /// Drops every cached query under each prefix in `touched`.
    fn invalidate_prefixes(&self, touched: BTreeSet<String>) {
        for prefix in touched {
            let dropped = self.cache.invalidate_prefix(&prefix);
            debug!(prefix = %prefix, dropped, "invalidated cached queries after write");
        }
    }
}

#[async_trait]
impl PluginAdapter for CachedStore {
    fn name(&self) -> &str {
        "cached-store"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Store
    }

    async fn health_check(&self) -> Result<HealthStatus, CourierError> {
        self.inner.health_check().await
    }

    async fn shutdown(&self) -> Result<(), CourierError> {
        self.cache.clear();
        self.inner.shutdown().await
    }
}

#[async_trait]
impl MessageStore for CachedStore {
    async fn insert_messages(
        &self,
        rows: Vec<MessageRecord>,
    ) -> Result<Vec<MessageRecord>, CourierError> {
        // Taken from the written rows: stores may echo back fewer.
        let touched: BTreeSet<String> = rows
            .iter()
            .map(|r| MessageQuery::conversation_prefix(&r.organization_id, &r.conversation_id))
            .collect();
        let persisted = self.inner.insert_messages(rows).await?;
        self.invalidate_prefixes(touched);
        Ok(persisted)
    }

    async fn select_messages(
        &self,
        query: &MessageQuery,
    ) -> Result<Vec<MessageRecord>, CourierError> {
        self.cache
            .read(&query.signature(), query.query_type(), None, || {
                self.inner.select_messages(query)
            })
            .await
    }
}
