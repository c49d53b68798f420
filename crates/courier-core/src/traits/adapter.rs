// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identity and lifecycle shared by the message store and the transport.

use async_trait::async_trait;

use crate::error::CourierError;
use crate::types::{AdapterType, HealthStatus};

/// Common surface of the engine's external collaborators.
///
/// `SyncEngine` folds every adapter's `health_check` into one status and
/// calls `shutdown` on each after its channels and batch queue are drained.
#[async_trait]
pub trait PluginAdapter: Send + Sync + 'static {
    /// Short name used in logs and health reasons, e.g. `postgres-store`.
    fn name(&self) -> &str;

    fn version(&self) -> semver::Version;

    /// Whether this is a store or a transport.
    fn adapter_type(&self) -> AdapterType;

    /// `name@version (type)`, as written into health reasons.
    fn label(&self) -> String {
        format!("{}@{} ({})", self.name(), self.version(), self.adapter_type())
    }

    /// Current reachability. Degraded and unhealthy adapters degrade the engine.
    async fn health_check(&self) -> Result<HealthStatus, CourierError>;

    /// Releases connections. Called once, after in-flight writes settle.
    async fn shutdown(&self) -> Result<(), CourierError>;
}
