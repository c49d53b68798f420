// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Optimistic updates for the Courier sync engine.
//!
//! An [`Operation`] is applied to the client-visible [`InboxState`] at once,
//! then confirmed with the server's entity or rolled back to the exact
//! snapshot taken when it was applied. Failed operations retry with capped
//! exponential backoff and end in a visible `error` state rather than
//! disappearing.

pub mod coordinator;
pub mod operation;
pub mod reducer;
pub mod retry;
pub mod state;

pub use coordinator::{OperationStatus, OptimisticCoordinator, PendingOperation};
pub use operation::{
    Operation, OperationAction, OperationKind, OperationType, OptimisticEntity, RollbackData,
    ServerEntity,
};
pub use retry::{RetryDecision, RetryPolicy, RetryScheduler};
pub use state::{InboxState, OptimisticMeta, Staged};
