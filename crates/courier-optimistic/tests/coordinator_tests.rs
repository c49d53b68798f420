// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Staging, confirmation, rollback and retry through the coordinator.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use courier_config::OptimisticConfig;
use courier_core::{ConversationStatus, CourierError, MessageId, MessageRecord};
use courier_optimistic::{
    Operation, OperationKind, OperationStatus, OptimisticCoordinator, OptimisticEntity,
    RetryDecision, ServerEntity,
};
use courier_test_utils::{draft, record};
use tokio::time::Instant;

fn coordinator() -> OptimisticCoordinator {
    OptimisticCoordinator::new(&OptimisticConfig::default())
}

fn seeded() -> (OptimisticCoordinator, MessageId) {
    let coordinator = coordinator();
    let row = record("conv-1", "seed");
    let id = row.id.clone();
    coordinator.apply_remote(row);
    (coordinator, id)
}

#[test]
fn staged_message_is_visible_until_confirmed() {
    let coordinator = coordinator();
    let op = Operation::create_message(draft("conv-1", "hello"));
    let op_id = op.id.clone();

    let OptimisticEntity::Message(staged) = coordinator.stage(op).unwrap() else {
        panic!("expected a message");
    };
    assert!(staged.entity.id.is_temporary());
    assert!(staged.is_pending());
    assert_eq!(coordinator.snapshot().messages(&"conv-1".into()).len(), 1);

    let mut server = staged.entity.clone();
    server.id = "msg-42".into();
    coordinator
        .confirm(&op_id, Some(ServerEntity::Message(server)))
        .unwrap();

    let snapshot = coordinator.snapshot();
    let messages = snapshot.messages(&"conv-1".into());
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].entity.id.as_str(), "msg-42");
    assert!(!messages[0].is_optimistic());
    assert_eq!(coordinator.pending_count(), 0);
}

#[test]
fn rollback_restores_the_exact_prior_state() {
    let (coordinator, seed) = seeded();
    let conversation = Operation::create_conversation("org-1", "Billing");
    let conv_op = conversation.id.clone();
    coordinator.stage(conversation).unwrap();
    coordinator.confirm(&conv_op, None).unwrap();
    let before = coordinator.snapshot();

    let conv_id = before.conversations[0].entity.id.clone();
    let ops = vec![
        Operation::update_message("conv-1", seed.clone(), "edited"),
        Operation::delete_message("conv-1", seed.clone()),
        Operation::change_status(conv_id.clone(), ConversationStatus::Closed),
        Operation::assign(conv_id.clone(), Some("agent-1".into())),
        Operation::update_conversation(conv_id.clone(), "Refunds"),
        Operation::delete_conversation(conv_id.clone()),
        Operation::create_message(draft("conv-1", "new")),
    ];

    for op in ops {
        let id = op.id.clone();
        coordinator.stage(op).unwrap();
        assert_ne!(*coordinator.snapshot(), *before);
        coordinator.rollback(&id).unwrap();
        assert_eq!(*coordinator.snapshot(), *before);
    }
    assert_eq!(coordinator.pending_count(), 0);
}

#[test]
fn retries_count_up_then_leave_a_visible_error() {
    let coordinator = OptimisticCoordinator::new(&OptimisticConfig {
        max_retries: 2,
        ..OptimisticConfig::default()
    });
    let op = Operation::create_message(draft("conv-1", "hello"));
    let id = op.id.clone();
    coordinator.stage(op).unwrap();
    let err = CourierError::store("connection reset");

    assert_eq!(
        coordinator.record_failure(&id, &err).unwrap(),
        RetryDecision::Retry {
            delay: Duration::from_secs(1),
            attempt: 1
        }
    );
    assert_eq!(
        coordinator.record_failure(&id, &err).unwrap(),
        RetryDecision::Retry {
            delay: Duration::from_secs(2),
            attempt: 2
        }
    );
    assert_eq!(
        coordinator.record_failure(&id, &err).unwrap(),
        RetryDecision::Terminal
    );

    let snapshot = coordinator.snapshot();
    let staged = &snapshot.messages(&"conv-1".into())[0];
    assert!(!staged.is_pending());
    assert_eq!(staged.error(), Some("store error: connection reset"));
    assert_eq!(staged.optimistic.as_ref().unwrap().retry_count, 2);
    assert_eq!(coordinator.status(&id), Some(OperationStatus::Failed));
    assert_eq!(coordinator.failed_operations(), vec![id]);
}

#[test]
fn non_transient_errors_fail_immediately() {
    let coordinator = coordinator();
    let op = Operation::create_message(draft("conv-1", "hello"));
    let id = op.id.clone();
    coordinator.stage(op).unwrap();

    let decision = coordinator
        .record_failure(&id, &CourierError::InvalidOperation("rejected".into()))
        .unwrap();
    assert_eq!(decision, RetryDecision::Terminal);
    assert_eq!(coordinator.status(&id), Some(OperationStatus::Failed));
}

#[test]
fn failed_operations_can_be_retried_or_dismissed() {
    let coordinator = coordinator();
    let op = Operation::create_message(draft("conv-1", "hello"));
    let id = op.id.clone();
    coordinator.stage(op).unwrap();

    assert!(matches!(
        coordinator.retry_operation(&id),
        Err(CourierError::InvalidOperation(_))
    ));

    coordinator.mark_failed(&id, "offline").unwrap();
    let rearmed = coordinator.retry_operation(&id).unwrap();
    assert_eq!(rearmed.retry_count, 0);
    let snapshot = coordinator.snapshot();
    let staged = &snapshot.messages(&"conv-1".into())[0];
    assert!(staged.is_pending());
    assert_eq!(staged.error(), None);

    coordinator.mark_failed(&id, "offline").unwrap();
    coordinator.dismiss_operation(&id).unwrap();
    assert!(coordinator.snapshot().messages(&"conv-1".into()).is_empty());
    assert_eq!(coordinator.status(&id), None);
}

#[test]
fn unknown_and_duplicate_operations_are_rejected() {
    let coordinator = coordinator();
    let op = Operation::create_message(draft("conv-1", "hello"));
    coordinator.stage(op.clone()).unwrap();

    assert!(matches!(
        coordinator.stage(op),
        Err(CourierError::InvalidOperation(_))
    ));
    assert!(matches!(
        coordinator.confirm(&"op-missing".into(), None),
        Err(CourierError::OperationNotFound { .. })
    ));
    assert!(matches!(
        coordinator.rollback(&"op-missing".into()),
        Err(CourierError::OperationNotFound { .. })
    ));
    assert_eq!(coordinator.pending_count(), 1);
}

#[test]
fn failed_stage_leaves_state_untouched() {
    let coordinator = coordinator();
    let before = coordinator.snapshot();

    let result = coordinator.stage(Operation::update_message("conv-1", "msg-404", "x"));
    assert!(matches!(result, Err(CourierError::EntityNotFound { .. })));
    assert_eq!(*coordinator.snapshot(), *before);
    assert_eq!(coordinator.pending_count(), 0);
}

#[test]
fn remote_messages_merge_around_pending_ones() {
    let coordinator = coordinator();
    let op = Operation::create_message(draft("conv-1", "mine"));
    coordinator.stage(op).unwrap();

    let theirs = record("conv-1", "theirs");
    coordinator.apply_remote(theirs.clone());
    coordinator.apply_remote(theirs);

    let snapshot = coordinator.snapshot();
    let messages = snapshot.messages(&"conv-1".into());
    assert_eq!(messages.len(), 2);
    assert_eq!(snapshot.optimistic_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn execute_backs_off_between_attempts() {
    let coordinator = coordinator();
    let start = Instant::now();
    let attempts = Arc::new(Mutex::new(Vec::new()));

    let op = Operation::create_message(draft("conv-1", "hello"));
    let result = coordinator
        .execute(op, |op| {
            let attempts = Arc::clone(&attempts);
            async move {
                let mut seen = attempts.lock().unwrap();
                seen.push(start.elapsed());
                if seen.len() < 3 {
                    return Err(CourierError::store("unavailable"));
                }
                let mut row = staged_row(&op);
                row.id = "msg-7".into();
                Ok(Some(ServerEntity::Message(row)))
            }
        })
        .await
        .unwrap();

    assert!(matches!(result, Some(ServerEntity::Message(ref row)) if row.id.as_str() == "msg-7"));
    assert_eq!(
        *attempts.lock().unwrap(),
        [Duration::ZERO, Duration::from_secs(1), Duration::from_secs(3)]
    );
    assert_eq!(coordinator.pending_count(), 0);
    let snapshot = coordinator.snapshot();
    assert_eq!(snapshot.messages(&"conv-1".into())[0].entity.id.as_str(), "msg-7");
}

#[tokio::test(start_paused = true)]
async fn execute_reports_exhaustion_and_keeps_the_entity() {
    let coordinator = coordinator();
    let calls = AtomicU32::new(0);
    let op = Operation::create_message(draft("conv-1", "hello")).with_max_retries(2);
    let id = op.id.clone();

    let result = coordinator
        .execute(op, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CourierError::store("down")) }
        })
        .await;

    match result {
        Err(CourierError::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 3),
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(coordinator.status(&id), Some(OperationStatus::Failed));
    assert!(
        coordinator.snapshot().messages(&"conv-1".into())[0]
            .error()
            .is_some()
    );
}

#[tokio::test(start_paused = true)]
async fn cancelled_retries_end_in_error_state() {
    let coordinator = Arc::new(coordinator());
    let op = Operation::create_message(draft("conv-1", "hello"));
    let id = op.id.clone();

    let task = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move {
            coordinator
                .execute(op, |_| async { Err(CourierError::store("down")) })
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(coordinator.cancel_retries(), 1);
    assert!(matches!(task.await.unwrap(), Err(CourierError::Shutdown)));
    assert_eq!(coordinator.status(&id), Some(OperationStatus::Failed));
    let snapshot = coordinator.snapshot();
    assert_eq!(
        snapshot.messages(&"conv-1".into())[0].error(),
        Some("retry cancelled")
    );
}

#[tokio::test(start_paused = true)]
async fn resume_runs_a_failed_operation_again() {
    let coordinator = coordinator();
    let op = Operation::create_message(draft("conv-1", "hello")).with_max_retries(0);
    let id = op.id.clone();

    let first = coordinator
        .execute(op, |_| async { Err(CourierError::store("down")) })
        .await;
    assert!(first.is_err());

    coordinator
        .resume(&id, |_| async { Ok(None) })
        .await
        .unwrap();
    assert_eq!(coordinator.pending_count(), 0);
    assert_eq!(coordinator.snapshot().optimistic_count(), 0);
}

/// The row staged by a create-message operation.
fn staged_row(op: &Operation) -> MessageRecord {
    match &op.kind {
        OperationKind::CreateMessage { message } => message.clone(),
        other => panic!("not a message create: {other:?}"),
    }
}
