#![allow(missing_docs)]

use std::sync::Arc;

use anyhow::Result;
use parlor_store::{
    DequeueOutcome, EnqueueOutcome, MemoryQueueBackend, PendingQueue, QueueConfig,
};

fn payload(user: &str, content: &str, timestamp_ms: u64) -> String {
    format!(r#"{{"user_id":"{user}","content":"{content}","timestamp_ms":{timestamp_ms}}}"#)
}

fn queue_with_max(max_size: usize) -> PendingQueue {
    PendingQueue::with_config(
        Arc::new(MemoryQueueBackend::new()),
        QueueConfig {
            max_size,
            ..QueueConfig::default()
        },
    )
}

#[tokio::test]
async fn dedup_replace_moves_entry_to_tail() -> Result<()> {
    let queue = queue_with_max(10);

    assert_eq!(
        queue.enqueue("c1", "u1", 1000, &payload("u1", "A", 1000)).await?,
        EnqueueOutcome::Success
    );
    assert_eq!(
        queue.enqueue("c1", "u2", 1010, &payload("u2", "B", 1010)).await?,
        EnqueueOutcome::Success
    );
    assert_eq!(
        queue
            .enqueue_replacing("c1", "u1", 2000, &payload("u1", "A2", 2000))
            .await?,
        EnqueueOutcome::ReplacedDuplicate
    );
    assert_eq!(queue.len("c1").await?, 2);

    // Order is now [u2, u1] and u1 carries the replacement payload.
    let now = 1_000_000;
    match queue.dequeue_at("c1", now).await? {
        DequeueOutcome::Success {
            user_id,
            timestamp_ms,
            payload,
        } => {
            assert_eq!(user_id, "u2");
            assert_eq!(timestamp_ms, 1010);
            assert!(payload.contains(r#""content":"B""#));
        }
        other => anyhow::bail!("expected u2 first, got {other:?}"),
    }
    match queue.dequeue_at("c1", now).await? {
        DequeueOutcome::Success {
            user_id,
            timestamp_ms,
            payload,
        } => {
            assert_eq!(user_id, "u1");
            assert_eq!(timestamp_ms, 2000);
            assert!(payload.contains(r#""content":"A2""#));
        }
        other => anyhow::bail!("expected replaced u1, got {other:?}"),
    }
    assert_eq!(queue.dequeue_at("c1", now).await?, DequeueOutcome::Empty);
    Ok(())
}

#[tokio::test]
async fn plain_enqueue_rejects_duplicate_user() -> Result<()> {
    let queue = queue_with_max(10);

    queue.enqueue("c1", "u1", 1000, &payload("u1", "A", 1000)).await?;
    assert_eq!(
        queue.enqueue("c1", "u1", 1100, &payload("u1", "B", 1100)).await?,
        EnqueueOutcome::Duplicate
    );
    assert_eq!(queue.len("c1").await?, 1);
    Ok(())
}

#[tokio::test]
async fn enqueue_rejects_when_full() -> Result<()> {
    let queue = queue_with_max(2);

    queue.enqueue("c1", "u1", 1, &payload("u1", "A", 1)).await?;
    queue.enqueue("c1", "u2", 2, &payload("u2", "B", 2)).await?;
    assert_eq!(
        queue.enqueue("c1", "u3", 3, &payload("u3", "C", 3)).await?,
        EnqueueOutcome::QueueFull
    );
    assert_eq!(queue.len("c1").await?, 2);
    Ok(())
}

#[tokio::test]
async fn stale_entries_are_discarded_at_dequeue() -> Result<()> {
    let queue = PendingQueue::with_config(
        Arc::new(MemoryQueueBackend::new()),
        QueueConfig {
            stale_threshold_ms: 1000,
            ..QueueConfig::default()
        },
    );

    queue.enqueue("c1", "u1", 100, &payload("u1", "old", 100)).await?;
    queue.enqueue("c1", "u2", 9_500, &payload("u2", "fresh", 9_500)).await?;

    // u1 is far past the threshold at now=10_000 and is silently dropped.
    match queue.dequeue_at("c1", 10_000).await? {
        DequeueOutcome::Success { user_id, .. } => assert_eq!(user_id, "u2"),
        other => anyhow::bail!("expected fresh entry, got {other:?}"),
    }
    assert_eq!(queue.dequeue_at("c1", 10_000).await?, DequeueOutcome::Empty);
    Ok(())
}

#[tokio::test]
async fn dequeue_reports_exhaustion_at_iteration_cap() -> Result<()> {
    let queue = PendingQueue::with_config(
        Arc::new(MemoryQueueBackend::new()),
        QueueConfig {
            max_size: 16,
            stale_threshold_ms: 10,
            max_dequeue_iterations: 3,
            ..QueueConfig::default()
        },
    );

    for i in 0..5u64 {
        let user = format!("u{i}");
        queue.enqueue("c1", &user, i, &payload(&user, "x", i)).await?;
    }
    assert_eq!(
        queue.dequeue_at("c1", 1_000_000).await?,
        DequeueOutcome::Exhausted
    );
    // Two survivors remain for the next pass.
    assert_eq!(queue.len("c1").await?, 2);
    Ok(())
}

#[tokio::test]
async fn chain_skip_flag_clears_on_read() -> Result<()> {
    let queue = queue_with_max(4);

    assert!(!queue.check_and_clear_chain_skip_flag("c1").await?);
    queue.set_chain_skip_flag("c1").await?;
    assert!(queue.check_and_clear_chain_skip_flag("c1").await?);
    assert!(!queue.check_and_clear_chain_skip_flag("c1").await?);
    Ok(())
}
