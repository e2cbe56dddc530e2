//! Stable event identifiers for structured store logs.

/// Machine-readable event names attached to every store log line as
/// `event = StoreEvent::...`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    /// A Valkey connection was (re)opened.
    StoreConnected,
    /// A command succeeded after the reconnect retry.
    StoreCommandRetrySucceeded,
    /// A command attempt failed and the connection was dropped.
    StoreCommandRetryFailed,
    /// A named script was loaded on a node.
    ScriptPreloaded,
    /// EVALSHA hit NOSCRIPT and recovered via EVAL on source.
    ScriptNoscriptRecovered,
    /// A chat lock was acquired at the store.
    LockAcquired,
    /// A lock acquire exhausted its retry budget.
    LockAcquireExhausted,
    /// A nested acquire re-entered a lock held in the current scope.
    LockReentered,
    /// The watchdog renewed a lock TTL.
    LockRenewed,
    /// The watchdog failed to renew and stopped.
    LockRenewalFailed,
    /// A lock was released at the store.
    LockReleased,
    /// A pending message was enqueued.
    QueueEnqueued,
    /// A pending message replaced an earlier entry from the same user.
    QueueReplacedDuplicate,
    /// Enqueue was rejected because the user already has an entry.
    QueueDuplicateRejected,
    /// Enqueue was rejected because the queue is full.
    QueueFullRejected,
    /// A pending message was dequeued.
    QueueDequeued,
    /// Dequeue gave up after the stale-eviction iteration cap.
    QueueDequeueExhausted,
    /// A guess attempt passed the cooldown gate.
    RateLimitAllowed,
    /// A guess attempt was rejected by the cooldown gate.
    RateLimitHit,
    /// The processing token for a chat was taken.
    ProcessingAcquired,
    /// The processing token for a chat was released.
    ProcessingReleased,
    /// A typed session value was saved.
    SessionSaved,
    /// A typed session value was loaded.
    SessionLoaded,
    /// Session keys were deleted.
    SessionDeleted,
    /// Session TTLs were refreshed.
    SessionTtlRefreshed,
    /// A topic was appended to the bounded topic history.
    TopicAppended,
    /// A puzzle signature was marked as used.
    SignatureMarked,
}

impl StoreEvent {
    /// Stable dotted identifier for log filtering.
    pub const fn as_str(self) -> &'static str {
        match self {
            StoreEvent::StoreConnected => "store.connected",
            StoreEvent::StoreCommandRetrySucceeded => "store.command.retry_succeeded",
            StoreEvent::StoreCommandRetryFailed => "store.command.retry_failed",
            StoreEvent::ScriptPreloaded => "store.script.preloaded",
            StoreEvent::ScriptNoscriptRecovered => "store.script.noscript_recovered",
            StoreEvent::LockAcquired => "store.lock.acquired",
            StoreEvent::LockAcquireExhausted => "store.lock.acquire_exhausted",
            StoreEvent::LockReentered => "store.lock.reentered",
            StoreEvent::LockRenewed => "store.lock.renewed",
            StoreEvent::LockRenewalFailed => "store.lock.renewal_failed",
            StoreEvent::LockReleased => "store.lock.released",
            StoreEvent::QueueEnqueued => "store.queue.enqueued",
            StoreEvent::QueueReplacedDuplicate => "store.queue.replaced_duplicate",
            StoreEvent::QueueDuplicateRejected => "store.queue.duplicate_rejected",
            StoreEvent::QueueFullRejected => "store.queue.full_rejected",
            StoreEvent::QueueDequeued => "store.queue.dequeued",
            StoreEvent::QueueDequeueExhausted => "store.queue.dequeue_exhausted",
            StoreEvent::RateLimitAllowed => "store.ratelimit.allowed",
            StoreEvent::RateLimitHit => "store.ratelimit.hit",
            StoreEvent::ProcessingAcquired => "store.processing.acquired",
            StoreEvent::ProcessingReleased => "store.processing.released",
            StoreEvent::SessionSaved => "store.session.saved",
            StoreEvent::SessionLoaded => "store.session.loaded",
            StoreEvent::SessionDeleted => "store.session.deleted",
            StoreEvent::SessionTtlRefreshed => "store.session.ttl_refreshed",
            StoreEvent::TopicAppended => "store.topic.appended",
            StoreEvent::SignatureMarked => "store.signature.marked",
        }
    }
}
