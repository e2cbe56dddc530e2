//! Per-chat turn worker: pending queue in, game operations out.
//!
//! One drain task per chat at most, enforced by the processing token;
//! total drain concurrency is bounded by a semaphore. The worker never
//! fails a chat on a bad turn, it logs and moves on.

use std::sync::Arc;

use async_trait::async_trait;
use parlor_store::{DequeueOutcome, EnqueueOutcome, PendingQueue, ProcessingLock, StoreError};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::error::GameResult;
use crate::observability::GameEvent;

/// One inbound user turn, as enqueued.
///
/// `timestamp_ms` is the staleness anchor the queue inspects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMessage {
    /// Sender.
    pub user_id: String,
    /// Message text.
    pub content: String,
    /// Thread the message arrived in, when threaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    /// Display name of the sender.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    /// Arrival time in unix milliseconds.
    pub timestamp_ms: u64,
    /// Whether this entry stands for a batch of chained questions.
    #[serde(default)]
    pub is_chain_batch: bool,
    /// The chained questions when `is_chain_batch` is set.
    #[serde(default)]
    pub batch_questions: Vec<String>,
}

impl PendingMessage {
    /// Plain single-question message.
    pub fn new(user_id: impl Into<String>, content: impl Into<String>, timestamp_ms: u64) -> Self {
        Self {
            user_id: user_id.into(),
            content: content.into(),
            thread_id: None,
            sender: None,
            timestamp_ms,
            is_chain_batch: false,
            batch_questions: Vec::new(),
        }
    }
}

/// What the worker calls for each dequeued turn.
#[async_trait]
pub trait TurnHandler: Send + Sync {
    /// Process one turn; the optional string is the outbound reply.
    async fn handle_turn(&self, chat: &str, message: PendingMessage)
    -> GameResult<Option<String>>;
}

/// Worker limits.
#[derive(Debug, Clone)]
pub struct TurnWorkerConfig {
    /// Chats drained concurrently across the process.
    pub max_concurrent_chats: usize,
}

impl Default for TurnWorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_chats: 8,
        }
    }
}

/// Queue consumer for one game family.
pub struct TurnWorker {
    queue: Arc<PendingQueue>,
    processing: Arc<ProcessingLock>,
    handler: Arc<dyn TurnHandler>,
    permits: Arc<Semaphore>,
}

impl TurnWorker {
    /// Worker with default limits.
    pub fn new(
        queue: Arc<PendingQueue>,
        processing: Arc<ProcessingLock>,
        handler: Arc<dyn TurnHandler>,
    ) -> Self {
        Self::with_config(queue, processing, handler, TurnWorkerConfig::default())
    }

    /// Worker with explicit limits.
    pub fn with_config(
        queue: Arc<PendingQueue>,
        processing: Arc<ProcessingLock>,
        handler: Arc<dyn TurnHandler>,
        config: TurnWorkerConfig,
    ) -> Self {
        Self {
            queue,
            processing,
            handler,
            permits: Arc::new(Semaphore::new(config.max_concurrent_chats.max(1))),
        }
    }

    /// Enqueue one turn and schedule a drain of the chat.
    pub async fn submit(
        self: &Arc<Self>,
        chat: &str,
        message: &PendingMessage,
        replace_duplicate: bool,
    ) -> GameResult<EnqueueOutcome> {
        let payload =
            serde_json::to_string(message).map_err(|source| StoreError::Payload {
                operation: "worker_submit",
                source,
            })?;
        let outcome = if replace_duplicate {
            self.queue
                .enqueue_replacing(chat, &message.user_id, message.timestamp_ms, &payload)
                .await?
        } else {
            self.queue
                .enqueue(chat, &message.user_id, message.timestamp_ms, &payload)
                .await?
        };
        if matches!(
            outcome,
            EnqueueOutcome::Success | EnqueueOutcome::ReplacedDuplicate
        ) {
            self.spawn_drain(chat);
        }
        Ok(outcome)
    }

    /// Schedule a drain of the chat's queue.
    pub fn spawn_drain(self: &Arc<Self>, chat: &str) {
        let worker = Arc::clone(self);
        let chat = chat.to_string();
        tokio::spawn(async move {
            worker.drain(chat).await;
        });
    }

    async fn drain(self: Arc<Self>, chat: String) {
        let Ok(_permit) = Arc::clone(&self.permits).acquire_owned().await else {
            return;
        };
        let guard = match self.processing.try_acquire(&chat).await {
            Ok(Some(guard)) => guard,
            // Another worker is already on this chat.
            Ok(None) => return,
            Err(error) => {
                tracing::warn!(
                    chat = %chat,
                    error = %error,
                    "processing token acquire failed; drain skipped"
                );
                return;
            }
        };

        loop {
            match self.queue.dequeue(&chat).await {
                Ok(DequeueOutcome::Success {
                    user_id, payload, ..
                }) => match serde_json::from_str::<PendingMessage>(&payload) {
                    Ok(message) => match self.handler.handle_turn(&chat, message).await {
                        Ok(reply) => {
                            tracing::debug!(
                                event = GameEvent::TurnProcessed.as_str(),
                                chat = %chat,
                                user_id = %user_id,
                                replied = reply.is_some(),
                                "turn processed"
                            );
                        }
                        Err(error) => {
                            tracing::warn!(
                                event = GameEvent::TurnFailed.as_str(),
                                chat = %chat,
                                user_id = %user_id,
                                error = %error,
                                "turn failed; continuing with the queue"
                            );
                        }
                    },
                    Err(error) => {
                        tracing::warn!(
                            chat = %chat,
                            user_id = %user_id,
                            error = %error,
                            "undecodable pending message dropped"
                        );
                    }
                },
                Ok(DequeueOutcome::Empty) => break,
                // Stale sweep hit its cap; keep draining.
                Ok(DequeueOutcome::Exhausted) => continue,
                Err(error) => {
                    tracing::warn!(
                        chat = %chat,
                        error = %error,
                        "dequeue failed; drain aborted"
                    );
                    break;
                }
            }
        }

        if let Err(error) = guard.release().await {
            tracing::warn!(
                chat = %chat,
                error = %error,
                "processing token release failed"
            );
        }
    }
}
