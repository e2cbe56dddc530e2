//! Consensus surrender voting.
//!
//! Quorum scales with the table: one player decides alone, two must agree,
//! three approvals settle anything larger.

use parlor_store::{JsonSessionStore, KeySpace, VOTE_TTL_SECS, now_unix_ms};
use serde::{Deserialize, Serialize};

use crate::error::GameResult;
use crate::observability::GameEvent;

/// A surrender vote in progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurrenderVote {
    /// Who started the vote.
    pub initiator: String,
    /// Players eligible to approve, fixed at creation.
    pub eligible_players: Vec<String>,
    /// Approvals so far; the initiator is auto-included.
    pub approvals: Vec<String>,
    /// Creation time in unix milliseconds.
    pub created_at_unix_ms: u64,
}

impl SurrenderVote {
    /// Vote initiated by `initiator` among `players`.
    pub fn new(initiator: impl Into<String>, players: Vec<String>) -> Self {
        let initiator = initiator.into();
        Self {
            approvals: vec![initiator.clone()],
            initiator,
            eligible_players: players,
            created_at_unix_ms: now_unix_ms(),
        }
    }

    /// Approvals required for a table of `player_count`.
    pub fn required_approvals(player_count: usize) -> usize {
        match player_count {
            0 | 1 => 1,
            2 => 2,
            _ => 3,
        }
    }

    /// Approvals required for this vote.
    pub fn required(&self) -> usize {
        Self::required_approvals(self.eligible_players.len())
    }

    /// Whether quorum is met.
    pub fn is_approved(&self) -> bool {
        self.approvals.len() >= self.required()
    }

    /// Whether `user` may approve.
    pub fn is_eligible(&self, user: &str) -> bool {
        self.eligible_players.iter().any(|p| p == user)
    }

    /// Whether `user` already approved.
    pub fn has_approved(&self, user: &str) -> bool {
        self.approvals.iter().any(|p| p == user)
    }
}

/// Outcome of starting a vote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartVoteOutcome {
    /// Quorum was met at creation (for example a single player).
    Immediate(SurrenderVote),
    /// The vote is stored and waiting for approvals.
    Started(SurrenderVote),
}

/// Outcome of one approval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApproveOutcome {
    /// No vote is in progress.
    NotFound,
    /// The user is not an eligible player.
    NotEligible,
    /// The user already approved; approvals are idempotent.
    AlreadyVoted,
    /// Approval recorded; quorum not yet met.
    Progress(SurrenderVote),
    /// Quorum met; the stored vote is cleared.
    Completed(SurrenderVote),
    /// The approval could not be persisted.
    PersistenceFailure,
}

/// Vote storage and state machine for one game family.
pub struct SurrenderVoteService {
    store: JsonSessionStore,
    keys: KeySpace,
    ttl_secs: u64,
}

impl SurrenderVoteService {
    /// Service with the default vote TTL.
    pub fn new(store: JsonSessionStore, keys: KeySpace) -> Self {
        Self {
            store,
            keys,
            ttl_secs: VOTE_TTL_SECS,
        }
    }

    /// The vote currently stored for `chat`, if any.
    pub async fn current(&self, chat: &str) -> GameResult<Option<SurrenderVote>> {
        Ok(self.store.load(&self.keys.surrender_vote(chat)).await?)
    }

    /// Start a vote; an already-satisfied quorum completes immediately.
    pub async fn start_vote(
        &self,
        chat: &str,
        initiator: &str,
        players: Vec<String>,
    ) -> GameResult<StartVoteOutcome> {
        let vote = SurrenderVote::new(initiator, players);
        if vote.is_approved() {
            tracing::debug!(
                event = GameEvent::VoteCompleted.as_str(),
                chat = %chat,
                initiator = %initiator,
                players = vote.eligible_players.len(),
                "surrender vote approved immediately"
            );
            return Ok(StartVoteOutcome::Immediate(vote));
        }
        self.store
            .save(&self.keys.surrender_vote(chat), &vote, self.ttl_secs)
            .await?;
        tracing::debug!(
            event = GameEvent::VoteStarted.as_str(),
            chat = %chat,
            initiator = %initiator,
            players = vote.eligible_players.len(),
            required = vote.required(),
            "surrender vote started"
        );
        Ok(StartVoteOutcome::Started(vote))
    }

    /// Record one approval.
    pub async fn approve(&self, chat: &str, user: &str) -> GameResult<ApproveOutcome> {
        let key = self.keys.surrender_vote(chat);
        let Some(mut vote) = self.store.load::<SurrenderVote>(&key).await? else {
            return Ok(ApproveOutcome::NotFound);
        };
        if !vote.is_eligible(user) {
            return Ok(ApproveOutcome::NotEligible);
        }
        if vote.has_approved(user) {
            return Ok(ApproveOutcome::AlreadyVoted);
        }
        vote.approvals.push(user.to_string());
        if vote.is_approved() {
            self.store.delete(&[key]).await?;
            tracing::info!(
                event = GameEvent::VoteCompleted.as_str(),
                chat = %chat,
                approvals = vote.approvals.len(),
                "surrender vote reached quorum"
            );
            return Ok(ApproveOutcome::Completed(vote));
        }
        match self.store.save(&key, &vote, self.ttl_secs).await {
            Ok(()) => {
                tracing::debug!(
                    event = GameEvent::VoteApproved.as_str(),
                    chat = %chat,
                    user = %user,
                    approvals = vote.approvals.len(),
                    required = vote.required(),
                    "surrender vote approval recorded"
                );
                Ok(ApproveOutcome::Progress(vote))
            }
            Err(error) => {
                tracing::warn!(
                    chat = %chat,
                    user = %user,
                    error = %error,
                    "surrender vote approval could not be persisted"
                );
                Ok(ApproveOutcome::PersistenceFailure)
            }
        }
    }

    /// Drop any stored vote.
    pub async fn clear(&self, chat: &str) -> GameResult<()> {
        Ok(self
            .store
            .delete(&[self.keys.surrender_vote(chat)])
            .await?)
    }
}
