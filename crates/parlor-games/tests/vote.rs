#![allow(missing_docs)]

mod common;

use anyhow::Result;
use common::{players, vote_service};
use parlor_games::{ApproveOutcome, StartVoteOutcome, SurrenderVote};

#[test]
fn quorum_table_matches_player_count() {
    assert_eq!(SurrenderVote::required_approvals(0), 1);
    assert_eq!(SurrenderVote::required_approvals(1), 1);
    assert_eq!(SurrenderVote::required_approvals(2), 2);
    assert_eq!(SurrenderVote::required_approvals(3), 3);
    assert_eq!(SurrenderVote::required_approvals(7), 3);
}

#[tokio::test]
async fn single_player_vote_completes_immediately() -> Result<()> {
    let service = vote_service();
    match service.start_vote("c1", "u1", players(&["u1"])).await? {
        StartVoteOutcome::Immediate(vote) => {
            assert_eq!(vote.approvals, vec!["u1".to_string()]);
        }
        StartVoteOutcome::Started(_) => anyhow::bail!("single player must complete immediately"),
    }
    // Nothing was stored.
    assert!(service.current("c1").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn three_player_vote_runs_to_quorum() -> Result<()> {
    let service = vote_service();

    match service
        .start_vote("c1", "u1", players(&["u1", "u2", "u3"]))
        .await?
    {
        StartVoteOutcome::Started(vote) => {
            assert_eq!(vote.approvals, vec!["u1".to_string()]);
            assert_eq!(vote.required(), 3);
        }
        StartVoteOutcome::Immediate(_) => anyhow::bail!("three players must not be immediate"),
    }

    // The initiator's second approval is idempotent.
    assert!(matches!(
        service.approve("c1", "u1").await?,
        ApproveOutcome::AlreadyVoted
    ));
    // Outsiders cannot vote.
    assert!(matches!(
        service.approve("c1", "u4").await?,
        ApproveOutcome::NotEligible
    ));

    match service.approve("c1", "u2").await? {
        ApproveOutcome::Progress(vote) => assert_eq!(vote.approvals.len(), 2),
        other => anyhow::bail!("expected Progress, got {other:?}"),
    }
    match service.approve("c1", "u3").await? {
        ApproveOutcome::Completed(vote) => {
            assert_eq!(vote.approvals.len(), 3);
            assert!(vote.is_approved());
        }
        other => anyhow::bail!("expected Completed, got {other:?}"),
    }

    // The store entry is cleared on completion.
    assert!(service.current("c1").await?.is_none());
    assert!(matches!(
        service.approve("c1", "u2").await?,
        ApproveOutcome::NotFound
    ));
    Ok(())
}

#[tokio::test]
async fn two_player_vote_needs_both() -> Result<()> {
    let service = vote_service();
    match service.start_vote("c1", "u1", players(&["u1", "u2"])).await? {
        StartVoteOutcome::Started(vote) => assert_eq!(vote.required(), 2),
        StartVoteOutcome::Immediate(_) => anyhow::bail!("two players must not be immediate"),
    }
    assert!(matches!(
        service.approve("c1", "u2").await?,
        ApproveOutcome::Completed(_)
    ));
    Ok(())
}

#[tokio::test]
async fn approvals_stay_a_subset_of_eligible_players() -> Result<()> {
    let service = vote_service();
    service
        .start_vote("c1", "u1", players(&["u1", "u2", "u3", "u4"]))
        .await?;
    service.approve("c1", "u2").await?;
    let vote = service
        .current("c1")
        .await?
        .ok_or_else(|| anyhow::anyhow!("vote must still be stored"))?;
    for approval in &vote.approvals {
        assert!(vote.is_eligible(approval));
    }
    Ok(())
}

#[tokio::test]
async fn clear_discards_a_pending_vote() -> Result<()> {
    let service = vote_service();
    service
        .start_vote("c1", "u1", players(&["u1", "u2", "u3"]))
        .await?;
    service.clear("c1").await?;
    assert!(matches!(
        service.approve("c1", "u2").await?,
        ApproveOutcome::NotFound
    ));
    Ok(())
}
