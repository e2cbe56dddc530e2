#![allow(missing_docs)]

mod common;

use std::time::Duration;

use anyhow::Result;
use common::{riddle_service, riddle_service_with_cooldown};
use parlor_games::{GameError, GuessOutcome};
use parlor_llm::{CallContext, TopicSelection};
use parlor_store::LockScope;

fn otter_topic() -> TopicSelection {
    TopicSelection {
        name: "otter".to_string(),
        category: "animals".to_string(),
        details: "a playful aquatic mammal".to_string(),
    }
}

#[tokio::test]
async fn start_ask_guess_round_trip() -> Result<()> {
    let (service, llm) = riddle_service();
    let ctx = CallContext::new();
    llm.set_topic(otter_topic());

    let scope = LockScope::new();
    let started = service
        .start_game(&scope, &ctx, "c1", "u1", Some("animals"))
        .await?;
    assert_eq!(started.category, "animals");

    let scope = LockScope::new();
    llm.push_riddle_answer("Yes.");
    let ask = service
        .ask_question(&scope, &ctx, "c1", "Does it   swim?")
        .await?;
    assert_eq!(ask.answer, "Yes.");
    assert_eq!(ask.question_count, 1);

    // The same (normalized) question again is a duplicate.
    let scope = LockScope::new();
    assert!(matches!(
        service.ask_question(&scope, &ctx, "c1", "Does it swim?").await,
        Err(GameError::DuplicateQuestion)
    ));

    let scope = LockScope::new();
    let wrong = service
        .submit_answer(&scope, &ctx, "c1", "u1", "beaver")
        .await?;
    assert_eq!(wrong, GuessOutcome::Incorrect { wrong_guesses: 1 });

    // Wait out the (test-sized) cooldown, then win.
    tokio::time::sleep(Duration::from_millis(150)).await;
    let scope = LockScope::new();
    let win = service
        .submit_answer(&scope, &ctx, "c1", "u1", "Otter")
        .await?;
    assert_eq!(
        win,
        GuessOutcome::Correct {
            target: "otter".to_string()
        }
    );

    let scope = LockScope::new();
    assert!(matches!(
        service.get_game_state(&scope, "c1").await,
        Err(GameError::SessionNotFound)
    ));
    assert_eq!(llm.ended_sessions(), vec!["c1".to_string()]);
    Ok(())
}

#[tokio::test]
async fn guesses_are_rate_limited_per_user() -> Result<()> {
    let (service, llm) = riddle_service_with_cooldown(Duration::from_secs(30));
    let ctx = CallContext::new();
    llm.set_topic(otter_topic());
    let scope = LockScope::new();
    service.start_game(&scope, &ctx, "c1", "u1", None).await?;

    let scope = LockScope::new();
    service
        .submit_answer(&scope, &ctx, "c1", "u1", "beaver")
        .await?;
    let scope = LockScope::new();
    match service.submit_answer(&scope, &ctx, "c1", "u1", "seal").await {
        Err(GameError::RateLimited { remaining_secs }) => {
            assert!(remaining_secs > 0 && remaining_secs <= 30);
        }
        other => anyhow::bail!("expected RateLimited, got {other:?}"),
    }

    // A different user in the same chat is unaffected.
    let scope = LockScope::new();
    let outcome = service
        .submit_answer(&scope, &ctx, "c1", "u2", "seal")
        .await?;
    assert_eq!(outcome, GuessOutcome::Incorrect { wrong_guesses: 2 });
    Ok(())
}

#[tokio::test]
async fn synonym_verdicts_are_cached_in_the_shared_hash() -> Result<()> {
    let (service, llm) = riddle_service_with_cooldown(Duration::from_millis(10));
    let ctx = CallContext::new();
    llm.set_topic(otter_topic());
    llm.add_synonym("otter", "sea otter");

    let scope = LockScope::new();
    service.start_game(&scope, &ctx, "c1", "u1", None).await?;

    tokio::time::sleep(Duration::from_millis(20)).await;
    let scope = LockScope::new();
    let win = service
        .submit_answer(&scope, &ctx, "c1", "u1", "sea otter")
        .await?;
    assert!(matches!(win, GuessOutcome::Correct { .. }));
    assert_eq!(llm.call_count("TwentyQCheckSynonym"), 1);

    // Same pair in a second game: served from the hash, no second RPC.
    let scope = LockScope::new();
    service.start_game(&scope, &ctx, "c2", "u1", None).await?;
    tokio::time::sleep(Duration::from_millis(20)).await;
    let scope = LockScope::new();
    let win = service
        .submit_answer(&scope, &ctx, "c2", "u1", "sea otter")
        .await?;
    assert!(matches!(win, GuessOutcome::Correct { .. }));
    assert_eq!(llm.call_count("TwentyQCheckSynonym"), 1);
    Ok(())
}

#[tokio::test]
async fn completed_topics_are_banned_for_the_next_game() -> Result<()> {
    let (service, llm) = riddle_service_with_cooldown(Duration::from_millis(10));
    let ctx = CallContext::new();

    // First game uses the mock default topic "otter" and is won.
    let scope = LockScope::new();
    service.start_game(&scope, &ctx, "c1", "u1", None).await?;
    tokio::time::sleep(Duration::from_millis(20)).await;
    let scope = LockScope::new();
    service
        .submit_answer(&scope, &ctx, "c1", "u1", "otter")
        .await?;

    // The next selection must avoid the banned "otter".
    let scope = LockScope::new();
    service.start_game(&scope, &ctx, "c1", "u1", None).await?;
    let scope = LockScope::new();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let wrong = service
        .submit_answer(&scope, &ctx, "c1", "u1", "otter")
        .await?;
    assert!(matches!(wrong, GuessOutcome::Incorrect { .. }));
    assert_eq!(llm.call_count("TwentyQSelectTopic"), 2);
    Ok(())
}

#[tokio::test]
async fn hint_budget_is_enforced() -> Result<()> {
    let (service, llm) = riddle_service();
    let ctx = CallContext::new();
    llm.set_topic(otter_topic());
    let scope = LockScope::new();
    service.start_game(&scope, &ctx, "c1", "u1", None).await?;

    for expected in 1..=3u32 {
        let scope = LockScope::new();
        let hint = service.request_hint(&scope, &ctx, "c1").await?;
        assert_eq!(hint.hints_used, expected);
        assert_eq!(hint.hint, format!("Hint {expected}"));
    }
    let scope = LockScope::new();
    assert!(matches!(
        service.request_hint(&scope, &ctx, "c1").await,
        Err(GameError::MaxHintsReached)
    ));
    Ok(())
}

#[tokio::test]
async fn operations_without_a_game_return_session_not_found() -> Result<()> {
    let (service, _llm) = riddle_service();
    let ctx = CallContext::new();

    let scope = LockScope::new();
    assert!(matches!(
        service.ask_question(&scope, &ctx, "c1", "anything?").await,
        Err(GameError::SessionNotFound)
    ));
    let scope = LockScope::new();
    assert!(matches!(
        service.request_hint(&scope, &ctx, "c1").await,
        Err(GameError::SessionNotFound)
    ));
    let scope = LockScope::new();
    assert!(matches!(
        service.surrender(&scope, &ctx, "c1").await,
        Err(GameError::SessionNotFound)
    ));
    Ok(())
}

#[tokio::test]
async fn surrender_reveals_target_and_bans_it() -> Result<()> {
    let (service, llm) = riddle_service();
    let ctx = CallContext::new();
    llm.set_topic(otter_topic());
    let scope = LockScope::new();
    service.start_game(&scope, &ctx, "c1", "u1", None).await?;

    let scope = LockScope::new();
    let target = service.surrender(&scope, &ctx, "c1").await?;
    assert_eq!(target, "otter");

    let scope = LockScope::new();
    assert!(matches!(
        service.get_game_state(&scope, "c1").await,
        Err(GameError::SessionNotFound)
    ));
    Ok(())
}
