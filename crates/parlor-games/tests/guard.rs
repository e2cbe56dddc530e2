#![allow(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use parlor_games::{GameError, GuardConfig, InjectionGuard, normalize_input};
use parlor_llm::CallContext;
use parlor_llm::test_support::MockLlm;

fn guard() -> (Arc<InjectionGuard>, Arc<MockLlm>) {
    let llm = Arc::new(MockLlm::new());
    (Arc::new(InjectionGuard::new(llm.clone())), llm)
}

#[test]
fn normalization_collapses_whitespace() {
    assert_eq!(normalize_input("  a   b\t c \n"), "a b c");
    assert_eq!(normalize_input("   "), "");
}

#[tokio::test]
async fn verdicts_are_cached_by_normalized_input() -> Result<()> {
    let (guard, llm) = guard();
    let ctx = CallContext::new();

    assert!(!guard.is_malicious(&ctx, "is it   alive?").await?);
    // Different spacing, same key.
    assert!(!guard.is_malicious(&ctx, "is it alive?").await?);
    assert_eq!(llm.call_count("GuardIsMalicious"), 1);
    Ok(())
}

#[tokio::test]
async fn concurrent_checks_for_one_key_coalesce() -> Result<()> {
    let (guard, llm) = guard();
    llm.set_delay(Duration::from_millis(50));

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let guard = Arc::clone(&guard);
        tasks.push(tokio::spawn(async move {
            let ctx = CallContext::new();
            guard.is_malicious(&ctx, "same question").await
        }));
    }
    for task in tasks {
        assert!(!task.await??);
    }
    assert_eq!(llm.call_count("GuardIsMalicious"), 1);
    Ok(())
}

#[tokio::test]
async fn empty_input_bypasses_the_cache() -> Result<()> {
    let (guard, llm) = guard();
    let ctx = CallContext::new();

    guard.is_malicious(&ctx, "   ").await?;
    guard.is_malicious(&ctx, "").await?;
    // No caching for empties: both calls reach the backend.
    assert_eq!(llm.call_count("GuardIsMalicious"), 2);
    Ok(())
}

#[tokio::test]
async fn validate_rejects_empty_and_malicious_input() -> Result<()> {
    let (guard, llm) = guard();
    let ctx = CallContext::new();

    assert!(matches!(
        guard.validate_or_reject(&ctx, "   ").await,
        Err(GameError::MalformedInput { .. })
    ));

    llm.set_guard_malicious(true);
    assert!(matches!(
        guard.validate_or_reject(&ctx, "sneaky prompt").await,
        Err(GameError::InputInjection)
    ));

    llm.set_guard_malicious(false);
    let sanitized = guard.validate_or_reject(&ctx, "  fine   question ").await?;
    assert_eq!(sanitized, "fine question");
    Ok(())
}

#[tokio::test]
async fn cache_entries_expire_after_ttl() -> Result<()> {
    let llm = Arc::new(MockLlm::new());
    let guard = InjectionGuard::with_config(
        llm.clone(),
        GuardConfig {
            cache_capacity: 16,
            cache_ttl: Duration::from_millis(40),
            check_timeout: Duration::from_secs(3),
        },
    );
    let ctx = CallContext::new();

    guard.is_malicious(&ctx, "short lived").await?;
    tokio::time::sleep(Duration::from_millis(60)).await;
    guard.is_malicious(&ctx, "short lived").await?;
    assert_eq!(llm.call_count("GuardIsMalicious"), 2);
    Ok(())
}

#[tokio::test]
async fn lru_eviction_respects_capacity() -> Result<()> {
    let llm = Arc::new(MockLlm::new());
    let guard = InjectionGuard::with_config(
        llm.clone(),
        GuardConfig {
            cache_capacity: 2,
            cache_ttl: Duration::from_secs(60),
            check_timeout: Duration::from_secs(3),
        },
    );
    let ctx = CallContext::new();

    guard.is_malicious(&ctx, "first").await?;
    guard.is_malicious(&ctx, "second").await?;
    // Touch "first" so "second" is the LRU victim.
    guard.is_malicious(&ctx, "first").await?;
    guard.is_malicious(&ctx, "third").await?;

    guard.is_malicious(&ctx, "first").await?;
    assert_eq!(llm.call_count("GuardIsMalicious"), 3);

    guard.is_malicious(&ctx, "second").await?;
    assert_eq!(llm.call_count("GuardIsMalicious"), 4);
    Ok(())
}

#[tokio::test]
async fn stalled_backend_hits_the_detached_timeout() -> Result<()> {
    let llm = Arc::new(MockLlm::new());
    llm.set_delay(Duration::from_millis(200));
    let guard = InjectionGuard::with_config(
        llm.clone(),
        GuardConfig {
            cache_capacity: 16,
            cache_ttl: Duration::from_secs(60),
            check_timeout: Duration::from_millis(50),
        },
    );
    let ctx = CallContext::new();

    assert!(matches!(
        guard.is_malicious(&ctx, "slow check").await,
        Err(GameError::Llm(_))
    ));
    Ok(())
}
