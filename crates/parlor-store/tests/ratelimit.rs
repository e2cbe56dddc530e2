#![allow(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use parlor_store::{GuessRateLimiter, MemoryRateLimitBackend};

#[tokio::test]
async fn second_attempt_within_cooldown_is_rejected() -> Result<()> {
    let limiter = GuessRateLimiter::with_cooldown(
        Arc::new(MemoryRateLimitBackend::new()),
        Duration::from_millis(200),
    );

    let first = limiter.check("c1", "u1").await?;
    assert!(first.allowed);
    assert_eq!(first.remaining_ms, 0);

    let second = limiter.check("c1", "u1").await?;
    assert!(!second.allowed);
    assert!(second.remaining_ms > 0 && second.remaining_ms <= 200);
    assert_eq!(second.remaining_secs(), 1);
    Ok(())
}

#[tokio::test]
async fn cooldown_expires_and_allows_exactly_once() -> Result<()> {
    let limiter = GuessRateLimiter::with_cooldown(
        Arc::new(MemoryRateLimitBackend::new()),
        Duration::from_millis(50),
    );

    assert!(limiter.check("c1", "u1").await?.allowed);
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(limiter.check("c1", "u1").await?.allowed);
    assert!(!limiter.check("c1", "u1").await?.allowed);
    Ok(())
}

#[tokio::test]
async fn cooldowns_are_scoped_per_chat_and_user() -> Result<()> {
    let limiter = GuessRateLimiter::with_cooldown(
        Arc::new(MemoryRateLimitBackend::new()),
        Duration::from_secs(30),
    );

    assert!(limiter.check("c1", "u1").await?.allowed);
    assert!(limiter.check("c1", "u2").await?.allowed);
    assert!(limiter.check("c2", "u1").await?.allowed);
    assert!(!limiter.check("c1", "u1").await?.allowed);
    Ok(())
}
