use std::time::Duration;

use super::RateLimiter;

fn limiter() -> RateLimiter {
    return RateLimiter::new(Duration::from_secs(60), 3, 5);
}

#[tokio::test(start_paused = true)]
async fn it_allows_everything_with_an_empty_history() {
    let limiter = limiter();

    let availability = limiter.check_availability().await;

    assert!(availability.can_proceed);
    assert_eq!(availability.wait, Duration::ZERO);
    assert!(!limiter.is_approaching_limit().await);
}

#[tokio::test(start_paused = true)]
async fn it_warns_at_the_threshold_and_recovers_after_the_window() {
    let limiter = limiter();

    for _ in 0..3 {
        limiter.record_request().await;
    }
    assert!(limiter.is_approaching_limit().await);

    tokio::time::advance(Duration::from_secs(61)).await;
    assert!(!limiter.is_approaching_limit().await);
}

#[tokio::test(start_paused = true)]
async fn it_still_proceeds_between_warning_and_max() {
    let limiter = limiter();

    for _ in 0..4 {
        limiter.record_request().await;
    }

    let availability = limiter.check_availability().await;
    assert!(limiter.is_approaching_limit().await);
    assert!(availability.can_proceed);
}

#[tokio::test(start_paused = true)]
async fn it_blocks_at_the_hard_max_with_a_wait_hint() {
    let limiter = limiter();

    limiter.record_request().await;
    tokio::time::advance(Duration::from_secs(10)).await;
    for _ in 0..4 {
        limiter.record_request().await;
    }

    let availability = limiter.check_availability().await;

    assert!(!availability.can_proceed);
    // The oldest entry is 10s into a 60s window.
    assert_eq!(availability.wait, Duration::from_secs(50));
}

#[tokio::test(start_paused = true)]
async fn it_frees_a_slot_once_the_oldest_entry_expires() {
    let limiter = limiter();

    limiter.record_request().await;
    tokio::time::advance(Duration::from_secs(30)).await;
    for _ in 0..4 {
        limiter.record_request().await;
    }
    assert!(!limiter.check_availability().await.can_proceed);

    tokio::time::advance(Duration::from_secs(31)).await;

    let availability = limiter.check_availability().await;
    assert!(availability.can_proceed);
}
