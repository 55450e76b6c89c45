use std::time::Duration;

use d_controller::queue::default_controller_rate_limiter;
use d_controller::queue::WorkQueue;
use d_controller::RateLimiterConfig;
use tokio::time::timeout;

/// Updates arriving while a key is in flight collapse into exactly one more
/// pass once the current one is done.
#[tokio::test]
async fn test_updates_during_processing_collapse_into_one_pass() {
    let queue = WorkQueue::new(
        "in-flight-updates",
        default_controller_rate_limiter(&RateLimiterConfig::default()),
    );
    let key = "root:org|w1";

    queue.add(key);
    assert_eq!(queue.get().await.as_deref(), Some(key));

    queue.add(key);
    queue.add(key);
    assert!(queue.is_empty());
    assert!(timeout(Duration::from_millis(50), queue.get()).await.is_err());

    queue.done(key);
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.get().await.as_deref(), Some(key));
    queue.done(key);

    assert!(queue.is_empty());
    assert!(timeout(Duration::from_millis(50), queue.get()).await.is_err());
}
