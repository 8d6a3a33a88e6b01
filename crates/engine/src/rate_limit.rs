use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Token bucket shared by every fetch in a scan.
///
/// Holds up to `requests_per_minute` tokens and refills continuously. Callers
/// await `acquire`; nothing else sleeps to pace requests.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<Bucket>>,
}

struct Bucket {
    tokens: f64,
    capacity: f64,
    per_sec: f64,
    refilled_at: Instant,
}

impl Bucket {
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.refilled_at).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.per_sec).min(self.capacity);
        self.refilled_at = now;
    }
}

impl RateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        let capacity = f64::from(requests_per_minute.max(1));
        Self {
            inner: Arc::new(Mutex::new(Bucket {
                tokens: capacity,
                capacity,
                per_sec: capacity / 60.0,
                refilled_at: Instant::now(),
            })),
        }
    }

    /// Take a token if one is available right now.
    pub async fn try_acquire(&self) -> bool {
        self.take_or_wait().await.is_none()
    }

    /// Wait until a token is available, then take it.
    pub async fn acquire(&self, context: &str) {
        while let Some(wait) = self.take_or_wait().await {
            debug!(context, wait_ms = wait.as_millis() as u64, "Rate limit saturated");
            tokio::time::sleep(wait).await;
        }
    }

    /// `None` when a token was taken, otherwise the time until one frees up.
    async fn take_or_wait(&self) -> Option<Duration> {
        let mut bucket = self.inner.lock().await;
        bucket.refill();
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return None;
        }
        let missing = 1.0 - bucket.tokens;
        Some(Duration::from_secs_f64(missing / bucket.per_sec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn burst_is_capped_at_capacity() {
        let limiter = RateLimiter::new(3);
        assert!(limiter.try_acquire().await);
        assert!(limiter.try_acquire().await);
        assert!(limiter.try_acquire().await);
        assert!(!limiter.try_acquire().await);
    }

    #[tokio::test]
    async fn acquire_waits_for_refill() {
        // 100 tokens per second
        let limiter = RateLimiter::new(6_000);
        for _ in 0..6_000 {
            limiter.acquire("drain").await;
        }
        let started = std::time::Instant::now();
        limiter.acquire("refill").await;
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn clones_share_one_bucket() {
        let a = RateLimiter::new(1);
        let b = a.clone();
        assert!(a.try_acquire().await);
        assert!(!b.try_acquire().await);
    }
}
