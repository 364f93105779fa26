use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

/// Token-bucket rate limiter: `rate` tokens refill per second up to `capacity`.
pub struct TokenBucketRateLimiter {
    rate: f64,
    capacity: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucketRateLimiter {
    pub fn new(rate: f64, capacity: f64) -> Self {
        Self {
            rate,
            capacity,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill(state: &mut BucketState, rate: f64, capacity: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * rate).min(capacity);
        state.last_refill = now;
    }

    /// Block until `n` tokens are available, then consume them. Refills on
    /// each loop iteration so a long wait still observes intermediate
    /// refills rather than sleeping for the whole deficit up front.
    pub async fn acquire(&self, n: f64) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                Self::refill(&mut state, self.rate, self.capacity);
                if state.tokens >= n {
                    state.tokens -= n;
                    None
                } else {
                    let deficit = n - state.tokens;
                    Some(Duration::from_secs_f64(deficit / self.rate))
                }
            };
            match wait {
                None => return,
                Some(d) => tokio::time::sleep(d).await,
            }
        }
    }

    /// Non-blocking acquire: consumes `n` tokens and returns true if they
    /// were available, otherwise returns false without waiting or
    /// partially consuming the bucket.
    pub async fn try_acquire(&self, n: f64) -> bool {
        let mut state = self.state.lock().await;
        Self::refill(&mut state, self.rate, self.capacity);
        if state.tokens >= n {
            state.tokens -= n;
            true
        } else {
            false
        }
    }

    /// Seconds until the next token would be available, 0.0 if one is ready now.
    pub async fn wait_time(&self) -> f64 {
        let mut state = self.state.lock().await;
        Self::refill(&mut state, self.rate, self.capacity);
        if state.tokens >= 1.0 {
            0.0
        } else {
            (1.0 - state.tokens) / self.rate
        }
    }

    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.tokens = self.capacity;
        state.last_refill = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_full_and_drains_immediately() {
        let limiter = TokenBucketRateLimiter::new(50.0, 50.0);
        for _ in 0..50 {
            assert!(limiter.try_acquire(1.0).await);
        }
        assert!(!limiter.try_acquire(1.0).await);
    }

    #[tokio::test]
    async fn reset_refills_to_capacity() {
        let limiter = TokenBucketRateLimiter::new(50.0, 50.0);
        for _ in 0..50 {
            limiter.try_acquire(1.0).await;
        }
        limiter.reset().await;
        assert!(limiter.try_acquire(1.0).await);
    }

    #[tokio::test]
    async fn try_acquire_rejects_a_batch_larger_than_capacity_without_partial_consumption() {
        let limiter = TokenBucketRateLimiter::new(50.0, 50.0);
        assert!(!limiter.try_acquire(51.0).await);
        // The failed attempt must not have consumed anything.
        assert!(limiter.try_acquire(50.0).await);
    }

    #[tokio::test]
    async fn wait_time_is_zero_when_tokens_available() {
        let limiter = TokenBucketRateLimiter::new(50.0, 50.0);
        assert_eq!(limiter.wait_time().await, 0.0);
    }
}
