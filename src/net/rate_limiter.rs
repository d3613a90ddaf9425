//! Per-source token bucket. `acquire` blocks the caller until a token is
//! available; the bucket mutex is held across the sleep so waiting callers
//! are served in order.

use tokio::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_update: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    /// Tokens per second.
    rate: f64,
    burst: f64,
    state: Mutex<BucketState>,
}

impl RateLimiter {
    /// `requests_per_minute` is the config-facing unit.
    pub fn new(requests_per_minute: f64, burst_size: u32) -> Self {
        Self::per_second(requests_per_minute / 60.0, burst_size)
    }

    pub fn per_second(rate: f64, burst_size: u32) -> Self {
        let burst = f64::from(burst_size.max(1));
        RateLimiter {
            rate: rate.max(f64::MIN_POSITIVE),
            burst,
            state: Mutex::new(BucketState {
                tokens: burst,
                last_update: Instant::now(),
            }),
        }
    }

    pub async fn acquire(&self) {
        let mut state = self.state.lock().await;

        let now = Instant::now();
        let elapsed = now.duration_since(state.last_update).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate).min(self.burst);
        state.last_update = now;

        if state.tokens < 1.0 {
            let wait = Duration::from_secs_f64((1.0 - state.tokens) / self.rate);
            sleep(wait).await;
            state.last_update = Instant::now();
            state.tokens = 1.0;
        }

        state.tokens -= 1.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn burst_then_steady_rate() {
        // rate=10/s, burst=2: five acquires land at ~0, 0, 0.1, 0.2, 0.3 s.
        let limiter = RateLimiter::per_second(10.0, 2);
        let start = Instant::now();
        let mut stamps = Vec::new();
        for _ in 0..5 {
            limiter.acquire().await;
            stamps.push(start.elapsed().as_secs_f64());
        }
        let expected = [0.0, 0.0, 0.1, 0.2, 0.3];
        for (got, want) in stamps.iter().zip(expected.iter()) {
            assert!(
                (got - want).abs() < 0.01,
                "expected {expected:?}, got {stamps:?}"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn refills_up_to_burst_while_idle() {
        let limiter = RateLimiter::per_second(1.0, 3);
        for _ in 0..3 {
            limiter.acquire().await;
        }
        // A long idle period refills to burst, never beyond.
        tokio::time::advance(Duration::from_secs(60)).await;
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(5));
        // Fourth token has to wait a full second.
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(990));
    }

    #[tokio::test(start_paused = true)]
    async fn admission_ceiling_over_window() {
        // Over any window W, admissions <= rate*W + burst.
        let limiter = RateLimiter::per_second(5.0, 2);
        let start = Instant::now();
        let mut admitted = 0u32;
        while start.elapsed() < Duration::from_secs(2) {
            limiter.acquire().await;
            admitted += 1;
        }
        assert!(admitted <= 5 * 2 + 2, "admitted {admitted} tokens");
    }

    #[tokio::test]
    async fn per_minute_constructor_scales() {
        // 600/min == 10/s; just exercise the conversion path.
        let limiter = RateLimiter::new(600.0, 1);
        limiter.acquire().await;
    }
}
