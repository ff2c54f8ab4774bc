//! Per-domain token-bucket rate limiting for outbound fetches

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Poll interval while waiting for a token.
const ACQUIRE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Token bucket with lazy refill based on elapsed monotonic time.
///
/// Capacity and refill rate both equal the configured requests-per-minute.
#[derive(Debug)]
struct TokenBucket {
    rate_per_second: f64,
    max_tokens: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(rate_per_minute: u32) -> Self {
        Self {
            rate_per_second: f64::from(rate_per_minute) / 60.0,
            max_tokens: f64::from(rate_per_minute),
            tokens: f64::from(rate_per_minute),
            last_refill: Instant::now(),
        }
    }

    /// Refill from elapsed time, then take one token if available.
    fn try_take(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate_per_second).min(self.max_tokens);
        self.last_refill = now;
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Manages one token bucket per domain, created lazily on first use and
/// kept for the process lifetime. Safe under concurrent suppliers.
pub struct DomainRateLimiter {
    buckets: Mutex<HashMap<String, Arc<Mutex<TokenBucket>>>>,
    domain_rates: HashMap<String, u32>,
    default_rpm: u32,
}

impl DomainRateLimiter {
    pub fn new(domain_rates: HashMap<String, u32>, default_rpm: u32) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            domain_rates,
            default_rpm,
        }
    }

    fn bucket_for(&self, domain: &str) -> Arc<Mutex<TokenBucket>> {
        let mut buckets = self.buckets.lock().expect("rate limiter lock poisoned");
        buckets
            .entry(domain.to_string())
            .or_insert_with(|| {
                let rpm = self
                    .domain_rates
                    .get(domain)
                    .copied()
                    .unwrap_or(self.default_rpm);
                tracing::debug!(domain = %domain, rpm = rpm, "Created rate-limit bucket");
                Arc::new(Mutex::new(TokenBucket::new(rpm)))
            })
            .clone()
    }

    /// Wait for a token for the domain, up to `timeout`.
    ///
    /// Returns false on timeout; never errors. The wait yields to the
    /// runtime between attempts instead of holding a thread.
    pub async fn acquire(&self, domain: &str, timeout: Duration) -> bool {
        let bucket = self.bucket_for(domain);
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut bucket = bucket.lock().expect("token bucket lock poisoned");
                if bucket.try_take() {
                    return true;
                }
            }
            if Instant::now() >= deadline {
                tracing::warn!(domain = %domain, "Rate limit acquisition timed out");
                return false;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(ACQUIRE_POLL_INTERVAL.min(remaining)).await;
        }
    }
}
