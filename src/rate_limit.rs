//! Persistent token-bucket rate limiter.
//!
//! Every upstream call must be admitted by [`RateLimiter::admit`] first.
//! The bucket holds at most `capacity` tokens and regains one token per
//! `refill_interval` of elapsed wall-clock time. Refill is computed lazily on
//! each admission; there is no background timer.
//!
//! The bucket state is written to the [`KvStore`] after every admission, so
//! restarting the embedding application does not reset the budget.
//!
//! # Concurrency
//!
//! Load, refill, decrement and persist form one critical section guarded by
//! an async mutex. Concurrent admissions are serialized and can never drive
//! the token count below zero.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::store::KvStore;
use crate::telemetry;
use crate::{HuginnError, Result};

/// Store key holding the serialized bucket.
pub const BUCKET_KEY: &str = "huginn:rate_bucket";

/// Configuration for the token bucket.
///
/// ```rust
/// # use huginn::RateLimitConfig;
/// # use std::time::Duration;
/// let config = RateLimitConfig::new()
///     .capacity(20)
///     .refill_interval(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum number of stored tokens. Default: 20.
    pub capacity: u32,
    /// Wall-clock time needed to regain one token. Default: 10s.
    pub refill_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 20,
            refill_interval: Duration::from_secs(10),
        }
    }
}

impl RateLimitConfig {
    /// Create a new config with the default budget.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bucket capacity.
    pub fn capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the time needed to regain one token.
    pub fn refill_interval(mut self, interval: Duration) -> Self {
        self.refill_interval = interval;
        self
    }

    fn interval_ms(&self) -> u64 {
        (self.refill_interval.as_millis() as u64).max(1)
    }
}

/// Persisted bucket state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateBucket {
    pub tokens: u32,
    pub last_refill_at_ms: u64,
}

impl RateBucket {
    fn full(config: &RateLimitConfig, now_ms: u64) -> Self {
        Self {
            tokens: config.capacity,
            last_refill_at_ms: now_ms,
        }
    }

    /// Add the tokens earned since the last refill, capped at capacity.
    ///
    /// The refill timestamp only moves when tokens were actually added. A
    /// bucket that reaches capacity restarts its clock at `now_ms` so idle
    /// time cannot be banked beyond capacity.
    fn refill(&mut self, config: &RateLimitConfig, now_ms: u64) {
        if self.last_refill_at_ms > now_ms {
            // persisted from a clock that ran ahead; never refill from the future
            self.last_refill_at_ms = now_ms;
        }
        if self.tokens >= config.capacity {
            self.tokens = config.capacity;
            self.last_refill_at_ms = now_ms;
            return;
        }

        let interval = config.interval_ms();
        let elapsed = now_ms - self.last_refill_at_ms;
        let earned = elapsed / interval;
        if earned == 0 {
            return;
        }

        let tokens = (u64::from(self.tokens) + earned).min(u64::from(config.capacity)) as u32;
        if tokens >= config.capacity {
            self.last_refill_at_ms = now_ms;
        } else {
            self.last_refill_at_ms += earned * interval;
        }
        self.tokens = tokens;
    }

    /// Time until the next token is earned.
    fn next_token_in(&self, config: &RateLimitConfig, now_ms: u64) -> Duration {
        if self.tokens >= config.capacity {
            return Duration::ZERO;
        }
        let interval = config.interval_ms();
        let elapsed = now_ms.saturating_sub(self.last_refill_at_ms);
        Duration::from_millis(interval - (elapsed % interval))
    }
}

/// Point-in-time view of the budget, for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateStatus {
    pub tokens: u32,
    pub capacity: u32,
    pub next_token_in: Duration,
}

/// Token-bucket limiter shared by every gateway operation.
pub struct RateLimiter {
    config: RateLimitConfig,
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    critical: tokio::sync::Mutex<()>,
}

impl RateLimiter {
    /// Create a limiter using the system clock.
    pub fn new(config: RateLimitConfig, store: Arc<dyn KvStore>) -> Self {
        Self::with_clock(config, store, Arc::new(SystemClock))
    }

    /// Create a limiter with an explicit time source.
    pub fn with_clock(
        config: RateLimitConfig,
        store: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            store,
            clock,
            critical: tokio::sync::Mutex::new(()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Consume one token, or fail with `RateExceeded`.
    ///
    /// Rejection leaves the bucket untouched apart from refill bookkeeping.
    /// If the spent token cannot be persisted the admission fails with the
    /// storage error.
    pub async fn admit(&self) -> Result<()> {
        let _guard = self.critical.lock().await;
        let now = self.clock.now_ms();
        let mut bucket = self.load(now).await?;
        bucket.refill(&self.config, now);

        if bucket.tokens == 0 {
            let retry_after = bucket.next_token_in(&self.config, now);
            if let Err(e) = self.persist(&bucket).await {
                warn!(error = %e, "failed to persist rate bucket");
            }
            metrics::counter!(telemetry::RATE_DECISIONS_TOTAL, "decision" => "rejected")
                .increment(1);
            debug!(retry_after_ms = retry_after.as_millis() as u64, "rate budget exhausted");
            return Err(HuginnError::RateExceeded { retry_after });
        }

        bucket.tokens -= 1;
        // an unrecorded decrement would be handed out again on the next load
        if let Err(e) = self.persist(&bucket).await {
            warn!(error = %e, "failed to persist rate bucket, refusing admission");
            return Err(e);
        }
        metrics::counter!(telemetry::RATE_DECISIONS_TOTAL, "decision" => "admitted").increment(1);
        debug!(tokens_left = bucket.tokens, "rate admission granted");
        Ok(())
    }

    /// Current budget after refill, without consuming a token.
    pub async fn status(&self) -> Result<RateStatus> {
        let _guard = self.critical.lock().await;
        let now = self.clock.now_ms();
        let mut bucket = self.load(now).await?;
        bucket.refill(&self.config, now);
        Ok(RateStatus {
            tokens: bucket.tokens,
            capacity: self.config.capacity,
            next_token_in: bucket.next_token_in(&self.config, now),
        })
    }

    async fn load(&self, now: u64) -> Result<RateBucket> {
        let Some(raw) = self.store.get(BUCKET_KEY).await? else {
            return Ok(RateBucket::full(&self.config, now));
        };
        match serde_json::from_str::<RateBucket>(&raw) {
            Ok(mut bucket) => {
                // capacity may have been lowered since the state was written
                bucket.tokens = bucket.tokens.min(self.config.capacity);
                Ok(bucket)
            }
            Err(e) => {
                warn!(error = %e, "unreadable rate bucket state, starting full");
                Ok(RateBucket::full(&self.config, now))
            }
        }
    }

    async fn persist(&self, bucket: &RateBucket) -> Result<()> {
        let encoded = serde_json::to_string(bucket)?;
        self.store.set(BUCKET_KEY, encoded).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;

    fn limiter(capacity: u32, secs: u64) -> (RateLimiter, ManualClock, Arc<MemoryStore>) {
        let clock = ManualClock::new(1_700_000_000_000);
        let store = Arc::new(MemoryStore::new());
        let limiter = RateLimiter::with_clock(
            RateLimitConfig::new()
                .capacity(capacity)
                .refill_interval(Duration::from_secs(secs)),
            store.clone(),
            Arc::new(clock.clone()),
        );
        (limiter, clock, store)
    }

    #[test]
    fn config_defaults() {
        let config = RateLimitConfig::default();
        assert_eq!(config.capacity, 20);
        assert_eq!(config.refill_interval, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn capacity_two_scenario() {
        let (limiter, clock, _) = limiter(2, 10);

        limiter.admit().await.unwrap();
        limiter.admit().await.unwrap();

        clock.advance(Duration::from_millis(500));
        let err = limiter.admit().await.unwrap_err();
        match err {
            HuginnError::RateExceeded { retry_after } => {
                assert_eq!(retry_after, Duration::from_millis(9_500));
            }
            other => panic!("expected RateExceeded, got {other:?}"),
        }

        clock.advance(Duration::from_secs(10));
        limiter.admit().await.unwrap();
    }

    #[tokio::test]
    async fn never_exceeds_capacity_after_long_idle() {
        let (limiter, clock, _) = limiter(3, 10);
        limiter.admit().await.unwrap();

        clock.advance(Duration::from_secs(3_600));
        let status = limiter.status().await.unwrap();
        assert_eq!(status.tokens, 3);

        for _ in 0..3 {
            limiter.admit().await.unwrap();
        }
        assert!(limiter.admit().await.unwrap_err().is_rate_limited());
    }

    #[tokio::test]
    async fn partial_interval_progress_is_kept() {
        let (limiter, clock, _) = limiter(2, 10);
        limiter.admit().await.unwrap();
        limiter.admit().await.unwrap();

        clock.advance(Duration::from_secs(15));
        limiter.admit().await.unwrap();
        assert!(limiter.admit().await.is_err());

        // 5s of the 15 carried over, so 5 more seconds earn the next token
        clock.advance(Duration::from_secs(5));
        limiter.admit().await.unwrap();
    }

    #[tokio::test]
    async fn state_survives_new_limiter_instance() {
        let (limiter, clock, store) = limiter(2, 10);
        limiter.admit().await.unwrap();
        limiter.admit().await.unwrap();

        let restarted = RateLimiter::with_clock(
            RateLimitConfig::new().capacity(2),
            store,
            Arc::new(clock.clone()),
        );
        assert!(restarted.admit().await.unwrap_err().is_rate_limited());
    }

    #[tokio::test]
    async fn corrupt_state_starts_full() {
        let (limiter, _, store) = limiter(2, 10);
        store.set(BUCKET_KEY, "garbage".into()).await.unwrap();
        assert_eq!(limiter.status().await.unwrap().tokens, 2);
    }

    struct ReadOnlyStore(MemoryStore);

    #[async_trait::async_trait]
    impl KvStore for ReadOnlyStore {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            self.0.get(key).await
        }
        async fn set(&self, _key: &str, _value: String) -> Result<()> {
            Err(HuginnError::Storage("disk full".into()))
        }
        async fn len(&self) -> Result<usize> {
            self.0.len().await
        }
        async fn remove_many(&self, keys: &[String]) -> Result<()> {
            self.0.remove_many(keys).await
        }
        async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
            self.0.keys(prefix).await
        }
    }

    #[tokio::test]
    async fn unwritable_store_refuses_admission() {
        let limiter = RateLimiter::with_clock(
            RateLimitConfig::new().capacity(2),
            Arc::new(ReadOnlyStore(MemoryStore::new())),
            Arc::new(ManualClock::new(1_700_000_000_000)),
        );

        for _ in 0..50 {
            let err = limiter.admit().await.unwrap_err();
            assert!(matches!(err, HuginnError::Storage(_)), "got {err:?}");
        }
        // reads still work, so the budget stays visible
        assert_eq!(limiter.status().await.unwrap().tokens, 2);
    }

    #[tokio::test]
    async fn concurrent_admissions_respect_budget() {
        let (limiter, _, _) = limiter(5, 10);
        let limiter = Arc::new(limiter);

        let mut handles = Vec::new();
        for _ in 0..20 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move { limiter.admit().await.is_ok() }));
        }
        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 5);
        assert_eq!(limiter.status().await.unwrap().tokens, 0);
    }
}
