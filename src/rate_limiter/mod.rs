/*!
 * # Rate Limiting
 *
 * Keyed fixed-window counters used to throttle cash-out requests per client.
 *
 * Two backends are available:
 *
 * - in-memory, for a single instance
 * - Redis (`INCR` + `EXPIRE`), shared between instances, falling back to the
 *   in-memory counters whenever Redis cannot be reached
 *
 * Windows are measured with a monotonic clock (in-memory) or by Redis key
 * expiry, never with wall-clock timestamps, so clock skew cannot reopen a
 * window early.
 *
 * Callers depend on the [`KeyedRateLimit`] capability rather than on
 * [`RateLimiter`] directly.
 */
use async_trait::async_trait;
use dashmap::DashMap;
use redis::AsyncCommands;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Map size above which elapsed windows are swept before counting.
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone)]
struct RateLimitEntry {
    count: u32,
    window_start: Instant,
}

impl RateLimitEntry {
    fn new(now: Instant) -> Self {
        Self {
            count: 0,
            window_start: now,
        }
    }

    fn roll_window(&mut self, now: Instant, window_duration: Duration) {
        if now.duration_since(self.window_start) >= window_duration {
            self.count = 0;
            self.window_start = now;
        }
    }

    fn time_until_reset(&self, now: Instant, window_duration: Duration) -> Duration {
        window_duration.saturating_sub(now.duration_since(self.window_start))
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_window: u32,
    pub window_duration: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 5,
            window_duration: Duration::from_secs(3600),
        }
    }
}

impl RateLimitConfig {
    pub fn validate(&self) -> Result<(), RateLimitError> {
        if self.requests_per_window == 0 {
            return Err(RateLimitError::InvalidConfig(
                "requests_per_window must be greater than 0".into(),
            ));
        }
        if self.window_duration.is_zero() {
            return Err(RateLimitError::InvalidConfig(
                "window_duration must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub enum RateLimitBackend {
    #[default]
    InMemory,
    Redis {
        client: Arc<redis::Client>,
        namespace: String,
    },
}

#[derive(Clone)]
enum RateLimitStore {
    InMemory {
        entries: Arc<DashMap<String, RateLimitEntry>>,
    },
    Redis {
        client: Arc<redis::Client>,
        namespace: String,
        fallback: Arc<DashMap<String, RateLimitEntry>>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    #[serde(serialize_with = "serialize_duration_secs")]
    pub reset_time: Duration,
}

fn serialize_duration_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_secs())
}

/// Keyed counter with a time window.
#[async_trait]
pub trait KeyedRateLimit: Send + Sync {
    async fn check_rate_limit(&self, key: &str) -> RateLimitResult;
}

#[derive(Clone)]
pub struct RateLimiter {
    store: RateLimitStore,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, backend: RateLimitBackend) -> Result<Self, RateLimitError> {
        config.validate()?;
        let store = match backend {
            RateLimitBackend::InMemory => RateLimitStore::InMemory {
                entries: Arc::new(DashMap::new()),
            },
            RateLimitBackend::Redis { client, namespace } => RateLimitStore::Redis {
                client,
                namespace,
                fallback: Arc::new(DashMap::new()),
            },
        };

        Ok(Self { store, config })
    }

    pub fn in_memory(config: RateLimitConfig) -> Result<Self, RateLimitError> {
        Self::new(config, RateLimitBackend::InMemory)
    }

    async fn check(&self, key: &str) -> RateLimitResult {
        match &self.store {
            RateLimitStore::InMemory { entries } => {
                Self::check_in_memory(entries, key, &self.config, Instant::now())
            }
            RateLimitStore::Redis {
                client,
                namespace,
                fallback,
            } => match client.get_async_connection().await {
                Ok(mut conn) => {
                    match Self::check_with_redis(&mut conn, namespace, key, &self.config).await {
                        Ok(result) => result,
                        Err(err) => {
                            warn!("Redis rate limit error: {}", err);
                            Self::check_in_memory(fallback, key, &self.config, Instant::now())
                        }
                    }
                }
                Err(err) => {
                    warn!(
                        "Failed to connect to Redis for rate limiting, using fallback: {}",
                        err
                    );
                    Self::check_in_memory(fallback, key, &self.config, Instant::now())
                }
            },
        }
    }

    fn check_in_memory(
        entries: &DashMap<String, RateLimitEntry>,
        key: &str,
        config: &RateLimitConfig,
        now: Instant,
    ) -> RateLimitResult {
        if entries.len() >= PRUNE_THRESHOLD {
            Self::prune_expired(entries, now, config.window_duration);
        }

        let mut entry = entries
            .entry(key.to_string())
            .or_insert_with(|| RateLimitEntry::new(now));

        entry.roll_window(now, config.window_duration);
        let reset_time = entry.time_until_reset(now, config.window_duration);

        if entry.count >= config.requests_per_window {
            debug!(key, "Rate limit exhausted");
            return RateLimitResult {
                allowed: false,
                limit: config.requests_per_window,
                remaining: 0,
                reset_time,
            };
        }

        entry.count += 1;
        RateLimitResult {
            allowed: true,
            limit: config.requests_per_window,
            remaining: config.requests_per_window.saturating_sub(entry.count),
            reset_time,
        }
    }

    async fn check_with_redis<C>(
        conn: &mut C,
        namespace: &str,
        key: &str,
        config: &RateLimitConfig,
    ) -> Result<RateLimitResult, redis::RedisError>
    where
        C: redis::aio::ConnectionLike + Send,
    {
        let redis_key = format!("{}:{}", namespace, key);
        let limit = config.requests_per_window as i64;
        let window_secs = config.window_duration.as_secs().max(1);

        let count: i64 = conn.incr(&redis_key, 1).await?;
        if count == 1 {
            let _: Result<(), _> = conn.expire(&redis_key, window_secs as usize).await;
        } else {
            // A key without expiry would block the client forever.
            let ttl: i64 = conn.ttl(&redis_key).await.unwrap_or(-1);
            if ttl < 0 {
                let _: Result<(), _> = conn.expire(&redis_key, window_secs as usize).await;
            }
        }

        let ttl_secs = match conn.ttl::<_, i64>(&redis_key).await {
            Ok(ttl) if ttl > 0 => ttl as u64,
            _ => window_secs,
        };
        let allowed = count <= limit;
        let remaining = if allowed {
            config
                .requests_per_window
                .saturating_sub(count.max(0) as u32)
        } else {
            0
        };

        Ok(RateLimitResult {
            allowed,
            limit: config.requests_per_window,
            remaining,
            reset_time: Duration::from_secs(ttl_secs),
        })
    }

    /// Drops in-memory windows that have fully elapsed.
    fn prune_expired(entries: &DashMap<String, RateLimitEntry>, now: Instant, window: Duration) {
        let before = entries.len();
        entries.retain(|_, entry| now.duration_since(entry.window_start) < window);
        debug!(
            dropped = before.saturating_sub(entries.len()),
            "Pruned elapsed rate limit windows"
        );
    }
}

#[async_trait]
impl KeyedRateLimit for RateLimiter {
    async fn check_rate_limit(&self, key: &str) -> RateLimitResult {
        self.check(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(limit: u32, window_secs: u64) -> RateLimitConfig {
        RateLimitConfig {
            requests_per_window: limit,
            window_duration: Duration::from_secs(window_secs),
        }
    }

    #[tokio::test]
    async fn allows_exactly_the_quota_then_blocks() {
        let limiter = RateLimiter::in_memory(config(3, 60)).unwrap();

        for expected_remaining in [2, 1, 0] {
            let result = limiter.check_rate_limit("client-a").await;
            assert!(result.allowed);
            assert_eq!(result.remaining, expected_remaining);
        }

        let blocked = limiter.check_rate_limit("client-a").await;
        assert!(!blocked.allowed);
        assert_eq!(blocked.remaining, 0);
        assert!(blocked.reset_time <= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn keys_are_counted_independently() {
        let limiter = RateLimiter::in_memory(config(1, 60)).unwrap();
        assert!(limiter.check_rate_limit("a").await.allowed);
        assert!(!limiter.check_rate_limit("a").await.allowed);
        assert!(limiter.check_rate_limit("b").await.allowed);
    }

    #[test]
    fn window_reopens_after_it_elapses() {
        let entries = DashMap::new();
        let cfg = config(1, 10);
        let start = Instant::now();

        let at = |secs| start + Duration::from_secs(secs);

        assert!(RateLimiter::check_in_memory(&entries, "k", &cfg, at(0)).allowed);
        assert!(!RateLimiter::check_in_memory(&entries, "k", &cfg, at(9)).allowed);
        assert!(RateLimiter::check_in_memory(&entries, "k", &cfg, at(10)).allowed);
    }

    #[test]
    fn elapsed_windows_are_dropped_once_the_map_grows() {
        let entries = DashMap::new();
        let cfg = config(1, 10);
        let start = Instant::now();

        for n in 0..PRUNE_THRESHOLD {
            RateLimiter::check_in_memory(&entries, &format!("client-{n}"), &cfg, start);
        }
        assert_eq!(entries.len(), PRUNE_THRESHOLD);

        let later = start + Duration::from_secs(10);
        assert!(RateLimiter::check_in_memory(&entries, "fresh", &cfg, later).allowed);
        assert_eq!(entries.len(), 1);
        assert!(entries.contains_key("fresh"));
    }

    #[test]
    fn live_windows_survive_pruning() {
        let entries = DashMap::new();
        let cfg = config(1, 10);
        let start = Instant::now();

        for n in 0..PRUNE_THRESHOLD {
            RateLimiter::check_in_memory(&entries, &format!("client-{n}"), &cfg, start);
        }

        let soon = start + Duration::from_secs(9);
        assert!(!RateLimiter::check_in_memory(&entries, "client-0", &cfg, soon).allowed);
        assert_eq!(entries.len(), PRUNE_THRESHOLD);
    }

    #[test]
    fn zero_quota_is_rejected() {
        assert!(RateLimiter::in_memory(config(0, 60)).is_err());
        assert!(RateLimiter::in_memory(config(1, 0)).is_err());
    }

    #[tokio::test]
    async fn unreachable_redis_falls_back_to_memory() {
        let client = redis::Client::open("redis://127.0.0.1:1/").unwrap();
        let limiter = RateLimiter::new(
            config(1, 60),
            RateLimitBackend::Redis {
                client: Arc::new(client),
                namespace: "test:rl".into(),
            },
        )
        .unwrap();

        assert!(limiter.check_rate_limit("k").await.allowed);
        assert!(!limiter.check_rate_limit("k").await.allowed);
    }
}
