use governor::{clock, state::keyed::DefaultKeyedStateStore, Quota, RateLimiter};
use metrics::counter;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::config::Config;

type KeyedRateLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, clock::DefaultClock>;

/// Per-process keyed token bucket. The full window is available as burst,
/// and tokens replenish evenly across the window, approximating the classic
/// "N requests per window" limiter.
#[derive(Clone)]
pub struct KeyedLimiter {
    name: &'static str,
    enabled: bool,
    limiter: Arc<KeyedRateLimiter>,
}

impl KeyedLimiter {
    pub fn new(
        name: &'static str,
        enabled: bool,
        max_per_window: u32,
        window: Duration,
    ) -> anyhow::Result<Self> {
        let burst = NonZeroU32::new(max_per_window)
            .ok_or_else(|| anyhow::anyhow!("rate limit must be greater than 0"))?;
        let quota = Quota::with_period(window / max_per_window)
            .ok_or_else(|| anyhow::anyhow!("invalid rate limit period"))?
            .allow_burst(burst);
        Ok(Self {
            name,
            enabled,
            limiter: Arc::new(RateLimiter::dashmap(quota)),
        })
    }

    pub fn allow(&self, bucket_key: &str) -> bool {
        if !self.enabled {
            return true;
        }
        if bucket_key.is_empty() {
            return true;
        }

        let allowed = self.limiter.check_key(&bucket_key.to_string()).is_ok();
        if !allowed {
            counter!(
                "rate_limit_exceeded_total",
                "limiter" => self.name,
            )
            .increment(1);
        }
        allowed
    }

    pub fn check(&self, bucket_key: &str) -> Result<(), ApiError> {
        if self.allow(bucket_key) {
            Ok(())
        } else {
            Err(ApiError::RateLimited)
        }
    }
}

/// Bucket keys: authenticated traffic is limited per user, anonymous
/// traffic per client IP.
pub fn user_key(user_id: Uuid) -> String {
    format!("user:{user_id}")
}

pub fn ip_key(ip: std::net::IpAddr) -> String {
    format!("ip:{ip}")
}

/// The service's limiter set, mirroring the per-route limits of the API:
/// shortening is cheap to abuse and gets tight anonymous buckets, auth
/// endpoints are tighter still, everything else shares a general bucket.
pub struct RateLimits {
    pub shorten_anon: KeyedLimiter,
    pub shorten_user: KeyedLimiter,
    pub auth: KeyedLimiter,
    pub general: KeyedLimiter,
}

impl RateLimits {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let window = Duration::from_secs(config.rate_limit_window_seconds);
        let enabled = config.rate_limits_enabled;
        Ok(Self {
            shorten_anon: KeyedLimiter::new(
                "shorten_anon",
                enabled,
                config.shorten_anon_per_window,
                window,
            )?,
            shorten_user: KeyedLimiter::new(
                "shorten_user",
                enabled,
                config.shorten_user_per_window,
                window,
            )?,
            auth: KeyedLimiter::new("auth", enabled, config.auth_per_window, window)?,
            general: KeyedLimiter::new("general", enabled, config.general_per_window, window)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_limiter_always_allows() {
        let limiter =
            KeyedLimiter::new("test", false, 1, Duration::from_secs(900)).unwrap();
        for _ in 0..100 {
            assert!(limiter.allow("key"));
        }
    }

    #[test]
    fn test_empty_key_always_allowed() {
        let limiter = KeyedLimiter::new("test", true, 1, Duration::from_secs(900)).unwrap();
        for _ in 0..100 {
            assert!(limiter.allow(""));
        }
    }

    #[test]
    fn test_burst_then_block() {
        let limiter = KeyedLimiter::new("test", true, 3, Duration::from_secs(900)).unwrap();
        assert!(limiter.allow("key"));
        assert!(limiter.allow("key"));
        assert!(limiter.allow("key"));
        assert!(!limiter.allow("key"));
    }

    #[test]
    fn test_keys_are_isolated() {
        let limiter = KeyedLimiter::new("test", true, 1, Duration::from_secs(900)).unwrap();
        assert!(limiter.allow("key1"));
        assert!(!limiter.allow("key1"));
        assert!(limiter.allow("key2"));
        assert!(!limiter.allow("key2"));
    }

    #[test]
    fn test_check_maps_to_rate_limited() {
        let limiter = KeyedLimiter::new("test", true, 1, Duration::from_secs(900)).unwrap();
        assert!(limiter.check("key").is_ok());
        assert!(matches!(
            limiter.check("key"),
            Err(ApiError::RateLimited)
        ));
    }

    #[test]
    fn test_zero_limit_is_rejected() {
        assert!(KeyedLimiter::new("test", true, 0, Duration::from_secs(900)).is_err());
    }

    #[test]
    fn test_bucket_key_formats() {
        let user = Uuid::new_v4();
        assert_eq!(user_key(user), format!("user:{user}"));
        assert_eq!(
            ip_key("127.0.0.1".parse().unwrap()),
            "ip:127.0.0.1".to_string()
        );
    }
}
