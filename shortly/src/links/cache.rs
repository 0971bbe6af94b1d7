use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use common_redis::{Client as RedisClient, CustomRedisError};

const DEFAULT_CACHE_TTL_SECONDS: u64 = 60 * 60 * 24; // 24 hours

// Assuming average key length (prefix + code) is ~20 characters and an
// average cached payload of ~200 characters.
const AVERAGE_ENTRY_WEIGHT: u64 = 20 + 200;
const TARGET_ITEM_COUNT: u64 = 10_000;
const LOCAL_CACHE_MAX_WEIGHT: u64 = TARGET_ITEM_COUNT * AVERAGE_ENTRY_WEIGHT;

const CACHE_HITS_TOTAL: &str = "redirect_cache_hits_total";
const CACHE_MISSES_TOTAL: &str = "redirect_cache_misses_total";
const CACHE_EVICTIONS_TOTAL: &str = "redirect_cache_evictions_total";

/// The resolved redirect stored in the cache tiers. Carries the link id so
/// cache hits can still record clicks, and the expiry so a cached entry can
/// answer 410 without a database round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedRedirect {
    pub link_id: Uuid,
    pub url: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait RedirectCacheManager {
    /// Cache lookup; `None` is a miss. Transport failures degrade to a miss
    /// so the database can still serve the redirect.
    async fn get_cached(&self, short_code: &str) -> Option<CachedRedirect>;

    async fn cache_redirect(
        &self,
        short_code: &str,
        redirect: &CachedRedirect,
        ttl_seconds: Option<u64>,
    ) -> Result<(), CustomRedisError>;

    /// Drops the entry from both tiers, called when a link is edited or
    /// deleted.
    async fn invalidate(&self, short_code: &str) -> Result<(), CustomRedisError>;
}

pub struct TieredRedirectCache {
    redis_client: Arc<dyn RedisClient + Send + Sync>,
    default_ttl_seconds: u64,
    local_cache: Cache<String, CachedRedirect>,
}

impl TieredRedirectCache {
    pub fn new(redis_client: Arc<dyn RedisClient + Send + Sync>, ttl_seconds: Option<u64>) -> Self {
        let default_ttl_seconds = ttl_seconds.unwrap_or(DEFAULT_CACHE_TTL_SECONDS);
        let local_cache: Cache<String, CachedRedirect> = Cache::builder()
            .name("redirect_cache")
            .max_capacity(LOCAL_CACHE_MAX_WEIGHT)
            // Weigh entries by key and URL length so that long URLs are
            // evicted first, maximizing how many links fit in the tier.
            .weigher(|key: &String, value: &CachedRedirect| -> u32 {
                (key.len() + value.url.len()).try_into().unwrap_or(u32::MAX)
            })
            .time_to_live(Duration::from_secs(default_ttl_seconds))
            .eviction_listener(|_key, _value, cause| {
                counter!(
                    CACHE_EVICTIONS_TOTAL,
                    &[
                        ("cache_type", "local".to_string()),
                        ("reason", format!("{:?}", cause)),
                    ]
                )
                .increment(1);
            })
            .build();

        Self {
            redis_client,
            default_ttl_seconds,
            local_cache,
        }
    }

    pub fn redis_key(short_code: &str) -> String {
        format!("shortly:redirect:{}", short_code)
    }

    /// Caps the TTL so a cache entry can never outlive the link's expiry.
    fn effective_ttl(&self, redirect: &CachedRedirect, requested: Option<u64>) -> Option<u64> {
        let ttl = requested.unwrap_or(self.default_ttl_seconds);
        match redirect.expires_at {
            None => Some(ttl),
            Some(expires_at) => {
                let remaining = (expires_at - Utc::now()).num_seconds();
                if remaining <= 1 {
                    None
                } else {
                    Some(ttl.min(remaining as u64))
                }
            }
        }
    }

    fn hit(&self, tier: &'static str) {
        counter!(CACHE_HITS_TOTAL, &[("cache_type", tier.to_string())]).increment(1);
    }

    fn miss(&self, tier: &'static str) {
        counter!(CACHE_MISSES_TOTAL, &[("cache_type", tier.to_string())]).increment(1);
    }
}

#[async_trait]
impl RedirectCacheManager for TieredRedirectCache {
    async fn get_cached(&self, short_code: &str) -> Option<CachedRedirect> {
        // Try the local tier first
        if let Some(redirect) = self.local_cache.get(short_code).await {
            self.hit("local");
            tracing::debug!("local cache hit for {}", short_code);
            return Some(redirect);
        }
        self.miss("local");

        match self.redis_client.get(Self::redis_key(short_code)).await {
            Ok(raw) => match serde_json::from_str::<CachedRedirect>(&raw) {
                Ok(redirect) => {
                    self.hit("redis");
                    // Populate the local tier for future requests
                    self.local_cache
                        .insert(short_code.to_string(), redirect.clone())
                        .await;
                    Some(redirect)
                }
                Err(err) => {
                    tracing::warn!("dropping unparseable cache entry for {short_code}: {err}");
                    None
                }
            },
            Err(CustomRedisError::NotFound) => {
                self.miss("redis");
                None
            }
            Err(err) => {
                // Degrade to a miss; the database still serves the redirect
                tracing::warn!("redis error reading cache for {short_code}: {err}");
                None
            }
        }
    }

    async fn cache_redirect(
        &self,
        short_code: &str,
        redirect: &CachedRedirect,
        ttl_seconds: Option<u64>,
    ) -> Result<(), CustomRedisError> {
        let Some(ttl) = self.effective_ttl(redirect, ttl_seconds) else {
            // Expires too soon to be worth caching
            return Ok(());
        };

        let payload = serde_json::to_string(redirect)
            .map_err(|e| CustomRedisError::ParseError(e.to_string()))?;
        self.redis_client
            .setex(Self::redis_key(short_code), payload, ttl)
            .await?;
        self.local_cache
            .insert(short_code.to_string(), redirect.clone())
            .await;
        Ok(())
    }

    async fn invalidate(&self, short_code: &str) -> Result<(), CustomRedisError> {
        self.local_cache.invalidate(short_code).await;
        self.redis_client.del(Self::redis_key(short_code)).await
    }
}
