use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use common_database::{is_unique_violation_error, PostgresReader};

use crate::api::errors::ApiError;
use crate::api::types::ShortenRequest;
use crate::links::cache::{CachedRedirect, RedirectCacheManager};
use crate::links::generator::generate_short_code;
use crate::links::model::{LinkRow, NewLink};
use crate::links::store;

/// How many generated codes we try before giving up. Collisions on an
/// 8-char base62 code are vanishingly rare, so hitting this limit means
/// something else is wrong.
const MAX_GENERATION_ATTEMPTS: u32 = 5;

/// Creates a short link. With a custom alias the alias is the code and a
/// conflict is an error; without one, generated codes are retried through
/// the unique index until one lands.
pub async fn create_short_link(
    db: PostgresReader,
    request: &ShortenRequest,
    owner_id: Option<Uuid>,
) -> Result<LinkRow, ApiError> {
    if let Some(alias) = &request.custom_alias {
        if store::code_in_use(db.clone(), alias).await? {
            return Err(ApiError::AliasTaken);
        }
        let new_link = NewLink {
            short_code: alias.clone(),
            target_url: request.url.clone(),
            owner_id,
            custom_alias: Some(alias.clone()),
            is_public: request.is_public,
            expires_at: request.expires_at,
        };
        // The pre-check races with concurrent inserts; the unique index is
        // the source of truth.
        return match store::create_link(db, new_link).await {
            Err(ApiError::Database(err)) if is_unique_violation_error(&err) => {
                Err(ApiError::AliasTaken)
            }
            other => other,
        };
    }

    for attempt in 0..MAX_GENERATION_ATTEMPTS {
        let new_link = NewLink {
            short_code: generate_short_code(),
            target_url: request.url.clone(),
            owner_id,
            custom_alias: None,
            is_public: request.is_public,
            expires_at: request.expires_at,
        };
        match store::create_link(db.clone(), new_link).await {
            Err(ApiError::Database(err)) if is_unique_violation_error(&err) => {
                tracing::warn!(attempt, "generated short code collided, retrying");
                continue;
            }
            other => return other,
        }
    }
    Err(ApiError::CodeSpaceExhausted)
}

/// Serves the redirect path: cache tiers first, database on a miss, and the
/// freshly fetched entry goes back into the cache.
pub struct RedirectService {
    db: PostgresReader,
    cache: Arc<dyn RedirectCacheManager + Send + Sync>,
}

impl RedirectService {
    pub fn new(
        db: PostgresReader,
        cache: Arc<dyn RedirectCacheManager + Send + Sync>,
    ) -> Self {
        Self { db, cache }
    }

    pub async fn resolve(&self, short_code: &str) -> Result<CachedRedirect, ApiError> {
        if let Some(redirect) = self.cache.get_cached(short_code).await {
            tracing::debug!("cache hit for {}", short_code);
            if is_expired(&redirect) {
                return Err(ApiError::LinkExpired);
            }
            return Ok(redirect);
        }

        tracing::debug!("cache miss for {}, fetching from database", short_code);
        let row = store::fetch_active(self.db.clone(), short_code)
            .await?
            .ok_or(ApiError::LinkNotFound)?;
        if row.is_expired() {
            return Err(ApiError::LinkExpired);
        }

        let redirect = CachedRedirect {
            link_id: row.id,
            url: row.target_url,
            expires_at: row.expires_at,
        };
        // Log caching errors but still serve the redirect, the primary
        // operation succeeded.
        if let Err(cache_err) = self.cache.cache_redirect(short_code, &redirect, None).await {
            tracing::error!("failed to cache redirect for {short_code}: {cache_err}");
        }
        Ok(redirect)
    }
}

fn is_expired(redirect: &CachedRedirect) -> bool {
    match redirect.expires_at {
        Some(expires_at) => Utc::now() > expires_at,
        None => false,
    }
}
