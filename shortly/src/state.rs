use anyhow::Result;
use std::{sync::Arc, time::Duration};

use common_database::{get_pool, PostgresReader};
use common_redis::RedisClient;
use health::{HealthHandle, HealthRegistry};

use crate::auth::token::TokenIssuer;
use crate::config::Config;
use crate::limits::RateLimits;
use crate::links::cache::{RedirectCacheManager, TieredRedirectCache};

#[derive(Clone)]
pub struct AppState {
    pub db: PostgresReader,
    pub redirect_cache: Arc<dyn RedirectCacheManager + Send + Sync>,
    pub tokens: Arc<TokenIssuer>,
    pub limits: Arc<RateLimits>,
    pub liveness: Arc<HealthRegistry>,
    pub public_origin: String,
    pub allowed_origins: Vec<String>,
    pub secure_cookies: bool,
    pub enable_metrics: bool,
}

impl AppState {
    pub async fn from_config(config: &Config) -> Result<Self> {
        let redis_client = match RedisClient::new(config.redis_url.clone()).await {
            Ok(client) => Arc::new(client),
            Err(e) => {
                tracing::error!("Failed to create Redis client: {}", e);
                return Err(anyhow::anyhow!("Failed to create Redis client: {}", e));
            }
        };

        let pool = match get_pool(&config.database_url, config.max_pg_connections).await {
            Ok(pool) => {
                tracing::info!("Successfully created Postgres pool");
                pool
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    url = %config.database_url,
                    max_connections = config.max_pg_connections,
                    "Failed to create Postgres pool"
                );
                return Err(anyhow::anyhow!("Failed to create Postgres pool: {}", e));
            }
        };

        if config.run_migrations {
            sqlx::migrate!("./migrations").run(&pool).await?;
        }
        let db: PostgresReader = Arc::new(pool);

        let health = Arc::new(HealthRegistry::new("liveness"));
        let simple_loop = health
            .register("simple_loop".to_string(), Duration::from_secs(30))
            .await;
        tokio::spawn(liveness_loop(simple_loop));

        let redirect_cache = Arc::new(TieredRedirectCache::new(
            redis_client,
            Some(config.redirect_cache_ttl_seconds),
        ));

        Ok(AppState {
            db,
            redirect_cache,
            tokens: Arc::new(TokenIssuer::from_config(config)),
            limits: Arc::new(RateLimits::from_config(config)?),
            liveness: health,
            public_origin: config.public_origin.clone(),
            allowed_origins: config.allowed_origins(),
            secure_cookies: config.secure_cookies,
            enable_metrics: config.enable_metrics,
        })
    }
}

async fn liveness_loop(handle: HealthHandle) {
    loop {
        handle.report_healthy().await;
        tokio::time::sleep(std::time::Duration::from_secs(10)).await;
    }
}
