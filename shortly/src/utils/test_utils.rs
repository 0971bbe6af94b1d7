use std::sync::Arc;

use anyhow::{Error, Result};
use chrono::{DateTime, Utc};
use common_database::{get_pool, Client};
use once_cell::sync::Lazy;
use rand::{distributions::Alphanumeric, Rng};

use crate::auth::password::hash_password;
use crate::config::Config;
use crate::links::model::{LinkRow, NewLink};
use crate::links::store::create_link;
use crate::users::model::UserRow;
use crate::users::store::create_user;

pub static DEFAULT_TEST_CONFIG: Lazy<Config> = Lazy::new(Config::default_for_test);

pub async fn setup_pg_client(config: Option<&Config>) -> Arc<dyn Client + Send + Sync> {
    let config = config.unwrap_or(&DEFAULT_TEST_CONFIG);
    let pool = get_pool(&config.database_url, config.max_pg_connections)
        .await
        .expect("Failed to create Postgres client");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");
    Arc::new(pool)
}

pub fn random_string(prefix: &str, length: usize) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(Alphanumeric)
        .take(length)
        .map(char::from)
        .collect();
    format!("{}{}", prefix, suffix)
}

pub async fn insert_new_user_in_pg(
    db_client: Arc<dyn Client + Send + Sync>,
) -> Result<UserRow, Error> {
    let email = format!("{}@example.com", random_string("user", 10)).to_lowercase();
    let password_hash =
        hash_password("integration-test-password").map_err(|e| anyhow::anyhow!("{e}"))?;
    let user = create_user(db_client, "Test User", &email, &password_hash)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    Ok(user)
}

pub async fn insert_new_link_in_pg(
    db_client: Arc<dyn Client + Send + Sync>,
    owner_id: Option<uuid::Uuid>,
    expires_at: Option<DateTime<Utc>>,
) -> Result<LinkRow, Error> {
    let link = create_link(
        db_client,
        NewLink {
            short_code: random_string("", 8),
            target_url: "https://example.com".to_string(),
            owner_id,
            custom_alias: None,
            is_public: false,
            expires_at,
        },
    )
    .await
    .map_err(|e| anyhow::anyhow!("{e}"))?;
    Ok(link)
}
