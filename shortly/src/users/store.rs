use tracing::instrument;
use uuid::Uuid;

use common_database::{is_unique_violation_error, PostgresReader};

use crate::api::errors::ApiError;
use crate::users::model::UserRow;

const USER_COLUMNS: &str = "id, name, email, password_hash, created_at, last_login_at";

/// Inserts a user; the unique index on email turns races into 409s.
#[instrument(skip(db, password_hash))]
pub async fn create_user(
    db: PostgresReader,
    name: &str,
    email: &str,
    password_hash: &str,
) -> Result<UserRow, ApiError> {
    let mut conn = db.get_connection().await?;
    let query = format!(
        "INSERT INTO shortly_user (id, name, email, password_hash) \
         VALUES ($1, $2, $3, $4) \
         RETURNING {USER_COLUMNS}"
    );
    let result = sqlx::query_as::<_, UserRow>(&query)
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .fetch_one(&mut *conn)
        .await;

    match result {
        Ok(row) => Ok(row),
        Err(err) if is_unique_violation_error(&err) => Err(ApiError::EmailTaken),
        Err(err) => Err(err.into()),
    }
}

#[instrument(skip(db))]
pub async fn fetch_by_email(db: PostgresReader, email: &str) -> Result<Option<UserRow>, ApiError> {
    let mut conn = db.get_connection().await?;
    let query = format!("SELECT {USER_COLUMNS} FROM shortly_user WHERE email = $1");
    let row = sqlx::query_as::<_, UserRow>(&query)
        .bind(email)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row)
}

#[instrument(skip(db))]
pub async fn fetch_by_id(db: PostgresReader, id: Uuid) -> Result<Option<UserRow>, ApiError> {
    let mut conn = db.get_connection().await?;
    let query = format!("SELECT {USER_COLUMNS} FROM shortly_user WHERE id = $1");
    let row = sqlx::query_as::<_, UserRow>(&query)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row)
}

#[instrument(skip(db))]
pub async fn touch_last_login(db: PostgresReader, id: Uuid) -> Result<(), ApiError> {
    let mut conn = db.get_connection().await?;
    sqlx::query("UPDATE shortly_user SET last_login_at = now() WHERE id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::{random_string, setup_pg_client};
    use anyhow::Result;

    #[tokio::test]
    async fn test_create_and_fetch_user() -> Result<()> {
        let db = setup_pg_client(None).await;
        let email = format!("{}@example.com", random_string("user", 8)).to_lowercase();

        let created = create_user(db.clone(), "Test User", &email, "$2b$12$hash").await?;
        assert_eq!(created.email, email);
        assert!(created.last_login_at.is_none());

        let by_email = fetch_by_email(db.clone(), &email).await?.unwrap();
        assert_eq!(by_email.id, created.id);

        let by_id = fetch_by_id(db, created.id).await?.unwrap();
        assert_eq!(by_id.email, email);
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() -> Result<()> {
        let db = setup_pg_client(None).await;
        let email = format!("{}@example.com", random_string("dup", 8)).to_lowercase();

        create_user(db.clone(), "First", &email, "$2b$12$hash").await?;
        let err = create_user(db, "Second", &email, "$2b$12$hash")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::EmailTaken));
        Ok(())
    }

    #[tokio::test]
    async fn test_touch_last_login() -> Result<()> {
        let db = setup_pg_client(None).await;
        let email = format!("{}@example.com", random_string("login", 8)).to_lowercase();
        let user = create_user(db.clone(), "Login User", &email, "$2b$12$hash").await?;

        touch_last_login(db.clone(), user.id).await?;
        let fetched = fetch_by_id(db, user.id).await?.unwrap();
        assert!(fetched.last_login_at.is_some());
        Ok(())
    }
}
