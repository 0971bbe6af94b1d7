use chrono::{DateTime, Utc};
use sqlx::Connection;
use tracing::instrument;
use uuid::Uuid;

use common_database::PostgresReader;

use crate::api::errors::ApiError;
use crate::api::types::OwnerStats;
use crate::links::model::{LinkRow, NewLink};

const LINK_COLUMNS: &str = "id, short_code, target_url, owner_id, custom_alias, is_public, \
     is_active, expires_at, click_count, last_accessed_at, created_at, updated_at";

/// Sort keys accepted by the dashboard listing; anything else falls back to
/// creation time.
fn sort_column(requested: &str) -> &'static str {
    match requested {
        "click_count" => "click_count",
        "last_accessed_at" => "last_accessed_at",
        _ => "created_at",
    }
}

pub struct ListParams {
    pub page: u32,
    pub limit: u32,
    pub sort_by: String,
    pub sort_order: String,
    pub search: String,
}

/// True when `code` is already taken, either as a generated short code or as
/// a custom alias. Both live in the same namespace.
#[instrument(skip(db))]
pub async fn code_in_use(db: PostgresReader, code: &str) -> Result<bool, ApiError> {
    let mut conn = db.get_connection().await?;
    let taken: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM shortly_link WHERE short_code = $1 OR custom_alias = $1)",
    )
    .bind(code)
    .fetch_one(&mut *conn)
    .await?;
    Ok(taken)
}

/// Like [`code_in_use`], but ignoring one row (the link being edited).
#[instrument(skip(db))]
pub async fn alias_in_use_by_other(
    db: PostgresReader,
    alias: &str,
    exclude_id: Uuid,
) -> Result<bool, ApiError> {
    let mut conn = db.get_connection().await?;
    let taken: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM shortly_link \
         WHERE (short_code = $1 OR custom_alias = $1) AND id <> $2)",
    )
    .bind(alias)
    .bind(exclude_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(taken)
}

/// Inserts a link row. Unique-index violations come back as
/// `ApiError::Database`; callers decide whether to retry (generated codes)
/// or surface a conflict (aliases).
#[instrument(skip(db, link), fields(short_code = %link.short_code))]
pub async fn create_link(db: PostgresReader, link: NewLink) -> Result<LinkRow, ApiError> {
    let mut conn = db.get_connection().await?;
    let query = format!(
        "INSERT INTO shortly_link \
         (id, short_code, target_url, owner_id, custom_alias, is_public, expires_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING {LINK_COLUMNS}"
    );
    let row = sqlx::query_as::<_, LinkRow>(&query)
        .bind(Uuid::new_v4())
        .bind(&link.short_code)
        .bind(&link.target_url)
        .bind(link.owner_id)
        .bind(&link.custom_alias)
        .bind(link.is_public)
        .bind(link.expires_at)
        .fetch_one(&mut *conn)
        .await?;
    Ok(row)
}

/// Resolves an active link by short code or custom alias.
#[instrument(skip(db))]
pub async fn fetch_active(db: PostgresReader, code: &str) -> Result<Option<LinkRow>, ApiError> {
    let mut conn = db.get_connection().await?;
    let query = format!(
        "SELECT {LINK_COLUMNS} FROM shortly_link \
         WHERE (short_code = $1 OR custom_alias = $1) AND is_active"
    );
    let row = sqlx::query_as::<_, LinkRow>(&query)
        .bind(code)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row)
}

/// Resolves a link owned by `owner_id`, regardless of its active flag.
#[instrument(skip(db))]
pub async fn fetch_for_owner(
    db: PostgresReader,
    owner_id: Uuid,
    code: &str,
) -> Result<Option<LinkRow>, ApiError> {
    let mut conn = db.get_connection().await?;
    let query = format!(
        "SELECT {LINK_COLUMNS} FROM shortly_link \
         WHERE (short_code = $1 OR custom_alias = $1) AND owner_id = $2"
    );
    let row = sqlx::query_as::<_, LinkRow>(&query)
        .bind(code)
        .bind(owner_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row)
}

/// Records one redirect: visit row append plus counter bump, in a single
/// transaction so the visit log and click_count cannot diverge.
#[instrument(skip(db))]
pub async fn record_visit(db: PostgresReader, link_id: Uuid) -> Result<(), ApiError> {
    let mut conn = db.get_connection().await?;
    let mut tx = conn.begin().await?;

    sqlx::query("INSERT INTO shortly_visit (link_id, visited_at) VALUES ($1, now())")
        .bind(link_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        "UPDATE shortly_link \
         SET click_count = click_count + 1, last_accessed_at = now(), updated_at = now() \
         WHERE id = $1",
    )
    .bind(link_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

#[instrument(skip(db))]
pub async fn visits_for_link(
    db: PostgresReader,
    link_id: Uuid,
) -> Result<Vec<DateTime<Utc>>, ApiError> {
    let mut conn = db.get_connection().await?;
    let visits = sqlx::query_scalar(
        "SELECT visited_at FROM shortly_visit WHERE link_id = $1 ORDER BY visited_at",
    )
    .bind(link_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(visits)
}

/// Pages through an owner's active links with optional substring search over
/// target URL, short code, and alias.
#[instrument(skip(db, params))]
pub async fn list_for_owner(
    db: PostgresReader,
    owner_id: Uuid,
    params: &ListParams,
) -> Result<(Vec<LinkRow>, i64), ApiError> {
    let sort = sort_column(&params.sort_by);
    let direction = if params.sort_order.eq_ignore_ascii_case("asc") {
        "ASC"
    } else {
        "DESC"
    };
    let pattern = format!("%{}%", params.search);
    let offset = i64::from(params.page - 1) * i64::from(params.limit);

    let mut conn = db.get_connection().await?;

    let query = format!(
        "SELECT {LINK_COLUMNS} FROM shortly_link \
         WHERE owner_id = $1 AND is_active \
           AND ($2 = '' OR target_url ILIKE $3 OR short_code ILIKE $3 OR custom_alias ILIKE $3) \
         ORDER BY {sort} {direction} NULLS LAST \
         LIMIT $4 OFFSET $5"
    );
    let rows = sqlx::query_as::<_, LinkRow>(&query)
        .bind(owner_id)
        .bind(&params.search)
        .bind(&pattern)
        .bind(i64::from(params.limit))
        .bind(offset)
        .fetch_all(&mut *conn)
        .await?;

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM shortly_link \
         WHERE owner_id = $1 AND is_active \
           AND ($2 = '' OR target_url ILIKE $3 OR short_code ILIKE $3 OR custom_alias ILIKE $3)",
    )
    .bind(owner_id)
    .bind(&params.search)
    .bind(&pattern)
    .fetch_one(&mut *conn)
    .await?;

    Ok((rows, total))
}

#[instrument(skip(db))]
pub async fn update_link(
    db: PostgresReader,
    link_id: Uuid,
    custom_alias: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    is_public: bool,
) -> Result<LinkRow, ApiError> {
    let mut conn = db.get_connection().await?;
    let query = format!(
        "UPDATE shortly_link \
         SET custom_alias = $2, expires_at = $3, is_public = $4, updated_at = now() \
         WHERE id = $1 \
         RETURNING {LINK_COLUMNS}"
    );
    let row = sqlx::query_as::<_, LinkRow>(&query)
        .bind(link_id)
        .bind(custom_alias)
        .bind(expires_at)
        .bind(is_public)
        .fetch_one(&mut *conn)
        .await?;
    Ok(row)
}

/// Soft delete; reports whether a row belonging to the owner matched.
#[instrument(skip(db))]
pub async fn soft_delete(
    db: PostgresReader,
    owner_id: Uuid,
    code: &str,
) -> Result<bool, ApiError> {
    let mut conn = db.get_connection().await?;
    let result = sqlx::query(
        "UPDATE shortly_link SET is_active = FALSE, updated_at = now() \
         WHERE (short_code = $1 OR custom_alias = $1) AND owner_id = $2",
    )
    .bind(code)
    .bind(owner_id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Soft-deletes the owner's active links among `codes`, returning how many
/// rows changed.
#[instrument(skip(db, codes), fields(count = codes.len()))]
pub async fn bulk_soft_delete(
    db: PostgresReader,
    owner_id: Uuid,
    codes: &[String],
) -> Result<u64, ApiError> {
    let mut conn = db.get_connection().await?;
    let result = sqlx::query(
        "UPDATE shortly_link SET is_active = FALSE, updated_at = now() \
         WHERE short_code = ANY($1) AND owner_id = $2 AND is_active",
    )
    .bind(codes)
    .bind(owner_id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

/// Cache keys that may reference the owner's links among `codes`; fetched
/// before a bulk delete so stale redirect entries can be dropped.
#[instrument(skip(db, codes))]
pub async fn codes_and_aliases_for_owner(
    db: PostgresReader,
    owner_id: Uuid,
    codes: &[String],
) -> Result<Vec<(String, Option<String>)>, ApiError> {
    let mut conn = db.get_connection().await?;
    let rows: Vec<(String, Option<String>)> = sqlx::query_as(
        "SELECT short_code, custom_alias FROM shortly_link \
         WHERE short_code = ANY($1) AND owner_id = $2",
    )
    .bind(codes)
    .bind(owner_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

#[instrument(skip(db))]
pub async fn owner_stats(db: PostgresReader, owner_id: Uuid) -> Result<OwnerStats, ApiError> {
    let mut conn = db.get_connection().await?;
    let stats = sqlx::query_as::<_, OwnerStats>(
        "SELECT COUNT(*) AS total_links, \
                COALESCE(SUM(click_count), 0)::bigint AS total_clicks, \
                COALESCE(AVG(click_count), 0)::float8 AS avg_clicks_per_link, \
                MAX(created_at) AS most_recent_link \
         FROM shortly_link WHERE owner_id = $1 AND is_active",
    )
    .bind(owner_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(stats)
}
