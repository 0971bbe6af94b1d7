use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};

use common_database::is_unique_violation_error;

use crate::api::errors::ApiError;
use crate::api::types::{
    validate_alias, validate_short_code_param, ApiResponse, BulkDeleteRequest, BulkDeleteResult,
    DashboardQuery, LinkAnalytics, LinkCreated, LinkDetails, LinkPage, LinkUpdated, Pagination,
    ShortenRequest, UpdateLinkRequest,
};
use crate::auth::extract::{Authenticated, MaybeAuthenticated};
use crate::limits::{ip_key, user_key};
use crate::links::analytics::bucket_visits_by_day;
use crate::links::service::{create_short_link, RedirectService};
use crate::links::store;
use crate::state::AppState;

pub async fn shorten(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    MaybeAuthenticated(viewer): MaybeAuthenticated,
    Json(payload): Json<ShortenRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // Authenticated callers get a wider per-user bucket, anonymous traffic
    // is limited per IP.
    match viewer {
        Some(user_id) => state.limits.shorten_user.check(&user_key(user_id))?,
        None => state.limits.shorten_anon.check(&ip_key(addr.ip()))?,
    }
    payload.validate()?;

    let row = create_short_link(state.db.clone(), &payload, viewer).await?;
    let body = LinkCreated::from_row(&row, &state.public_origin);
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok_with_message(
            "Short link created successfully",
            body,
        )),
    ))
}

pub async fn follow_short_link(
    State(state): State<AppState>,
    Path(short_code): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    validate_short_code_param(&short_code)?;

    let service = RedirectService::new(state.db.clone(), state.redirect_cache.clone());
    let redirect = service.resolve(&short_code).await?;

    // Record the click off the response path; a failed write must not break
    // the redirect.
    let db = state.db.clone();
    let link_id = redirect.link_id;
    tokio::spawn(async move {
        if let Err(err) = store::record_visit(db, link_id).await {
            tracing::error!("failed to record visit for link {link_id}: {err}");
        }
    });

    Ok((StatusCode::FOUND, [(header::LOCATION, redirect.url)]))
}

pub async fn link_analytics(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    MaybeAuthenticated(viewer): MaybeAuthenticated,
    Path(short_code): Path<String>,
) -> Result<Json<ApiResponse<LinkAnalytics>>, ApiError> {
    let bucket = viewer.map(user_key).unwrap_or_else(|| ip_key(addr.ip()));
    state.limits.general.check(&bucket)?;
    validate_short_code_param(&short_code)?;

    let link = store::fetch_active(state.db.clone(), &short_code)
        .await?
        .ok_or(ApiError::LinkNotFound)?;

    // Owners see their own links; everyone else only public ones. Denied
    // and unknown are indistinguishable.
    let is_owner = matches!((link.owner_id, viewer), (Some(owner), Some(v)) if owner == v);
    if !(link.is_public || is_owner) {
        return Err(ApiError::LinkNotFound);
    }

    let visits = store::visits_for_link(state.db.clone(), link.id).await?;
    let daily_clicks = bucket_visits_by_day(&visits);
    let is_expired = link.is_expired();

    Ok(Json(ApiResponse::ok(LinkAnalytics {
        short_code: link.short_code,
        target_url: link.target_url,
        total_clicks: link.click_count,
        created_at: link.created_at,
        last_accessed_at: link.last_accessed_at,
        is_expired,
        expires_at: link.expires_at,
        visit_history: visits,
        daily_clicks,
    })))
}

pub async fn dashboard_urls(
    State(state): State<AppState>,
    Authenticated(user_id): Authenticated,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<ApiResponse<LinkPage>>, ApiError> {
    state.limits.general.check(&user_key(user_id))?;
    query.validate()?;

    let params = store::ListParams {
        page: query.page,
        limit: query.limit,
        sort_by: query.sort_by.clone(),
        sort_order: query.sort_order.clone(),
        search: query.search.clone(),
    };
    let (rows, total) = store::list_for_owner(state.db.clone(), user_id, &params).await?;
    let urls = rows
        .iter()
        .map(|row| LinkDetails::from_row(row, &state.public_origin))
        .collect();

    Ok(Json(ApiResponse::ok(LinkPage {
        urls,
        pagination: Pagination::new(query.page, query.limit, total),
    })))
}

pub async fn dashboard_stats(
    State(state): State<AppState>,
    Authenticated(user_id): Authenticated,
) -> Result<impl IntoResponse, ApiError> {
    state.limits.general.check(&user_key(user_id))?;
    let stats = store::owner_stats(state.db.clone(), user_id).await?;
    Ok(Json(ApiResponse::ok(stats)))
}

pub async fn update_link(
    State(state): State<AppState>,
    Authenticated(user_id): Authenticated,
    Path(short_code): Path<String>,
    Json(payload): Json<UpdateLinkRequest>,
) -> Result<Json<ApiResponse<LinkUpdated>>, ApiError> {
    state.limits.general.check(&user_key(user_id))?;
    validate_short_code_param(&short_code)?;

    let link = store::fetch_for_owner(state.db.clone(), user_id, &short_code)
        .await?
        .ok_or(ApiError::LinkNotFound)?;

    let mut custom_alias = link.custom_alias.clone();
    if let Some(alias) = &payload.custom_alias {
        if alias.is_empty() {
            custom_alias = None;
        } else {
            validate_alias(alias)?;
            if link.custom_alias.as_deref() != Some(alias.as_str())
                && store::alias_in_use_by_other(state.db.clone(), alias, link.id).await?
            {
                return Err(ApiError::AliasTaken);
            }
            custom_alias = Some(alias.clone());
        }
    }

    let mut expires_at = link.expires_at;
    if payload.clear_expiry {
        expires_at = None;
    } else if let Some(new_expiry) = payload.expires_at {
        expires_at = Some(new_expiry);
    }
    let is_public = payload.is_public.unwrap_or(link.is_public);

    // The pre-check races with concurrent alias edits; the unique index has
    // the final word.
    let updated = match store::update_link(
        state.db.clone(),
        link.id,
        custom_alias,
        expires_at,
        is_public,
    )
    .await
    {
        Err(ApiError::Database(err)) if is_unique_violation_error(&err) => {
            return Err(ApiError::AliasTaken)
        }
        other => other?,
    };

    invalidate_cached_redirects(
        &state,
        [
            Some(link.short_code.clone()),
            link.custom_alias.clone(),
            updated.custom_alias.clone(),
        ],
    )
    .await;

    Ok(Json(ApiResponse::ok_with_message(
        "Link updated successfully",
        LinkUpdated {
            short_code: updated.short_code,
            custom_alias: updated.custom_alias,
            expires_at: updated.expires_at,
            is_public: updated.is_public,
        },
    )))
}

pub async fn delete_link(
    State(state): State<AppState>,
    Authenticated(user_id): Authenticated,
    Path(short_code): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.limits.general.check(&user_key(user_id))?;
    validate_short_code_param(&short_code)?;

    let link = store::fetch_for_owner(state.db.clone(), user_id, &short_code)
        .await?
        .ok_or(ApiError::LinkNotFound)?;
    store::soft_delete(state.db.clone(), user_id, &short_code).await?;

    invalidate_cached_redirects(&state, [Some(link.short_code), link.custom_alias]).await;

    Ok(Json(ApiResponse::message("Link deleted successfully")))
}

pub async fn bulk_delete(
    State(state): State<AppState>,
    Authenticated(user_id): Authenticated,
    Json(payload): Json<BulkDeleteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.limits.general.check(&user_key(user_id))?;
    payload.validate()?;

    // Snapshot codes and aliases up front, the rows are unreadable through
    // the redirect path once deactivated.
    let cache_keys =
        store::codes_and_aliases_for_owner(state.db.clone(), user_id, &payload.short_codes)
            .await?;
    let deleted_count =
        store::bulk_soft_delete(state.db.clone(), user_id, &payload.short_codes).await?;

    for (code, alias) in cache_keys {
        invalidate_cached_redirects(&state, [Some(code), alias]).await;
    }

    Ok(Json(ApiResponse::ok_with_message(
        &format!("{deleted_count} links deleted successfully"),
        BulkDeleteResult { deleted_count },
    )))
}

async fn invalidate_cached_redirects(
    state: &AppState,
    codes: impl IntoIterator<Item = Option<String>>,
) {
    for code in codes.into_iter().flatten() {
        if let Err(err) = state.redirect_cache.invalidate(&code).await {
            tracing::warn!("failed to invalidate cached redirect for {code}: {err}");
        }
    }
}
