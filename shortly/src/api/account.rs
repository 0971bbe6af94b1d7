use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::api::errors::ApiError;
use crate::api::types::{ApiResponse, AuthSession, LoginRequest, RegisterRequest, UserBody};
use crate::auth::extract::Authenticated;
use crate::auth::password::{hash_password, verify_password};
use crate::limits::ip_key;
use crate::state::AppState;
use crate::users::model::UserRow;
use crate::users::store;

pub const REFRESH_COOKIE: &str = "refresh_token";

/// Login failures answer with this message whether the email is unknown or
/// the password is wrong.
const INVALID_CREDENTIALS: &str = "Invalid email or password";

pub async fn register(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    jar: CookieJar,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.limits.auth.check(&ip_key(addr.ip()))?;
    payload.validate()?;

    let email = payload.email.trim().to_lowercase();
    let password_hash = hash_password(&payload.password)?;
    let user = store::create_user(state.db.clone(), payload.name.trim(), &email, &password_hash)
        .await?;

    let (session, refresh) = issue_session(&state, &user)?;
    let jar = jar.add(refresh_cookie(&state, refresh));
    Ok((
        StatusCode::CREATED,
        jar,
        Json(ApiResponse::ok_with_message(
            "User registered successfully",
            session,
        )),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.limits.auth.check(&ip_key(addr.ip()))?;

    let email = payload.email.trim().to_lowercase();
    let user = store::fetch_by_email(state.db.clone(), &email)
        .await?
        .ok_or_else(|| ApiError::Unauthorized(INVALID_CREDENTIALS.to_string()))?;
    if !verify_password(&payload.password, &user.password_hash) {
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.to_string()));
    }

    store::touch_last_login(state.db.clone(), user.id).await?;

    let (session, refresh) = issue_session(&state, &user)?;
    let jar = jar.add(refresh_cookie(&state, refresh));
    Ok((
        jar,
        Json(ApiResponse::ok_with_message("Login successful", session)),
    ))
}

pub async fn refresh_token(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    let cookie = jar
        .get(REFRESH_COOKIE)
        .ok_or_else(|| ApiError::Unauthorized("Refresh token not found".to_string()))?;
    let claims = state.tokens.verify_refresh(cookie.value())?;

    let user = store::fetch_by_id(state.db.clone(), claims.sub)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User not found".to_string()))?;

    // Rotate both halves of the session
    let (session, refresh) = issue_session(&state, &user)?;
    let jar = jar.add(refresh_cookie(&state, refresh));
    Ok((jar, Json(ApiResponse::ok(session))))
}

pub async fn logout(
    State(_state): State<AppState>,
    Authenticated(_user_id): Authenticated,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    let mut removal = Cookie::from(REFRESH_COOKIE);
    removal.set_path("/");
    Ok((
        jar.remove(removal),
        Json(ApiResponse::message("Logged out successfully")),
    ))
}

pub async fn me(
    State(state): State<AppState>,
    Authenticated(user_id): Authenticated,
) -> Result<Json<ApiResponse<UserBody>>, ApiError> {
    let user = store::fetch_by_id(state.db.clone(), user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User not found".to_string()))?;
    Ok(Json(ApiResponse::ok(UserBody::from_row(&user))))
}

fn issue_session(state: &AppState, user: &UserRow) -> Result<(AuthSession, String), ApiError> {
    let access_token = state.tokens.issue_access(user.id)?;
    let refresh = state.tokens.issue_refresh(user.id)?;
    Ok((
        AuthSession {
            user: UserBody::from_row(user),
            access_token,
        },
        refresh,
    ))
}

fn refresh_cookie(state: &AppState, token: String) -> Cookie<'static> {
    let mut cookie = Cookie::new(REFRESH_COOKIE, token);
    cookie.set_http_only(true);
    cookie.set_secure(state.secure_cookies);
    cookie.set_same_site(SameSite::Strict);
    cookie.set_path("/");
    cookie.set_max_age(time::Duration::seconds(
        state.tokens.refresh_ttl_seconds() as i64
    ));
    cookie
}
