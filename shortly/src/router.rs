use axum::{
    http::{HeaderValue, Method, StatusCode},
    routing::{get, post, put},
    Router,
};
use std::future::ready;

use common_metrics::{setup_metrics_recorder, track_metrics};
use tower_http::{
    cors::{AllowHeaders, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::api::account::{login, logout, me, refresh_token, register};
use crate::api::endpoints::{
    bulk_delete, dashboard_stats, dashboard_urls, delete_link, follow_short_link, link_analytics,
    shorten, update_link,
};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    // The SPA talks to the API with credentials, so origins are an explicit
    // list instead of a wildcard.
    let origins: Vec<HeaderValue> = state
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("ignoring unparseable CORS origin {origin}");
                None
            }
        })
        .collect();
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
        .allow_origin(AllowOrigin::list(origins));

    let liveness = state.liveness.clone();
    let status_router = Router::new()
        .route("/_readiness", get(|| ready(StatusCode::OK)))
        .route("/_liveness", get(move || ready(liveness.get_status())));

    let account_router = Router::new()
        .route("/api/user/register", post(register))
        .route("/api/user/login", post(login))
        .route("/api/user/refresh-token", post(refresh_token))
        .route("/api/user/logout", post(logout))
        .route("/api/user/me", get(me));

    let links_api_router = Router::new()
        .route("/api/shorten", post(shorten))
        .route("/api/analytics/:short_code", get(link_analytics))
        .route("/api/dashboard/urls", get(dashboard_urls))
        .route("/api/dashboard/stats", get(dashboard_stats))
        .route("/api/urls/bulk-delete", post(bulk_delete))
        .route(
            "/api/urls/:short_code",
            put(update_link).delete(delete_link),
        );

    let redirect_router = Router::new().route("/:short_code", get(follow_short_link));

    let enable_metrics = state.enable_metrics;
    let router = Router::new()
        .merge(status_router)
        .merge(account_router)
        .merge(links_api_router)
        .merge(redirect_router)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(track_metrics))
        .layer(cors)
        .with_state(state);

    if enable_metrics {
        let recorder_handle = setup_metrics_recorder();
        router.route("/metrics", get(move || ready(recorder_handle.render())))
    } else {
        router
    }
}
