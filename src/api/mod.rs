//! HTTP boundary.
//!
//! Flow Overview:
//! 1) Every request gets an `x-request-id` (ULID when absent) and a trace span.
//! 2) `establish_context` resolves the client IP and bearer token into a
//!    `RequestContext` extension.
//! 3) Guarded routes run their own rate-limit policy, then, where guests are
//!    accepted, the guest opt-in.
//! 4) Handlers map component results to JSON and cookies.

use anyhow::Result;
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    middleware::from_fn_with_state,
    routing::{get, post, MethodRouter},
    Extension, Router,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;

use crate::{
    client_ip::ClientIpResolver,
    guest::GuestResolver,
    oauth::OAuthLogin,
    rate_limit::{Quota, RateLimitPolicy, RateLimitQuotas, RateLimiter},
    rotation::RefreshRotation,
};

pub mod cookies;
pub mod error;
pub mod handlers;
pub mod middleware;
mod openapi;


pub use openapi::openapi;

use handlers::{auth, health, me};
use middleware::{allow_guest, enforce_rate_limit, establish_context, RateLimitLayerState};

/// Transport settings that do not belong to any single component.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub cookie_secure: bool,
    pub quotas: RateLimitQuotas,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            cookie_secure: true,
            quotas: RateLimitQuotas::default(),
        }
    }
}

impl ApiConfig {
    #[must_use]
    pub fn with_cookie_secure(mut self, cookie_secure: bool) -> Self {
        self.cookie_secure = cookie_secure;
        self
    }

    #[must_use]
    pub fn with_quotas(mut self, quotas: RateLimitQuotas) -> Self {
        self.quotas = quotas;
        self
    }
}

/// Components shared by every request.
pub struct AppState {
    pub rotation: Arc<RefreshRotation>,
    pub login: OAuthLogin,
    pub limiter: RateLimiter,
    pub ip_resolver: ClientIpResolver,
    pub guests: GuestResolver,
    pub config: ApiConfig,
}

fn rate_limited(
    route: MethodRouter,
    state: &AppState,
    name: &'static str,
    quota: Quota,
) -> MethodRouter {
    let layer_state = RateLimitLayerState {
        limiter: state.limiter.clone(),
        policy: RateLimitPolicy::new(name, quota),
    };
    route.layer(from_fn_with_state(layer_state, enforce_rate_limit))
}

/// Build the application router.
///
/// Layers added last run first: the request id and trace span wrap
/// `establish_context`, which wraps the per-route rate limit, which wraps the
/// guest opt-in.
pub fn router(state: Arc<AppState>) -> Router {
    let quotas = state.config.quotas;

    let whoami = get(me::whoami).layer(from_fn_with_state(state.clone(), allow_guest));

    Router::new()
        .route("/api/v1/health", get(health::health))
        .route("/api/v1/status", get(health::status))
        .route("/api/v1/openapi.json", get(openapi::openapi_json))
        .route(
            "/api/v1/auth/oauth/:provider/authorize",
            rate_limited(
                get(auth::authorize),
                &state,
                "oauth_authorize",
                quotas.authorize,
            ),
        )
        .route(
            "/api/v1/auth/oauth/:provider/callback",
            rate_limited(
                get(auth::callback),
                &state,
                "oauth_callback",
                quotas.callback,
            ),
        )
        .route(
            "/api/v1/auth/refresh",
            rate_limited(post(auth::refresh), &state, "refresh", quotas.refresh),
        )
        .route(
            "/api/v1/me",
            rate_limited(get(me::me), &state, "me", quotas.default),
        )
        .route(
            "/api/v1/whoami",
            rate_limited(whoami, &state, "whoami", quotas.default),
        )
        .layer(from_fn_with_state(state.clone(), establish_context))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(state)),
        )
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

/// Start the server
/// # Errors
/// Return error if failed to bind or serve
pub async fn serve(port: u16, state: Arc<AppState>) -> Result<()> {
    let app = router(state);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Gracefully shutdown");
        }
    })
    .await?;

    Ok(())
}
