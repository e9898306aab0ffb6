//! OAuth login and refresh endpoints.
//!
//! Flow Overview:
//! 1) `authorize` issues a CSRF state, stores it in a short-lived cookie and
//!    returns the provider URL carrying the same state.
//! 2) `callback` checks the returned state against the cookie, clears the
//!    cookie either way, completes the login and sets the refresh cookie.
//! 3) `refresh` rotates the refresh cookie and returns a new access token.

use axum::{
    extract::{Extension, Path, Query},
    http::{
        header::{InvalidHeaderValue, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, instrument, warn};
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::{
        cookies::{
            clear_oauth_state_cookie, oauth_state_cookie, read_cookie, refresh_cookie,
            OAUTH_STATE_COOKIE, REFRESH_TOKEN_COOKIE,
        },
        error::{ApiError, ErrorBody},
        AppState,
    },
    csrf,
    error::{AuthError, UnauthenticatedReason},
    oauth::OAuthProvider,
    token::TokenPair,
};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeResponse {
    pub provider: String,
    pub authorize_url: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

impl From<&TokenPair> for TokenResponse {
    fn from(pair: &TokenPair) -> Self {
        Self {
            access_token: pair.access.value.clone(),
            token_type: "Bearer".to_string(),
            expires_in: pair.expires_in(),
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
}

fn cookie_value(
    cookie: Result<HeaderValue, InvalidHeaderValue>,
) -> Result<HeaderValue, AuthError> {
    cookie.map_err(|err| {
        error!("Failed to build cookie: {err}");
        AuthError::InvalidConfiguration("cookie value is not a valid header".to_string())
    })
}

fn with_cookies(mut response: Response, cookies: Vec<HeaderValue>) -> Response {
    for cookie in cookies {
        response.headers_mut().append(SET_COOKIE, cookie);
    }
    response
}

/// The provider named in the path, if this service serves it.
fn supported_provider(state: &AppState, provider: &str) -> Result<OAuthProvider, ApiError> {
    match provider.parse::<OAuthProvider>() {
        Ok(parsed) if parsed == state.login.provider() => Ok(parsed),
        _ => Err(ApiError::BadRequest("Unsupported OAuth provider.".to_string())),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/oauth/{provider}/authorize",
    params(("provider" = String, Path, description = "OAuth provider, e.g. google")),
    responses(
        (status = 200, description = "Provider authorization URL; sets the oauth_state cookie", body = AuthorizeResponse),
        (status = 400, description = "Unsupported provider", body = ErrorBody),
        (status = 429, description = "Too many requests", body = ErrorBody)
    ),
    tag = "auth"
)]
#[instrument(skip_all, fields(provider = %provider))]
pub async fn authorize(
    Path(provider): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let provider = supported_provider(&state, &provider)?;

    let oauth_state = csrf::generate().map_err(AuthError::Storage)?;
    let authorize_url = state.login.build_authorize_url(&oauth_state)?;
    let cookie = cookie_value(oauth_state_cookie(&oauth_state, state.config.cookie_secure))?;

    let body = AuthorizeResponse {
        provider: provider.as_str().to_string(),
        authorize_url,
    };
    Ok(with_cookies(
        (StatusCode::OK, Json(body)).into_response(),
        vec![cookie],
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/oauth/{provider}/callback",
    params(
        ("provider" = String, Path, description = "OAuth provider, e.g. google"),
        CallbackQuery
    ),
    responses(
        (status = 200, description = "Login completed; sets the refresh_token cookie", body = TokenResponse),
        (status = 400, description = "Unsupported provider or missing authorization code", body = ErrorBody),
        (status = 401, description = "Invalid OAuth state", body = ErrorBody),
        (status = 429, description = "Too many requests", body = ErrorBody),
        (status = 502, description = "OAuth provider request failed", body = ErrorBody)
    ),
    tag = "auth"
)]
#[instrument(skip_all, fields(provider = %provider))]
pub async fn callback(
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
    headers: HeaderMap,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Response, ApiError> {
    supported_provider(&state, &provider)?;
    let secure = state.config.cookie_secure;
    let clear_state = cookie_value(clear_oauth_state_cookie(secure))?;

    let expected = read_cookie(&headers, OAUTH_STATE_COOKIE);
    if !csrf::is_valid(expected.as_deref(), query.state.as_deref()) {
        warn!("Invalid OAuth state on callback");
        let response =
            AuthError::unauthenticated(UnauthenticatedReason::InvalidOAuthState).into_response();
        return Ok(with_cookies(response, vec![clear_state]));
    }

    let outcome = match state
        .login
        .login(query.code.as_deref().unwrap_or_default())
        .await
    {
        Ok(outcome) => outcome,
        Err(err) => return Ok(with_cookies(err.into_response(), vec![clear_state])),
    };

    let refresh = cookie_value(refresh_cookie(
        &outcome.tokens.refresh.value,
        state.rotation.codec().refresh_ttl_seconds(),
        secure,
    ))?;
    let body = TokenResponse::from(&outcome.tokens);
    Ok(with_cookies(
        (StatusCode::OK, Json(body)).into_response(),
        vec![clear_state, refresh],
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    responses(
        (status = 200, description = "Rotated; sets a new refresh_token cookie", body = TokenResponse),
        (status = 401, description = "Missing, invalid, revoked or replayed refresh token", body = ErrorBody),
        (status = 429, description = "Too many requests", body = ErrorBody)
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn refresh(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let presented = read_cookie(&headers, REFRESH_TOKEN_COOKIE).unwrap_or_default();
    let tokens = state.rotation.rotate(&presented).await?;

    let cookie = cookie_value(refresh_cookie(
        &tokens.refresh.value,
        state.rotation.codec().refresh_ttl_seconds(),
        state.config.cookie_secure,
    ))?;
    Ok(with_cookies(
        (StatusCode::OK, Json(TokenResponse::from(&tokens))).into_response(),
        vec![cookie],
    ))
}
