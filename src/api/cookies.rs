//! Cookies carrying the refresh token and the OAuth state.

use axum::http::{
    header::{InvalidHeaderValue, COOKIE},
    HeaderMap, HeaderValue,
};

pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";
pub const REFRESH_COOKIE_PATH: &str = "/api/v1/auth";
pub const OAUTH_STATE_COOKIE_PATH: &str = "/api/v1/auth/oauth";
pub const OAUTH_STATE_MAX_AGE_SECONDS: u64 = 5 * 60;

fn build(
    name: &str,
    value: &str,
    path: &str,
    same_site: &str,
    max_age: u64,
    secure: bool,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie =
        format!("{name}={value}; Path={path}; HttpOnly; SameSite={same_site}; Max-Age={max_age}");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Refresh token cookie, scoped to the auth endpoints.
pub fn refresh_cookie(
    token: &str,
    max_age: u64,
    secure: bool,
) -> Result<HeaderValue, InvalidHeaderValue> {
    build(
        REFRESH_TOKEN_COOKIE,
        token,
        REFRESH_COOKIE_PATH,
        "Strict",
        max_age,
        secure,
    )
}

pub fn oauth_state_cookie(state: &str, secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
    build(
        OAUTH_STATE_COOKIE,
        state,
        OAUTH_STATE_COOKIE_PATH,
        "Lax",
        OAUTH_STATE_MAX_AGE_SECONDS,
        secure,
    )
}

pub fn clear_oauth_state_cookie(secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
    build(
        OAUTH_STATE_COOKIE,
        "",
        OAUTH_STATE_COOKIE_PATH,
        "Lax",
        0,
        secure,
    )
}

/// Value of the named cookie from the request `Cookie` headers.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let mut parts = pair.trim().splitn(2, '=');
            let key = parts.next().map(str::trim);
            let val = parts.next().map(str::trim);
            if let (Some(key), Some(val)) = (key, val) {
                if key == name && !val.is_empty() {
                    return Some(val.to_string());
                }
            }
        }
    }
    None
}

/// Token from `Authorization: Bearer <token>`.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
