//! Request pipeline stages.
//!
//! Flow Overview:
//! 1) `establish_context` runs for every request: it resolves the client IP
//!    and verifies a bearer access token, if any, into a [`RequestContext`].
//! 2) `enforce_rate_limit` runs per route with the route's [`RateLimitPolicy`].
//! 3) `allow_guest` runs on routes that accept guests and upgrades an
//!    anonymous caller without credentials to a guest principal.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
};
use tracing::{debug, warn};

use super::{cookies::extract_bearer_token, AppState};
use crate::{
    principal::{GuestPrincipal, Principal, RequestContext, UserPrincipal},
    rate_limit::{scope_key, RateLimitPolicy, RateLimiter},
    token::TokenType,
};

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Attach a [`RequestContext`] to the request extensions.
pub async fn establish_context(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    mut request: Request,
    next: Next,
) -> Response {
    let forwarded_for = request
        .headers()
        .get(X_FORWARDED_FOR)
        .and_then(|value| value.to_str().ok());
    let client_ip = state.ip_resolver.resolve(peer.ip(), forwarded_for);

    let mut context = RequestContext::anonymous(client_ip);
    if let Some(token) = extract_bearer_token(request.headers()) {
        match state.rotation.codec().verify(&token, TokenType::Access) {
            Ok(claims) => match UserPrincipal::from_claims(&claims) {
                Some(user) => context.principal = Principal::User(user),
                None => warn!("Ignoring access token with non-UUID subject"),
            },
            Err(err) => debug!("Bearer token rejected: {err}"),
        }
    }

    request.extensions_mut().insert(context);
    next.run(request).await
}

/// State for one rate-limited route.
#[derive(Clone, Debug)]
pub struct RateLimitLayerState {
    pub limiter: RateLimiter,
    pub policy: RateLimitPolicy,
}

/// Count the request against its route quota; reject with 429 when exhausted.
pub async fn enforce_rate_limit(
    State(layer): State<RateLimitLayerState>,
    request: Request,
    next: Next,
) -> Response {
    let context = request
        .extensions()
        .get::<RequestContext>()
        .cloned()
        .unwrap_or_else(|| RequestContext::anonymous(Ipv4Addr::UNSPECIFIED.into()));
    let key = scope_key(request.method().as_str(), request.uri().path(), &context);

    match layer.limiter.acquire(&key, layer.policy.quota).await {
        Ok(()) => next.run(request).await,
        Err(err) => {
            debug!(policy = layer.policy.name, "Request rejected by rate limit");
            err.into_response()
        }
    }
}

/// Resolve a guest identity for anonymous callers on routes that accept guests.
pub async fn allow_guest(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let has_credentials = request.headers().contains_key(AUTHORIZATION);
    let Some(context) = request.extensions_mut().get_mut::<RequestContext>() else {
        return next.run(request).await;
    };

    if context.principal == Principal::Anonymous && !has_credentials {
        match state.guests.resolve_or_create(context.client_ip).await {
            Ok(guest) => {
                context.principal = Principal::Guest(GuestPrincipal { guest_id: guest.id });
            }
            Err(err) => return err.into_response(),
        }
    }

    next.run(request).await
}
