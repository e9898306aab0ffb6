//! Fixed-window rate limiting over the shared store.
//!
//! Keys follow `rate_limit:{METHOD}:{path}:{actor}:{auth|anon}` where the actor
//! is `user:<id>` for an authenticated caller and `ip:<addr>` otherwise, so
//! authenticated and anonymous traffic never share a bucket.
//!
//! Scaling: counters live in the shared store, so the limit holds across all
//! instances that share it.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

use crate::error::AuthError;
use crate::principal::RequestContext;
use crate::store::SharedStore;

/// `requests` admitted per `window`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Quota {
    pub requests: u64,
    pub window: Duration,
}

impl Quota {
    #[must_use]
    pub const fn per_seconds(requests: u64, seconds: u64) -> Self {
        Self {
            requests,
            window: Duration::from_secs(seconds),
        }
    }
}

impl FromStr for Quota {
    type Err = String;

    /// Parse `requests/seconds`, e.g. `20/60`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (requests, seconds) = raw
            .trim()
            .split_once('/')
            .ok_or_else(|| format!("expected requests/seconds, got '{raw}'"))?;
        let requests: u64 = requests
            .trim()
            .parse()
            .map_err(|_| format!("invalid request count in '{raw}'"))?;
        let seconds: u64 = seconds
            .trim()
            .parse()
            .map_err(|_| format!("invalid window in '{raw}'"))?;
        if requests == 0 || seconds == 0 {
            return Err(format!("quota '{raw}' must be positive"));
        }
        Ok(Self::per_seconds(requests, seconds))
    }
}

impl fmt::Display for Quota {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.requests, self.window.as_secs())
    }
}

/// Declarative per-route limit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub name: &'static str,
    pub quota: Quota,
}

impl RateLimitPolicy {
    #[must_use]
    pub const fn new(name: &'static str, quota: Quota) -> Self {
        Self { name, quota }
    }
}

/// Quotas for the guarded operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitQuotas {
    pub authorize: Quota,
    pub callback: Quota,
    pub refresh: Quota,
    pub default: Quota,
}

impl Default for RateLimitQuotas {
    fn default() -> Self {
        Self {
            authorize: Quota::per_seconds(20, 60),
            callback: Quota::per_seconds(10, 60),
            refresh: Quota::per_seconds(30, 60),
            default: Quota::per_seconds(60, 60),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited { retry_after_seconds: u64 },
}

/// Compose the bucket key for a request.
#[must_use]
pub fn scope_key(method: &str, path: &str, context: &RequestContext) -> String {
    let (actor, auth_state) = match context.principal.actor() {
        Some(actor) if context.principal.is_authenticated() => {
            (format!("user:{}", actor.actor_id()), "auth")
        }
        _ => (format!("ip:{}", context.client_ip), "anon"),
    };
    format!(
        "rate_limit:{}:{path}:{actor}:{auth_state}",
        method.to_ascii_uppercase()
    )
}

fn ceil_seconds(duration: Duration) -> u64 {
    let seconds = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        seconds + 1
    } else {
        seconds
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn SharedStore>,
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter").finish_non_exhaustive()
    }
}

impl RateLimiter {
    #[must_use]
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self { store }
    }

    /// Count one request against `key` and decide whether it is admitted.
    pub async fn check(&self, key: &str, quota: Quota) -> RateLimitDecision {
        match self.store.increment(key, quota.window).await {
            Ok(window) if window.count <= quota.requests => RateLimitDecision::Allowed,
            Ok(window) => {
                warn!("Rate limit exceeded: {key}");
                RateLimitDecision::Limited {
                    retry_after_seconds: ceil_seconds(window.resets_in).max(1),
                }
            }
            Err(err) => {
                error!("Failed to update rate limit counter {key}: {err}");
                // Fail closed
                RateLimitDecision::Limited {
                    retry_after_seconds: quota.window.as_secs().max(1),
                }
            }
        }
    }

    /// Admit the request or fail with `QuotaExceeded`.
    ///
    /// # Errors
    /// Returns `QuotaExceeded` when the window is exhausted or the counter
    /// cannot be updated.
    pub async fn acquire(&self, key: &str, quota: Quota) -> Result<(), AuthError> {
        match self.check(key, quota).await {
            RateLimitDecision::Allowed => Ok(()),
            RateLimitDecision::Limited {
                retry_after_seconds,
            } => Err(AuthError::QuotaExceeded {
                retry_after_seconds,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::principal::{GuestPrincipal, Principal, UserPrincipal};
    use crate::store::{MemoryStore, WindowCount};
    use async_trait::async_trait;
    use std::net::IpAddr;
    use uuid::Uuid;

    struct BrokenStore;

    #[async_trait]
    impl SharedStore for BrokenStore {
        async fn exists(&self, _key: &str) -> anyhow::Result<bool> {
            Err(anyhow::anyhow!("store down"))
        }

        async fn create_if_absent(
            &self,
            _key: &str,
            _value: &str,
            _ttl: Duration,
        ) -> anyhow::Result<bool> {
            Err(anyhow::anyhow!("store down"))
        }

        async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("store down"))
        }

        async fn increment(&self, _key: &str, _window: Duration) -> anyhow::Result<WindowCount> {
            Err(anyhow::anyhow!("store down"))
        }
    }

    fn context(principal: Principal) -> RequestContext {
        RequestContext {
            client_ip: IpAddr::from([203, 0, 113, 9]),
            principal,
        }
    }

    #[test]
    fn quota_parses_requests_per_seconds() {
        assert_eq!("20/60".parse::<Quota>(), Ok(Quota::per_seconds(20, 60)));
        assert_eq!(" 5 / 1 ".parse::<Quota>(), Ok(Quota::per_seconds(5, 1)));
        assert!("20".parse::<Quota>().is_err());
        assert!("0/60".parse::<Quota>().is_err());
        assert!("ten/60".parse::<Quota>().is_err());
        assert_eq!(Quota::per_seconds(30, 60).to_string(), "30/60");
    }

    #[test]
    fn scope_key_separates_users_from_anonymous_callers() {
        let user_id = Uuid::nil();
        let user = context(Principal::User(UserPrincipal {
            user_id,
            role: "USER".to_string(),
        }));
        assert_eq!(
            scope_key("post", "/api/v1/auth/refresh", &user),
            format!("rate_limit:POST:/api/v1/auth/refresh:user:{user_id}:auth")
        );

        let anonymous = context(Principal::Anonymous);
        assert_eq!(
            scope_key("GET", "/api/v1/whoami", &anonymous),
            "rate_limit:GET:/api/v1/whoami:ip:203.0.113.9:anon"
        );

        let guest = context(Principal::Guest(GuestPrincipal { guest_id: user_id }));
        assert_eq!(
            scope_key("GET", "/api/v1/whoami", &guest),
            "rate_limit:GET:/api/v1/whoami:ip:203.0.113.9:anon"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn denies_past_quota_until_window_resets() {
        let limiter = RateLimiter::new(Arc::new(MemoryStore::new()));
        let quota = Quota::per_seconds(2, 60);

        assert!(limiter.acquire("k", quota).await.is_ok());
        assert!(limiter.acquire("k", quota).await.is_ok());
        tokio::time::advance(Duration::from_secs(15)).await;
        assert!(matches!(
            limiter.acquire("k", quota).await,
            Err(AuthError::QuotaExceeded {
                retry_after_seconds: 45
            })
        ));
        assert!(limiter.acquire("other", quota).await.is_ok());

        tokio::time::advance(Duration::from_secs(45)).await;
        assert_eq!(limiter.check("k", quota).await, RateLimitDecision::Allowed);
    }

    #[tokio::test]
    async fn store_failure_fails_closed() {
        let limiter = RateLimiter::new(Arc::new(BrokenStore));
        assert_eq!(
            limiter.check("k", Quota::per_seconds(5, 30)).await,
            RateLimitDecision::Limited {
                retry_after_seconds: 30
            }
        );
    }
}
