//! Caller identity carried explicitly through each request.
//!
//! Flow Overview: the context middleware resolves the client address and any
//! bearer token into a [`RequestContext`]; routes that opt in may upgrade an
//! anonymous caller to a guest. Handlers, the rate limiter and request logging
//! all read the same value from request extensions.

use std::fmt;
use std::net::IpAddr;
use uuid::Uuid;

use crate::error::{AuthError, UnauthenticatedReason};
use crate::token::Claims;

pub const GUEST_ROLE: &str = "GUEST";

/// Anything that can act on the API: an identifier plus a role-like tag.
pub trait Actor {
    fn actor_id(&self) -> String;
    fn role_tag(&self) -> &str;
    /// Short label used when composing keys, e.g. `user`.
    fn kind(&self) -> &'static str;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserPrincipal {
    pub user_id: Uuid,
    pub role: String,
}

impl UserPrincipal {
    /// Build a principal from verified access-token claims.
    ///
    /// Returns `None` when the subject is not a UUID.
    #[must_use]
    pub fn from_claims(claims: &Claims) -> Option<Self> {
        let user_id = Uuid::parse_str(&claims.sub).ok()?;
        Some(Self {
            user_id,
            role: claims.role.clone(),
        })
    }
}

impl Actor for UserPrincipal {
    fn actor_id(&self) -> String {
        self.user_id.to_string()
    }

    fn role_tag(&self) -> &str {
        &self.role
    }

    fn kind(&self) -> &'static str {
        "user"
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuestPrincipal {
    pub guest_id: Uuid,
}

impl Actor for GuestPrincipal {
    fn actor_id(&self) -> String {
        self.guest_id.to_string()
    }

    fn role_tag(&self) -> &str {
        GUEST_ROLE
    }

    fn kind(&self) -> &'static str {
        "guest"
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Principal {
    User(UserPrincipal),
    Guest(GuestPrincipal),
    #[default]
    Anonymous,
}

impl Principal {
    #[must_use]
    pub fn actor(&self) -> Option<&dyn Actor> {
        match self {
            Self::User(user) => Some(user),
            Self::Guest(guest) => Some(guest),
            Self::Anonymous => None,
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::User(_))
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.actor() {
            Some(actor) => write!(f, "{}:{}", actor.kind(), actor.actor_id()),
            None => write!(f, "anonymous"),
        }
    }
}

/// Per-request identity established at the transport boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    pub client_ip: IpAddr,
    pub principal: Principal,
}

impl RequestContext {
    #[must_use]
    pub fn anonymous(client_ip: IpAddr) -> Self {
        Self {
            client_ip,
            principal: Principal::Anonymous,
        }
    }

    /// The authenticated user, or `Unauthenticated` for guests and anonymous callers.
    ///
    /// # Errors
    /// Returns `Unauthenticated(AuthenticationRequired)` when no user is present.
    pub fn require_user(&self) -> Result<&UserPrincipal, AuthError> {
        match &self.principal {
            Principal::User(user) => Ok(user),
            _ => Err(AuthError::unauthenticated(
                UnauthenticatedReason::AuthenticationRequired,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{Audience, TokenType};

    fn claims(sub: &str) -> Claims {
        Claims {
            sub: sub.to_string(),
            role: "ADMIN".to_string(),
            iss: "vocawik".to_string(),
            aud: Audience::One("vocawik-api".to_string()),
            iat: 0,
            exp: 60,
            typ: TokenType::Access,
            fid: None,
            jti: None,
        }
    }

    #[test]
    fn user_principal_requires_uuid_subject() {
        let id = Uuid::new_v4();
        let user = UserPrincipal::from_claims(&claims(&id.to_string()));
        assert_eq!(
            user,
            Some(UserPrincipal {
                user_id: id,
                role: "ADMIN".to_string()
            })
        );
        assert_eq!(UserPrincipal::from_claims(&claims("not-a-uuid")), None);
    }

    #[test]
    fn users_and_guests_share_the_actor_capability() {
        let user = Principal::User(UserPrincipal {
            user_id: Uuid::nil(),
            role: "USER".to_string(),
        });
        let guest = Principal::Guest(GuestPrincipal {
            guest_id: Uuid::nil(),
        });

        let tags: Vec<_> = [&user, &guest]
            .iter()
            .filter_map(|principal| principal.actor().map(|actor| actor.role_tag().to_string()))
            .collect();
        assert_eq!(tags, vec!["USER".to_string(), GUEST_ROLE.to_string()]);
        assert_eq!(
            guest.to_string(),
            "guest:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(Principal::Anonymous.to_string(), "anonymous");
        assert!(user.is_authenticated());
        assert!(!guest.is_authenticated());
    }

    #[test]
    fn require_user_rejects_guests() {
        let ip = IpAddr::from([127, 0, 0, 1]);
        let mut context = RequestContext::anonymous(ip);
        assert!(context.require_user().is_err());

        context.principal = Principal::Guest(GuestPrincipal {
            guest_id: Uuid::nil(),
        });
        assert!(context.require_user().is_err());

        context.principal = Principal::User(UserPrincipal {
            user_id: Uuid::nil(),
            role: "USER".to_string(),
        });
        assert!(context.require_user().is_ok());
    }
}
