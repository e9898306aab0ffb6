//! Error taxonomy shared by the session-security components.
//!
//! Every component returns these as typed results; the HTTP boundary in
//! `api::error` decides the status code and body.

use thiserror::Error;

use crate::token::TokenError;

/// Why a caller could not be authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnauthenticatedReason {
    AuthenticationRequired,
    MissingCredential,
    InvalidToken,
    FamilyRevoked,
    ReuseDetected,
    InvalidOAuthState,
}

impl UnauthenticatedReason {
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::AuthenticationRequired => "Authentication required.",
            Self::MissingCredential | Self::InvalidToken => "Invalid or missing refresh token.",
            Self::FamilyRevoked => "Refresh token family is revoked. Please sign in again.",
            Self::ReuseDetected => "Refresh token reuse detected. Please sign in again.",
            Self::InvalidOAuthState => "Invalid OAuth state.",
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{}", .0.message())]
    Unauthenticated(UnauthenticatedReason),
    #[error("Too many requests. Please try again in {retry_after_seconds} seconds.")]
    QuotaExceeded { retry_after_seconds: u64 },
    #[error("{0}")]
    InvalidRequest(String),
    #[error("upstream dependency failure: {0}")]
    UpstreamDependency(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("storage failure: {0}")]
    Storage(#[source] anyhow::Error),
}

impl AuthError {
    #[must_use]
    pub fn unauthenticated(reason: UnauthenticatedReason) -> Self {
        Self::Unauthenticated(reason)
    }

    /// Returns the reason when this is an authentication failure.
    #[must_use]
    pub fn reason(&self) -> Option<UnauthenticatedReason> {
        match self {
            Self::Unauthenticated(reason) => Some(*reason),
            _ => None,
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(_: TokenError) -> Self {
        Self::Unauthenticated(UnauthenticatedReason::InvalidToken)
    }
}
