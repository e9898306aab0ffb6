//! OAuth authorization-code login.
//!
//! Flow Overview:
//! 1) `authorize_url` assembles the provider redirect carrying the CSRF state.
//! 2) `login` exchanges the code once (no retry), fetches the profile and maps
//!    it to a local user inside one transaction.
//! 3) The login starts a new refresh family and returns the first token pair.

mod client;

pub use client::{
    GoogleOAuthClient, GoogleOAuthConfig, GOOGLE_AUTH_URI, GOOGLE_TOKEN_URI, GOOGLE_USERINFO_URI,
};

use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info};

use crate::error::AuthError;
use crate::identity::{resolve_local_user, IdentityStore, LocalUser, ProviderProfile};
use crate::rotation::RefreshRotation;
use crate::token::TokenPair;

pub const MISSING_CODE_MESSAGE: &str = "Missing authorization code.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OAuthProvider {
    Google,
}

impl OAuthProvider {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Google => "GOOGLE",
        }
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OAuthProvider {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "google" => Ok(Self::Google),
            other => Err(format!("unsupported oauth provider: {other}")),
        }
    }
}

/// Outbound calls to one identity provider.
#[async_trait]
pub trait OAuthProviderClient: Send + Sync {
    fn provider(&self) -> OAuthProvider;

    /// Provider authorization URL carrying `state`. No network call.
    ///
    /// # Errors
    /// Returns `InvalidConfiguration` if the configured endpoint is not a URL.
    fn authorize_url(&self, state: &str) -> Result<String, AuthError>;

    /// Exchange an authorization code for a provider access token.
    async fn exchange_code(&self, code: &str) -> Result<String, AuthError>;

    /// Fetch the profile behind a provider access token.
    async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile, AuthError>;
}

/// Completed login: the local user and its first token pair.
#[derive(Clone, Debug)]
pub struct LoginOutcome {
    pub user: LocalUser,
    pub tokens: TokenPair,
}

pub struct OAuthLogin {
    client: Arc<dyn OAuthProviderClient>,
    identities: Arc<dyn IdentityStore>,
    rotation: Arc<RefreshRotation>,
}

impl OAuthLogin {
    #[must_use]
    pub fn new(
        client: Arc<dyn OAuthProviderClient>,
        identities: Arc<dyn IdentityStore>,
        rotation: Arc<RefreshRotation>,
    ) -> Self {
        Self {
            client,
            identities,
            rotation,
        }
    }

    #[must_use]
    pub fn provider(&self) -> OAuthProvider {
        self.client.provider()
    }

    /// # Errors
    /// Returns `InvalidConfiguration` if the provider endpoint is malformed.
    pub fn build_authorize_url(&self, state: &str) -> Result<String, AuthError> {
        self.client.authorize_url(state)
    }

    /// Complete a login from the provider's authorization code.
    ///
    /// # Errors
    /// Returns `InvalidRequest` for a blank code, `UpstreamDependency` when the
    /// provider exchange or profile fetch fails and `Storage` when the identity
    /// cannot be persisted.
    pub async fn login(&self, code: &str) -> Result<LoginOutcome, AuthError> {
        if code.trim().is_empty() {
            return Err(AuthError::InvalidRequest(
                MISSING_CODE_MESSAGE.to_string(),
            ));
        }

        let provider_token = self.client.exchange_code(code).await?;
        let profile = self.client.fetch_profile(&provider_token).await?;

        let user = resolve_local_user(self.identities.as_ref(), &profile)
            .await
            .map_err(|err| {
                error!("Failed to resolve local identity: {err:#}");
                AuthError::Storage(err)
            })?;

        let tokens = self
            .rotation
            .start_family(&user.id.to_string(), &user.role)?;
        info!(user_id = %user.id, provider = %self.provider(), "OAuth login completed");
        Ok(LoginOutcome { user, tokens })
    }
}
