//! Google OAuth endpoints over HTTP.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use tracing::{error, instrument};
use url::Url;

use super::{OAuthProvider, OAuthProviderClient};
use crate::error::AuthError;
use crate::identity::ProviderProfile;
use crate::APP_USER_AGENT;

pub const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_USERINFO_URI: &str = "https://openidconnect.googleapis.com/v1/userinfo";
const SCOPES: &str = "openid email profile";

#[derive(Clone, Debug)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub redirect_uri: String,
    pub auth_uri: String,
    pub token_uri: String,
    pub userinfo_uri: String,
    pub timeout: Duration,
}

impl GoogleOAuthConfig {
    #[must_use]
    pub fn new(client_id: String, client_secret: SecretString, redirect_uri: String) -> Self {
        Self {
            client_id,
            client_secret,
            redirect_uri,
            auth_uri: GOOGLE_AUTH_URI.to_string(),
            token_uri: GOOGLE_TOKEN_URI.to_string(),
            userinfo_uri: GOOGLE_USERINFO_URI.to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    #[must_use]
    pub fn with_endpoints(mut self, auth_uri: &str, token_uri: &str, userinfo_uri: &str) -> Self {
        auth_uri.clone_into(&mut self.auth_uri);
        token_uri.clone_into(&mut self.token_uri);
        userinfo_uri.clone_into(&mut self.userinfo_uri);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    sub: Option<String>,
    email: Option<String>,
    name: Option<String>,
}

#[derive(Clone, Debug)]
pub struct GoogleOAuthClient {
    config: GoogleOAuthConfig,
    http: Client,
}

impl GoogleOAuthClient {
    /// # Errors
    /// Returns `InvalidConfiguration` if an endpoint is not a URL or the HTTP
    /// client cannot be built.
    pub fn new(config: GoogleOAuthConfig) -> Result<Self, AuthError> {
        for endpoint in [&config.auth_uri, &config.token_uri, &config.userinfo_uri] {
            Url::parse(endpoint).map_err(|err| {
                AuthError::InvalidConfiguration(format!("invalid oauth endpoint {endpoint}: {err}"))
            })?;
        }
        let http = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(config.timeout)
            .build()
            .map_err(|err| AuthError::InvalidConfiguration(format!("oauth http client: {err}")))?;
        Ok(Self { config, http })
    }
}

fn upstream(what: &str, err: impl std::fmt::Display) -> AuthError {
    error!("OAuth {what} failed: {err}");
    AuthError::UpstreamDependency(format!("OAuth {what} failed."))
}

#[async_trait]
impl OAuthProviderClient for GoogleOAuthClient {
    fn provider(&self) -> OAuthProvider {
        OAuthProvider::Google
    }

    fn authorize_url(&self, state: &str) -> Result<String, AuthError> {
        let mut url = Url::parse(&self.config.auth_uri)
            .map_err(|err| AuthError::InvalidConfiguration(format!("oauth auth uri: {err}")))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("scope", SCOPES)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("state", state);
        Ok(url.into())
    }

    #[instrument(skip_all)]
    async fn exchange_code(&self, code: &str) -> Result<String, AuthError> {
        let form = [
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ];

        let response = self
            .http
            .post(&self.config.token_uri)
            .form(&form)
            .send()
            .await
            .map_err(|err| upstream("token exchange", err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(upstream("token exchange", status));
        }

        let body: GoogleTokenResponse = response
            .json()
            .await
            .map_err(|err| upstream("token exchange", err))?;

        body.access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| upstream("token exchange", "missing access_token"))
    }

    #[instrument(skip_all)]
    async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile, AuthError> {
        let response = self
            .http
            .get(&self.config.userinfo_uri)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|err| upstream("user info fetch", err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(upstream("user info fetch", status));
        }

        let info: GoogleUserInfo = response
            .json()
            .await
            .map_err(|err| upstream("user info fetch", err))?;

        match (info.sub, info.email) {
            (Some(subject), Some(email)) if !subject.is_empty() && !email.is_empty() => {
                Ok(ProviderProfile {
                    provider: OAuthProvider::Google.as_str(),
                    subject,
                    email,
                    name: info.name,
                })
            }
            _ => Err(upstream("user info fetch", "missing sub or email")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> Result<GoogleOAuthClient> {
        let config = GoogleOAuthConfig::new(
            "client-123".to_string(),
            SecretString::from("s3cret".to_string()),
            "https://app.test/api/v1/auth/oauth/google/callback".to_string(),
        )
        .with_endpoints(
            &format!("{}/auth", server.uri()),
            &format!("{}/token", server.uri()),
            &format!("{}/userinfo", server.uri()),
        )
        .with_timeout(Duration::from_secs(2));
        Ok(GoogleOAuthClient::new(config)?)
    }

    #[test]
    fn authorize_url_carries_required_parameters() -> Result<()> {
        let config = GoogleOAuthConfig::new(
            "client 1".to_string(),
            SecretString::from("s".to_string()),
            "https://app.test/cb".to_string(),
        );
        let client = GoogleOAuthClient::new(config)?;
        let url = Url::parse(&client.authorize_url("st/ate")?)?;

        assert_eq!(url.host_str(), Some("accounts.google.com"));
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let get = |key: &str| {
            pairs
                .iter()
                .find(|(name, _)| name == key)
                .map(|(_, value)| value.clone())
        };
        assert_eq!(get("response_type").as_deref(), Some("code"));
        assert_eq!(get("client_id").as_deref(), Some("client 1"));
        assert_eq!(get("redirect_uri").as_deref(), Some("https://app.test/cb"));
        assert_eq!(get("scope").as_deref(), Some("openid email profile"));
        assert_eq!(get("access_type").as_deref(), Some("offline"));
        assert_eq!(get("prompt").as_deref(), Some("consent"));
        assert_eq!(get("state").as_deref(), Some("st/ate"));
        Ok(())
    }

    #[test]
    fn rejects_malformed_endpoints() {
        let config = GoogleOAuthConfig::new(
            "c".to_string(),
            SecretString::from("s".to_string()),
            "https://app.test/cb".to_string(),
        )
        .with_endpoints("not a url", GOOGLE_TOKEN_URI, GOOGLE_USERINFO_URI);
        assert!(matches!(
            GoogleOAuthClient::new(config),
            Err(AuthError::InvalidConfiguration(_))
        ));
    }

    #[tokio::test]
    async fn exchanges_code_and_fetches_profile() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("code=abc"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("client_secret=s3cret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ya29.token",
                "token_type": "Bearer",
                "expires_in": 3599
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .and(header("authorization", "Bearer ya29.token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sub": "g-1",
                "email": "a@example.com",
                "email_verified": true,
                "name": "Ada"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server)?;
        let token = client.exchange_code("abc").await?;
        assert_eq!(token, "ya29.token");

        let profile = client.fetch_profile(&token).await?;
        assert_eq!(profile.provider, "GOOGLE");
        assert_eq!(profile.subject, "g-1");
        assert_eq!(profile.email, "a@example.com");
        assert_eq!(profile.name.as_deref(), Some("Ada"));
        Ok(())
    }

    #[tokio::test]
    async fn provider_errors_surface_as_upstream_failures() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "sub": "g-1" })))
            .mount(&server)
            .await;

        let client = client_for(&server)?;
        assert!(matches!(
            client.exchange_code("expired").await,
            Err(AuthError::UpstreamDependency(_))
        ));
        assert!(matches!(
            client.fetch_profile("token").await,
            Err(AuthError::UpstreamDependency(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn token_response_without_access_token_is_rejected() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token_type": "Bearer" })))
            .mount(&server)
            .await;

        let client = client_for(&server)?;
        assert!(matches!(
            client.exchange_code("abc").await,
            Err(AuthError::UpstreamDependency(_))
        ));
        Ok(())
    }
}
