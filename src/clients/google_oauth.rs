//! OAuth2 access tokens for Google APIs from a service-account key.
//!
//! Implements the JWT bearer grant: a short-lived assertion signed with the
//! service account's RSA key is exchanged at `token_uri` for an access token.

use anyhow::{Context, Result};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

const DATASTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Tokens are refreshed this long before Google says they expire.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub project_id: String,
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKey {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_context(|| {
            format!("Service account JSON not found at {}", path.display())
        })?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid service account JSON: {}", path.display()))
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

pub struct AccessTokenProvider {
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl AccessTokenProvider {
    pub fn new(key: ServiceAccountKey, http: reqwest::Client) -> Result<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .context("Service account private key is not a valid RSA PEM")?;

        Ok(Self {
            key,
            encoding_key,
            http,
            cached: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.key.project_id
    }

    /// Returns a valid access token, minting a new one when the cached one is stale.
    pub async fn access_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref()
            && token.refresh_at > Instant::now()
        {
            return Ok(token.value.clone());
        }

        let fresh = self.fetch_token().await?;
        let value = fresh.access_token.clone();
        let lifetime = Duration::from_secs(fresh.expires_in).saturating_sub(REFRESH_MARGIN);
        *cached = Some(CachedToken {
            value: fresh.access_token,
            refresh_at: Instant::now() + lifetime,
        });

        Ok(value)
    }

    fn assertion(&self) -> Result<String> {
        let now = chrono::Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: DATASTORE_SCOPE,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };

        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .context("Failed to sign service account assertion")
    }

    async fn fetch_token(&self) -> Result<TokenResponse> {
        let assertion = self.assertion()?;
        debug!(client_email = %self.key.client_email, "Requesting Google access token");

        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .context("Token endpoint unreachable")?;

        if !response.status().is_success() {
            anyhow::bail!("Token endpoint returned {}", response.status());
        }

        response
            .json::<TokenResponse>()
            .await
            .context("Failed to parse token response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TEST_KEY: &str = include_str!("../../tests/fixtures/test_rsa_key.pem");

    fn key_for(server: &MockServer) -> ServiceAccountKey {
        ServiceAccountKey {
            project_id: "academy-test".to_string(),
            client_email: "svc@academy-test.iam.gserviceaccount.com".to_string(),
            private_key: TEST_KEY.to_string(),
            token_uri: format!("{}/token", server.uri()),
        }
    }

    #[tokio::test]
    async fn token_is_fetched_once_and_cached() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=urn"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.test",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = AccessTokenProvider::new(key_for(&server), reqwest::Client::new()).unwrap();
        assert_eq!(provider.access_token().await.unwrap(), "ya29.test");
        assert_eq!(provider.access_token().await.unwrap(), "ya29.test");
    }

    #[tokio::test]
    async fn token_endpoint_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let provider = AccessTokenProvider::new(key_for(&server), reqwest::Client::new()).unwrap();
        assert!(provider.access_token().await.is_err());
    }

    #[test]
    fn rejects_non_rsa_private_key() {
        let key = ServiceAccountKey {
            project_id: "p".to_string(),
            client_email: "e".to_string(),
            private_key: "not a key".to_string(),
            token_uri: default_token_uri(),
        };
        assert!(AccessTokenProvider::new(key, reqwest::Client::new()).is_err());
    }

    #[test]
    fn debug_hides_private_key() {
        let key = ServiceAccountKey {
            project_id: "p".to_string(),
            client_email: "e".to_string(),
            private_key: "SECRET".to_string(),
            token_uri: default_token_uri(),
        };
        assert!(!format!("{key:?}").contains("SECRET"));
    }
}
