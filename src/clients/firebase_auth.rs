//! Firebase Authentication as the identity provider.
//!
//! ID tokens are RS256 JWTs signed with Google's rotating `securetoken` keys.
//! The public keys are fetched from the JWKS endpoint and cached; the
//! verification itself is local. Password sign-in goes through the Identity
//! Toolkit REST API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::IdentityConfig;
use crate::services::identity::{Identity, IdentityError, IdentityProvider, SignedIn};

/// Tokens larger than this are rejected before any parsing.
pub const MAX_ID_TOKEN_BYTES: usize = 8192;

const INVALID_TOKEN: &str = "The identity token is invalid or expired";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,

    pub kid: String,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,

    #[serde(default)]
    pub alg: Option<String>,

    #[serde(default, rename = "use")]
    pub key_use: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwksResponse {
    pub keys: Vec<Jwk>,
}

struct CachedJwks {
    keys: HashMap<String, Jwk>,
    /// `None` for keys supplied at construction; those never refresh.
    expires_at: Option<Instant>,
}

impl CachedJwks {
    fn is_fresh(&self) -> bool {
        self.expires_at.is_none_or(|at| at > Instant::now())
    }
}

/// Claims carried by a Firebase ID token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirebaseClaims {
    pub sub: String,
    pub aud: String,
    pub iss: String,
    pub exp: i64,
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Custom claims (`role`) and the provider's own extras (`auth_time`, `firebase`).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    id_token: String,
    local_id: String,
    email: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<String>,
}

#[derive(Deserialize)]
struct ToolkitErrorBody {
    error: ToolkitError,
}

#[derive(Deserialize)]
struct ToolkitError {
    message: String,
}

pub struct FirebaseIdentityProvider {
    project_id: String,
    api_key: String,
    jwks_url: String,
    toolkit_url: String,
    http: reqwest::Client,
    cache: RwLock<Option<CachedJwks>>,
    cache_ttl: Duration,
    clock_skew_seconds: u64,
}

impl FirebaseIdentityProvider {
    pub fn new(config: &IdentityConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .user_agent("academy-admin/1.0")
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build identity HTTP client: {e}"))?;

        Ok(Self {
            project_id: config.project_id.clone(),
            api_key: config.api_key.clone(),
            jwks_url: config.jwks_url.clone(),
            toolkit_url: config.identity_toolkit_url.trim_end_matches('/').to_string(),
            http,
            cache: RwLock::new(None),
            cache_ttl: Duration::from_secs(config.jwks_cache_seconds),
            clock_skew_seconds: config.clock_skew_seconds,
        })
    }

    /// A provider that trusts exactly `keys` and never contacts the JWKS endpoint.
    pub fn with_static_keys(config: &IdentityConfig, keys: Vec<Jwk>) -> anyhow::Result<Self> {
        let provider = Self::new(config)?;
        let keys = keys.into_iter().map(|k| (k.kid.clone(), k)).collect();
        Ok(Self {
            cache: RwLock::new(Some(CachedJwks {
                keys,
                expires_at: None,
            })),
            ..provider
        })
    }

    fn issuer(&self) -> String {
        format!("https://securetoken.google.com/{}", self.project_id)
    }

    #[instrument(skip(self), fields(kid = %kid))]
    async fn get_key(&self, kid: &str) -> Result<Jwk, IdentityError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref()
                && cached.is_fresh()
            {
                return cached.keys.get(kid).cloned().ok_or_else(|| {
                    debug!(kid = %kid, "Key not found in JWKS cache");
                    IdentityError::InvalidToken(INVALID_TOKEN.to_string())
                });
            }
        }

        self.refresh_keys().await?;

        let cache = self.cache.read().await;
        cache
            .as_ref()
            .and_then(|cached| cached.keys.get(kid).cloned())
            .ok_or_else(|| {
                warn!(kid = %kid, "Key not found in JWKS after refresh");
                IdentityError::InvalidToken(INVALID_TOKEN.to_string())
            })
    }

    async fn refresh_keys(&self) -> Result<(), IdentityError> {
        debug!(url = %self.jwks_url, "Fetching identity provider JWKS");

        let unavailable = |reason: String| {
            warn!(reason = %reason, "Identity provider keys unavailable");
            IdentityError::InvalidToken(INVALID_TOKEN.to_string())
        };

        let response = self
            .http
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(unavailable(format!("JWKS endpoint returned {}", response.status())));
        }

        let jwks: JwksResponse = response
            .json()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        let keys: HashMap<String, Jwk> = jwks
            .keys
            .into_iter()
            .map(|key| (key.kid.clone(), key))
            .collect();

        tracing::info!(key_count = keys.len(), "JWKS cache refreshed");

        *self.cache.write().await = Some(CachedJwks {
            keys,
            expires_at: Some(Instant::now() + self.cache_ttl),
        });

        Ok(())
    }

    fn verify_with_key(&self, token: &str, jwk: &Jwk) -> Result<FirebaseClaims, IdentityError> {
        let invalid = || IdentityError::InvalidToken(INVALID_TOKEN.to_string());

        if jwk.kty != "RSA" {
            warn!(kty = %jwk.kty, "Unexpected JWK key type");
            return Err(invalid());
        }
        let (Some(n), Some(e)) = (jwk.n.as_deref(), jwk.e.as_deref()) else {
            warn!(kid = %jwk.kid, "JWK missing RSA components");
            return Err(invalid());
        };

        let decoding_key = DecodingKey::from_rsa_components(n, e).map_err(|err| {
            warn!(error = %err, "Invalid RSA components in JWK");
            invalid()
        })?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = self.clock_skew_seconds;
        validation.set_audience(&[&self.project_id]);
        validation.set_issuer(&[self.issuer()]);
        validation.set_required_spec_claims(&["exp", "aud", "iss", "sub"]);

        let data = decode::<FirebaseClaims>(token, &decoding_key, &validation).map_err(|err| {
            debug!(error = %err, "Token verification failed");
            invalid()
        })?;

        Ok(data.claims)
    }
}

#[async_trait]
impl IdentityProvider for FirebaseIdentityProvider {
    #[instrument(skip_all)]
    async fn verify_id_token(&self, token: &str) -> Result<Identity, IdentityError> {
        let invalid = || IdentityError::InvalidToken(INVALID_TOKEN.to_string());

        if self.project_id.is_empty() {
            tracing::error!("identity.project_id is not configured; rejecting ID token");
            return Err(invalid());
        }
        if token.is_empty() || token.len() > MAX_ID_TOKEN_BYTES {
            return Err(invalid());
        }

        let header = decode_header(token).map_err(|_| invalid())?;
        if header.alg != Algorithm::RS256 {
            debug!(alg = ?header.alg, "Unexpected token algorithm");
            return Err(invalid());
        }
        let kid = header.kid.ok_or_else(invalid)?;

        let jwk = self.get_key(&kid).await?;
        let claims = self.verify_with_key(token, &jwk)?;

        let now = Utc::now().timestamp();
        let skew = i64::try_from(self.clock_skew_seconds).unwrap_or(i64::MAX);
        if claims.sub.is_empty() || claims.iat > now.saturating_add(skew) {
            return Err(invalid());
        }
        if let Some(auth_time) = claims.extra.get("auth_time").and_then(Value::as_i64)
            && auth_time > now.saturating_add(skew)
        {
            return Err(invalid());
        }

        let expires_at = DateTime::<Utc>::from_timestamp(claims.exp, 0).ok_or_else(invalid)?;

        Ok(Identity {
            uid: claims.sub,
            email: claims.email,
            expires_at,
            claims: claims.extra,
        })
    }

    #[instrument(skip(self, password))]
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<SignedIn, IdentityError> {
        if email.is_empty() || password.is_empty() {
            return Err(IdentityError::InvalidCredentials(
                "Email and password are required".to_string(),
            ));
        }

        let mut url = Url::parse(&format!(
            "{}/v1/accounts:signInWithPassword",
            self.toolkit_url
        ))
        .map_err(|e| {
            tracing::error!(error = %e, "Invalid identity toolkit URL");
            IdentityError::InvalidCredentials("Sign-in is not available".to_string())
        })?;
        url.query_pairs_mut().append_pair("key", &self.api_key);

        let response = self
            .http
            .post(url)
            .json(&SignInRequest {
                email,
                password,
                return_secure_token: true,
            })
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Identity provider unreachable during sign-in");
                IdentityError::InvalidCredentials("Sign-in is not available".to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ToolkitErrorBody>()
                .await
                .map_or_else(|_| status.to_string(), |body| body.error.message);
            debug!(status = %status, message = %message, "Password sign-in rejected");
            return Err(IdentityError::InvalidCredentials(message));
        }

        let body: SignInResponse = response.json().await.map_err(|e| {
            warn!(error = %e, "Malformed sign-in response");
            IdentityError::InvalidCredentials("Sign-in is not available".to_string())
        })?;

        Ok(SignedIn {
            uid: body.local_id,
            email: body.email,
            id_token: body.id_token,
            refresh_token: body.refresh_token,
            expires_in_seconds: body
                .expires_in
                .and_then(|s| s.parse().ok())
                .unwrap_or(3600),
        })
    }
}
