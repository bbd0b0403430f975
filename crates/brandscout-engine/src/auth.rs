use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::blocking::Client as HttpClient;
use serde::{Deserialize, Serialize};

use crate::error::{truncate_text, AuthInitError};

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECONDS: i64 = 3600;
const EXPIRY_SKEW_SECONDS: u64 = 60;

/// The fields of a service-account JSON document this tool needs.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub client_email: String,
    #[serde(default)]
    private_key: String,
    #[serde(default)]
    private_key_id: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

impl ServiceAccountKey {
    pub fn from_json(blob: &str) -> Result<Self, AuthInitError> {
        let key: Self = serde_json::from_str(blob)?;
        if key.project_id.trim().is_empty() {
            return Err(AuthInitError::MissingField {
                field: "project_id",
            });
        }
        if key.client_email.trim().is_empty() {
            return Err(AuthInitError::MissingField {
                field: "client_email",
            });
        }
        if key.private_key.trim().is_empty() {
            return Err(AuthInitError::MissingField {
                field: "private_key",
            });
        }
        key.encoding_key()
            .map_err(|err| AuthInitError::InvalidPrivateKey {
                message: err.to_string(),
            })?;
        Ok(key)
    }

    pub fn token_uri(&self) -> &str {
        self.token_uri
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_TOKEN_URI)
    }

    fn encoding_key(&self) -> jsonwebtoken::errors::Result<EncodingKey> {
        EncodingKey::from_rsa_pem(self.private_key.as_bytes())
    }

    fn claims(&self, issued_at: i64) -> AssertionClaims {
        AssertionClaims {
            iss: self.client_email.clone(),
            scope: CLOUD_PLATFORM_SCOPE.to_string(),
            aud: self.token_uri().to_string(),
            iat: issued_at,
            exp: issued_at + ASSERTION_LIFETIME_SECONDS,
        }
    }

    fn signed_assertion(&self, issued_at: i64) -> Result<String> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.private_key_id.clone();
        let key = self
            .encoding_key()
            .context("service account private key unusable")?;
        encode(&header, &self.claims(issued_at), &key).context("failed signing token assertion")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct AssertionClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_expired(&self) -> bool {
        self.expires_at <= Instant::now() + Duration::from_secs(EXPIRY_SKEW_SECONDS)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    ASSERTION_LIFETIME_SECONDS as u64
}

/// Exchanges a service-account assertion for OAuth access tokens and caches
/// the token until shortly before it expires.
pub struct ServiceAccountTokenSource {
    key: ServiceAccountKey,
    http: HttpClient,
    token: Mutex<Option<CachedToken>>,
}

impl ServiceAccountTokenSource {
    pub fn new(key: ServiceAccountKey, http: HttpClient) -> Self {
        Self {
            key,
            http,
            token: Mutex::new(None),
        }
    }

    pub fn project_id(&self) -> &str {
        &self.key.project_id
    }

    pub fn access_token(&self) -> Result<String> {
        let mut guard = self
            .token
            .lock()
            .map_err(|_| anyhow::anyhow!("token cache lock poisoned"))?;
        if let Some(token) = guard.as_ref() {
            if !token.is_expired() {
                return Ok(token.access_token.clone());
            }
        }
        let refreshed = self.exchange()?;
        let access_token = refreshed.access_token.clone();
        *guard = Some(refreshed);
        Ok(access_token)
    }

    fn exchange(&self) -> Result<CachedToken> {
        let assertion = self.key.signed_assertion(chrono::Utc::now().timestamp())?;
        let token_uri = self.key.token_uri();
        tracing::debug!(token_uri, client_email = %self.key.client_email, "exchanging service account assertion");
        let response = self
            .http
            .post(token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .with_context(|| format!("token request failed ({token_uri})"))?;
        let status = response.status();
        let body = response
            .text()
            .context("token response body read failed")?;
        if !status.is_success() {
            bail!(
                "token endpoint returned {}: {}",
                status.as_u16(),
                truncate_text(&body, 512)
            );
        }
        let parsed: TokenResponse =
            serde_json::from_str(&body).context("token endpoint returned invalid JSON")?;
        Ok(CachedToken {
            access_token: parsed.access_token,
            expires_at: Instant::now() + Duration::from_secs(parsed.expires_in),
        })
    }
}
