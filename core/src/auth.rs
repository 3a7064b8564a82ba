//! Client-credentials authentication for the shelter API.
//!
//! # Design
//! `AuthManager` owns one token slot. The first authenticated call fills it
//! with a client-credentials grant; later calls reuse it as a bearer header.
//! When a call comes back `401 Unauthorized` the slot is cleared and the call
//! is repeated, at most `max_unauthorized_retries` times per logical call, so
//! permanently invalid credentials end in an error instead of a loop.
//!
//! The slot sits behind an async mutex that stays held while a grant is in
//! flight: concurrent callers wait for the one grant instead of issuing their
//! own, and a 401-triggered clear can never interleave with a fresh fetch.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::http::{ApiEnvironment, Endpoint, Header, HttpMethod, PetfinderPath};
use crate::transport::NetworkService;

/// Retries granted to a call that fails with `401`.
pub const DEFAULT_MAX_UNAUTHORIZED_RETRIES: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    ClientCredentials,
}

/// Outgoing grant request body.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Credentials {
    grant_type: GrantType,
    client_id: String,
    client_secret: String,
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            grant_type: GrantType::ClientCredentials,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("grant_type", &self.grant_type)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Bearer token returned by the grant endpoint.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Token {
    #[serde(rename = "access_token")]
    value: String,
    expires_in: u64,
}

impl Token {
    pub fn new(value: impl Into<String>, expires_in: u64) -> Self {
        Self {
            value: value.into(),
            expires_in,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Lifetime hint in seconds, as reported by the server.
    pub fn expires_in(&self) -> u64 {
        self.expires_in
    }

    pub fn authorization_header(&self) -> Header {
        ("Authorization".to_string(), format!("Bearer {}", self.value))
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("value", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Owns the cached token and wraps calls with credential injection.
pub struct AuthManager {
    network: NetworkService,
    environment: ApiEnvironment,
    credentials: Credentials,
    token: Mutex<Option<Token>>,
    max_unauthorized_retries: u32,
}

impl fmt::Debug for AuthManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthManager")
            .field("environment", &self.environment)
            .field("credentials", &self.credentials)
            .field("max_unauthorized_retries", &self.max_unauthorized_retries)
            .finish_non_exhaustive()
    }
}

impl AuthManager {
    pub fn new(network: NetworkService, environment: ApiEnvironment, credentials: Credentials) -> Self {
        Self {
            network,
            environment,
            credentials,
            token: Mutex::new(None),
            max_unauthorized_retries: DEFAULT_MAX_UNAUTHORIZED_RETRIES,
        }
    }

    pub fn with_max_unauthorized_retries(mut self, retries: u32) -> Self {
        self.max_unauthorized_retries = retries;
        self
    }

    pub fn environment(&self) -> &ApiEnvironment {
        &self.environment
    }

    pub async fn cached_token(&self) -> Option<Token> {
        self.token.lock().await.clone()
    }

    /// Drop the cached token; the next call performs a fresh grant.
    pub async fn invalidate(&self) {
        *self.token.lock().await = None;
    }

    /// Perform a call against `path` with a bearer token, retrying once on 401.
    pub async fn perform_authenticated_request<P, R>(
        &self,
        path: PetfinderPath,
        method: HttpMethod,
        parameters: Option<&P>,
    ) -> Result<R, ApiError>
    where
        P: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let endpoint = Endpoint::petfinder(path, &self.environment);
        let mut retries = 0;

        loop {
            let token = self.token().await?;
            let headers = [token.authorization_header()];
            match self
                .network
                .perform_request(&endpoint, method, &headers, parameters)
                .await
            {
                Err(err) if err.is_unauthorized() && retries < self.max_unauthorized_retries => {
                    retries += 1;
                    warn!(path = path.as_str(), retries, "request unauthorized, refreshing token");
                    self.clear_if_current(&token).await;
                }
                result => return result,
            }
        }
    }

    async fn token(&self) -> Result<Token, ApiError> {
        let mut slot = self.token.lock().await;
        if let Some(token) = slot.as_ref() {
            debug!("reusing cached token");
            return Ok(token.clone());
        }

        let token = self.fetch_token().await?;
        *slot = Some(token.clone());
        Ok(token)
    }

    async fn fetch_token(&self) -> Result<Token, ApiError> {
        let endpoint = Endpoint::petfinder(PetfinderPath::Auth, &self.environment);
        let token: Token = self
            .network
            .perform_request(&endpoint, HttpMethod::Post, &[], Some(&self.credentials))
            .await?;
        info!(
            client_id = self.credentials.client_id(),
            expires_in = token.expires_in,
            "acquired access token"
        );
        Ok(token)
    }

    /// Clear the slot unless a concurrent caller already replaced the token.
    async fn clear_if_current(&self, rejected: &Token) {
        let mut slot = self.token.lock().await;
        if slot.as_ref() == Some(rejected) {
            *slot = None;
        }
    }
}
