//! Client configuration.
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! `petfeed.toml` in the working directory, then `PETFEED_*` environment
//! variables (`PETFEED_CLIENT_ID`, `PETFEED_CLIENT_SECRET`,
//! `PETFEED_API_BASE_URL`, `PETFEED_REQUEST_TIMEOUT_SECS`).

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::auth::Credentials;
use crate::error::ApiError;
use crate::http::{ApiEnvironment, PETFINDER_PROD_URL};

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

const ENV_PREFIX: &str = "PETFEED";

#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub request_timeout_secs: u64,
}

impl ClientConfig {
    /// Production endpoint and default timeout with the given credentials.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            api_base_url: PETFINDER_PROD_URL.to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }

    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Load from `petfeed.toml` (if present) and the process environment.
    pub fn load() -> Result<Self, ApiError> {
        Self::build(
            Config::builder()
                .add_source(File::with_name("petfeed").required(false))
                .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true)),
        )
    }

    /// Load from an explicit set of `PETFEED_*` variables, ignoring the
    /// process environment and any config file.
    pub fn load_from_vars(vars: HashMap<String, String>) -> Result<Self, ApiError> {
        Self::build(
            Config::builder().add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .source(Some(vars)),
            ),
        )
    }

    fn build(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<Self, ApiError> {
        let config: ClientConfig = builder
            .set_default("api_base_url", PETFINDER_PROD_URL)
            .and_then(|b| b.set_default("request_timeout_secs", DEFAULT_REQUEST_TIMEOUT_SECS))
            .and_then(|b| b.build())
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ApiError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject blank credentials and an unparseable base URL.
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.client_id.trim().is_empty() {
            return Err(ApiError::Config("client_id is empty".to_string()));
        }
        if self.client_secret.trim().is_empty() {
            return Err(ApiError::Config("client_secret is empty".to_string()));
        }
        url::Url::parse(&self.api_base_url).map_err(|e| ApiError::Config(format!("api_base_url: {e}")))?;
        Ok(())
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.client_id.clone(), self.client_secret.clone())
    }

    pub fn environment(&self) -> ApiEnvironment {
        ApiEnvironment::custom(&self.api_base_url)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_base_url", &self.api_base_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}
