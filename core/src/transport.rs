//! Request execution and response classification.
//!
//! # Design
//! `HttpTransport` is the single I/O seam: it takes an `HttpRequest` and
//! returns an `HttpResponse` or a transport-level error. `NetworkService`
//! sits on top and implements the request contract every other layer uses:
//! build the request, execute it, classify the status, then hand the body to
//! the caller raw or decoded.
//!
//! A classified failure short-circuits even when the server sent a body.
//! A request that never produced a status surfaces the transport's own error
//! unchanged.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::ApiError;
use crate::http::{Endpoint, Header, HttpMethod, HttpRequest, HttpResponse};
use crate::status;

/// Executes HTTP requests.
///
/// Implementations must return non-2xx responses as data, not as errors, so
/// status interpretation stays in one place.
#[async_trait]
pub trait HttpTransport: Send + Sync + 'static {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError>;
}

/// Transport backed by a blocking `ureq` agent run on tokio's blocking pool.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl HttpTransport for UreqTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let agent = self.agent.clone();
        tokio::task::spawn_blocking(move || execute_blocking(&agent, request))
            .await
            .map_err(|e| ApiError::Transport(format!("transport task failed: {e}")))?
    }
}

fn execute_blocking(agent: &ureq::Agent, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let HttpRequest {
        method,
        url,
        headers,
        body,
    } = req;

    let result = match method {
        HttpMethod::Get | HttpMethod::Delete => {
            let mut builder = match method {
                HttpMethod::Get => agent.get(&url),
                _ => agent.delete(&url),
            };
            for (name, value) in &headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            builder.call()
        }
        HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch => {
            let mut builder = match method {
                HttpMethod::Post => agent.post(&url),
                HttpMethod::Put => agent.put(&url),
                _ => agent.patch(&url),
            };
            for (name, value) in &headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            match body {
                Some(body) => builder.send(body.as_bytes()),
                None => builder.send_empty(),
            }
        }
    };

    let mut response = result.map_err(|e| ApiError::Transport(e.to_string()))?;
    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();
    let body = response
        .body_mut()
        .read_to_vec()
        .map_err(|e| ApiError::Transport(e.to_string()))?;

    Ok(HttpResponse {
        status,
        headers,
        body,
    })
}

/// The request contract shared by the auth, catalog and media layers.
#[derive(Clone)]
pub struct NetworkService {
    transport: Arc<dyn HttpTransport>,
}

impl std::fmt::Debug for NetworkService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkService").finish_non_exhaustive()
    }
}

impl NetworkService {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Perform a request and decode the JSON body into `R`.
    pub async fn perform_request<P, R>(
        &self,
        endpoint: &Endpoint,
        method: HttpMethod,
        headers: &[Header],
        parameters: Option<&P>,
    ) -> Result<R, ApiError>
    where
        P: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let body = self
            .perform_data_request(endpoint, method, headers, parameters)
            .await?;
        serde_json::from_slice(&body).map_err(|e| ApiError::Deserialization(e.to_string()))
    }

    /// Perform a request and return the raw body.
    pub async fn perform_data_request<P>(
        &self,
        endpoint: &Endpoint,
        method: HttpMethod,
        headers: &[Header],
        parameters: Option<&P>,
    ) -> Result<Vec<u8>, ApiError>
    where
        P: Serialize + ?Sized + Sync,
    {
        let request = HttpRequest::build(endpoint, method, headers, parameters)?;
        let url = request.url.clone();
        let response = self.transport.execute(request).await?;
        debug!(method = method.as_str(), %url, status = response.status, bytes = response.body.len(), "request completed");
        status::classify(response.status)?;
        Ok(response.body)
    }
}
