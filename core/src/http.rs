//! HTTP request/response types and endpoint descriptors.
//!
//! # Design
//! Requests and responses are plain data. `HttpRequest::build` turns an
//! endpoint, a method, headers and an optional encodable parameter value into
//! a request; an `HttpTransport` executes it and hands back an
//! `HttpResponse`. Keeping both sides as owned values means the executing
//! side can be swapped (blocking agent, scripted test double, a host across
//! the FFI boundary) without touching the layers above.
//!
//! Parameters are flattened into key/value pairs. Methods without a body put
//! them in the query string; the others send them form-encoded.

use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::error::ApiError;

/// Base URL of the production shelter API.
pub const PETFINDER_PROD_URL: &str = "https://api.petfinder.com/v2/";

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Whether parameters travel in the body rather than the query string.
    pub fn carries_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }
}

/// Paths under the shelter API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PetfinderPath {
    Auth,
    Pets,
}

impl PetfinderPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            PetfinderPath::Auth => "oauth2/token",
            PetfinderPath::Pets => "animals",
        }
    }
}

/// The API environment requests are sent to.
///
/// There is a single production environment; the base URL can be overridden
/// to point at a local mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiEnvironment {
    base_url: String,
}

impl ApiEnvironment {
    pub fn prod() -> Self {
        Self::custom(PETFINDER_PROD_URL)
    }

    pub fn custom(base_url: &str) -> Self {
        let trimmed = base_url.trim().trim_end_matches('/');
        Self {
            base_url: format!("{trimmed}/"),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Default for ApiEnvironment {
    fn default() -> Self {
        Self::prod()
    }
}

/// Where a request goes: a base URL plus an optional path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Petfinder {
        path: PetfinderPath,
        environment: ApiEnvironment,
    },
    /// A media resource; the locator is the whole URL.
    Photo(Url),
}

impl Endpoint {
    pub fn petfinder(path: PetfinderPath, environment: &ApiEnvironment) -> Self {
        Endpoint::Petfinder {
            path,
            environment: environment.clone(),
        }
    }

    pub fn base(&self) -> &str {
        match self {
            Endpoint::Petfinder { environment, .. } => environment.base_url(),
            Endpoint::Photo(url) => url.as_str(),
        }
    }

    pub fn path(&self) -> Option<&'static str> {
        match self {
            Endpoint::Petfinder { path, .. } => Some(path.as_str()),
            Endpoint::Photo(_) => None,
        }
    }

    pub fn url(&self) -> String {
        format!("{}{}", self.base(), self.path().unwrap_or(""))
    }
}

/// A single header as a name/value pair.
pub type Header = (String, String);

/// An HTTP request described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<Header>,
    pub body: Option<String>,
}

impl HttpRequest {
    /// Build a request, encoding `parameters` according to `method`.
    pub fn build<P>(
        endpoint: &Endpoint,
        method: HttpMethod,
        headers: &[Header],
        parameters: Option<&P>,
    ) -> Result<Self, ApiError>
    where
        P: Serialize + ?Sized,
    {
        let pairs = match parameters {
            Some(parameters) => encode_parameters(parameters)?,
            None => Vec::new(),
        };

        let mut url = Url::parse(&endpoint.url()).map_err(|e| ApiError::InvalidUrl(e.to_string()))?;
        let mut headers = headers.to_vec();
        let mut body = None;

        if !pairs.is_empty() {
            if method.carries_body() {
                let encoded = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(&pairs)
                    .finish();
                headers.push(("content-type".to_string(), FORM_CONTENT_TYPE.to_string()));
                body = Some(encoded);
            } else {
                url.query_pairs_mut().extend_pairs(&pairs);
            }
        }

        Ok(HttpRequest {
            method,
            url: url.into(),
            headers,
            body,
        })
    }

    /// Value of the first header named `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<Header>,
    pub body: Vec<u8>,
}

/// Flatten an encodable value into key/value pairs.
///
/// The value must encode as an object of scalars (or as nothing at all).
/// `null` members are skipped.
fn encode_parameters<P>(parameters: &P) -> Result<Vec<(String, String)>, ApiError>
where
    P: Serialize + ?Sized,
{
    let value = serde_json::to_value(parameters).map_err(|e| ApiError::Serialization(e.to_string()))?;
    let map = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Object(map) => map,
        other => {
            return Err(ApiError::Serialization(format!(
                "parameters must encode as an object, got {other}"
            )))
        }
    };

    let mut pairs = Vec::with_capacity(map.len());
    for (key, value) in map {
        let value = match value {
            Value::Null => continue,
            Value::String(s) => s,
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            other => {
                return Err(ApiError::Serialization(format!(
                    "parameter `{key}` is not a scalar: {other}"
                )))
            }
        };
        pairs.push((key, value));
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Query {
        location: String,
        limit: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        page: Option<u32>,
    }

    fn pets() -> Endpoint {
        Endpoint::petfinder(PetfinderPath::Pets, &ApiEnvironment::prod())
    }

    #[test]
    fn petfinder_urls_join_base_and_path() {
        assert_eq!(pets().url(), "https://api.petfinder.com/v2/animals");
        let auth = Endpoint::petfinder(PetfinderPath::Auth, &ApiEnvironment::prod());
        assert_eq!(auth.url(), "https://api.petfinder.com/v2/oauth2/token");
    }

    #[test]
    fn custom_environment_normalises_trailing_slash() {
        let env = ApiEnvironment::custom("http://127.0.0.1:3000/v2");
        assert_eq!(env.base_url(), "http://127.0.0.1:3000/v2/");
        let env = ApiEnvironment::custom("http://127.0.0.1:3000/v2//");
        assert_eq!(env.base_url(), "http://127.0.0.1:3000/v2/");
    }

    #[test]
    fn photo_endpoint_is_the_locator() {
        let url = Url::parse("https://cdn.example.org/photos/1/small.jpg").unwrap();
        let endpoint = Endpoint::Photo(url);
        assert_eq!(endpoint.path(), None);
        assert_eq!(endpoint.url(), "https://cdn.example.org/photos/1/small.jpg");
    }

    #[test]
    fn get_parameters_go_to_the_query_string() {
        let query = Query {
            location: "37.5,-122".to_string(),
            limit: 20,
            page: None,
        };
        let req = HttpRequest::build(&pets(), HttpMethod::Get, &[], Some(&query)).unwrap();
        assert_eq!(req.method, HttpMethod::Get);
        let url = Url::parse(&req.url).unwrap();
        assert_eq!(url.path(), "/v2/animals");
        let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        pairs.sort();
        assert_eq!(
            pairs,
            vec![
                ("limit".to_string(), "20".to_string()),
                ("location".to_string(), "37.5,-122".to_string()),
            ]
        );
        assert!(req.url.contains("location=37.5%2C-122"));
        assert!(req.body.is_none());
        assert!(req.headers.is_empty());
    }

    #[test]
    fn post_parameters_are_form_encoded() {
        let query = Query {
            location: "a b".to_string(),
            limit: 1,
            page: Some(2),
        };
        let req = HttpRequest::build(&pets(), HttpMethod::Post, &[], Some(&query)).unwrap();
        assert_eq!(req.url, "https://api.petfinder.com/v2/animals");
        assert_eq!(req.header("Content-Type"), Some(FORM_CONTENT_TYPE));
        let body = req.body.as_deref().unwrap();
        let mut pairs: Vec<(String, String)> =
            url::form_urlencoded::parse(body.as_bytes()).into_owned().collect();
        pairs.sort();
        assert_eq!(
            pairs,
            vec![
                ("limit".to_string(), "1".to_string()),
                ("location".to_string(), "a b".to_string()),
                ("page".to_string(), "2".to_string()),
            ]
        );
        assert!(body.contains("location=a+b"));
    }

    #[test]
    fn absent_parameters_leave_url_untouched() {
        let req = HttpRequest::build::<()>(&pets(), HttpMethod::Get, &[], None).unwrap();
        assert_eq!(req.url, "https://api.petfinder.com/v2/animals");
        let req = HttpRequest::build(&pets(), HttpMethod::Delete, &[], Some(&())).unwrap();
        assert_eq!(req.url, "https://api.petfinder.com/v2/animals");
    }

    #[test]
    fn caller_headers_are_preserved() {
        let headers = vec![("Authorization".to_string(), "Bearer abc".to_string())];
        let req = HttpRequest::build::<()>(&pets(), HttpMethod::Get, &headers, None).unwrap();
        assert_eq!(req.header("authorization"), Some("Bearer abc"));
    }

    #[test]
    fn non_object_parameters_are_rejected() {
        let err = HttpRequest::build(&pets(), HttpMethod::Get, &[], Some(&[1, 2, 3])).unwrap_err();
        assert!(matches!(err, ApiError::Serialization(_)));
    }

    #[test]
    fn methods_with_bodies() {
        assert!(HttpMethod::Post.carries_body());
        assert!(HttpMethod::Put.carries_body());
        assert!(HttpMethod::Patch.carries_body());
        assert!(!HttpMethod::Get.carries_body());
        assert!(!HttpMethod::Delete.carries_body());
    }
}
