//! In-process stand-in for the shelter API.
//!
//! Routes:
//! - `POST /v2/oauth2/token`: client-credentials grant (form body).
//! - `GET /v2/animals[?location=lat,lon]`: bearer-protected listing; with a
//!   location every animal that has coordinates carries a distance in miles.
//! - `GET /photos/{file}`: PNG thumbnails referenced by the listing.
//!
//! `MockState` exposes hooks tests use to revoke tokens, force listing
//! failures and count requests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const DEFAULT_CLIENT_ID: &str = "mock-client";
pub const DEFAULT_CLIENT_SECRET: &str = "mock-secret";

/// Where the fixture animals are placed around; matches the client's
/// default fixed location.
pub const HOME: (f64, f64) = (37.279138, -121.950346);

pub const TOKEN_TTL_SECS: u64 = 3600;

const EARTH_RADIUS_MILES: f64 = 3958.8;

/// 2x2 RGB PNG served for every known photo.
pub const PHOTO_PNG: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x02, 0x08, 0x02, 0x00, 0x00, 0x00, 0xfd, 0xd4, 0x9a,
    0x73, 0x00, 0x00, 0x00, 0x10, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0x38, 0x51, 0xa1, 0x01,
    0x44, 0x0c, 0x10, 0x0a, 0x00, 0x29, 0xee, 0x05, 0xa1, 0x8c, 0x09, 0xce, 0x88, 0x00, 0x00, 0x00,
    0x00, 0x49, 0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

/// Server state shared by all handlers.
#[derive(Debug)]
pub struct MockState {
    client_id: String,
    client_secret: String,
    tokens: RwLock<HashSet<String>>,
    animals_failure: RwLock<Option<u16>>,
    token_grants: AtomicUsize,
    animal_requests: AtomicUsize,
    photo_requests: AtomicUsize,
}

pub type SharedState = Arc<MockState>;

impl MockState {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> SharedState {
        Arc::new(Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            tokens: RwLock::new(HashSet::new()),
            animals_failure: RwLock::new(None),
            token_grants: AtomicUsize::new(0),
            animal_requests: AtomicUsize::new(0),
            photo_requests: AtomicUsize::new(0),
        })
    }

    /// Invalidate every issued token; the next listing call gets a 401.
    pub async fn revoke_tokens(&self) {
        self.tokens.write().await.clear();
    }

    /// Answer every listing call with `status` until cleared with `None`.
    pub async fn fail_animals_with(&self, status: Option<u16>) {
        *self.animals_failure.write().await = status;
    }

    pub fn token_grants(&self) -> usize {
        self.token_grants.load(Ordering::SeqCst)
    }

    pub fn animal_requests(&self) -> usize {
        self.animal_requests.load(Ordering::SeqCst)
    }

    pub fn photo_requests(&self) -> usize {
        self.photo_requests.load(Ordering::SeqCst)
    }
}

pub fn app() -> Router {
    app_with_state(MockState::new(DEFAULT_CLIENT_ID, DEFAULT_CLIENT_SECRET))
}

pub fn app_with_state(state: SharedState) -> Router {
    Router::new()
        .route("/v2/oauth2/token", post(grant_token))
        .route("/v2/animals", get(list_animals))
        .route("/photos/{file}", get(get_photo))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

pub async fn run_with_state(listener: TcpListener, state: SharedState) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_state(state)).await
}

#[derive(Deserialize)]
pub struct TokenRequest {
    pub grant_type: String,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Deserialize)]
pub struct AnimalsQuery {
    pub location: Option<String>,
}

fn error_body(status: StatusCode, error: &str, detail: &str) -> Response {
    (status, Json(json!({ "error": error, "error_description": detail }))).into_response()
}

async fn grant_token(State(state): State<SharedState>, Form(input): Form<TokenRequest>) -> Response {
    if input.grant_type != "client_credentials" {
        return error_body(StatusCode::BAD_REQUEST, "unsupported_grant_type", "only client_credentials is supported");
    }
    if input.client_id != state.client_id || input.client_secret != state.client_secret {
        warn!(client_id = %input.client_id, "rejected client credentials");
        return error_body(StatusCode::UNAUTHORIZED, "invalid_client", "client authentication failed");
    }

    let token = Uuid::new_v4().to_string();
    state.tokens.write().await.insert(token.clone());
    state.token_grants.fetch_add(1, Ordering::SeqCst);
    info!("issued access token");

    Json(json!({
        "token_type": "Bearer",
        "expires_in": TOKEN_TTL_SECS,
        "access_token": token,
    }))
    .into_response()
}

async fn list_animals(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(query): Query<AnimalsQuery>,
) -> Response {
    state.animal_requests.fetch_add(1, Ordering::SeqCst);

    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    let authorized = match bearer {
        Some(token) => state.tokens.read().await.contains(token),
        None => false,
    };
    if !authorized {
        return error_body(StatusCode::UNAUTHORIZED, "invalid_token", "access token invalid or expired");
    }

    if let Some(code) = *state.animals_failure.read().await {
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return error_body(status, "forced_failure", "listing failure requested by test");
    }

    let origin = match query.location.as_deref().map(parse_location) {
        Some(Some(origin)) => Some(origin),
        Some(None) => {
            return error_body(StatusCode::BAD_REQUEST, "invalid_location", "expected \"lat,lon\"");
        }
        None => None,
    };

    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("localhost");
    let animals: Vec<Value> = fixtures()
        .iter()
        .map(|fixture| fixture.to_json(host, origin))
        .collect();
    debug!(count = animals.len(), located = origin.is_some(), "listing animals");

    Json(json!({
        "animals": animals,
        "pagination": {
            "count_per_page": 20,
            "total_count": animals.len(),
            "current_page": 1,
            "total_pages": 1,
        },
    }))
    .into_response()
}

async fn get_photo(State(state): State<SharedState>, Path(file): Path<String>) -> Response {
    state.photo_requests.fetch_add(1, Ordering::SeqCst);
    let known = fixtures().iter().any(|f| f.photo == Some(file.as_str()));
    if !known {
        return StatusCode::NOT_FOUND.into_response();
    }
    ([(header::CONTENT_TYPE, "image/png")], PHOTO_PNG).into_response()
}

/// Parse `"lat,lon"`.
pub fn parse_location(value: &str) -> Option<(f64, f64)> {
    let (lat, lon) = value.split_once(',')?;
    let lat: f64 = lat.trim().parse().ok()?;
    let lon: f64 = lon.trim().parse().ok()?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return None;
    }
    Some((lat, lon))
}

/// Great-circle distance in miles.
pub fn haversine_miles(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lat1, lon1) = (from.0.to_radians(), from.1.to_radians());
    let (lat2, lon2) = (to.0.to_radians(), to.1.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_MILES * a.sqrt().asin()
}

pub struct Fixture {
    pub id: i64,
    pub name: &'static str,
    pub species: &'static str,
    pub size: &'static str,
    pub status: &'static str,
    pub gender: &'static str,
    pub breeds: Value,
    /// Offset in degrees of latitude north of `HOME`.
    pub lat_offset: Option<f64>,
    pub photo: Option<&'static str>,
}

impl Fixture {
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.lat_offset.map(|offset| (HOME.0 + offset, HOME.1))
    }

    fn to_json(&self, host: &str, origin: Option<(f64, f64)>) -> Value {
        let distance = match (origin, self.coordinates()) {
            (Some(origin), Some(at)) => Some(haversine_miles(origin, at)),
            _ => None,
        };
        let photos: Vec<Value> = self
            .photo
            .map(|file| {
                let url = format!("http://{host}/photos/{file}");
                vec![json!({ "small": url, "medium": url, "large": url, "full": url })]
            })
            .unwrap_or_default();

        json!({
            "id": self.id,
            "name": self.name,
            "species": self.species,
            "size": self.size,
            "status": self.status,
            "gender": self.gender,
            "distance": distance,
            "photos": photos,
            "breeds": self.breeds,
        })
    }
}

pub fn fixtures() -> Vec<Fixture> {
    vec![
        Fixture {
            id: 1,
            name: "Whiskers",
            species: "Cat",
            size: "Small",
            status: "adoptable",
            gender: "Female",
            breeds: json!({"primary": "Domestic Short Hair", "secondary": null, "mixed": false, "unknown": false}),
            lat_offset: Some(0.01),
            photo: Some("whiskers.png"),
        },
        Fixture {
            id: 2,
            name: "Rex",
            species: "Dog",
            size: "Large",
            status: "adoptable",
            gender: "Male",
            breeds: json!({"primary": "Labrador Retriever", "secondary": null, "mixed": true, "unknown": false}),
            lat_offset: Some(0.1),
            photo: Some("rex.png"),
        },
        Fixture {
            id: 3,
            name: "Nibbles",
            species: "Rabbit",
            size: "Extra Large",
            status: "adoptable",
            gender: "Unknown",
            breeds: json!({"primary": null, "secondary": null, "mixed": false, "unknown": true}),
            lat_offset: Some(0.4),
            photo: Some("nibbles.png"),
        },
        Fixture {
            id: 4,
            name: "Polly",
            species: "Parrot",
            size: "Small",
            status: "adoptable",
            gender: "Female",
            breeds: json!({"primary": "Macaw", "secondary": null, "mixed": false, "unknown": false}),
            lat_offset: Some(4.0),
            photo: None,
        },
        Fixture {
            id: 5,
            name: "Goldie",
            species: "Fish",
            size: "Small",
            status: "found",
            gender: "Female",
            breeds: json!({"primary": "Goldfish", "secondary": null, "mixed": false, "unknown": false}),
            lat_offset: None,
            photo: None,
        },
    ]
}
