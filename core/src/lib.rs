//! Data-access core for the adoptable-pets client.
//!
//! # Overview
//! Lists adoptable pets from the shelter API, attaches lazily fetched
//! thumbnails, and projects the result into sections and a loading state
//! that a host UI renders. The host pushes a location (or a location
//! failure), reloads, and selections; it reads signals back.
//!
//! # Design
//! - `http` / `transport` keep requests and responses as plain data behind
//!   the `HttpTransport` seam; `status` classifies status codes.
//! - `auth::AuthManager` owns the bearer token and retries a `401` once.
//! - `catalog::PetfinderClient` is the `PetCatalog` over the API.
//! - `media::CachedMediaService` deduplicates in-flight photo fetches and
//!   caches decoded images for the life of the process.
//! - `pipeline::PetListPipeline` combines location, catalog and media into
//!   `Signal`s; `navigation` and `details` carry a selection to the details
//!   screen.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod auth;
pub mod catalog;
pub mod config;
pub mod details;
pub mod error;
pub mod http;
pub mod location;
pub mod media;
pub mod navigation;
pub mod pet;
pub mod pipeline;
pub mod signal;
pub mod status;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use auth::{AuthManager, Credentials, Token};
pub use catalog::{PetCatalog, PetfinderClient};
pub use config::ClientConfig;
pub use details::{DetailItem, PetDetails};
pub use error::ApiError;
pub use http::{ApiEnvironment, Endpoint, HttpMethod, HttpRequest, HttpResponse};
pub use location::{Location, LocationError, LocationProvider};
pub use media::{CachedMediaService, Image, MediaService, MemoryImageCache, PhotoStream};
pub use navigation::{Destination, NavigationSource, Navigator, Transition};
pub use pet::{Breed, Gender, Pet, Size, Status};
pub use pipeline::{LoadingState, PetListItem, PetListPipeline, PetSection};
pub use signal::{Relay, ReplayRelay, Signal};
pub use status::{StatusCategory, StatusCodeError, StatusReason};
pub use transport::{HttpTransport, NetworkService, UreqTransport};
