//! Pet Catalog Client.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::auth::AuthManager;
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::http::{HttpMethod, PetfinderPath};
use crate::location::Location;
use crate::pet::Pet;
use crate::transport::{HttpTransport, NetworkService};

/// Fetches the pet list, optionally filtered by a location.
#[async_trait]
pub trait PetCatalog: Send + Sync {
    async fn get_pets(&self, location: Option<Location>) -> Result<Vec<Pet>, ApiError>;
}

#[derive(Deserialize)]
struct PetResponse {
    animals: Vec<Pet>,
}

/// `PetCatalog` over the shelter API.
#[derive(Debug)]
pub struct PetfinderClient {
    auth: AuthManager,
}

impl PetfinderClient {
    pub fn new(auth: AuthManager) -> Self {
        Self { auth }
    }

    pub fn from_config(config: &ClientConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let auth = AuthManager::new(NetworkService::new(transport), config.environment(), config.credentials());
        Self::new(auth)
    }

    pub fn auth(&self) -> &AuthManager {
        &self.auth
    }
}

#[async_trait]
impl PetCatalog for PetfinderClient {
    async fn get_pets(&self, location: Option<Location>) -> Result<Vec<Pet>, ApiError> {
        let response: PetResponse = self
            .auth
            .perform_authenticated_request(PetfinderPath::Pets, HttpMethod::Get, location.as_ref())
            .await?;
        Ok(response.animals)
    }
}
