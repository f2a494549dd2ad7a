//! API module
//!
//! HTTP API endpoints and middleware.

pub mod extract;
pub mod middleware;
pub mod routes;

use std::sync::Arc;

use crate::store::EconomyRepository;

pub use middleware::ApiKeys;
pub use routes::create_router;

/// Shared state of every request
#[derive(Clone)]
pub struct AppState {
    pub repository: EconomyRepository,
    pub keys: Arc<ApiKeys>,
}

impl AppState {
    pub fn new(repository: EconomyRepository, keys: ApiKeys) -> Self {
        Self {
            repository,
            keys: Arc::new(keys),
        }
    }
}
