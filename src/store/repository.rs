//! Economy Repository
//!
//! Read-modify-write over the versioned document with optimistic
//! concurrency control.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::aggregate::{Economy, SystemConfig};

use super::StoreError;

/// Backend holding the single economy document.
#[async_trait]
pub trait AggregateStore: Send + Sync {
    /// Load the document. A missing document loads as an empty economy at
    /// version 0.
    async fn load(&self) -> Result<Economy, StoreError>;

    /// Persist the document only if the stored version still equals
    /// `economy.version()`. Returns the new version.
    async fn save(&self, economy: &Economy) -> Result<i64, StoreError>;
}

/// Attempts per mutation before giving up
const MAX_ATTEMPTS: u32 = 5;

/// Repository used by every handler
#[derive(Clone)]
pub struct EconomyRepository {
    backend: Arc<dyn AggregateStore>,
    seed: SystemConfig,
}

impl EconomyRepository {
    /// `seed` is the configuration a never-persisted economy starts with
    pub fn new(backend: Arc<dyn AggregateStore>, seed: SystemConfig) -> Self {
        Self { backend, seed }
    }

    /// Current snapshot of the economy
    pub async fn load(&self) -> Result<Economy, StoreError> {
        let economy = self.backend.load().await?;
        if economy.version() == 0 {
            return Ok(Economy::seeded(self.seed.clone()));
        }
        Ok(economy)
    }

    /// Run `operation` against a fresh snapshot and save the result.
    ///
    /// On a version conflict the snapshot is reloaded and the operation
    /// re-run, so it must only depend on the economy it is given. Operations
    /// that leave the document untouched never write.
    pub async fn mutate<T, E, F>(&self, mut operation: F) -> Result<T, E>
    where
        T: Send,
        E: From<StoreError> + Send,
        F: FnMut(&mut Economy) -> Result<T, E> + Send,
    {
        for attempt in 0..MAX_ATTEMPTS {
            let mut economy = self.load().await?;
            let output = operation(&mut economy)?;

            if !economy.is_dirty() {
                return Ok(output);
            }

            match self.backend.save(&economy).await {
                Ok(version) => {
                    tracing::debug!(version = version, attempt = attempt + 1, "Economy saved");
                    return Ok(output);
                }
                Err(e) if e.is_concurrency_conflict() => {
                    if attempt + 1 == MAX_ATTEMPTS {
                        break;
                    }
                    tracing::warn!(
                        "Concurrency conflict, retrying (attempt {}/{}): {}",
                        attempt + 1,
                        MAX_ATTEMPTS,
                        e
                    );
                    let delay = Duration::from_millis(50 * (attempt as u64 + 1));
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::error!(attempts = MAX_ATTEMPTS, "Giving up on economy update");
        Err(StoreError::MaxRetriesExceeded.into())
    }
}
