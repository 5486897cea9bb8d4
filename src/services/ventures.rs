use std::sync::Arc;

use chrono::TimeDelta;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::clock::Clock;
use crate::models::{CreateVentureRequest, UpdateVentureRequest, Venture, VentureStage};

/// In-memory ventures store behind the demo API.
///
/// Data lives for the lifetime of the process; restarts return to the seed
/// set. Listing order is insertion order.
#[derive(Clone)]
pub struct VentureService {
    ventures: Arc<RwLock<Vec<Venture>>>,
    clock: Arc<dyn Clock>,
}

impl VentureService {
    /// Create an empty store.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            ventures: Arc::new(RwLock::new(Vec::new())),
            clock,
        }
    }

    /// Create a store preloaded with the studio's portfolio.
    pub fn seeded(clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        let seed = vec![
            Venture::new(
                "Lumen",
                "Off-grid solar lighting for rural clinics",
                VentureStage::Launched,
                now - TimeDelta::days(540),
            ),
            Venture::new(
                "Tidewater",
                "Flood-risk forecasting for coastal municipalities",
                VentureStage::Building,
                now - TimeDelta::days(120),
            ),
            Venture::new(
                "Fieldnote",
                "Voice-first field reports for agronomists",
                VentureStage::Idea,
                now - TimeDelta::days(14),
            ),
        ];
        info!(count = seed.len(), "Seeded ventures store");

        Self {
            ventures: Arc::new(RwLock::new(seed)),
            clock,
        }
    }

    pub async fn list(&self) -> Vec<Venture> {
        self.ventures.read().await.clone()
    }

    /// Fetch one venture.
    ///
    /// # Errors
    ///
    /// `NotFound` if no venture has `id`.
    pub async fn get(&self, id: Uuid) -> AppResult<Venture> {
        self.ventures
            .read()
            .await
            .iter()
            .find(|v| v.id == id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create(&self, request: CreateVentureRequest) -> Venture {
        let venture = Venture::new(
            request.name.trim(),
            request.description,
            request.stage,
            self.clock.now(),
        );

        self.ventures.write().await.push(venture.clone());
        debug!(id = %venture.id, "Venture created");

        venture
    }

    /// Apply `update` to venture `id` and return the result.
    #[instrument(skip(self, update))]
    pub async fn update(&self, id: Uuid, update: UpdateVentureRequest) -> AppResult<Venture> {
        let mut ventures = self.ventures.write().await;
        let venture = ventures
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or_else(|| not_found(id))?;

        venture.apply(update);
        debug!(id = %id, "Venture updated");

        Ok(venture.clone())
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        let mut ventures = self.ventures.write().await;
        let before = ventures.len();
        ventures.retain(|v| v.id != id);

        if ventures.len() == before {
            return Err(not_found(id));
        }

        debug!(id = %id, "Venture deleted");
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.ventures.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Venture {id} not found"))
}
