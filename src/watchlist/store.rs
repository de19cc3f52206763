use std::sync::Arc;

use chrono::Utc;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::KeyValueStore;

use super::normalize::{normalize, MIN_PLATE_LEN};

/// Slot name the whole collection is stored under.
pub const WATCHLIST_SLOT: &str = "watchlist";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WatchedPlate {
    pub id: String,
    pub number: String,
    /// Epoch milliseconds.
    pub created_at: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum WatchlistError {
    #[error("plate must have at least {} letters or digits", MIN_PLATE_LEN)]
    InvalidFormat,

    #[error("plate {0} is already on the watchlist")]
    DuplicateEntry(String),

    #[error("failed to persist watchlist: {0:#}")]
    Storage(#[from] anyhow::Error),
}

/// User-curated plates, most recent first, mirrored to a single storage slot.
pub struct WatchlistStore {
    slot: Arc<dyn KeyValueStore>,
    plates: RwLock<Vec<WatchedPlate>>,
}

impl WatchlistStore {
    /// Read the persisted collection. Missing, unreadable or corrupt data
    /// yields an empty list so startup never blocks on storage.
    pub async fn load(slot: Arc<dyn KeyValueStore>) -> Self {
        let plates = match slot.get(WATCHLIST_SLOT).await {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<WatchedPlate>>(&raw) {
                Ok(plates) => plates,
                Err(err) => {
                    warn!("Discarding corrupt watchlist data: {err}");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!("Failed to read watchlist, starting empty: {err:#}");
                Vec::new()
            }
        };

        info!("Loaded {} watched plate(s)", plates.len());

        Self {
            slot,
            plates: RwLock::new(plates),
        }
    }

    pub async fn list(&self) -> Vec<WatchedPlate> {
        self.plates.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.plates.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.plates.read().await.is_empty()
    }

    /// `number` must already be normalized.
    pub async fn contains(&self, number: &str) -> bool {
        self.plates
            .read()
            .await
            .iter()
            .any(|plate| plate.number == number)
    }

    pub async fn add(&self, raw: &str) -> Result<WatchedPlate, WatchlistError> {
        let number = normalize(raw);
        if number.len() < MIN_PLATE_LEN {
            return Err(WatchlistError::InvalidFormat);
        }

        let mut plates = self.plates.write().await;
        if plates.iter().any(|plate| plate.number == number) {
            return Err(WatchlistError::DuplicateEntry(number));
        }

        let plate = WatchedPlate {
            id: Uuid::new_v4().to_string(),
            number,
            created_at: Utc::now().timestamp_millis(),
        };

        let mut next = Vec::with_capacity(plates.len() + 1);
        next.push(plate.clone());
        next.extend(plates.iter().cloned());

        self.persist(&next).await?;
        *plates = next;

        info!("Added {} to watchlist ({} total)", plate.number, plates.len());
        Ok(plate)
    }

    /// Returns the removed entry, or `None` when no entry had that id.
    pub async fn remove(&self, id: &str) -> Result<Option<WatchedPlate>, WatchlistError> {
        let mut plates = self.plates.write().await;
        let Some(position) = plates.iter().position(|plate| plate.id == id) else {
            return Ok(None);
        };

        let mut next = plates.clone();
        let removed = next.remove(position);

        self.persist(&next).await?;
        *plates = next;

        info!("Removed {} from watchlist", removed.number);
        Ok(Some(removed))
    }

    async fn persist(&self, plates: &[WatchedPlate]) -> anyhow::Result<()> {
        let serialized = serde_json::to_string(plates)?;
        self.slot.set(WATCHLIST_SLOT, serialized).await
    }
}
