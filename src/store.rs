//! Storage boundary for predictions and guesses.
//!
//! The game logic only ever talks to a [`GameStore`]; SQLite and in-memory
//! backends are interchangeable behind it.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::{Config, StoreBackend};
use crate::db::SqliteStore;
use crate::error::Result;
use crate::state::MemoryStore;
use crate::types::{GameDate, GuessRecord, Prediction};

#[async_trait]
pub trait GameStore: Send + Sync {
    /// Exact-date lookup. `Ok(None)` means the date has not been seeded.
    async fn get_prediction(&self, game_date: GameDate) -> Result<Option<Prediction>>;

    /// Insert or replace the prediction for its date.
    async fn put_prediction(&self, prediction: &Prediction) -> Result<()>;

    /// Upsert keyed by `(game_date, user_id)`; the last write wins.
    async fn put_guess(&self, guess: &GuessRecord) -> Result<()>;

    async fn get_guess(&self, game_date: GameDate, user_id: &str) -> Result<Option<GuessRecord>>;

    /// Every guess for the date, read in one pass. Order is unspecified.
    async fn list_guesses(&self, game_date: GameDate) -> Result<Vec<GuessRecord>>;

    /// The settled opening price for the date, if one has been recorded.
    async fn get_actual_open(&self, game_date: GameDate) -> Result<Option<f64>>;

    /// Record the date's opening price and score every guess for it.
    ///
    /// Only `actual_open` and the outcome fields are written. Each outcome is
    /// derived from the row's current `user_guess` and `bot_prediction`, so a
    /// resubmission that lands while settling is scored, never overwritten.
    /// Returns the number of guesses scored.
    async fn settle_guesses(&self, game_date: GameDate, actual_open: f64) -> Result<usize>;

    /// Score one stored guess the same way [`GameStore::settle_guesses`]
    /// does. `Ok(None)` when the user has no guess for the date.
    async fn score_guess(
        &self,
        game_date: GameDate,
        user_id: &str,
        actual_open: f64,
    ) -> Result<Option<GuessRecord>>;
}

/// Open the backend selected by `STORE_BACKEND`, running migrations for SQLite.
pub async fn open(cfg: &Config) -> Result<Arc<dyn GameStore>> {
    match cfg.store_backend {
        StoreBackend::Sqlite => {
            let store = SqliteStore::connect(&cfg.db_path).await?;
            info!("Database ready at {}", cfg.db_path);
            let store: Arc<dyn GameStore> = Arc::new(store);
            Ok(store)
        }
        StoreBackend::Memory => {
            info!("Using in-memory store; data is lost on restart");
            let store: Arc<dyn GameStore> = MemoryStore::new();
            Ok(store)
        }
    }
}
