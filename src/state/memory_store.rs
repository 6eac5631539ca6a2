use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::Result;
use crate::scorer::rescore;
use crate::store::GameStore;
use crate::types::{GameDate, GuessRecord, Prediction};

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Process-local store. Guesses are bucketed per date so a leaderboard read
/// touches one shard and sees each user at most once.
pub struct MemoryStore {
    /// game_date → Prediction
    predictions: DashMap<GameDate, Prediction>,
    /// game_date → (user_id → GuessRecord)
    guesses: DashMap<GameDate, DashMap<String, GuessRecord>>,
    /// game_date → settled opening price
    results: DashMap<GameDate, f64>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[cfg(test)]
    pub fn guess_count(&self, game_date: GameDate) -> usize {
        self.guesses.get(&game_date).map(|g| g.len()).unwrap_or(0)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            predictions: DashMap::new(),
            guesses: DashMap::new(),
            results: DashMap::new(),
        }
    }
}

#[async_trait]
impl GameStore for MemoryStore {
    async fn get_prediction(&self, game_date: GameDate) -> Result<Option<Prediction>> {
        Ok(self.predictions.get(&game_date).map(|p| *p))
    }

    async fn put_prediction(&self, prediction: &Prediction) -> Result<()> {
        self.predictions.insert(prediction.game_date, *prediction);
        Ok(())
    }

    async fn put_guess(&self, guess: &GuessRecord) -> Result<()> {
        self.guesses
            .entry(guess.game_date)
            .or_default()
            .insert(guess.user_id.clone(), guess.clone());
        Ok(())
    }

    async fn get_guess(&self, game_date: GameDate, user_id: &str) -> Result<Option<GuessRecord>> {
        let Some(day) = self.guesses.get(&game_date) else {
            return Ok(None);
        };
        let found = day.get(user_id).map(|g| g.clone());
        Ok(found)
    }

    async fn list_guesses(&self, game_date: GameDate) -> Result<Vec<GuessRecord>> {
        let Some(day) = self.guesses.get(&game_date) else {
            return Ok(Vec::new());
        };
        let all = day.iter().map(|e| e.value().clone()).collect();
        Ok(all)
    }

    async fn get_actual_open(&self, game_date: GameDate) -> Result<Option<f64>> {
        Ok(self.results.get(&game_date).map(|a| *a))
    }

    async fn settle_guesses(&self, game_date: GameDate, actual_open: f64) -> Result<usize> {
        // Published before scoring so a guess written after the sweep finds it.
        self.results.insert(game_date, actual_open);
        let Some(day) = self.guesses.get(&game_date) else {
            return Ok(0);
        };
        let mut scored = 0;
        for mut entry in day.iter_mut() {
            let current = entry.value_mut();
            *current = rescore(current, actual_open);
            scored += 1;
        }
        Ok(scored)
    }

    async fn score_guess(
        &self,
        game_date: GameDate,
        user_id: &str,
        actual_open: f64,
    ) -> Result<Option<GuessRecord>> {
        let Some(day) = self.guesses.get(&game_date) else {
            return Ok(None);
        };
        let scored = day.get_mut(user_id).map(|mut entry| {
            let current = entry.value_mut();
            *current = rescore(current, actual_open);
            current.clone()
        });
        Ok(scored)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
