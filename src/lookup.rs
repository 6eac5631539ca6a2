use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;

use crate::config::GAME_TIMEZONE;
use crate::error::Result;
use crate::store::GameStore;
use crate::types::{GameDate, Prediction};

/// Source of "today" for callers that omit a game date.
pub trait Clock: Send + Sync {
    fn today(&self) -> GameDate;
}

/// Wall clock in [`GAME_TIMEZONE`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> GameDate {
        GameDate::new(Utc::now().with_timezone(&GAME_TIMEZONE).date_naive())
    }
}

/// Wall-clock nanoseconds since the Unix epoch. Stamps guess submissions
/// and store writes.
pub fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64
}

/// Always returns the same date.
#[cfg(test)]
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub GameDate);

#[cfg(test)]
impl Clock for FixedClock {
    fn today(&self) -> GameDate {
        self.0
    }
}

/// Resolves a game date to the bot's prediction for it.
#[derive(Clone)]
pub struct PredictionLookup {
    store: Arc<dyn GameStore>,
    clock: Arc<dyn Clock>,
}

impl PredictionLookup {
    pub fn new(store: Arc<dyn GameStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// The explicit date, or today per the clock.
    pub fn game_date(&self, requested: Option<GameDate>) -> GameDate {
        requested.unwrap_or_else(|| self.clock.today())
    }

    /// Exact-date lookup. An unseeded date is `Ok((date, None))`; only a
    /// store failure is an error.
    pub async fn resolve(&self, requested: Option<GameDate>) -> Result<(GameDate, Option<Prediction>)> {
        let game_date = self.game_date(requested);
        let prediction = self.store.get_prediction(game_date).await?;
        Ok((game_date, prediction))
    }
}
