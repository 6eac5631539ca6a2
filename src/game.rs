use std::sync::Arc;

use tracing::{debug, info};

use crate::api::health::HealthState;
use crate::config::{DEFAULT_LEADERBOARD_LIMIT, MAX_LEADERBOARD_LIMIT};
use crate::error::{AppError, Result};
use crate::leaderboard;
use crate::lookup::{now_ns, Clock, PredictionLookup};
use crate::scorer;
use crate::store::GameStore;
use crate::types::{GameDate, GuessRecord, Identity, LeaderboardEntry, Prediction};

/// A guess as received from the request layer, already parsed to numbers.
#[derive(Debug, Clone, Copy)]
pub struct SubmitGuess {
    pub game_date: Option<GameDate>,
    pub user_guess: f64,
    pub actual_open: Option<f64>,
}

/// Game operations over a store: lookup, submission, ranking, settlement.
#[derive(Clone)]
pub struct GameService {
    store: Arc<dyn GameStore>,
    lookup: PredictionLookup,
    health: Arc<HealthState>,
}

impl GameService {
    pub fn new(store: Arc<dyn GameStore>, clock: Arc<dyn Clock>, health: Arc<HealthState>) -> Self {
        let lookup = PredictionLookup::new(Arc::clone(&store), clock);
        Self { store, lookup, health }
    }

    pub fn health(&self) -> &HealthState {
        &self.health
    }

    /// The prediction for the date (default today), or NotFound.
    pub async fn today(&self, game_date: Option<GameDate>) -> Result<Prediction> {
        match self.lookup.resolve(game_date).await? {
            (_, Some(prediction)) => Ok(prediction),
            (game_date, None) => {
                debug!(%game_date, "No prediction seeded");
                Err(AppError::NotFound { game_date })
            }
        }
    }

    /// Score a guess against the date's prediction and upsert it.
    ///
    /// Once a date is settled its recorded open is used, and a body
    /// `actualOpen` that disagrees with it is rejected. A guess written while
    /// the date is being settled is scored after the write.
    pub async fn submit(&self, req: SubmitGuess, identity: Identity) -> Result<GuessRecord> {
        let (game_date, prediction) = self.lookup.resolve(req.game_date).await?;
        let settled_open = self.store.get_actual_open(game_date).await?;
        if let (Some(settled), Some(claimed)) = (settled_open, req.actual_open) {
            if settled != claimed {
                debug!(%game_date, settled, claimed, "Guess rejected: actualOpen conflicts with settled open");
                return Err(AppError::Validation(format!(
                    "actualOpen does not match the settled open for {game_date}"
                )));
            }
        }

        let actual_open = settled_open.or(req.actual_open);
        let result = scorer::score(game_date, req.user_guess, prediction.as_ref(), actual_open)
            .inspect_err(|e| debug!(%game_date, user_id = %identity.user_id, "Guess rejected: {e}"))?;

        let record = GuessRecord {
            game_date,
            user_id: identity.user_id,
            username: identity.username,
            user_guess: req.user_guess,
            bot_prediction: result.bot_prediction,
            actual_open: result.actual_open,
            outcome: result.outcome,
            submitted_at_ns: now_ns(),
        };
        self.store.put_guess(&record).await?;
        let record = match settled_open {
            Some(_) => record,
            None => self.score_if_settled_since(record).await?,
        };
        self.health.record_guess(record.submitted_at_ns as u64);

        info!(
            event = "GUESS_SUBMITTED",
            game_date = %record.game_date,
            user_id = %record.user_id,
            user_guess = record.user_guess,
            bot_prediction = record.bot_prediction,
            scored = record.outcome.is_some(),
            "GUESS | {} | user: {} | guess: {:.2} | bot: {:.2}",
            record.game_date, record.username, record.user_guess, record.bot_prediction,
        );
        Ok(record)
    }

    /// Ranked view of the date's scored guesses. `limit` defaults to
    /// [`DEFAULT_LEADERBOARD_LIMIT`] and is capped at [`MAX_LEADERBOARD_LIMIT`].
    pub async fn leaderboard(
        &self,
        game_date: Option<GameDate>,
        limit: Option<usize>,
    ) -> Result<(GameDate, Vec<LeaderboardEntry>)> {
        let game_date = self.lookup.game_date(game_date);
        let limit = limit.unwrap_or(DEFAULT_LEADERBOARD_LIMIT).min(MAX_LEADERBOARD_LIMIT);
        let guesses = self.store.list_guesses(game_date).await?;
        let board = leaderboard::rank(game_date, &guesses, limit);
        debug!(%game_date, guesses = guesses.len(), ranked = board.len(), "Leaderboard built");
        Ok((game_date, board))
    }

    /// Ingest a prediction from the model pipeline.
    pub async fn publish_prediction(&self, prediction: Prediction) -> Result<()> {
        validate_prediction(&prediction)?;
        self.store.put_prediction(&prediction).await?;
        info!(
            event = "PREDICTION_PUBLISHED",
            game_date = %prediction.game_date,
            predicted_open = prediction.predicted_open,
            "PREDICTION | {} | open: {:.2} | 95%: [{:.2}, {:.2}]",
            prediction.game_date, prediction.predicted_open, prediction.lower_bound, prediction.upper_bound,
        );
        Ok(())
    }

    /// Record the real opening price for a date and score every guess made
    /// for it. Each guess is scored against its own bot snapshot, and later
    /// guesses for the date are scored on submission. Settling again replaces
    /// the recorded open. Returns the number of guesses settled.
    pub async fn settle(&self, game_date: GameDate, actual_open: f64) -> Result<usize> {
        if !actual_open.is_finite() {
            return Err(AppError::Validation("actualOpen must be a number".to_string()));
        }
        if self.store.get_prediction(game_date).await?.is_none() {
            return Err(AppError::Precondition { game_date });
        }

        let settled = self.store.settle_guesses(game_date, actual_open).await?;
        self.health.record_settlement();

        info!(
            event = "DATE_SETTLED",
            game_date = %game_date,
            actual_open,
            settled,
            "SETTLED | {} | actual open: {:.2} | guesses: {}",
            game_date, actual_open, settled,
        );
        Ok(settled)
    }

    /// A settlement that ran between the open check in `submit` and its write
    /// missed this guess. Score it against the recorded open.
    async fn score_if_settled_since(&self, record: GuessRecord) -> Result<GuessRecord> {
        let Some(actual_open) = self.store.get_actual_open(record.game_date).await? else {
            return Ok(record);
        };
        let scored = self
            .store
            .score_guess(record.game_date, &record.user_id, actual_open)
            .await?;
        debug!(game_date = %record.game_date, user_id = %record.user_id, actual_open, "Guess scored against late settlement");
        Ok(scored.unwrap_or_else(|| scorer::rescore(&record, actual_open)))
    }
}

fn validate_prediction(p: &Prediction) -> Result<()> {
    let values = [p.predicted_open, p.lower_bound, p.upper_bound];
    if values.iter().any(|v| !v.is_finite()) {
        return Err(AppError::Validation(
            "predictedOpen, lowerBound and upperBound must be numbers".to_string(),
        ));
    }
    if !(p.lower_bound <= p.predicted_open && p.predicted_open <= p.upper_bound) {
        return Err(AppError::Validation(
            "lowerBound <= predictedOpen <= upperBound must hold".to_string(),
        ));
    }
    Ok(())
}
