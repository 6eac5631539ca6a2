//! Database row types matching `migrations/0001_init.sql`.
//! Conversions into domain types re-check the invariants the schema relies on.

use crate::error::{AppError, Result};
use crate::types::{GameDate, GuessRecord, Outcome, Prediction};

#[derive(Debug, sqlx::FromRow)]
pub struct PredictionRow {
    pub game_date: String,
    pub predicted_open: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct GuessRow {
    pub game_date: String,
    pub user_id: String,
    pub username: String,
    pub user_guess: f64,
    pub bot_prediction: f64,
    pub actual_open: Option<f64>,
    pub user_error: Option<f64>,
    pub bot_error: Option<f64>,
    pub did_user_beat_bot: Option<bool>,
    pub submitted_at: i64,
}

fn parse_stored_date(raw: &str) -> Result<GameDate> {
    raw.parse()
        .map_err(|_| AppError::Corrupt(format!("bad game_date '{raw}'")))
}

impl TryFrom<PredictionRow> for Prediction {
    type Error = AppError;

    fn try_from(row: PredictionRow) -> Result<Self> {
        Ok(Prediction {
            game_date: parse_stored_date(&row.game_date)?,
            predicted_open: row.predicted_open,
            lower_bound: row.lower_bound,
            upper_bound: row.upper_bound,
        })
    }
}

impl TryFrom<GuessRow> for GuessRecord {
    type Error = AppError;

    fn try_from(row: GuessRow) -> Result<Self> {
        let outcome = match (row.user_error, row.bot_error, row.did_user_beat_bot) {
            (Some(user_error), Some(bot_error), Some(did_user_beat_bot)) => Some(Outcome {
                user_error,
                bot_error,
                did_user_beat_bot,
            }),
            (None, None, None) => None,
            _ => {
                return Err(AppError::Corrupt(format!(
                    "partially scored guess for {}/{}",
                    row.game_date, row.user_id
                )))
            }
        };
        Ok(GuessRecord {
            game_date: parse_stored_date(&row.game_date)?,
            user_id: row.user_id,
            username: row.username,
            user_guess: row.user_guess,
            bot_prediction: row.bot_prediction,
            actual_open: row.actual_open,
            outcome,
            submitted_at_ns: row.submitted_at,
        })
    }
}
