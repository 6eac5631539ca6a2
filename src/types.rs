use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::ANONYMOUS_IDENTITY;
use crate::error::AppError;

// ---------------------------------------------------------------------------
// Game date
// ---------------------------------------------------------------------------

/// One round of the game, identified by a calendar date (`YYYY-MM-DD`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameDate(NaiveDate);

impl GameDate {
    pub const FORMAT: &'static str = "%Y-%m-%d";

    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl std::str::FromStr for GameDate {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s.trim(), Self::FORMAT)
            .map(GameDate)
            .map_err(|_| AppError::Validation(format!("gameDate must be YYYY-MM-DD, got '{s}'")))
    }
}

impl std::fmt::Display for GameDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format(Self::FORMAT))
    }
}

// ---------------------------------------------------------------------------
// Prediction
// ---------------------------------------------------------------------------

/// The model's opening-price estimate for one game date, with its 95% interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub game_date: GameDate,
    pub predicted_open: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// The three fields derived once the actual open is known. Kept as one value
/// so a record can never carry some of them without the others.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outcome {
    pub user_error: f64,
    pub bot_error: f64,
    pub did_user_beat_bot: bool,
}

/// Result of scoring one guess. `outcome` is None while the actual open is unknown.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreResult {
    pub bot_prediction: f64,
    pub actual_open: Option<f64>,
    pub outcome: Option<Outcome>,
}

// ---------------------------------------------------------------------------
// Guesses
// ---------------------------------------------------------------------------

/// One user's guess for one game date. Upserted by `(game_date, user_id)`.
#[derive(Debug, Clone, PartialEq)]
pub struct GuessRecord {
    pub game_date: GameDate,
    pub user_id: String,
    pub username: String,
    pub user_guess: f64,
    /// Snapshot of the prediction at submission time, never a live reference.
    pub bot_prediction: f64,
    pub actual_open: Option<f64>,
    pub outcome: Option<Outcome>,
    /// Nanosecond UTC epoch of the submission. Settlement keeps it unchanged.
    pub submitted_at_ns: i64,
}

impl GuessRecord {
    pub fn user_error(&self) -> Option<f64> {
        self.outcome.map(|o| o.user_error)
    }

    pub fn bot_error(&self) -> Option<f64> {
        self.outcome.map(|o| o.bot_error)
    }

    pub fn did_user_beat_bot(&self) -> Option<bool> {
        self.outcome.map(|o| o.did_user_beat_bot)
    }
}

/// One row of a leaderboard. Derived on request, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub username: String,
    pub user_error: f64,
    pub bot_error: f64,
    pub did_user_beat_bot: bool,
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Who submitted a guess, as reported by the auth layer. Opaque to the game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub username: String,
}

impl Identity {
    /// Blank or missing values fall back to [`ANONYMOUS_IDENTITY`].
    pub fn new(user_id: Option<&str>, username: Option<&str>) -> Self {
        let pick = |v: Option<&str>| {
            v.map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(ANONYMOUS_IDENTITY)
                .to_string()
        };
        Self {
            user_id: pick(user_id),
            username: pick(username),
        }
    }
}
