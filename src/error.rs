use axum::{http::StatusCode, response::IntoResponse, Json};
use thiserror::Error;
use tracing::error;

use crate::types::GameDate;

#[derive(Debug, Error)]
pub enum AppError {
    /// No prediction has been seeded for the date. Expected state, not a fault.
    #[error("No prediction found for {game_date}")]
    NotFound { game_date: GameDate },

    /// Malformed client input (bad guess value, bad date, bad bounds).
    #[error("{0}")]
    Validation(String),

    /// Scoring attempted for a date with no bot prediction to compare against.
    #[error("No bot prediction for {game_date}")]
    Precondition { game_date: GameDate },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Stored record is corrupt: {0}")]
    Corrupt(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Validation(_) | AppError::Precondition { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let body = match &self {
            AppError::NotFound { game_date } => serde_json::json!({
                "message": "No prediction found for this date",
                "gameDate": game_date,
            }),
            AppError::Precondition { game_date } => serde_json::json!({
                "message": "No bot prediction for this date",
                "gameDate": game_date,
            }),
            AppError::Validation(msg) => serde_json::json!({ "message": msg }),
            _ => {
                error!("Request failed: {self}");
                serde_json::json!({ "message": "Internal server error" })
            }
        };
        (status, Json(body)).into_response()
    }
}
