use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{Path, Query, Request, State},
    http::HeaderMap,
    middleware::{self, Next},
    response::Response,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::latency::{LatencySummary, RequestLatency};
use crate::error::{AppError, Result};
use crate::game::{GameService, SubmitGuess};
use crate::scorer::parse_price;
use crate::types::{GameDate, GuessRecord, Identity, LeaderboardEntry, Prediction};

/// Header carrying the caller's user id, set by the upstream auth gateway.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the caller's display name, set by the upstream auth gateway.
pub const USERNAME_HEADER: &str = "x-username";

#[derive(Clone)]
pub struct ApiState {
    pub game: GameService,
    pub latency: Arc<RequestLatency>,
    pub symbol: String,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/today", get(get_today))
        .route("/guess", post(post_guess))
        .route("/leaderboard", get(get_leaderboard))
        .route("/predictions/:game_date", put(put_prediction))
        .route("/results/:game_date", post(post_results))
        .route("/health", get(get_health))
        .route("/stats/latency", get(get_stats_latency))
        .layer(middleware::from_fn_with_state(state.clone(), track_latency))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param and body structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateQuery {
    pub game_date: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardQuery {
    pub game_date: Option<String>,
    pub limit: Option<String>,
}

/// Fields stay loosely typed so that bad values surface as our own
/// validation errors rather than extractor rejections.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GuessBody {
    pub game_date: Option<String>,
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub user_guess: Option<Value>,
    pub actual_open: Option<Value>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelPrediction {
    pub predicted_open: f64,
    pub lower95: f64,
    pub upper95: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodayResponse {
    pub game_date: GameDate,
    pub symbol: String,
    pub model_prediction: ModelPrediction,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuessResponse {
    pub game_date: GameDate,
    pub username: String,
    pub user_guess: f64,
    pub bot_prediction: f64,
    pub actual_open: Option<f64>,
    pub user_error: Option<f64>,
    pub bot_error: Option<f64>,
    pub did_user_beat_bot: Option<bool>,
}

impl From<GuessRecord> for GuessResponse {
    fn from(g: GuessRecord) -> Self {
        Self {
            user_error: g.user_error(),
            bot_error: g.bot_error(),
            did_user_beat_bot: g.did_user_beat_bot(),
            game_date: g.game_date,
            username: g.username,
            user_guess: g.user_guess,
            bot_prediction: g.bot_prediction,
            actual_open: g.actual_open,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardResponse {
    pub game_date: GameDate,
    pub leaderboard: Vec<LeaderboardEntry>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    pub game_date: GameDate,
    pub actual_open: f64,
    pub settled: usize,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Blank strings count as "not supplied".
fn optional_date(raw: Option<&str>) -> Result<Option<GameDate>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => s.parse().map(Some),
        None => Ok(None),
    }
}

/// An unparsable body is treated as empty, so the caller gets a field-level
/// validation message instead of a JSON syntax error.
fn lenient_json<T: for<'de> Deserialize<'de> + Default>(body: &Bytes) -> T {
    serde_json::from_slice(body).unwrap_or_default()
}

fn json_object(body: &Bytes) -> serde_json::Map<String, Value> {
    match serde_json::from_slice(body) {
        Ok(Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    }
}

/// Auth gateway headers win over body fields; both fall back to anonymous.
fn identity(headers: &HeaderMap, body: &GuessBody) -> Identity {
    Identity::new(
        header_value(headers, USER_ID_HEADER).or(body.user_id.as_deref()),
        header_value(headers, USERNAME_HEADER).or(body.username.as_deref()),
    )
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// Middleware
// ---------------------------------------------------------------------------

async fn track_latency(State(state): State<ApiState>, req: Request, next: Next) -> Response {
    let started = Instant::now();
    let response = next.run(req).await;
    state.latency.record(started.elapsed());
    response
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_today(
    State(state): State<ApiState>,
    Query(params): Query<DateQuery>,
) -> Result<Json<TodayResponse>> {
    let game_date = optional_date(params.game_date.as_deref())?;
    let p = state.game.today(game_date).await?;

    Ok(Json(TodayResponse {
        game_date: p.game_date,
        symbol: state.symbol.clone(),
        model_prediction: ModelPrediction {
            predicted_open: p.predicted_open,
            lower95: p.lower_bound,
            upper95: p.upper_bound,
        },
    }))
}

async fn post_guess(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<GuessResponse>> {
    let body: GuessBody = lenient_json(&body);

    let user_guess = parse_price("userGuess", body.user_guess.as_ref())?;
    let actual_open = match &body.actual_open {
        None | Some(Value::Null) => None,
        Some(v) => Some(parse_price("actualOpen", Some(v))?),
    };
    let req = SubmitGuess {
        game_date: optional_date(body.game_date.as_deref())?,
        user_guess,
        actual_open,
    };

    let record = state.game.submit(req, identity(&headers, &body)).await?;
    Ok(Json(record.into()))
}

async fn get_leaderboard(
    State(state): State<ApiState>,
    Query(params): Query<LeaderboardQuery>,
) -> Result<Json<LeaderboardResponse>> {
    let game_date = optional_date(params.game_date.as_deref())?;
    let limit = match params.limit.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Some(raw.parse::<usize>().map_err(|_| {
            AppError::Validation(format!("limit must be a non-negative integer, got '{raw}'"))
        })?),
        None => None,
    };

    let (game_date, leaderboard) = state.game.leaderboard(game_date, limit).await?;
    Ok(Json(LeaderboardResponse { game_date, leaderboard }))
}

async fn put_prediction(
    State(state): State<ApiState>,
    Path(game_date): Path<String>,
    body: Bytes,
) -> Result<Json<Value>> {
    let game_date: GameDate = game_date.parse()?;
    let body = json_object(&body);
    let prediction = Prediction {
        game_date,
        predicted_open: parse_price("predictedOpen", body.get("predictedOpen"))?,
        lower_bound: parse_price("lowerBound", body.get("lowerBound"))?,
        upper_bound: parse_price("upperBound", body.get("upperBound"))?,
    };

    state.game.publish_prediction(prediction).await?;
    Ok(Json(serde_json::json!({ "gameDate": game_date, "stored": true })))
}

async fn post_results(
    State(state): State<ApiState>,
    Path(game_date): Path<String>,
    body: Bytes,
) -> Result<Json<SettleResponse>> {
    let game_date: GameDate = game_date.parse()?;
    let body = json_object(&body);
    let actual_open = parse_price("actualOpen", body.get("actualOpen"))?;

    let settled = state.game.settle(game_date, actual_open).await?;
    Ok(Json(SettleResponse { game_date, actual_open, settled }))
}

async fn get_health(State(state): State<ApiState>) -> Json<Value> {
    let health = state.game.health();
    let last = health.last_guess_at_ns();
    let last = (last != 0).then_some(last);
    Json(serde_json::json!({
        "status": "ok",
        "guessesSubmitted": health.guesses_submitted(),
        "settlements": health.settlements(),
        "lastGuessAtNs": last,
    }))
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencySummary> {
    Json(state.latency.summary())
}
