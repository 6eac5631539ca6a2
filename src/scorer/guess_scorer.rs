use serde_json::Value;

use crate::error::{AppError, Result};
use crate::types::{GameDate, GuessRecord, Outcome, Prediction, ScoreResult};

/// Parse a price field from a request body. Accepts a JSON number or a
/// numeric string; anything else, including NaN and infinities, is rejected.
pub fn parse_price(field: &str, raw: Option<&Value>) -> Result<f64> {
    let value = match raw {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match value {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(AppError::Validation(format!("{field} must be a number"))),
    }
}

/// Score a guess against the bot prediction and, once known, the actual open.
///
/// The guess is validated before the prediction is checked, so a bad value
/// is reported as such even on an unseeded date. Without `actual_open` the
/// result carries no outcome.
pub fn score(
    game_date: GameDate,
    user_guess: f64,
    prediction: Option<&Prediction>,
    actual_open: Option<f64>,
) -> Result<ScoreResult> {
    if !user_guess.is_finite() {
        return Err(AppError::Validation("userGuess must be a number".to_string()));
    }
    if matches!(actual_open, Some(a) if !a.is_finite()) {
        return Err(AppError::Validation("actualOpen must be a number".to_string()));
    }
    let prediction = prediction.ok_or(AppError::Precondition { game_date })?;
    let bot_prediction = prediction.predicted_open;

    Ok(ScoreResult {
        bot_prediction,
        actual_open,
        outcome: actual_open.map(|actual| compute_outcome(user_guess, bot_prediction, actual)),
    })
}

/// Re-derive the outcome of a stored guess from its own snapshotted bot
/// prediction. The submission time and identity are preserved.
pub fn rescore(record: &GuessRecord, actual_open: f64) -> GuessRecord {
    GuessRecord {
        actual_open: Some(actual_open),
        outcome: Some(compute_outcome(record.user_guess, record.bot_prediction, actual_open)),
        ..record.clone()
    }
}

/// A tie does not beat the bot.
fn compute_outcome(user_guess: f64, bot_prediction: f64, actual_open: f64) -> Outcome {
    let user_error = (actual_open - user_guess).abs();
    let bot_error = (actual_open - bot_prediction).abs();
    Outcome {
        user_error,
        bot_error,
        did_user_beat_bot: user_error < bot_error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date() -> GameDate {
        "2025-12-01".parse().unwrap()
    }

    fn prediction() -> Prediction {
        Prediction {
            game_date: date(),
            predicted_open: 120.00,
            lower_bound: 115.00,
            upper_bound: 125.00,
        }
    }

    fn user_error(r: &ScoreResult) -> Option<f64> {
        r.outcome.map(|o| o.user_error)
    }

    fn bot_error(r: &ScoreResult) -> Option<f64> {
        r.outcome.map(|o| o.bot_error)
    }

    fn beat(r: &ScoreResult) -> Option<bool> {
        r.outcome.map(|o| o.did_user_beat_bot)
    }

    fn assert_close(actual: Option<f64>, expected: f64) {
        let v = actual.expect("value should be present");
        assert!((v - expected).abs() < 1e-9, "expected {expected}, got {v}");
    }

    #[test]
    fn user_closer_than_bot_wins() {
        let r = score(date(), 118.00, Some(&prediction()), Some(117.50)).unwrap();
        assert_close(user_error(&r), 0.50);
        assert_close(bot_error(&r), 2.50);
        assert_eq!(beat(&r), Some(true));
        assert_eq!(r.bot_prediction, 120.00);
    }

    #[test]
    fn user_further_than_bot_loses() {
        let r = score(date(), 125.00, Some(&prediction()), Some(117.50)).unwrap();
        assert_close(user_error(&r), 7.50);
        assert_close(bot_error(&r), 2.50);
        assert_eq!(beat(&r), Some(false));
    }

    #[test]
    fn unknown_actual_leaves_outcome_absent() {
        for guess in [0.0, 118.0, -5.0, 1e9] {
            let r = score(date(), guess, Some(&prediction()), None).unwrap();
            assert!(r.outcome.is_none());
            assert!(user_error(&r).is_none());
            assert!(bot_error(&r).is_none());
            assert!(beat(&r).is_none());
            assert!(r.actual_open.is_none());
        }
    }

    #[test]
    fn equal_errors_do_not_beat_bot() {
        // Same distance on opposite sides of the actual open.
        let r = score(date(), 115.00, Some(&prediction()), Some(117.50)).unwrap();
        assert_eq!(user_error(&r), bot_error(&r));
        assert_eq!(beat(&r), Some(false));

        // Identical guess.
        let r = score(date(), 120.00, Some(&prediction()), Some(130.0)).unwrap();
        assert_eq!(beat(&r), Some(false));
    }

    #[test]
    fn scoring_is_deterministic() {
        let a = score(date(), 118.37, Some(&prediction()), Some(117.01)).unwrap();
        let b = score(date(), 118.37, Some(&prediction()), Some(117.01)).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            user_error(&a).unwrap().to_bits(),
            user_error(&b).unwrap().to_bits()
        );
    }

    #[test]
    fn missing_prediction_is_precondition_failure() {
        let d: GameDate = "2030-01-01".parse().unwrap();
        let err = score(d, 118.0, None, Some(117.5)).unwrap_err();
        assert!(matches!(err, AppError::Precondition { game_date } if game_date == d));
    }

    #[test]
    fn non_finite_guess_is_validation_even_without_prediction() {
        for g in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = score(date(), g, None, None).unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "{g}: {err:?}");
        }
    }

    #[test]
    fn non_finite_actual_is_validation() {
        let err = score(date(), 118.0, Some(&prediction()), Some(f64::NAN)).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn parse_price_accepts_numbers_and_numeric_strings() {
        assert_eq!(parse_price("userGuess", Some(&json!(118.5))).unwrap(), 118.5);
        assert_eq!(parse_price("userGuess", Some(&json!(118))).unwrap(), 118.0);
        assert_eq!(parse_price("userGuess", Some(&json!(" 117.25 "))).unwrap(), 117.25);
    }

    #[test]
    fn parse_price_rejects_non_numeric_values() {
        let bad = [
            None,
            Some(json!(null)),
            Some(json!("abc")),
            Some(json!("NaN")),
            Some(json!("inf")),
            Some(json!(true)),
            Some(json!([118])),
        ];
        for raw in bad {
            let err = parse_price("userGuess", raw.as_ref()).unwrap_err();
            match err {
                AppError::Validation(msg) => assert!(msg.contains("userGuess"), "{msg}"),
                other => panic!("expected validation error for {raw:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn rescore_uses_snapshot_not_current_prediction() {
        let record = GuessRecord {
            game_date: date(),
            user_id: "u1".to_string(),
            username: "alice".to_string(),
            user_guess: 118.0,
            bot_prediction: 120.0,
            actual_open: None,
            outcome: None,
            submitted_at_ns: 42,
        };
        let settled = rescore(&record, 117.5);
        assert_eq!(settled.actual_open, Some(117.5));
        assert_close(settled.user_error(), 0.5);
        assert_close(settled.bot_error(), 2.5);
        assert_eq!(settled.did_user_beat_bot(), Some(true));
        assert_eq!(settled.submitted_at_ns, 42);
        assert_eq!(settled.bot_prediction, 120.0);
    }
}
