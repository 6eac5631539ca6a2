use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::db::models::{GuessRow, PredictionRow};
use crate::error::Result;
use crate::lookup::now_ns;
use crate::store::GameStore;
use crate::types::{GameDate, GuessRecord, Prediction};

/// SQLite-backed store. Each write is a single statement, so the three
/// scoring columns of a guess are always written together. Settlement adds
/// a `results` row and scores the date's guesses in one transaction.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database file and apply migrations.
    pub async fn connect(db_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{db_path}"))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self::new(pool))
    }

    /// Private in-memory database. One connection, since every SQLite
    /// `:memory:` connection is its own database.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl GameStore for SqliteStore {
    async fn get_prediction(&self, game_date: GameDate) -> Result<Option<Prediction>> {
        let row = sqlx::query_as::<_, PredictionRow>(
            r#"
            SELECT game_date, predicted_open, lower_bound, upper_bound
            FROM predictions
            WHERE game_date = ?
            "#,
        )
        .bind(game_date.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Prediction::try_from).transpose()
    }

    async fn put_prediction(&self, p: &Prediction) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO predictions (game_date, predicted_open, lower_bound, upper_bound, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(game_date) DO UPDATE SET
                predicted_open = excluded.predicted_open,
                lower_bound = excluded.lower_bound,
                upper_bound = excluded.upper_bound,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(p.game_date.to_string())
        .bind(p.predicted_open)
        .bind(p.lower_bound)
        .bind(p.upper_bound)
        .bind(now_ns())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn put_guess(&self, g: &GuessRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO guesses (
                game_date, user_id, username, user_guess, bot_prediction,
                actual_open, user_error, bot_error, did_user_beat_bot, submitted_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(game_date, user_id) DO UPDATE SET
                username = excluded.username,
                user_guess = excluded.user_guess,
                bot_prediction = excluded.bot_prediction,
                actual_open = excluded.actual_open,
                user_error = excluded.user_error,
                bot_error = excluded.bot_error,
                did_user_beat_bot = excluded.did_user_beat_bot,
                submitted_at = excluded.submitted_at
            "#,
        )
        .bind(g.game_date.to_string())
        .bind(&g.user_id)
        .bind(&g.username)
        .bind(g.user_guess)
        .bind(g.bot_prediction)
        .bind(g.actual_open)
        .bind(g.user_error())
        .bind(g.bot_error())
        .bind(g.did_user_beat_bot())
        .bind(g.submitted_at_ns)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_guess(&self, game_date: GameDate, user_id: &str) -> Result<Option<GuessRecord>> {
        let row = sqlx::query_as::<_, GuessRow>(
            r#"
            SELECT game_date, user_id, username, user_guess, bot_prediction,
                   actual_open, user_error, bot_error, did_user_beat_bot, submitted_at
            FROM guesses
            WHERE game_date = ? AND user_id = ?
            "#,
        )
        .bind(game_date.to_string())
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(GuessRecord::try_from).transpose()
    }

    async fn list_guesses(&self, game_date: GameDate) -> Result<Vec<GuessRecord>> {
        let rows = sqlx::query_as::<_, GuessRow>(
            r#"
            SELECT game_date, user_id, username, user_guess, bot_prediction,
                   actual_open, user_error, bot_error, did_user_beat_bot, submitted_at
            FROM guesses
            WHERE game_date = ?
            "#,
        )
        .bind(game_date.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(GuessRecord::try_from).collect()
    }

    async fn get_actual_open(&self, game_date: GameDate) -> Result<Option<f64>> {
        let actual = sqlx::query_scalar::<_, f64>("SELECT actual_open FROM results WHERE game_date = ?")
            .bind(game_date.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(actual)
    }

    async fn settle_guesses(&self, game_date: GameDate, actual_open: f64) -> Result<usize> {
        // The first statement writes, so the transaction holds the write lock
        // from the start and no submission can interleave with the sweep.
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO results (game_date, actual_open, settled_at)
            VALUES (?, ?, ?)
            ON CONFLICT(game_date) DO UPDATE SET
                actual_open = excluded.actual_open,
                settled_at = excluded.settled_at
            "#,
        )
        .bind(game_date.to_string())
        .bind(actual_open)
        .bind(now_ns())
        .execute(&mut *tx)
        .await?;

        let scored = sqlx::query(&format!("{SCORE_GUESSES} WHERE game_date = ?"))
            .bind(actual_open)
            .bind(actual_open)
            .bind(actual_open)
            .bind(actual_open)
            .bind(actual_open)
            .bind(game_date.to_string())
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(scored as usize)
    }

    async fn score_guess(
        &self,
        game_date: GameDate,
        user_id: &str,
        actual_open: f64,
    ) -> Result<Option<GuessRecord>> {
        let row = sqlx::query_as::<_, GuessRow>(&format!(
            "{SCORE_GUESSES} WHERE game_date = ? AND user_id = ? RETURNING {GUESS_COLUMNS}"
        ))
        .bind(actual_open)
        .bind(actual_open)
        .bind(actual_open)
        .bind(actual_open)
        .bind(actual_open)
        .bind(game_date.to_string())
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(GuessRecord::try_from).transpose()
    }
}

/// Scoring-only update, evaluated against each row's current guess and bot
/// snapshot. Binds the actual open five times. A tie does not beat the bot.
const SCORE_GUESSES: &str = r#"
    UPDATE guesses SET
        actual_open = ?,
        user_error = ABS(? - user_guess),
        bot_error = ABS(? - bot_prediction),
        did_user_beat_bot = ABS(? - user_guess) < ABS(? - bot_prediction)
"#;

const GUESS_COLUMNS: &str = "game_date, user_id, username, user_guess, bot_prediction, \
     actual_open, user_error, bot_error, did_user_beat_bot, submitted_at";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scorer::rescore;

    fn date(s: &str) -> GameDate {
        s.parse().unwrap()
    }

    fn guess(user_id: &str, user_guess: f64, submitted_at_ns: i64) -> GuessRecord {
        GuessRecord {
            game_date: date("2025-12-01"),
            user_id: user_id.to_string(),
            username: format!("name-{user_id}"),
            user_guess,
            bot_prediction: 120.0,
            actual_open: None,
            outcome: None,
            submitted_at_ns,
        }
    }

    #[tokio::test]
    async fn prediction_round_trip_and_absence() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert!(store.get_prediction(date("2030-01-01")).await.unwrap().is_none());

        let p = Prediction {
            game_date: date("2025-12-01"),
            predicted_open: 120.0,
            lower_bound: 115.0,
            upper_bound: 125.0,
        };
        store.put_prediction(&p).await.unwrap();
        assert_eq!(store.get_prediction(p.game_date).await.unwrap(), Some(p));

        let corrected = Prediction { predicted_open: 121.0, ..p };
        store.put_prediction(&corrected).await.unwrap();
        assert_eq!(store.get_prediction(p.game_date).await.unwrap(), Some(corrected));
    }

    #[tokio::test]
    async fn guess_upsert_keeps_one_row_per_user() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.put_guess(&guess("u1", 100.0, 1)).await.unwrap();
        store.put_guess(&guess("u1", 110.0, 2)).await.unwrap();
        store.put_guess(&guess("u2", 105.0, 3)).await.unwrap();

        let all = store.list_guesses(date("2025-12-01")).await.unwrap();
        assert_eq!(all.len(), 2);
        let u1 = store.get_guess(date("2025-12-01"), "u1").await.unwrap().unwrap();
        assert_eq!(u1.user_guess, 110.0);
        assert_eq!(u1.submitted_at_ns, 2);
        assert!(u1.outcome.is_none());
    }

    #[tokio::test]
    async fn scored_guess_round_trips_all_fields() {
        let store = SqliteStore::in_memory().await.unwrap();
        let settled = rescore(&guess("u1", 118.0, 7), 117.5);
        store.put_guess(&settled).await.unwrap();

        let back = store.get_guess(date("2025-12-01"), "u1").await.unwrap().unwrap();
        assert_eq!(back, settled);
        assert_eq!(back.did_user_beat_bot(), Some(true));
    }

    #[tokio::test]
    async fn settle_scores_rows_and_records_open() {
        let store = SqliteStore::in_memory().await.unwrap();
        let d = date("2025-12-01");
        store.put_guess(&guess("u1", 118.0, 7)).await.unwrap();
        store.put_guess(&guess("u2", 115.0, 8)).await.unwrap();
        assert!(store.get_actual_open(d).await.unwrap().is_none());

        assert_eq!(store.settle_guesses(d, 117.5).await.unwrap(), 2);
        assert_eq!(store.get_actual_open(d).await.unwrap(), Some(117.5));

        // Same outcome as the in-process scorer, including the tie rule.
        let u1 = store.get_guess(d, "u1").await.unwrap().unwrap();
        assert_eq!(u1, rescore(&guess("u1", 118.0, 7), 117.5));
        let u2 = store.get_guess(d, "u2").await.unwrap().unwrap();
        assert_eq!(u2.user_error(), u2.bot_error());
        assert_eq!(u2.did_user_beat_bot(), Some(false));
    }

    #[tokio::test]
    async fn resettling_overwrites_open_and_rescores() {
        let store = SqliteStore::in_memory().await.unwrap();
        let d = date("2025-12-01");
        store.put_guess(&guess("u1", 118.0, 7)).await.unwrap();
        store.settle_guesses(d, 117.5).await.unwrap();
        store.settle_guesses(d, 121.0).await.unwrap();

        assert_eq!(store.get_actual_open(d).await.unwrap(), Some(121.0));
        let u1 = store.get_guess(d, "u1").await.unwrap().unwrap();
        assert_eq!(u1.user_error(), Some(3.0));
        assert_eq!(u1.did_user_beat_bot(), Some(false));
    }

    #[tokio::test]
    async fn score_guess_updates_only_that_user() {
        let store = SqliteStore::in_memory().await.unwrap();
        let d = date("2025-12-01");
        store.put_guess(&guess("u1", 118.0, 7)).await.unwrap();
        store.put_guess(&guess("u2", 125.0, 8)).await.unwrap();

        let u1 = store.score_guess(d, "u1", 117.5).await.unwrap().unwrap();
        assert_eq!(u1, rescore(&guess("u1", 118.0, 7), 117.5));
        assert!(store.get_guess(d, "u2").await.unwrap().unwrap().outcome.is_none());
        assert!(store.score_guess(d, "nobody", 117.5).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn partially_scored_row_is_rejected_by_schema() {
        let store = SqliteStore::in_memory().await.unwrap();
        let res = sqlx::query(
            r#"
            INSERT INTO guesses (game_date, user_id, username, user_guess, bot_prediction,
                                 user_error, submitted_at)
            VALUES ('2025-12-01', 'u1', 'x', 1.0, 2.0, 0.5, 1)
            "#,
        )
        .execute(&store.pool)
        .await;
        assert!(res.is_err());
    }
}
