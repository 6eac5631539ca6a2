use std::cmp::Ordering;

use crate::types::{GameDate, GuessRecord, LeaderboardEntry, Outcome};

/// Rank a day's guesses by ascending user error.
///
/// Only scored guesses take part. Equal errors are ordered by earlier
/// submission, then by user id, and still receive distinct consecutive ranks.
/// At most `limit` entries are returned, ranked from 1.
///
/// Every guess must belong to `game_date`; a board never mixes days.
pub fn rank(game_date: GameDate, guesses: &[GuessRecord], limit: usize) -> Vec<LeaderboardEntry> {
    debug_assert!(
        guesses.iter().all(|g| g.game_date == game_date),
        "leaderboard for {game_date} given guesses from another date"
    );
    let mut scored: Vec<(&GuessRecord, Outcome)> = guesses
        .iter()
        .filter_map(|g| g.outcome.map(|o| (g, o)))
        .collect();

    scored.sort_by(|(a, ao), (b, bo)| by_error_then_submission(a, ao, b, bo));

    scored
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(i, (g, o))| LeaderboardEntry {
            rank: i + 1,
            username: g.username.clone(),
            user_error: o.user_error,
            bot_error: o.bot_error,
            did_user_beat_bot: o.did_user_beat_bot,
        })
        .collect()
}

fn by_error_then_submission(
    a: &GuessRecord,
    ao: &Outcome,
    b: &GuessRecord,
    bo: &Outcome,
) -> Ordering {
    ao.user_error
        .total_cmp(&bo.user_error)
        .then(a.submitted_at_ns.cmp(&b.submitted_at_ns))
        .then_with(|| a.user_id.cmp(&b.user_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scorer::rescore;

    fn day() -> GameDate {
        "2025-12-01".parse().unwrap()
    }

    fn guess(user: &str, user_guess: f64, submitted_at_ns: i64) -> GuessRecord {
        GuessRecord {
            game_date: day(),
            user_id: format!("id-{user}"),
            username: user.to_string(),
            user_guess,
            bot_prediction: 120.0,
            actual_open: None,
            outcome: None,
            submitted_at_ns,
        }
    }

    fn scored(user: &str, user_guess: f64, submitted_at_ns: i64) -> GuessRecord {
        rescore(&guess(user, user_guess, submitted_at_ns), 100.0)
    }

    #[test]
    fn empty_input_yields_empty_board() {
        assert!(rank(day(), &[], 20).is_empty());
    }

    #[test]
    fn unscored_guesses_never_appear() {
        let guesses = vec![
            guess("pending", 100.0, 1),
            scored("bob", 103.0, 2),
            guess("pending2", 99.0, 3),
        ];
        let board = rank(day(), &guesses, 20);
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].username, "bob");
    }

    #[test]
    fn all_unscored_yields_empty_board() {
        let guesses = vec![guess("a", 1.0, 1), guess("b", 2.0, 2)];
        assert!(rank(day(), &guesses, 20).is_empty());
    }

    #[test]
    fn orders_by_ascending_error_with_consecutive_ranks() {
        let guesses = vec![
            scored("far", 110.0, 1),
            scored("near", 100.5, 2),
            scored("mid", 95.0, 3),
        ];
        let board = rank(day(), &guesses, 20);
        let names: Vec<_> = board.iter().map(|e| e.username.as_str()).collect();
        assert_eq!(names, ["near", "mid", "far"]);
        let ranks: Vec<_> = board.iter().map(|e| e.rank).collect();
        assert_eq!(ranks, [1, 2, 3]);
        assert!(board.windows(2).all(|w| w[0].user_error <= w[1].user_error));
    }

    #[test]
    fn ties_break_by_earlier_submission_then_user_id() {
        // All three are 2.0 away from the actual open.
        let guesses = vec![
            scored("late", 102.0, 30),
            scored("zed", 98.0, 10),
            scored("amy", 102.0, 10),
        ];
        let board = rank(day(), &guesses, 20);
        let names: Vec<_> = board.iter().map(|e| e.username.as_str()).collect();
        assert_eq!(names, ["amy", "zed", "late"]);
        let ranks: Vec<_> = board.iter().map(|e| e.rank).collect();
        assert_eq!(ranks, [1, 2, 3]);
    }

    #[test]
    fn ranking_ignores_input_order() {
        let mut guesses = vec![
            scored("a", 101.0, 1),
            scored("b", 104.0, 2),
            scored("c", 99.5, 3),
            scored("d", 101.0, 4),
        ];
        let forward = rank(day(), &guesses, 20);
        guesses.reverse();
        assert_eq!(forward, rank(day(), &guesses, 20));
    }

    #[test]
    fn limit_caps_the_board() {
        let guesses: Vec<_> = (0..25)
            .map(|i| scored(&format!("user{i:02}"), 100.0 + i as f64 * 0.25, i))
            .rev()
            .collect();
        let board = rank(day(), &guesses, 20);
        assert_eq!(board.len(), 20);
        assert_eq!(board.first().unwrap().rank, 1);
        assert_eq!(board.last().unwrap().rank, 20);
        assert_eq!(board[0].username, "user00");
        assert!(board.windows(2).all(|w| w[0].user_error <= w[1].user_error));
        assert!(board.windows(2).all(|w| w[1].rank == w[0].rank + 1));

        assert!(rank(day(), &guesses, 0).is_empty());
        assert_eq!(rank(day(), &guesses, 100).len(), 25);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "another date")]
    fn guesses_from_another_date_are_refused() {
        let mut other = scored("bob", 101.0, 2);
        other.game_date = "2025-12-02".parse().unwrap();
        rank(day(), &[scored("alice", 101.0, 1), other], 20);
    }

    #[test]
    fn entry_carries_bot_comparison() {
        let board = rank(day(), &[scored("alice", 101.0, 1)], 20);
        let e = &board[0];
        assert_eq!(e.user_error, 1.0);
        assert_eq!(e.bot_error, 20.0);
        assert!(e.did_user_beat_bot);
    }
}
