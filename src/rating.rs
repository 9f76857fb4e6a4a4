//! Elo rating update for a single decisive battle.

/// K-factor for rating updates (higher = more volatile)
pub const K_FACTOR: f64 = 24.0;

/// Expected score of a player rated `rating` against `opponent`.
pub fn expected_score(rating: f64, opponent: f64) -> f64 {
    1.0 / (1.0 + 10.0_f64.powf((opponent - rating) / 400.0))
}

/// Rating after one game with the given actual score (1 = win, 0 = loss).
pub fn rate(rating: f64, opponent: f64, score: f64, k_factor: f64) -> f64 {
    rating + k_factor * (score - expected_score(rating, opponent))
}

/// Returns `(new_winner, new_loser)`.
///
/// Both sides are computed from the pre-battle pair, so the result does not
/// depend on which side is updated first.
pub fn update_ratings(winner: f64, loser: f64) -> (f64, f64) {
    update_ratings_with(winner, loser, K_FACTOR)
}

pub fn update_ratings_with(winner: f64, loser: f64, k_factor: f64) -> (f64, f64) {
    (
        rate(winner, loser, 1.0, k_factor),
        rate(loser, winner, 0.0, k_factor),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_ratings_expect_half() {
        assert!((expected_score(1000.0, 1000.0) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn equal_ratings_move_by_half_k() {
        let (w, l) = update_ratings(1000.0, 1000.0);
        assert!((w - 1012.0).abs() < 1e-9);
        assert!((l - 988.0).abs() < 1e-9);
    }

    #[test]
    fn winner_gains_and_loser_drops_within_k() {
        let pairs = [
            (1000.0, 1000.0),
            (1500.0, 800.0),
            (800.0, 1500.0),
            (-250.0, 3000.0),
            (1199.9, 1000.1),
        ];
        for (a, b) in pairs {
            let (na, nb) = update_ratings(a, b);
            assert!(na > a, "winner {} -> {}", a, na);
            assert!(nb < b, "loser {} -> {}", b, nb);
            assert!((na - a).abs() <= K_FACTOR);
            assert!((nb - b).abs() <= K_FACTOR);
        }
    }

    #[test]
    fn loser_update_uses_pre_battle_winner_rating() {
        let (_, l) = update_ratings(1100.0, 1000.0);
        let expected = 1000.0 + K_FACTOR * (0.0 - expected_score(1000.0, 1100.0));
        assert!((l - expected).abs() < 1e-9);
    }

    #[test]
    fn upset_pays_more_than_expected_win() {
        let (upset, _) = update_ratings(900.0, 1100.0);
        let (favourite, _) = update_ratings(1100.0, 900.0);
        assert!(upset - 900.0 > favourite - 1100.0);
    }
}
