use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{Result, WordBattleError};
use crate::model::UserRecord;

/// Maximum rating gap (exclusive) between a requester and an eligible opponent.
pub const RATING_WINDOW: f64 = 200.0;

/// Candidates from `pool` the requester may be paired with.
pub fn eligible_opponents<'a>(
    requester: &UserRecord,
    pool: &'a [UserRecord],
    window: f64,
) -> Vec<&'a UserRecord> {
    let partition = requester.partition();
    pool.iter()
        .filter(|u| u.id != requester.id)
        .filter(|u| partition.contains(u))
        .filter(|u| (requester.rating - u.rating).abs() < window)
        .collect()
}

/// Uniformly random opponent from the eligible set.
///
/// The window is never widened; an empty set is surfaced as `NoOpponentAvailable`.
pub fn select_opponent<R: Rng + ?Sized>(
    requester: &UserRecord,
    pool: &[UserRecord],
    window: f64,
    rng: &mut R,
) -> Result<UserRecord> {
    eligible_opponents(requester, pool, window)
        .choose(rng)
        .map(|u| (*u).clone())
        .ok_or(WordBattleError::NoOpponentAvailable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn user(name: &str, rating: f64, board: Option<&str>) -> UserRecord {
        let mut u = UserRecord::new(name.into(), format!("{}-word", name), board.map(String::from));
        u.rating = rating;
        u
    }

    #[test]
    fn never_returns_requester_or_out_of_window() {
        let me = user("me", 1000.0, None);
        let pool = vec![
            me.clone(),
            user("near", 1150.0, None),
            user("low", 850.5, None),
            user("edge", 1200.0, None),
            user("far", 1400.0, None),
            user("other-board", 1000.0, Some("chess")),
        ];
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let pick = select_opponent(&me, &pool, RATING_WINDOW, &mut rng).unwrap();
            assert_ne!(pick.id, me.id);
            assert!((pick.rating - me.rating).abs() < RATING_WINDOW);
            assert!(pick.leaderboard.is_none());
        }
    }

    #[test]
    fn selection_covers_all_eligible() {
        let me = user("me", 1000.0, Some("b"));
        let pool = vec![
            user("a", 1010.0, Some("b")),
            user("b", 990.0, Some("b")),
            user("c", 1100.0, Some("b")),
        ];
        let mut rng = StdRng::seed_from_u64(42);
        let seen: HashSet<_> = (0..300)
            .map(|_| select_opponent(&me, &pool, RATING_WINDOW, &mut rng).unwrap().username)
            .collect();
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn empty_pool_is_an_error() {
        let me = user("me", 1000.0, None);
        let mut rng = StdRng::seed_from_u64(1);
        let err = select_opponent(&me, &[me.clone()], RATING_WINDOW, &mut rng).unwrap_err();
        assert!(matches!(err, WordBattleError::NoOpponentAvailable));

        let far = vec![user("far", 2000.0, None)];
        assert!(select_opponent(&me, &far, RATING_WINDOW, &mut rng).is_err());
    }
}
