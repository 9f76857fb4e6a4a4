//! Battle resolution: judging, cheat reconciliation, rating update, commit.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::Result;
use crate::model::{now_millis, BattleOutcome, UserRecord};
use crate::moderation::ModerationGate;
use crate::oracle::{BattleJudge, Flag, Verdict};
use crate::rating::update_ratings_with;
use crate::store::{BattleArchive, UserStore};

/// Who won a battle and the narrative to show for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Ruling {
    pub requester_won: bool,
    pub message: String,
    /// Word that lost by disqualification, if any.
    pub disqualified: Option<String>,
}

pub fn disqualification_message(word: &str) -> String {
    format!("\"{}\" was disqualified for attempting to manipulate the battle.", word)
}

/// Combines the judge's verdict with the per-word injection flags.
///
/// Exactly one flagged side loses no matter what the judge said. When both or
/// neither are flagged the verdict stands as given.
pub fn reconcile(
    verdict: &Verdict,
    requester_first: bool,
    requester: &UserRecord,
    requester_flag: &Flag,
    opponent: &UserRecord,
    opponent_flag: &Flag,
) -> Ruling {
    match (requester_flag.flagged, opponent_flag.flagged) {
        (true, false) => Ruling {
            requester_won: false,
            message: disqualification_message(&requester.word),
            disqualified: Some(requester.word.clone()),
        },
        (false, true) => Ruling {
            requester_won: true,
            message: disqualification_message(&opponent.word),
            disqualified: Some(opponent.word.clone()),
        },
        _ => Ruling {
            requester_won: verdict.first_player_won == requester_first,
            message: verdict.reason_for_win.clone(),
            disqualified: None,
        },
    }
}

/// Applies the ruling to pre-battle snapshots of both players.
///
/// Both new ratings come from the same snapshot pair.
pub fn settle(
    requester: &UserRecord,
    opponent: &UserRecord,
    ruling: Ruling,
    k_factor: f64,
    timestamp: u64,
) -> BattleOutcome {
    let (winner, loser) = if ruling.requester_won {
        (requester, opponent)
    } else {
        (opponent, requester)
    };
    let (winner_rating, loser_rating) = update_ratings_with(winner.rating, loser.rating, k_factor);

    let winner_after = UserRecord { rating: winner_rating, ..winner.clone() };
    let loser_after = UserRecord { rating: loser_rating, ..loser.clone() };
    let requester_after = if ruling.requester_won { winner_rating } else { loser_rating };

    BattleOutcome {
        user_record: requester.clone(),
        other_user_record: opponent.clone(),
        winner_user_record: winner_after,
        loser_user_record: loser_after,
        rating_change: requester_after - requester.rating,
        message: ruling.message,
        timestamp,
    }
}

/// Runs one battle from judged to persisted.
#[derive(Clone)]
pub struct BattleAdjudicator {
    judge: Arc<dyn BattleJudge>,
    gate: ModerationGate,
    users: Arc<dyn UserStore>,
    archive: Arc<dyn BattleArchive>,
    k_factor: f64,
}

impl BattleAdjudicator {
    pub fn new(
        judge: Arc<dyn BattleJudge>,
        gate: ModerationGate,
        users: Arc<dyn UserStore>,
        archive: Arc<dyn BattleArchive>,
        k_factor: f64,
    ) -> Self {
        Self { judge, gate, users, archive, k_factor }
    }

    /// Presents the words in a random left/right order to avoid positional bias.
    pub async fn resolve_battle(&self, requester: &UserRecord, opponent: &UserRecord) -> Result<BattleOutcome> {
        let requester_first = rand::random::<bool>();
        self.resolve_battle_ordered(requester, opponent, requester_first).await
    }

    pub async fn resolve_battle_ordered(
        &self,
        requester: &UserRecord,
        opponent: &UserRecord,
        requester_first: bool,
    ) -> Result<BattleOutcome> {
        let (first, second) = if requester_first {
            (&requester.word, &opponent.word)
        } else {
            (&opponent.word, &requester.word)
        };

        debug!(requester = %requester.id, opponent = %opponent.id, requester_first, "adjudicating");
        let (verdict, requester_flag, opponent_flag) = tokio::join!(
            self.judge.judge(first, second),
            self.gate.check_injection(&requester.word),
            self.gate.check_injection(&opponent.word),
        );
        let (verdict, requester_flag, opponent_flag) = (verdict?, requester_flag?, opponent_flag?);

        let ruling = reconcile(&verdict, requester_first, requester, &requester_flag, opponent, &opponent_flag);
        if let Some(word) = &ruling.disqualified {
            info!(word = %word, "disqualified by injection check");
        }

        let mut outcome = settle(requester, opponent, ruling, self.k_factor, now_millis());
        debug!(rating_change = outcome.rating_change, "ratings applied");

        // Commit point: both players in one batch, then the archive entry.
        self.users
        .put_users(&[outcome.winner_user_record.clone(), outcome.loser_user_record.clone()])
        .await?;
        outcome.timestamp = self.archive.put(&outcome).await?;

        info!(
            requester = %requester.username,
            opponent = %opponent.username,
            winner = %outcome.winner_user_record.username,
            rating_change = outcome.rating_change,
            timestamp = outcome.timestamp,
            "battle persisted"
        );
        Ok(outcome)
    }
}
