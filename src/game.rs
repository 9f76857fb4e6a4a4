//! The request-level operations, wired to explicitly constructed stores and oracles.

use std::sync::Arc;

use ordered_float::OrderedFloat;
use tracing::{info, warn};
use uuid::Uuid;

use crate::battle::BattleAdjudicator;
use crate::config::GameSettings;
use crate::db::WordBattleDb;
use crate::duplicate::DuplicateDetector;
use crate::error::{Result, WordBattleError};
use crate::matchmaker::select_opponent;
use crate::model::{
    BattleOutcome, Partition, UserRecord, WordEmbedding, MAX_LEADERBOARD_LENGTH, MAX_USERNAME_LENGTH,
    MAX_WORD_LENGTH, MIN_USERNAME_LENGTH, MIN_WORD_LENGTH,
};
use crate::moderation::ModerationGate;
use crate::oracle::{BattleJudge, ContentModerator, WordEmbedder};
use crate::store::{BattleArchive, EmbeddingStore, UserStore};

#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub battles: Arc<dyn BattleArchive>,
    pub embeddings: Arc<dyn EmbeddingStore>,
}

impl Stores {
    pub fn from_db(db: Arc<WordBattleDb>) -> Self {
        Self { users: db.clone(), battles: db.clone(), embeddings: db }
    }
}

#[derive(Clone)]
pub struct Oracles {
    pub judge: Arc<dyn BattleJudge>,
    pub moderator: Arc<dyn ContentModerator>,
    pub embedder: Arc<dyn WordEmbedder>,
}

impl Oracles {
    /// One client answering every oracle role.
    pub fn shared<T>(client: Arc<T>) -> Self
    where
        T: BattleJudge + ContentModerator + WordEmbedder + 'static,
    {
        Self { judge: client.clone(), moderator: client.clone(), embedder: client }
    }
}

/// Checks length bounds (in characters) and canonicalises the leaderboard label.
pub fn validate_registration(
    username: &str,
    word: &str,
    leaderboard: Option<&str>,
) -> Result<Option<String>> {
    let name_len = username.chars().count();
    if !(MIN_USERNAME_LENGTH..=MAX_USERNAME_LENGTH).contains(&name_len) {
        return Err(WordBattleError::Validation(format!(
            "Username must be between {} and {} characters",
            MIN_USERNAME_LENGTH, MAX_USERNAME_LENGTH
        )));
    }
    let word_len = word.chars().count();
    if !(MIN_WORD_LENGTH..=MAX_WORD_LENGTH).contains(&word_len) {
        return Err(WordBattleError::Validation(format!(
            "Word must be between {} and {} characters",
            MIN_WORD_LENGTH, MAX_WORD_LENGTH
        )));
    }
    normalize_leaderboard(leaderboard)
}

/// Blank labels mean the global pool; `Some("")` never escapes this function.
pub fn normalize_leaderboard(label: Option<&str>) -> Result<Option<String>> {
    let label = match label.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(l) => l,
    };
    if label.chars().count() > MAX_LEADERBOARD_LENGTH {
        return Err(WordBattleError::Validation(format!(
            "Leaderboard name must be at most {} characters",
            MAX_LEADERBOARD_LENGTH
        )));
    }
    if label.contains('/') {
        return Err(WordBattleError::Validation("Leaderboard name may not contain '/'".to_string()));
    }
    Ok(Some(label.to_string()))
}

/// Service context: every store and oracle handle a request needs.
/// Built once at startup and shared behind an `Arc`.
#[derive(Clone)]
pub struct GameContext {
    stores: Stores,
    embedder: Arc<dyn WordEmbedder>,
    gate: ModerationGate,
    detector: DuplicateDetector,
    adjudicator: BattleAdjudicator,
    settings: GameSettings,
}

impl GameContext {
    pub fn new(stores: Stores, oracles: Oracles, settings: GameSettings) -> Result<Self> {
        settings.validate()?;
        let gate = ModerationGate::new(oracles.moderator, settings.injection_votes);
        let detector = DuplicateDetector::new(
            stores.embeddings.clone(),
            stores.users.clone(),
            settings.similarity_threshold,
        );
        let adjudicator = BattleAdjudicator::new(
            oracles.judge,
            gate.clone(),
            stores.users.clone(),
            stores.battles.clone(),
            settings.k_factor,
        );
        Ok(Self { stores, embedder: oracles.embedder, gate, detector, adjudicator, settings })
    }

    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    pub async fn register_user(&self, username: &str, word: &str, leaderboard: Option<&str>) -> Result<UserRecord> {
        let leaderboard = validate_registration(username, word, leaderboard)?;
        let partition = Partition::from_label(leaderboard.as_deref());

        if self.stores.users.find_by_username(username).await?.is_some() {
            return Err(WordBattleError::UsernameTaken { username: username.to_string() });
        }
        let peers = self.stores.users.scan(&partition).await?;
        if let Some(owner) = peers.iter().find(|u| u.word.eq_ignore_ascii_case(word)) {
            return Err(WordBattleError::DuplicateWord {
                username: owner.username.clone(),
                word: owner.word.clone(),
            });
        }

        let (report, vector) = tokio::join!(self.gate.moderate(word), self.embedder.embed(word));
        let report = report?;
        if report.blocked {
            warn!(username, word, reasons = ?report.reasons, "registration blocked by moderation");
            return Err(WordBattleError::ContentRejected { reasons: report.reasons });
        }
        let vector = vector?;

        if let Some(owner) = self.detector.check_duplicate(&vector, &partition).await? {
            return Err(WordBattleError::DuplicateWord { username: owner.username, word: owner.word });
        }

        // The user record is the commit point; it goes last.
        let user = UserRecord::new(username.to_string(), word.to_string(), leaderboard);
        self.stores
        .embeddings
        .put(&partition.embedding_key(user.id), &WordEmbedding { owner: user.id, vector })
        .await?;
        self.stores.users.put(&user).await?;

        info!(id = %user.id, username, word, leaderboard = ?user.leaderboard, "user registered");
        Ok(user)
    }

    pub async fn get_user(&self, id: Uuid) -> Result<UserRecord> {
        self.stores
        .users
        .get(id)
        .await?
        .ok_or_else(|| WordBattleError::NotFound(format!("User with id {} not found", id)))
    }

    /// Highest rated first. `limit` of `None` returns the whole partition.
    pub async fn list_top_users(&self, leaderboard: Option<&str>, limit: Option<usize>) -> Result<Vec<UserRecord>> {
        let leaderboard = normalize_leaderboard(leaderboard)?;
        let mut users = self
        .stores
        .users
        .scan(&Partition::from_label(leaderboard.as_deref()))
        .await?;
        if users.is_empty() {
            return Err(WordBattleError::NotFound("No users found".to_string()));
        }

        users.sort_by_key(|u| std::cmp::Reverse(OrderedFloat(u.rating)));
        if let Some(limit) = limit {
            users.truncate(limit);
        }
        Ok(users)
    }

    pub async fn battle(&self, id: Uuid) -> Result<BattleOutcome> {
        let requester = self.get_user(id).await?;
        let pool = self.stores.users.scan(&requester.partition()).await?;
        // Fails before any oracle call when nobody is in range.
        let opponent = select_opponent(&requester, &pool, self.settings.rating_window, &mut rand::thread_rng())?;
        self.adjudicator.resolve_battle(&requester, &opponent).await
    }

    pub async fn get_battle(&self, id: Uuid, timestamp: u64) -> Result<BattleOutcome> {
        self.stores
        .battles
        .get(id, timestamp)
        .await?
        .ok_or_else(|| WordBattleError::NotFound("Battle not found".to_string()))
    }

    pub async fn list_battles(&self, id: Uuid) -> Result<Vec<BattleOutcome>> {
        self.get_user(id).await?;
        self.stores.battles.history(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_bounds_are_inclusive() {
        assert!(validate_registration("abc", "xyz", None).is_ok());
        assert!(validate_registration(&"a".repeat(20), &"w".repeat(50), None).is_ok());
        assert!(validate_registration("ab", "xyz", None).is_err());
        assert!(validate_registration(&"a".repeat(21), "xyz", None).is_err());
        assert!(validate_registration("abc", "xy", None).is_err());
        assert!(validate_registration("abc", &"w".repeat(51), None).is_err());
    }

    #[test]
    fn lengths_count_characters_not_bytes() {
        assert!(validate_registration("ééé", "火火火", None).is_ok());
    }

    #[test]
    fn blank_leaderboard_is_the_global_pool() {
        assert_eq!(normalize_leaderboard(None).unwrap(), None);
        assert_eq!(normalize_leaderboard(Some("")).unwrap(), None);
        assert_eq!(normalize_leaderboard(Some("   ")).unwrap(), None);
        assert_eq!(normalize_leaderboard(Some(" chess ")).unwrap(), Some("chess".to_string()));
        assert!(normalize_leaderboard(Some("a/b")).is_err());
    }
}
