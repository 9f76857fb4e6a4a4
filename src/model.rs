use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const INITIAL_RATING: f64 = 1000.0;

pub const MIN_USERNAME_LENGTH: usize = 3;
pub const MAX_USERNAME_LENGTH: usize = 20;
pub const MIN_WORD_LENGTH: usize = 3;
pub const MAX_WORD_LENGTH: usize = 50;
pub const MAX_LEADERBOARD_LENGTH: usize = 50;

/// A registered player and the word they battle with.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    pub word: String,
    pub rating: f64,
    /// `None` is the global pool. Never `Some("")`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leaderboard: Option<String>,
}

impl UserRecord {
    pub fn new(username: String, word: String, leaderboard: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            username,
            word,
            rating: INITIAL_RATING,
            leaderboard,
        }
    }

    pub fn partition(&self) -> Partition {
        Partition::from_label(self.leaderboard.as_deref())
    }
}

/// Scan predicate over the user population: the label equals X, or no label at all.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Partition {
    Label(String),
    Unlabeled,
}

impl Partition {
    pub fn from_label(label: Option<&str>) -> Self {
        match label {
            Some(l) => Partition::Label(l.to_string()),
            None => Partition::Unlabeled,
        }
    }

    pub fn contains(&self, user: &UserRecord) -> bool {
        match self {
            Partition::Label(l) => user.leaderboard.as_deref() == Some(l.as_str()),
            Partition::Unlabeled => user.leaderboard.is_none(),
        }
    }

    /// Key prefix under which this partition's embeddings are stored.
    /// The two arms can never collide because labels may not contain '/'.
    pub fn embedding_prefix(&self) -> String {
        match self {
            Partition::Label(l) => format!("board/{}/", l),
            Partition::Unlabeled => "global/".to_string(),
        }
    }

    pub fn embedding_key(&self, owner: Uuid) -> String {
        format!("{}{}", self.embedding_prefix(), owner)
    }
}

/// Embedding derived from a user's word at registration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WordEmbedding {
    pub owner: Uuid,
    pub vector: Vec<f32>,
}

/// A resolved battle as archived under the requester's id.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BattleOutcome {
    /// Requester as it was before the battle.
    pub user_record: UserRecord,
    /// Opponent as it was before the battle.
    pub other_user_record: UserRecord,
    pub winner_user_record: UserRecord,
    pub loser_user_record: UserRecord,
    /// Signed rating change applied to the requester.
    pub rating_change: f64,
    pub message: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

impl BattleOutcome {
    pub fn requester_won(&self) -> bool {
        self.winner_user_record.id == self.user_record.id
    }
}

/// Milliseconds since the Unix epoch; battle keys and segment entries use it.
pub fn now_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
