//! Persistence contracts the game core is written against.
//!
//! Stores give atomic single-key reads and writes and nothing stronger;
//! `WordBattleDb` is the bundled implementation of all three.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::model::{BattleOutcome, Partition, UserRecord, WordEmbedding};

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<UserRecord>>;

    async fn put(&self, user: &UserRecord) -> Result<()>;

    /// Writes several records as one logical commit. Implementations without a
    /// batch primitive fall back to sequential single-key writes.
    async fn put_users(&self, users: &[UserRecord]) -> Result<()> {
        for user in users {
            self.put(user).await?;
        }
        Ok(())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>>;

    async fn scan(&self, partition: &Partition) -> Result<Vec<UserRecord>>;
}

#[async_trait]
pub trait BattleArchive: Send + Sync {
    /// Keyed by `(outcome.user_record.id, timestamp)`. Returns the timestamp
    /// the battle was filed under: `outcome.timestamp`, or the next free
    /// millisecond when the requester already has a battle at that instant.
    async fn put(&self, outcome: &BattleOutcome) -> Result<u64>;

    async fn get(&self, requester: Uuid, timestamp: u64) -> Result<Option<BattleOutcome>>;

    /// All battles started by `requester`, oldest first.
    async fn history(&self, requester: Uuid) -> Result<Vec<BattleOutcome>>;
}

#[async_trait]
pub trait EmbeddingStore: Send + Sync {
    async fn put(&self, key: &str, embedding: &WordEmbedding) -> Result<()>;

    /// Every embedding whose key starts with `prefix`, in unspecified order.
    async fn list(&self, prefix: &str) -> Result<Vec<WordEmbedding>>;
}
