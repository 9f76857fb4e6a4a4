use std::sync::Arc;

use tracing::{info, warn};

use crate::error::Result;
use crate::model::{Partition, UserRecord};
use crate::store::{EmbeddingStore, UserStore};
use crate::vector::cosine_similarity;

/// Rejects words whose embedding is too close to one already registered in
/// the same partition.
#[derive(Clone)]
pub struct DuplicateDetector {
    embeddings: Arc<dyn EmbeddingStore>,
    users: Arc<dyn UserStore>,
    threshold: f32,
}

impl DuplicateDetector {
    pub fn new(embeddings: Arc<dyn EmbeddingStore>, users: Arc<dyn UserStore>, threshold: f32) -> Self {
        Self { embeddings, users, threshold }
    }

    /// Owner of the first stored embedding strictly above the threshold.
    ///
    /// Listing order is whatever the store returns, so with several
    /// duplicates any one of them may be reported. Embeddings of another
    /// dimension are skipped, as are embeddings whose registration never
    /// committed a user record.
    pub async fn check_duplicate(&self, candidate: &[f32], partition: &Partition) -> Result<Option<UserRecord>> {
        let stored = self.embeddings.list(&partition.embedding_prefix()).await?;
        for embedding in &stored {
            let similarity = match cosine_similarity(candidate, &embedding.vector) {
                Some(similarity) => similarity,
                None => {
                    warn!(
                        owner = %embedding.owner,
                        stored = embedding.vector.len(),
                        candidate = candidate.len(),
                        "embedding dimensions differ, skipping"
                    );
                    continue;
                }
            };
            if similarity <= self.threshold {
                continue;
            }
            match self.users.get(embedding.owner).await? {
                Some(owner) => {
                    info!(owner = %owner.id, similarity, "near-duplicate word");
                    return Ok(Some(owner));
                }
                None => warn!(owner = %embedding.owner, "ignoring embedding without a registered user"),
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::WordBattleDb;
    use crate::model::WordEmbedding;
    use crate::vector::HIGH_SIMILARITY;

    struct Fixture {
        _dir: tempfile::TempDir,
        db: Arc<WordBattleDb>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let db = Arc::new(WordBattleDb::open(&dir.path().join("wb.dat"), false).unwrap());
            Self { _dir: dir, db }
        }

        fn detector(&self) -> DuplicateDetector {
            DuplicateDetector::new(self.db.clone(), self.db.clone(), HIGH_SIMILARITY)
        }

        async fn embed(&self, partition: &Partition, owner: &UserRecord, vector: Vec<f32>) {
            let embedding = WordEmbedding { owner: owner.id, vector };
            EmbeddingStore::put(self.db.as_ref(), &partition.embedding_key(owner.id), &embedding)
            .await
            .unwrap();
        }

        async fn register(&self, partition: &Partition, word: &str, vector: Vec<f32>) -> UserRecord {
            let label = match partition {
                Partition::Label(l) => Some(l.clone()),
                Partition::Unlabeled => None,
            };
            let user = UserRecord::new(format!("{}-owner", word), word.into(), label);
            UserStore::put(self.db.as_ref(), &user).await.unwrap();
            self.embed(partition, &user, vector).await;
            user
        }
    }

    #[tokio::test]
    async fn identical_embedding_is_a_duplicate() {
        let f = Fixture::new();
        let owner = f.register(&Partition::Unlabeled, "dragon", vec![0.3, 0.4, 0.5]).await;
        let hit = f.detector().check_duplicate(&[0.3, 0.4, 0.5], &Partition::Unlabeled).await.unwrap();
        assert_eq!(hit.map(|u| u.word), Some(owner.word));
    }

    #[tokio::test]
    async fn orthogonal_embedding_passes() {
        let f = Fixture::new();
        f.register(&Partition::Unlabeled, "dragon", vec![1.0, 0.0, 0.0]).await;
        let hit = f.detector().check_duplicate(&[0.0, 1.0, 0.0], &Partition::Unlabeled).await.unwrap();
        assert_eq!(hit, None);
    }

    #[tokio::test]
    async fn other_partitions_are_not_consulted() {
        let f = Fixture::new();
        let board = Partition::Label("animals".into());
        f.register(&board, "tiger", vec![1.0, 1.0]).await;
        let detector = f.detector();
        assert_eq!(detector.check_duplicate(&[1.0, 1.0], &Partition::Unlabeled).await.unwrap(), None);
        assert!(detector.check_duplicate(&[1.0, 1.0], &board).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn other_dimensions_are_skipped() {
        let f = Fixture::new();
        f.register(&Partition::Unlabeled, "dragon", vec![1.0, 0.0, 0.0]).await;
        let hit = f.detector().check_duplicate(&[1.0, 0.0, 0.0, 0.0], &Partition::Unlabeled).await.unwrap();
        assert_eq!(hit, None);
    }

    #[tokio::test]
    async fn uncommitted_owner_does_not_shadow_a_real_one() {
        let f = Fixture::new();
        let ghost = UserRecord::new("ghost".into(), "wyrm".into(), None);
        f.embed(&Partition::Unlabeled, &ghost, vec![0.0, 1.0]).await;
        let detector = f.detector();
        assert_eq!(detector.check_duplicate(&[0.0, 1.0], &Partition::Unlabeled).await.unwrap(), None);

        let real = f.register(&Partition::Unlabeled, "dragon", vec![0.0, 1.0]).await;
        let hit = detector.check_duplicate(&[0.0, 1.0], &Partition::Unlabeled).await.unwrap();
        assert_eq!(hit.map(|u| u.id), Some(real.id));
    }
}
