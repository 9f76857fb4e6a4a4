use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Result, WordBattleError};
use crate::filter::BloomFilter;
use crate::model::{now_millis, BattleOutcome, Partition, UserRecord, WordEmbedding};
use crate::storage::{Entry, Segment};
use crate::store::{BattleArchive, EmbeddingStore, UserStore};

const BLOOM_CAPACITY: usize = 1_000_000;
const BLOOM_FP_RATE: f64 = 0.01;

fn poisoned<T>(_: T) -> WordBattleError {
    WordBattleError::Storage("Poisoned Lock".to_string())
}

fn user_key(id: Uuid) -> String {
    format!("user:{}", id)
}

fn username_key(username: &str) -> String {
    format!("username:{}", username)
}

fn battle_prefix(requester: Uuid) -> String {
    format!("battle:{}:", requester)
}

// Zero-padded so key order is chronological order.
fn battle_key(requester: Uuid, timestamp: u64) -> String {
    format!("{}{:020}", battle_prefix(requester), timestamp)
}

fn embedding_key(key: &str) -> String {
    format!("embedding:{}", key)
}

fn parse_owner(entry: &Entry) -> Option<Uuid> {
    std::str::from_utf8(&entry.payload).ok().and_then(|s| Uuid::parse_str(s).ok())
}

/// Sizes of the segment around one compaction run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionStats {
    pub live_entries: usize,
    pub bytes_before: u64,
    pub bytes_after: u64,
}

/// Every path that resolves or changes an offset takes the segment lock
/// before the index and holds it until the read or write is done, so
/// compaction can never swap the file between an index lookup and the read.
struct Engine {
    active_segment: Mutex<Segment>,
    index: RwLock<BTreeMap<String, u64>>,
    bloom_filter: RwLock<BloomFilter>,
    strict_durability: bool,
}

impl Engine {
    fn write_locked(&self, segment: &mut Segment, entries: Vec<Entry>) -> Result<()> {
        let offsets = segment.append_batch(&entries)?;

        {
            let mut bf = self.bloom_filter.write().map_err(poisoned)?;
            for entry in &entries {
                bf.insert(&entry.key);
            }
        }

        let mut idx = self.index.write().map_err(poisoned)?;
        for (entry, offset) in entries.into_iter().zip(offsets) {
            idx.insert(entry.key, offset);
        }
        Ok(())
    }

    fn write(&self, entries: Vec<Entry>) -> Result<()> {
        let mut segment = self.active_segment.lock().map_err(poisoned)?;
        self.write_locked(&mut segment, entries)
    }

    fn read_key(&self, key: &str) -> Result<Option<Entry>> {
        {
            let bf = self.bloom_filter.read().map_err(poisoned)?;
            if !bf.might_contain(key) {
                return Ok(None);
            }
        }

        let segment = self.active_segment.lock().map_err(poisoned)?;
        let offset = {
            let idx = self.index.read().map_err(poisoned)?;
            match idx.get(key) {
                Some(offset) => *offset,
                None => return Ok(None),
            }
        };

        let entry = segment.read(offset)?;
        if entry.key != key {
            return Err(WordBattleError::Storage(format!(
                "index for {} points at {} (offset {})",
                key, entry.key, offset
            )));
        }
        Ok(Some(entry))
    }

    /// Latest entry of every key starting with `prefix`, in key order.
    fn read_prefix(&self, prefix: &str) -> Result<Vec<Entry>> {
        let segment = self.active_segment.lock().map_err(poisoned)?;
        let located: Vec<(String, u64)> = {
            let idx = self.index.read().map_err(poisoned)?;
            idx.range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, offset)| (k.clone(), *offset))
            .collect()
        };

        let mut out = Vec::with_capacity(located.len());
        for (key, offset) in located {
            let entry = segment.read(offset)?;
            if entry.key != key {
                return Err(WordBattleError::Storage(format!(
                    "index for {} points at {} (offset {})",
                    key, entry.key, offset
                )));
            }
            out.push(entry);
        }
        Ok(out)
    }

    fn json_entry<T: Serialize>(key: String, value: &T) -> Result<Entry> {
        Ok(Entry::json(key, serde_json::to_vec(value)?, now_millis()))
    }

    fn decode<T: DeserializeOwned>(entry: &Entry) -> Result<T> {
        Ok(serde_json::from_slice(&entry.payload)?)
    }

    fn get_user(&self, id: Uuid) -> Result<Option<UserRecord>> {
        self.read_key(&user_key(id))?
        .map(|entry| Self::decode(&entry))
        .transpose()
    }

    /// One append for all records; a username entry is added the first time
    /// a name is seen.
    fn put_users(&self, users: &[UserRecord]) -> Result<()> {
        let mut segment = self.active_segment.lock().map_err(poisoned)?;
        let entries = {
            let idx = self.index.read().map_err(poisoned)?;
            let mut entries = Vec::with_capacity(users.len() * 2);
            for user in users {
                entries.push(Self::json_entry(user_key(user.id), user)?);
                let name_key = username_key(&user.username);
                if !idx.contains_key(&name_key) {
                    entries.push(Entry::json(name_key, user.id.to_string().into_bytes(), now_millis()));
                }
            }
            entries
        };
        self.write_locked(&mut segment, entries)
    }

    fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        let entry = match self.read_key(&username_key(username))? {
            Some(entry) => entry,
            None => return Ok(None),
        };
        let id = parse_owner(&entry)
        .ok_or_else(|| WordBattleError::Storage(format!("corrupt username entry for {}", username)))?;
        self.get_user(id)
    }

    fn scan_users(&self, partition: &Partition) -> Result<Vec<UserRecord>> {
        let mut users = Vec::new();
        for entry in self.read_prefix("user:")? {
            let user: UserRecord = Self::decode(&entry)?;
            if partition.contains(&user) {
                users.push(user);
            }
        }
        Ok(users)
    }

    fn put_battle(&self, outcome: &BattleOutcome) -> Result<u64> {
        let requester = outcome.user_record.id;
        let mut segment = self.active_segment.lock().map_err(poisoned)?;
        let mut filed = outcome.clone();
        {
            let idx = self.index.read().map_err(poisoned)?;
            while idx.contains_key(&battle_key(requester, filed.timestamp)) {
                filed.timestamp += 1;
            }
        }
        if filed.timestamp != outcome.timestamp {
            warn!(%requester, requested = outcome.timestamp, filed = filed.timestamp, "battle timestamp taken, filing later");
        }
        let entry = Self::json_entry(battle_key(requester, filed.timestamp), &filed)?;
        self.write_locked(&mut segment, vec![entry])?;
        Ok(filed.timestamp)
    }

    fn get_battle(&self, requester: Uuid, timestamp: u64) -> Result<Option<BattleOutcome>> {
        self.read_key(&battle_key(requester, timestamp))?
        .map(|entry| Self::decode(&entry))
        .transpose()
    }

    fn battle_history(&self, requester: Uuid) -> Result<Vec<BattleOutcome>> {
        self.read_prefix(&battle_prefix(requester))?
        .iter()
        .map(Self::decode)
        .collect()
    }

    fn put_embedding(&self, key: &str, embedding: WordEmbedding) -> Result<()> {
        let entry = Entry {
            key: embedding_key(key),
            vector: embedding.vector,
            payload: embedding.owner.to_string().into_bytes(),
            tx_time: now_millis(),
        };
        self.write(vec![entry])
    }

    fn list_embeddings(&self, prefix: &str) -> Result<Vec<WordEmbedding>> {
        self.read_prefix(&embedding_key(prefix))?
        .into_iter()
        .map(|entry| {
            let owner = parse_owner(&entry)
            .ok_or_else(|| WordBattleError::Storage(format!("corrupt embedding entry {}", entry.key)))?;
            Ok(WordEmbedding { owner, vector: entry.vector })
        })
        .collect()
    }

    fn compact(&self) -> Result<CompactionStats> {
        let mut segment_lock = self.active_segment.lock().map_err(poisoned)?;
        let mut index_lock = self.index.write().map_err(poisoned)?;

        let bytes_before = segment_lock.len_bytes();
        let mut keys = Vec::with_capacity(index_lock.len());
        let mut live = Vec::with_capacity(index_lock.len());
        for (key, offset) in index_lock.iter() {
            keys.push(key.clone());
            live.push(segment_lock.read(*offset)?);
        }

        let old_path = segment_lock.file_path.clone();
        let tmp_path = old_path.with_extension("compacting");
        if tmp_path.exists() {
            fs::remove_file(&tmp_path)?;
        }

        let offsets = {
            let mut rewritten = Segment::new(&tmp_path, true)?;
            rewritten.append_batch(&live)?
        };
        fs::rename(&tmp_path, &old_path)?;
        *segment_lock = Segment::new(&old_path, self.strict_durability)?;

        {
            let mut bf = self.bloom_filter.write().map_err(poisoned)?;
            bf.clear();
            for key in &keys {
                bf.insert(key);
            }
        }
        *index_lock = keys.into_iter().zip(offsets).collect();

        let stats = CompactionStats {
            live_entries: live.len(),
            bytes_before,
            bytes_after: segment_lock.len_bytes(),
        };
        info!(live = stats.live_entries, before = stats.bytes_before, after = stats.bytes_after, "compaction complete");
        Ok(stats)
    }
}

/// Single-file store: append-only segment, latest-offset index per key, and a
/// bloom filter that answers most misses without touching the index.
///
/// Cheap to clone. The async store methods run their file I/O on the
/// blocking pool.
#[derive(Clone)]
pub struct WordBattleDb {
    engine: Arc<Engine>,
}

impl fmt::Debug for WordBattleDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WordBattleDb")
        .field("index_count", &self.key_count())
        .finish()
    }
}

impl WordBattleDb {
    /// Opens the segment at `path` and rebuilds the index by replaying it.
    pub fn open(path: &Path, strict_durability: bool) -> Result<Self> {
        let segment = Segment::new(path, strict_durability)?;

        let mut index = BTreeMap::new();
        let mut bloom_filter = BloomFilter::new(BLOOM_CAPACITY, BLOOM_FP_RATE);
        let mut replayed = 0usize;
        for (offset, entry) in segment.scan()? {
            bloom_filter.insert(&entry.key);
            index.insert(entry.key, offset);
            replayed += 1;
        }
        info!(path = %path.display(), replayed, keys = index.len(), "store opened");

        Ok(Self {
            engine: Arc::new(Engine {
                active_segment: Mutex::new(segment),
                index: RwLock::new(index),
                bloom_filter: RwLock::new(bloom_filter),
                strict_durability,
            }),
        })
    }

    pub fn key_count(&self) -> usize {
        self.engine.index.read().map(|i| i.len()).unwrap_or(0)
    }

    /// Rewrites the segment keeping only the latest entry of each key.
    ///
    /// Stop-the-world and blocking: writers and readers wait on the segment
    /// lock meanwhile. Call from a dedicated thread or the blocking pool.
    pub fn compact(&self) -> Result<CompactionStats> {
        self.engine.compact()
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&Engine) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let engine = self.engine.clone();
        tokio::task::spawn_blocking(move || op(&engine))
        .await
        .map_err(|e| WordBattleError::Storage(format!("store task failed: {}", e)))?
    }
}

#[async_trait]
impl UserStore for WordBattleDb {
    async fn get(&self, id: Uuid) -> Result<Option<UserRecord>> {
        self.blocking(move |db| db.get_user(id)).await
    }

    async fn put(&self, user: &UserRecord) -> Result<()> {
        let user = user.clone();
        self.blocking(move |db| db.put_users(std::slice::from_ref(&user))).await
    }

    async fn put_users(&self, users: &[UserRecord]) -> Result<()> {
        let users = users.to_vec();
        self.blocking(move |db| db.put_users(&users)).await
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        let username = username.to_string();
        self.blocking(move |db| db.find_by_username(&username)).await
    }

    async fn scan(&self, partition: &Partition) -> Result<Vec<UserRecord>> {
        let partition = partition.clone();
        self.blocking(move |db| db.scan_users(&partition)).await
    }
}

#[async_trait]
impl BattleArchive for WordBattleDb {
    async fn put(&self, outcome: &BattleOutcome) -> Result<u64> {
        let outcome = outcome.clone();
        self.blocking(move |db| db.put_battle(&outcome)).await
    }

    async fn get(&self, requester: Uuid, timestamp: u64) -> Result<Option<BattleOutcome>> {
        self.blocking(move |db| db.get_battle(requester, timestamp)).await
    }

    async fn history(&self, requester: Uuid) -> Result<Vec<BattleOutcome>> {
        self.blocking(move |db| db.battle_history(requester)).await
    }
}

#[async_trait]
impl EmbeddingStore for WordBattleDb {
    async fn put(&self, key: &str, embedding: &WordEmbedding) -> Result<()> {
        let key = key.to_string();
        let embedding = embedding.clone();
        self.blocking(move |db| db.put_embedding(&key, embedding)).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<WordEmbedding>> {
        let prefix = prefix.to_string();
        self.blocking(move |db| db.list_embeddings(&prefix)).await
    }
}
