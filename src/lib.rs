//! Word battle matchmaking: registration with moderation and duplicate
//! detection, rating-window matchmaking, oracle adjudication, Elo updates
//! and a persistent battle archive.

pub mod battle;
pub mod config;
pub mod db;
pub mod duplicate;
pub mod error;
pub mod filter;
pub mod game;
pub mod llm;
pub mod manager;
pub mod matchmaker;
pub mod model;
pub mod moderation;
pub mod oracle;
pub mod parser;
pub mod rating;
pub mod server;
pub mod storage;
pub mod store;
pub mod vector;

pub use error::{Result, WordBattleError};
pub use game::{GameContext, Oracles, Stores};
pub use model::{BattleOutcome, Partition, UserRecord};
