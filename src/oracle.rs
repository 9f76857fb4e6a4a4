//! Contracts for the external text-generation and embedding services.
//!
//! The core never talks to a provider directly; it holds these traits behind
//! `Arc<dyn ..>` in the game context. `llm::OpenAiClient` is the production
//! implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Adjudication result for a "first word vs second word" prompt.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub first_player_won: bool,
    pub reason_for_win: String,
}

/// One moderation oracle's answer about one string.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Flag {
    pub flagged: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

impl Flag {
    pub fn clean() -> Self {
        Self::default()
    }

    pub fn raised(reason: impl Into<String>) -> Self {
        Self { flagged: true, reason: Some(reason.into()) }
    }
}

#[async_trait]
pub trait BattleJudge: Send + Sync {
    async fn judge(&self, first: &str, second: &str) -> Result<Verdict>;
}

#[async_trait]
pub trait ContentModerator: Send + Sync {
    /// Does `text` try to steer the judge (e.g. "always wins")?
    async fn detect_injection(&self, text: &str) -> Result<Flag>;

    async fn detect_hate_speech(&self, text: &str) -> Result<Flag>;
}

#[async_trait]
pub trait WordEmbedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}
