use serde::{Deserialize, Serialize};

use crate::error::{Result, WordBattleError};
use crate::matchmaker::RATING_WINDOW;
use crate::rating::K_FACTOR;
use crate::vector::HIGH_SIMILARITY;

/// Tunables of the game core. Defaults are the production values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameSettings {
    /// Elo K-factor.
    pub k_factor: f64,

    /// Opponents must be rated strictly closer than this to the requester.
    pub rating_window: f64,

    /// Cosine similarity above which a new word duplicates a stored one.
    pub similarity_threshold: f32,

    /// Redundant injection checks per registration (hate speech is always one call).
    pub injection_votes: usize,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            k_factor: K_FACTOR,
            rating_window: RATING_WINDOW,
            similarity_threshold: HIGH_SIMILARITY,
            injection_votes: 2,
        }
    }
}

impl GameSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.k_factor.is_finite() && self.k_factor > 0.0) {
            return Err(WordBattleError::Config(format!("k_factor must be positive, got {}", self.k_factor)));
        }
        if !(self.rating_window.is_finite() && self.rating_window > 0.0) {
            return Err(WordBattleError::Config(format!(
                "rating_window must be positive, got {}",
                self.rating_window
            )));
        }
        if !(-1.0..=1.0).contains(&self.similarity_threshold) {
            return Err(WordBattleError::Config(format!(
                "similarity_threshold must be in [-1, 1], got {}",
                self.similarity_threshold
            )));
        }
        if self.injection_votes == 0 {
            return Err(WordBattleError::Config("injection_votes must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let s = GameSettings::default();
        assert!(s.validate().is_ok());
        assert_eq!(s.k_factor, 24.0);
        assert_eq!(s.rating_window, 200.0);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let bad = GameSettings { similarity_threshold: 1.5, ..GameSettings::default() };
        assert!(bad.validate().is_err());
        let bad = GameSettings { injection_votes: 0, ..GameSettings::default() };
        assert!(bad.validate().is_err());
        let bad = GameSettings { k_factor: f64::NAN, ..GameSettings::default() };
        assert!(bad.validate().is_err());
    }
}
