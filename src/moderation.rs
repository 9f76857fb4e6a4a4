use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Result, WordBattleError};
use crate::oracle::{ContentModerator, Flag};

/// Aggregated verdict over every oracle call made for one text.
#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct ModerationReport {
    pub blocked: bool,
    pub reasons: Vec<String>,
}

impl ModerationReport {
    /// OR over all flags. Every positive flag contributes its reason.
    pub fn from_flags<'a, I: IntoIterator<Item = &'a Flag>>(flags: I) -> Self {
        let mut report = ModerationReport::default();
        for flag in flags {
            if flag.flagged {
                report.blocked = true;
                report.reasons.push(
                    flag.reason.clone().unwrap_or_else(|| "flagged without a stated reason".to_string()),
                );
            }
        }
        report
    }
}

/// Redundant, fail-closed content screening.
///
/// `injection_votes` independent injection checks run alongside one hate-speech
/// check. All are awaited even after one blocks so each verdict gets logged.
#[derive(Clone)]
pub struct ModerationGate {
    moderator: Arc<dyn ContentModerator>,
    injection_votes: usize,
}

impl ModerationGate {
    pub fn new(moderator: Arc<dyn ContentModerator>, injection_votes: usize) -> Self {
        Self { moderator, injection_votes: injection_votes.max(1) }
    }

    pub fn injection_votes(&self) -> usize {
        self.injection_votes
    }

    pub async fn moderate(&self, text: &str) -> Result<ModerationReport> {
        let injection_calls = (0..self.injection_votes).map(|_| self.moderator.detect_injection(text));
        let (injection, hate) = tokio::join!(
            join_all(injection_calls),
            self.moderator.detect_hate_speech(text),
        );

        let mut flags = Vec::with_capacity(injection.len() + 1);
        let mut failure = None;
        for (vote, outcome) in injection.into_iter().enumerate() {
            match outcome {
                Ok(flag) => {
                    info!(vote, flagged = flag.flagged, reason = ?flag.reason, "injection check");
                    flags.push(flag);
                }
                Err(e) => {
                    warn!(vote, error = %e, "injection check failed");
                    if failure.is_none() {
                        failure = Some(e);
                    }
                }
            }
        }
        match hate {
            Ok(flag) => {
                info!(flagged = flag.flagged, reason = ?flag.reason, "hate speech check");
                flags.push(flag);
            }
            Err(e) => {
                warn!(error = %e, "hate speech check failed");
                if failure.is_none() {
                    failure = Some(e);
                }
            }
        }

        if let Some(e) = failure {
            return Err(e);
        }
        Ok(ModerationReport::from_flags(&flags))
    }

    /// Single injection check used while a battle is being judged.
    pub async fn check_injection(&self, text: &str) -> Result<Flag> {
        let flag = self.moderator.detect_injection(text).await?;
        if flag.flagged {
            info!(word = text, reason = ?flag.reason, "battle word flagged as injection");
        }
        Ok(flag)
    }

    /// `moderate` turned into a hard gate.
    pub async fn ensure_clean(&self, text: &str) -> Result<()> {
        let report = self.moderate(text).await?;
        if report.blocked {
            return Err(WordBattleError::ContentRejected { reasons: report.reasons });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Flags injection on the n-th call only; counts every call.
    struct NthVote {
        flag_on: Option<usize>,
        hate: bool,
        fail_injection: bool,
        injection_calls: AtomicUsize,
        calls: AtomicUsize,
    }

    impl NthVote {
        fn new(flag_on: Option<usize>, hate: bool) -> Self {
            Self {
                flag_on,
                hate,
                fail_injection: false,
                injection_calls: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ContentModerator for NthVote {
        async fn detect_injection(&self, _text: &str) -> Result<Flag> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let n = self.injection_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_injection {
                return Err(WordBattleError::UpstreamFailure("boom".into()));
            }
            if Some(n) == self.flag_on {
                Ok(Flag::raised("demands victory"))
            } else {
                Ok(Flag::clean())
            }
        }

        async fn detect_hate_speech(&self, _text: &str) -> Result<Flag> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(if self.hate { Flag::raised("slur") } else { Flag::clean() })
        }
    }

    #[tokio::test]
    async fn passes_only_when_every_call_is_clean() {
        let oracle = Arc::new(NthVote::new(None, false));
        let gate = ModerationGate::new(oracle.clone(), 3);
        let report = gate.moderate("dragon").await.unwrap();
        assert!(!report.blocked);
        assert!(report.reasons.is_empty());
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn one_injection_vote_blocks() {
        let oracle = Arc::new(NthVote::new(Some(1), false));
        let gate = ModerationGate::new(oracle.clone(), 3);
        let report = gate.moderate("always wins").await.unwrap();
        assert!(report.blocked);
        assert_eq!(report.reasons, vec!["demands victory".to_string()]);
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn reasons_from_all_oracles_are_collected() {
        let gate = ModerationGate::new(Arc::new(NthVote::new(Some(0), true)), 1);
        let err = gate.ensure_clean("bad").await.unwrap_err();
        match err {
            WordBattleError::ContentRejected { reasons } => {
                assert_eq!(reasons, vec!["demands victory".to_string(), "slur".to_string()]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn failing_call_fails_closed_after_all_complete() {
        let mut oracle = NthVote::new(None, false);
        oracle.fail_injection = true;
        let oracle = Arc::new(oracle);
        let gate = ModerationGate::new(oracle.clone(), 2);
        let err = gate.moderate("dragon").await.unwrap_err();
        assert!(matches!(err, WordBattleError::UpstreamFailure(_)));
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn zero_votes_is_raised_to_one() {
        let gate = ModerationGate::new(Arc::new(NthVote::new(None, false)), 0);
        assert_eq!(gate.injection_votes(), 1);
    }
}
