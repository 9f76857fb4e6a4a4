use thiserror::Error;

/// Every way a request can fail. All variants are terminal for the request.
#[derive(Error, Debug)]
pub enum WordBattleError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("Username \"{username}\" already exists")]
    UsernameTaken { username: String },

    #[error("Word rejected: {}", .reasons.join("; "))]
    ContentRejected { reasons: Vec<String> },

    #[error("Word is too similar to \"{word}\" registered by {username}")]
    DuplicateWord { username: String, word: String },

    #[error("No opponents found")]
    NoOpponentAvailable,

    #[error("Upstream call failed: {0}")]
    UpstreamFailure(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, WordBattleError>;

impl WordBattleError {
    /// Stable tag surfaced to clients alongside the message.
    pub fn kind(&self) -> &'static str {
        match self {
            WordBattleError::NotFound(_) => "NotFound",
            WordBattleError::Validation(_) => "ValidationError",
            WordBattleError::UsernameTaken { .. } => "UsernameTaken",
            WordBattleError::ContentRejected { .. } => "ContentRejected",
            WordBattleError::DuplicateWord { .. } => "DuplicateWord",
            WordBattleError::NoOpponentAvailable => "NoOpponentAvailable",
            WordBattleError::UpstreamFailure(_) => "UpstreamFailure",
            WordBattleError::Storage(_) | WordBattleError::Config(_) => "ServerError",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            WordBattleError::NotFound(_) => 404,
            WordBattleError::Validation(_) => 400,
            WordBattleError::UsernameTaken { .. }
            | WordBattleError::DuplicateWord { .. }
            | WordBattleError::NoOpponentAvailable => 409,
            WordBattleError::ContentRejected { .. } => 422,
            WordBattleError::UpstreamFailure(_) => 502,
            WordBattleError::Storage(_) | WordBattleError::Config(_) => 500,
        }
    }
}

impl From<reqwest::Error> for WordBattleError {
    fn from(err: reqwest::Error) -> Self {
        WordBattleError::UpstreamFailure(err.to_string())
    }
}

impl From<serde_json::Error> for WordBattleError {
    fn from(err: serde_json::Error) -> Self {
        WordBattleError::Storage(format!("serialization: {}", err))
    }
}

impl From<std::io::Error> for WordBattleError {
    fn from(err: std::io::Error) -> Self {
        WordBattleError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_content_lists_every_reason() {
        let err = WordBattleError::ContentRejected {
            reasons: vec!["asks to always win".into(), "slur".into()],
        };
        assert_eq!(err.to_string(), "Word rejected: asks to always win; slur");
        assert_eq!(err.status_code(), 422);
    }

    #[test]
    fn internal_failures_share_the_server_error_tag() {
        assert_eq!(WordBattleError::Storage("disk".into()).kind(), "ServerError");
        assert_eq!(WordBattleError::Config("bad".into()).status_code(), 500);
    }
}
