//! Error taxonomy shared by the store, scheduler and report pipeline.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuddyError {
    /// The classifier session could not be created. Retried on the next request.
    #[error("Failed to initialize classifier session: {0}")]
    Initialization(String),

    /// Session budget is nearly spent. Recovered by renewing the session.
    #[error("Classifier token budget exhausted ({tokens_left} of {max_tokens} tokens left)")]
    BudgetExhausted { tokens_left: u32, max_tokens: u32 },

    /// The classify call itself failed
    #[error("Content analysis failed: {0}")]
    Classification(String),

    /// An event or payload that does not have the expected shape
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Event data that failed validation at the boundary
    #[error("{0}")]
    InvalidInput(String),

    /// The download sink rejected the report
    #[error("Failed to download report: {0}")]
    Download(String),

    #[error("Report generation already in progress")]
    ReportBusy,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BuddyError {
    /// Whether the failure text points at the token budget or a context limit
    #[must_use]
    pub fn is_budget_related(&self) -> bool {
        match self {
            Self::BudgetExhausted { .. } => true,
            Self::Classification(message) => mentions_token_limit(message),
            _ => false,
        }
    }
}

/// Provider errors are free text; a mention of tokens or limits is treated
/// as a budget problem.
#[must_use]
pub fn mentions_token_limit(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("token") || lower.contains("limit")
}

pub type Result<T> = std::result::Result<T, BuddyError>;
