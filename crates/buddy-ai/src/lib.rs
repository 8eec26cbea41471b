pub mod ai_provider;
pub mod budget;
pub mod providers;
pub mod verdict;

pub use ai_provider::{
    create_provider, ClassifierProvider, ClassifierSession, ProviderConfig, ProviderKind,
    DEFAULT_SYSTEM_PROMPT,
};
pub use budget::{TokenBudget, DEFAULT_MAX_TOKENS, TRUNCATION_MARKER};
pub use verdict::{parse_verdict, AnalysisPayload};
