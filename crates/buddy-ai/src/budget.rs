use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Budget assumed when a provider does not report a context window
pub const DEFAULT_MAX_TOKENS: u32 = 6144;

/// Rough token estimate used for input sizing
pub const CHARS_PER_TOKEN: usize = 4;

/// Appended to input that had to be cut to fit the budget
pub const TRUNCATION_MARKER: &str = "...";

/// Token accounting for one classifier session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBudget {
    pub max_tokens: u32,
    pub tokens_used: u32,
}

impl TokenBudget {
    /// Fresh budget. A zero maximum falls back to [`DEFAULT_MAX_TOKENS`].
    #[must_use]
    pub const fn new(max_tokens: u32) -> Self {
        Self::with_usage(max_tokens, 0)
    }

    #[must_use]
    pub const fn with_usage(max_tokens: u32, tokens_used: u32) -> Self {
        let max_tokens = if max_tokens == 0 {
            DEFAULT_MAX_TOKENS
        } else {
            max_tokens
        };
        Self {
            max_tokens,
            tokens_used,
        }
    }

    #[must_use]
    pub const fn tokens_left(&self) -> u32 {
        self.max_tokens.saturating_sub(self.tokens_used)
    }

    /// Less than 20% of the budget remains; the session should be renewed
    #[must_use]
    pub const fn is_critical(&self) -> bool {
        (self.tokens_left() as u64) * 5 < self.max_tokens as u64
    }

    /// Largest input, in tokens, a single prompt may use (half the budget)
    #[must_use]
    pub const fn safe_input_tokens(&self) -> u32 {
        self.max_tokens / 2
    }

    pub fn record_usage(&mut self, tokens: u32) {
        self.tokens_used = self.tokens_used.saturating_add(tokens);
    }

    /// Estimated token count of `text` at four characters per token
    #[must_use]
    pub fn estimate_tokens(text: &str) -> u32 {
        let chars = text.chars().count();
        u32::try_from(chars.div_ceil(CHARS_PER_TOKEN)).unwrap_or(u32::MAX)
    }

    /// Cut `text` down to the safe input size, marking the cut.
    /// Text that already fits is borrowed unchanged.
    #[must_use]
    pub fn fit_input<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let safe_tokens = self.safe_input_tokens();
        if Self::estimate_tokens(text) <= safe_tokens {
            return Cow::Borrowed(text);
        }

        let safe_chars = safe_tokens as usize * CHARS_PER_TOKEN;
        let mut truncated: String = text.chars().take(safe_chars).collect();
        truncated.push_str(TRUNCATION_MARKER);
        log::info!(
            "Text truncated from {} to {safe_chars} characters",
            text.chars().count()
        );
        Cow::Owned(truncated)
    }
}

impl Default for TokenBudget {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TOKENS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_max_falls_back_to_default() {
        let budget = TokenBudget::new(0);
        assert_eq!(budget.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(budget.tokens_left(), DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn test_is_critical_below_twenty_percent() {
        // 20% of 1000 is 200: exactly 200 left is still fine
        assert!(!TokenBudget::with_usage(1000, 800).is_critical());
        assert!(TokenBudget::with_usage(1000, 801).is_critical());
        assert!(TokenBudget::with_usage(1000, 5000).is_critical());
        assert!(!TokenBudget::new(1000).is_critical());
    }

    #[test]
    fn test_record_usage_saturates() {
        let mut budget = TokenBudget::with_usage(100, u32::MAX - 1);
        budget.record_usage(10);
        assert_eq!(budget.tokens_used, u32::MAX);
        assert_eq!(budget.tokens_left(), 0);
    }

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(TokenBudget::estimate_tokens(""), 0);
        assert_eq!(TokenBudget::estimate_tokens("abc"), 1);
        assert_eq!(TokenBudget::estimate_tokens("abcd"), 1);
        assert_eq!(TokenBudget::estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_fit_input_borrows_short_text() {
        let budget = TokenBudget::new(100);
        let text = "a".repeat(200);
        assert!(matches!(budget.fit_input(&text), Cow::Borrowed(_)));
    }

    #[test]
    fn test_fit_input_truncates_long_text_with_marker() {
        let budget = TokenBudget::new(100);
        let text = "b".repeat(201);
        let fitted = budget.fit_input(&text);
        assert_eq!(fitted.chars().count(), 200 + TRUNCATION_MARKER.len());
        assert!(fitted.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn test_fit_input_respects_char_boundaries() {
        let budget = TokenBudget::new(2);
        let fitted = budget.fit_input("\u{4f60}\u{597d}\u{4e16}\u{754c}\u{4f60}\u{597d}");
        assert_eq!(fitted, "\u{4f60}\u{597d}\u{4e16}\u{754c}...");
    }
}
