use buddy_ai::{ClassifierProvider, ClassifierSession, TokenBudget};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{BuddyError, Result};

/// Lifecycle of the wrapped classifier session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// No session exists
    Idle,
    /// A session is being created
    Initializing,
    /// A live session is available
    Ready,
}

/// Owns one classifier session: creates it lazily, renews it when the token
/// budget runs low and sizes input to the budget.
///
/// The slot is behind an async mutex, so concurrent callers queue up behind
/// an in-flight initialization and reuse its session instead of opening
/// their own.
pub struct AnalyzerSession {
    provider: Arc<dyn ClassifierProvider>,
    system_prompt: String,
    slot: Mutex<Option<Box<dyn ClassifierSession>>>,
    initializing: AtomicBool,
    live: AtomicBool,
    sessions_created: AtomicU32,
}

impl AnalyzerSession {
    #[must_use]
    pub fn new(provider: Arc<dyn ClassifierProvider>, system_prompt: impl Into<String>) -> Self {
        Self {
            provider,
            system_prompt: system_prompt.into(),
            slot: Mutex::new(None),
            initializing: AtomicBool::new(false),
            live: AtomicBool::new(false),
            sessions_created: AtomicU32::new(0),
        }
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        if self.initializing.load(Ordering::SeqCst) {
            SessionStatus::Initializing
        } else if self.live.load(Ordering::SeqCst) {
            SessionStatus::Ready
        } else {
            SessionStatus::Idle
        }
    }

    /// Number of sessions opened over this wrapper's lifetime
    #[must_use]
    pub fn sessions_created(&self) -> u32 {
        self.sessions_created.load(Ordering::SeqCst)
    }

    /// Budget of the live session, if any
    pub async fn budget(&self) -> Option<TokenBudget> {
        self.slot.lock().await.as_ref().map(|s| s.budget())
    }

    /// Make sure a session exists, creating one if needed
    ///
    /// # Errors
    ///
    /// Returns `BuddyError::Initialization` if the provider cannot create a
    /// session. The slot stays empty and the next call retries.
    pub async fn ensure_ready(&self) -> Result<TokenBudget> {
        let mut slot = self.slot.lock().await;
        self.ensure_slot(&mut slot).await
    }

    /// Destroy the current session (if any) and open a fresh one
    ///
    /// # Errors
    ///
    /// Returns `BuddyError::Initialization` if the new session cannot be created
    pub async fn renew(&self) -> Result<TokenBudget> {
        let mut slot = self.slot.lock().await;
        self.discard(&mut slot).await;
        self.ensure_slot(&mut slot).await
    }

    /// Destroy the current session without replacing it
    pub async fn shutdown(&self) {
        let mut slot = self.slot.lock().await;
        self.discard(&mut slot).await;
    }

    /// Classify `text` with the live session.
    ///
    /// Before the call a session whose budget is critical is replaced. Input
    /// over half the budget is truncated. A failure that mentions tokens or
    /// limits replaces the session so the next attempt starts clean.
    ///
    /// # Errors
    ///
    /// `Initialization` when no session can be opened, `Classification` when
    /// the classify call fails.
    pub async fn classify(&self, text: &str) -> Result<String> {
        let mut slot = self.slot.lock().await;

        let budget = self.ensure_slot(&mut slot).await?;
        if budget.is_critical() {
            log::info!(
                "Token limit approaching ({} of {} left), refreshing classifier session",
                budget.tokens_left(),
                budget.max_tokens
            );
            self.discard(&mut slot).await;
            self.ensure_slot(&mut slot).await?;
        }

        let Some(session) = slot.as_mut() else {
            return Err(BuddyError::Initialization(String::from(
                "Classifier session not initialized",
            )));
        };

        let budget = session.budget();
        let input = budget.fit_input(text);
        log::debug!(
            "Processing text ({} chars, ~{} tokens); token status: used {} / max {} / left {}",
            input.chars().count(),
            TokenBudget::estimate_tokens(text),
            budget.tokens_used,
            budget.max_tokens,
            budget.tokens_left()
        );

        match session.classify(&input).await {
            Ok(response) => {
                let after = session.budget();
                log::debug!(
                    "Classification done; token status: used {} / left {}",
                    after.tokens_used,
                    after.tokens_left()
                );
                Ok(response)
            }
            Err(e) => {
                let error = BuddyError::Classification(format!("{e:#}"));
                log::warn!("{error}");
                if error.is_budget_related() {
                    log::info!("Token-related error detected, refreshing classifier session");
                    self.discard(&mut slot).await;
                    if let Err(init_error) = self.ensure_slot(&mut slot).await {
                        log::warn!("Session refresh after token error failed: {init_error}");
                    }
                }
                Err(error)
            }
        }
    }

    async fn ensure_slot(
        &self,
        slot: &mut Option<Box<dyn ClassifierSession>>,
    ) -> Result<TokenBudget> {
        if let Some(session) = slot.as_ref() {
            return Ok(session.budget());
        }

        self.initializing.store(true, Ordering::SeqCst);
        log::info!(
            "Initializing classifier session ({})",
            self.provider.model_name()
        );
        let created = self.provider.create(&self.system_prompt).await;
        self.initializing.store(false, Ordering::SeqCst);

        match created {
            Ok(session) => {
                let budget = session.budget();
                self.sessions_created.fetch_add(1, Ordering::SeqCst);
                log::info!(
                    "Classifier session initialized; token status: max {} / used {} / left {}",
                    budget.max_tokens,
                    budget.tokens_used,
                    budget.tokens_left()
                );
                *slot = Some(session);
                self.live.store(true, Ordering::SeqCst);
                Ok(budget)
            }
            Err(e) => {
                log::error!("Failed to initialize classifier session: {e:#}");
                Err(BuddyError::Initialization(format!("{e:#}")))
            }
        }
    }

    async fn discard(&self, slot: &mut Option<Box<dyn ClassifierSession>>) {
        if let Some(mut session) = slot.take() {
            if let Err(e) = session.destroy().await {
                log::warn!("Failed to destroy classifier session: {e:#}");
            }
        }
        self.live.store(false, Ordering::SeqCst);
    }
}
