//! In-memory classifier and download sink used by unit tests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use buddy_ai::{ClassifierProvider, ClassifierSession, TokenBudget};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use crate::events::EventHandler;
use crate::report::{DownloadId, DownloadSink, ReportGenerator, ReportRenderer};

pub const DEFAULT_REPLY: &str = "Nothing concerning here. Risk level: low.";

#[derive(Debug, Clone, Copy)]
pub enum Reply {
    Ok(&'static str),
    Err(&'static str),
}

#[derive(Default)]
struct FakeState {
    created: AtomicU32,
    destroyed: AtomicU32,
    failing_creates: AtomicU32,
    create_gated: AtomicBool,
    create_entered: Notify,
    create_release: Notify,
    replies: Mutex<VecDeque<Reply>>,
    inputs: Mutex<Vec<String>>,
    system_prompt: Mutex<Option<String>>,
}

#[derive(Clone)]
pub struct FakeProvider {
    state: Arc<FakeState>,
    max_tokens: u32,
    usage_per_call: u32,
}

impl FakeProvider {
    pub fn new(max_tokens: u32) -> Self {
        Self {
            state: Arc::new(FakeState::default()),
            max_tokens,
            usage_per_call: 10,
        }
    }

    pub fn with_usage_per_call(mut self, tokens: u32) -> Self {
        self.usage_per_call = tokens;
        self
    }

    pub fn with_replies(self, replies: Vec<Reply>) -> Self {
        self.state.replies.lock().unwrap().extend(replies);
        self
    }

    pub fn failing_creates(self, count: u32) -> Self {
        self.state.failing_creates.store(count, Ordering::SeqCst);
        self
    }

    /// Hold every `create` until [`Self::release_create`] is called
    pub fn with_create_gate(self) -> Self {
        self.gate_creates();
        self
    }

    /// Hold the next `create` calls on a provider already in use
    pub fn gate_creates(&self) {
        self.state.create_gated.store(true, Ordering::SeqCst);
    }

    pub async fn wait_for_create(&self) {
        self.state.create_entered.notified().await;
    }

    pub fn release_create(&self) {
        self.state.create_gated.store(false, Ordering::SeqCst);
        self.state.create_release.notify_waiters();
    }

    pub fn created(&self) -> u32 {
        self.state.created.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> u32 {
        self.state.destroyed.load(Ordering::SeqCst)
    }

    pub fn inputs(&self) -> Vec<String> {
        self.state.inputs.lock().unwrap().clone()
    }

    pub fn last_system_prompt(&self) -> Option<String> {
        self.state.system_prompt.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClassifierProvider for FakeProvider {
    async fn create(&self, system_prompt: &str) -> Result<Box<dyn ClassifierSession>> {
        if self.state.create_gated.load(Ordering::SeqCst) {
            let released = self.state.create_release.notified();
            self.state.create_entered.notify_one();
            released.await;
        }

        let failing = self.state.failing_creates.load(Ordering::SeqCst);
        if failing > 0 {
            self.state.failing_creates.store(failing - 1, Ordering::SeqCst);
            return Err(anyhow!("language model unavailable"));
        }

        *self.state.system_prompt.lock().unwrap() = Some(system_prompt.to_string());
        self.state.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            state: self.state.clone(),
            budget: TokenBudget::new(self.max_tokens),
            usage_per_call: self.usage_per_call,
        }))
    }

    fn model_name(&self) -> &str {
        "fake"
    }
}

struct FakeSession {
    state: Arc<FakeState>,
    budget: TokenBudget,
    usage_per_call: u32,
}

#[async_trait]
impl ClassifierSession for FakeSession {
    async fn classify(&mut self, text: &str) -> Result<String> {
        self.state.inputs.lock().unwrap().push(text.to_string());
        let reply = self
            .state
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Reply::Ok(DEFAULT_REPLY));
        match reply {
            Reply::Ok(text) => {
                self.budget.record_usage(self.usage_per_call);
                Ok(text.to_string())
            }
            Reply::Err(message) => Err(anyhow!(message)),
        }
    }

    fn budget(&self) -> TokenBudget {
        self.budget
    }

    async fn destroy(&mut self) -> Result<()> {
        self.state.destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Accepts every report and keeps nothing
pub struct NullSink;

#[async_trait]
impl DownloadSink for NullSink {
    async fn save(&self, _: &[u8], _: &str, _: bool) -> Result<DownloadId> {
        Ok(DownloadId(1))
    }
}

pub fn null_handler() -> EventHandler {
    EventHandler::new(ReportGenerator::new(
        ReportRenderer::default(),
        Arc::new(NullSink),
    ))
}
