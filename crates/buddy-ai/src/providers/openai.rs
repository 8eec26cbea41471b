use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::ai_provider::{ClassifierProvider, ClassifierSession};
use crate::budget::TokenBudget;

/// `OpenAI` API Provider (also compatible with other OpenAI-compatible APIs)
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
}

impl OpenAiProvider {
    #[must_use]
    pub fn new(
        client: Client,
        api_key: &str,
        model: &str,
        base_url: Option<&str>,
        max_tokens: u32,
    ) -> Self {
        Self {
            client,
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url
                .unwrap_or("https://api.openai.com/v1")
                .trim_end_matches('/')
                .to_string(),
            max_tokens,
        }
    }
}

#[async_trait]
impl ClassifierProvider for OpenAiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn create(&self, system_prompt: &str) -> Result<Box<dyn ClassifierSession>> {
        if self.api_key.is_empty() {
            anyhow::bail!("OpenAI API key is empty");
        }

        Ok(Box::new(OpenAiSession {
            client: self.client.clone(),
            url: format!("{}/chat/completions", self.base_url),
            api_key: self.api_key.clone(),
            model: self.model.clone(),
            messages: vec![json!({ "role": "system", "content": system_prompt })],
            budget: TokenBudget::new(self.max_tokens),
        }))
    }
}

/// Stateful chat over the completions endpoint. The budget is kept locally
/// because the API itself is stateless.
pub struct OpenAiSession {
    client: Client,
    url: String,
    api_key: String,
    model: String,
    messages: Vec<Value>,
    budget: TokenBudget,
}

#[async_trait]
impl ClassifierSession for OpenAiSession {
    async fn classify(&mut self, text: &str) -> Result<String> {
        if self.budget.tokens_left() == 0 {
            anyhow::bail!("Session token limit reached");
        }

        self.messages
            .push(json!({ "role": "user", "content": text }));

        let body = json!({
            "model": self.model,
            "messages": self.messages,
        });

        match self.send(&body).await {
            Ok((content, total_tokens)) => {
                self.messages
                    .push(json!({ "role": "assistant", "content": content }));
                match total_tokens {
                    Some(tokens) => self.budget.tokens_used = tokens,
                    None => self.budget.record_usage(
                        TokenBudget::estimate_tokens(text)
                            .saturating_add(TokenBudget::estimate_tokens(&content)),
                    ),
                }
                Ok(content)
            }
            Err(e) => {
                self.messages.pop();
                Err(e)
            }
        }
    }

    fn budget(&self) -> TokenBudget {
        self.budget
    }

    async fn destroy(&mut self) -> Result<()> {
        self.messages.truncate(1);
        self.budget = TokenBudget::new(self.budget.max_tokens);
        Ok(())
    }
}

impl OpenAiSession {
    async fn send(&self, body: &Value) -> Result<(String, Option<u32>)> {
        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(body)
            .send()
            .await
            .context("Failed to send request to OpenAI")?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI API error: {}", error_text);
        }

        let json: Value = response
            .json()
            .await
            .context("Failed to parse OpenAI response")?;

        // Extract text from: choices[0].message.content
        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .map(ToString::to_string)
            .context("Failed to extract text from OpenAI response")?;

        let total_tokens = json["usage"]["total_tokens"]
            .as_u64()
            .and_then(|t| u32::try_from(t).ok());

        Ok((content, total_tokens))
    }
}
