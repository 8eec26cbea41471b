use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::ai_provider::{ClassifierProvider, ClassifierSession};
use crate::budget::TokenBudget;

/// Local Ollama Provider
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl OllamaProvider {
    #[must_use]
    pub fn new(client: Client, base_url: Option<&str>, model: &str, max_tokens: u32) -> Self {
        Self {
            client,
            base_url: base_url
                .unwrap_or("http://localhost:11434")
                .trim_end_matches('/')
                .to_string(),
            model: model.to_string(),
            max_tokens,
        }
    }
}

#[async_trait]
impl ClassifierProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn create(&self, system_prompt: &str) -> Result<Box<dyn ClassifierSession>> {
        if !self.is_available().await {
            anyhow::bail!("Ollama is not reachable at {}", self.base_url);
        }

        Ok(Box::new(OllamaSession {
            client: self.client.clone(),
            url: format!("{}/api/chat", self.base_url),
            model: self.model.clone(),
            messages: vec![json!({ "role": "system", "content": system_prompt })],
            budget: TokenBudget::new(self.max_tokens),
        }))
    }

    async fn is_available(&self) -> bool {
        // Check if Ollama is running by hitting /api/tags
        let url = format!("{}/api/tags", self.base_url);
        self.client.get(&url).send().await.is_ok()
    }
}

/// Chat session against `/api/chat`. The conversation is resent on every
/// prompt, so the context grows until the session is renewed.
pub struct OllamaSession {
    client: Client,
    url: String,
    model: String,
    messages: Vec<Value>,
    budget: TokenBudget,
}

#[async_trait]
impl ClassifierSession for OllamaSession {
    async fn classify(&mut self, text: &str) -> Result<String> {
        if self.budget.tokens_left() == 0 {
            anyhow::bail!("Session token limit reached");
        }

        self.messages
            .push(json!({ "role": "user", "content": text }));

        let body = json!({
            "model": self.model,
            "messages": self.messages,
            "stream": false,
            "options": { "num_ctx": self.budget.max_tokens }
        });

        let result = self.send(&body).await;
        match result {
            Ok((content, context_tokens)) => {
                self.messages
                    .push(json!({ "role": "assistant", "content": content }));
                match context_tokens {
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

impl OllamaSession {
    /// Returns the reply text and, when reported, the tokens now held in context
    async fn send(&self, body: &Value) -> Result<(String, Option<u32>)> {
        let response = self
            .client
            .post(&self.url)
            .json(body)
            .send()
            .await
            .context("Failed to send request to Ollama")?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama API error: {}", error_text);
        }

        let json: Value = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;

        // Extract text from: message.content
        let content = json["message"]["content"]
            .as_str()
            .map(ToString::to_string)
            .context("Failed to extract text from Ollama response")?;

        let prompt_tokens = json["prompt_eval_count"].as_u64();
        let reply_tokens = json["eval_count"].as_u64();
        let context_tokens = match (prompt_tokens, reply_tokens) {
            (Some(p), Some(r)) => u32::try_from(p + r).ok(),
            _ => None,
        };

        Ok((content, context_tokens))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session(server: &MockServer, budget: TokenBudget) -> OllamaSession {
        OllamaSession {
            client: Client::new(),
            url: format!("{}/api/chat", server.uri()),
            model: String::from("llama3.2"),
            messages: vec![json!({ "role": "system", "content": "moderate" })],
            budget,
        }
    }

    fn chat_reply(content: &str) -> Value {
        json!({ "message": { "role": "assistant", "content": content }, "done": true })
    }

    #[tokio::test]
    async fn test_classify_takes_context_size_from_reported_counts() {
        let server = MockServer::start().await;
        let mut reply = chat_reply("Risk level: low.");
        reply["prompt_eval_count"] = json!(30);
        reply["eval_count"] = json!(12);
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply))
            .expect(1)
            .mount(&server)
            .await;

        let mut session = session(&server, TokenBudget::new(1000));
        let content = session.classify("some page text").await.unwrap();

        assert_eq!(content, "Risk level: low.");
        assert_eq!(session.budget().tokens_used, 42);
        assert_eq!(session.messages.len(), 3);
    }

    #[tokio::test]
    async fn test_classify_estimates_usage_without_counts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply("12345678")))
            .mount(&server)
            .await;

        let mut session = session(&server, TokenBudget::with_usage(1000, 100));
        session.classify("abcd").await.unwrap();

        // 1 token for the prompt, 2 for the reply
        assert_eq!(session.budget().tokens_used, 103);
    }

    #[tokio::test]
    async fn test_server_error_leaves_conversation_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
            .mount(&server)
            .await;

        let mut session = session(&server, TokenBudget::new(1000));
        let err = session.classify("some page text").await.unwrap_err();

        assert!(err.to_string().contains("Ollama API error: model not loaded"));
        assert_eq!(session.messages.len(), 1);
        assert_eq!(session.budget().tokens_used, 0);
    }

    #[tokio::test]
    async fn test_spent_budget_refuses_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply("unused")))
            .expect(0)
            .mount(&server)
            .await;

        let mut session = session(&server, TokenBudget::with_usage(100, 100));
        let err = session.classify("some page text").await.unwrap_err();
        assert!(err.to_string().contains("token limit"));
        assert_eq!(session.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_destroy_keeps_only_system_prompt() {
        let server = MockServer::start().await;
        let mut reply = chat_reply("Risk level: high.");
        reply["prompt_eval_count"] = json!(400);
        reply["eval_count"] = json!(20);
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply))
            .mount(&server)
            .await;

        let mut session = session(&server, TokenBudget::new(1000));
        session.classify("first page").await.unwrap();
        session.destroy().await.unwrap();

        assert_eq!(session.messages.len(), 1);
        assert_eq!(session.messages[0]["role"], "system");
        assert_eq!(session.budget(), TokenBudget::new(1000));
    }

    #[tokio::test]
    async fn test_provider_creates_session_against_server() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "models": [] })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply("Risk level: low.")))
            .mount(&server)
            .await;

        let provider = OllamaProvider::new(Client::new(), Some(&server.uri()), "llama3.2", 2048);
        assert!(provider.is_available().await);

        let mut session = provider.create("moderate").await.unwrap();
        assert_eq!(session.classify("page").await.unwrap(), "Risk level: low.");
        assert_eq!(session.budget().max_tokens, 2048);
    }
}
