//! Language-model backends behind a single `complete(system, user)` capability.

use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::io::config::{Backend, ModelConfig};

/// Opaque `prompt -> text` collaborator.
pub trait LanguageModel {
    fn complete(&self, system: &str, user: &str) -> Result<String>;
}

impl<M: LanguageModel + ?Sized> LanguageModel for Box<M> {
    fn complete(&self, system: &str, user: &str) -> Result<String> {
        (**self).complete(system, user)
    }
}

impl<M: LanguageModel + ?Sized> LanguageModel for Rc<M> {
    fn complete(&self, system: &str, user: &str) -> Result<String> {
        (**self).complete(system, user)
    }
}

impl<M: LanguageModel + ?Sized> LanguageModel for Arc<M> {
    fn complete(&self, system: &str, user: &str) -> Result<String> {
        (**self).complete(system, user)
    }
}

/// Build the backend named by `cfg`.
pub fn model_from_config(cfg: &ModelConfig) -> Box<dyn LanguageModel> {
    match cfg.backend {
        Backend::OpenAi => Box::new(OpenAiChat::new(cfg)),
        Backend::Ollama => Box::new(OllamaChat::new(cfg)),
    }
}

fn agent(timeout_secs: u64) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
}

fn post_json(agent: &ureq::Agent, url: &str, auth: Option<&str>, body: &Value) -> Result<Value> {
    let mut request = agent.post(url).set("Content-Type", "application/json");
    if let Some(key) = auth {
        request = request.set("Authorization", &format!("Bearer {key}"));
    }
    let response = match request.send_string(&body.to_string()) {
        Ok(response) => response,
        Err(ureq::Error::Status(code, response)) => {
            let detail = response.into_string().unwrap_or_default();
            return Err(anyhow!("{url} returned HTTP {code}: {detail}"));
        }
        Err(ureq::Error::Transport(t)) => {
            return Err(anyhow!("{url} transport failure: {t}"));
        }
    };
    let text = response
        .into_string()
        .with_context(|| format!("read response from {url}"))?;
    serde_json::from_str(&text).with_context(|| format!("parse response from {url}"))
}

/// OpenAI-compatible `/chat/completions`.
pub struct OpenAiChat {
    url: String,
    model: String,
    api_key: Option<String>,
    temperature: f64,
    agent: ureq::Agent,
}

impl OpenAiChat {
    pub fn new(cfg: &ModelConfig) -> Self {
        Self {
            url: format!("{}/chat/completions", cfg.base_url.trim_end_matches('/')),
            model: cfg.model.clone(),
            api_key: std::env::var(&cfg.api_key_env).ok().filter(|k| !k.is_empty()),
            temperature: cfg.temperature,
            agent: agent(cfg.timeout_secs),
        }
    }
}

impl LanguageModel for OpenAiChat {
    #[instrument(skip_all, fields(model = %self.model))]
    fn complete(&self, system: &str, user: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        });
        let reply = post_json(&self.agent, &self.url, self.api_key.as_deref(), &body)?;
        let content = reply["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow!("chat completion has no message content"))?;
        debug!(chars = content.len(), "completion received");
        Ok(content.to_string())
    }
}

/// Ollama `/api/chat` without streaming.
pub struct OllamaChat {
    url: String,
    model: String,
    temperature: f64,
    agent: ureq::Agent,
}

impl OllamaChat {
    pub fn new(cfg: &ModelConfig) -> Self {
        Self {
            url: format!("{}/api/chat", cfg.base_url.trim_end_matches('/')),
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            agent: agent(cfg.timeout_secs),
        }
    }
}

impl LanguageModel for OllamaChat {
    #[instrument(skip_all, fields(model = %self.model))]
    fn complete(&self, system: &str, user: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "stream": false,
            "options": {"temperature": self.temperature},
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        });
        let reply = post_json(&self.agent, &self.url, None, &body)?;
        let content = reply["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow!("ollama reply has no message content"))?;
        debug!(chars = content.len(), "completion received");
        Ok(content.to_string())
    }
}
