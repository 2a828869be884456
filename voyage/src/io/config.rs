//! Agent configuration stored at `<workdir>/config.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::io::atomic::write_atomic;

/// Agent configuration (TOML).
///
/// Built once at startup and passed by reference into every constructor.
/// Missing fields default to values that work against a local worker.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    pub worker: WorkerConfig,
    pub world: WorldConfig,
    pub learning: LearningConfig,
    pub models: ModelsConfig,
}

/// The supervised world worker process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorkerConfig {
    pub command: Vec<String>,
    /// A stdout/stderr line matching this regex marks the worker ready.
    pub ready_pattern: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_pattern: Option<String>,
    /// Relative paths resolve against the working directory.
    pub log_dir: String,
    /// 0 waits until the worker prints a ready line or exits.
    pub ready_timeout_secs: u64,
    pub stop_grace_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "node".to_string(),
                "mineflayer/index.js".to_string(),
                "3000".to_string(),
            ],
            ready_pattern: r"Server started on port (\d+)".to_string(),
            callback_pattern: None,
            log_dir: "logs".to_string(),
            ready_timeout_secs: 60,
            stop_grace_secs: 5,
        }
    }
}

/// World session parameters sent to and used against the worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorldConfig {
    pub server_url: String,
    /// Port the worker's HTTP server listens on.
    pub server_port: u16,
    /// Port of the world the worker connects its bot to.
    pub world_port: u16,
    pub request_timeout_secs: u64,
    pub wait_ticks: u32,
    pub settle_millis: u64,
    pub start_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<InstanceConfig>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1".to_string(),
            server_port: 3000,
            world_port: 25565,
            request_timeout_secs: 600,
            wait_ticks: 20,
            settle_millis: 3000,
            start_attempts: 3,
            instance: None,
        }
    }
}

impl WorldConfig {
    pub fn base_url(&self) -> String {
        format!("{}:{}", self.server_url.trim_end_matches('/'), self.server_port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// An owned world server, supervised alongside the worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceConfig {
    pub command: Vec<String>,
    pub ready_pattern: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LearningConfig {
    /// Synthesize/execute/judge attempts per sub-goal.
    pub max_retries: u32,
    /// Restarts of a whole sub-goal after an unexpected error.
    pub outer_attempts: u32,
    /// Fresh synthesis requests when extraction fails, per attempt.
    pub parse_retries: u32,
    /// Same-prompt critique requests when the verdict is unparsable.
    pub judgment_retries: u32,
    /// Teleport target issued after the initial reset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_position: Option<[i64; 3]>,
    /// Directory of `*.js` primitives sent with every step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primitives_dir: Option<String>,
    pub describe_skills: bool,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            max_retries: 4,
            outer_attempts: 3,
            parse_retries: 3,
            judgment_retries: 5,
            start_position: None,
            primitives_dir: None,
            describe_skills: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelsConfig {
    pub synthesis: ModelConfig,
    pub critique: CritiqueConfig,
    pub describe: ModelConfig,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum Backend {
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "ollama")]
    Ollama,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub backend: Backend,
    pub model: String,
    pub base_url: String,
    /// Environment variable holding the API key; unset means no auth header.
    pub api_key_env: String,
    pub temperature: f64,
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            backend: Backend::OpenAi,
            model: "gpt-4".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.0,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CritiqueMode {
    #[default]
    Auto,
    Manual,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CritiqueConfig {
    pub mode: CritiqueMode,
    #[serde(flatten)]
    pub model: ModelConfig,
}

impl ModelConfig {
    fn validate(&self, section: &str) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(anyhow!("models.{section}.model must be non-empty"));
        }
        if self.base_url.trim().is_empty() {
            return Err(anyhow!("models.{section}.base_url must be non-empty"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(anyhow!("models.{section}.temperature must be within 0..=2"));
        }
        if self.timeout_secs == 0 {
            return Err(anyhow!("models.{section}.timeout_secs must be > 0"));
        }
        Ok(())
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.worker.command.is_empty() || self.worker.command[0].trim().is_empty() {
            return Err(anyhow!("worker.command must be a non-empty array"));
        }
        Regex::new(&self.worker.ready_pattern).context("worker.ready_pattern")?;
        if let Some(pattern) = &self.worker.callback_pattern {
            Regex::new(pattern).context("worker.callback_pattern")?;
        }
        if let Some(instance) = &self.world.instance {
            if instance.command.is_empty() || instance.command[0].trim().is_empty() {
                return Err(anyhow!("world.instance.command must be a non-empty array"));
            }
            Regex::new(&instance.ready_pattern).context("world.instance.ready_pattern")?;
        }
        if self.world.server_port == 0 {
            return Err(anyhow!("world.server_port must be > 0"));
        }
        if self.world.request_timeout_secs == 0 {
            return Err(anyhow!("world.request_timeout_secs must be > 0"));
        }
        if self.world.start_attempts == 0 {
            return Err(anyhow!("world.start_attempts must be > 0"));
        }
        let learning = &self.learning;
        for (name, value) in [
            ("max_retries", learning.max_retries),
            ("outer_attempts", learning.outer_attempts),
            ("parse_retries", learning.parse_retries),
            ("judgment_retries", learning.judgment_retries),
        ] {
            if value == 0 {
                return Err(anyhow!("learning.{name} must be > 0"));
            }
        }
        self.models.synthesis.validate("synthesis")?;
        self.models.critique.model.validate("critique")?;
        self.models.describe.validate("describe")?;
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AgentConfig::default()`.
pub fn load_config(path: &Path) -> Result<AgentConfig> {
    if !path.exists() {
        let cfg = AgentConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AgentConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AgentConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}
