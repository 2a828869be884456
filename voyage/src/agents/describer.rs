//! One-line summaries of learned skills.

use anyhow::{Context, Result};
use tracing::instrument;

use crate::io::llm::LanguageModel;
use crate::io::prompt::{DESCRIBE_SYSTEM, PromptEngine};

pub struct Describer {
    model: Box<dyn LanguageModel>,
    prompts: PromptEngine,
}

impl Describer {
    pub fn new(model: Box<dyn LanguageModel>) -> Self {
        Self {
            model,
            prompts: PromptEngine::new(),
        }
    }

    /// Stub declaration of `name` whose body is the summary as a comment.
    #[instrument(skip_all, fields(skill = %name))]
    pub fn describe(&self, name: &str, code: &str) -> Result<String> {
        let summary = self
            .model
            .complete(DESCRIBE_SYSTEM, &self.prompts.describe_user(name, code))
            .context("describe request")?;
        let summary = summary.split_whitespace().collect::<Vec<_>>().join(" ");
        Ok(format!("async function {name}(bot) {{\n    // {summary}\n}}"))
    }
}
