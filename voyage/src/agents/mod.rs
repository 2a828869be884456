//! Language-model collaborators driven by the control loop.

use crate::io::config::{CritiqueMode, ModelsConfig};
use crate::io::llm::model_from_config;

pub mod critic;
pub mod describer;
pub mod synthesizer;

use critic::{ConsoleReviewer, Critic};
use describer::Describer;
use synthesizer::Synthesizer;

/// The collaborators one learning session talks to.
pub struct Agents {
    pub synthesizer: Synthesizer,
    pub critic: Critic,
    /// Present only when skill descriptions are enabled.
    pub describer: Option<Describer>,
}

impl Agents {
    /// Build every collaborator from the `[models]` section.
    pub fn from_config(models: &ModelsConfig, judgment_retries: u32, describe: bool) -> Self {
        let critic = match models.critique.mode {
            CritiqueMode::Auto => {
                Critic::automatic(model_from_config(&models.critique.model), judgment_retries)
            }
            CritiqueMode::Manual => Critic::manual(Box::new(ConsoleReviewer::stdio())),
        };
        Self {
            synthesizer: Synthesizer::new(model_from_config(&models.synthesis)),
            critic,
            describer: describe.then(|| Describer::new(model_from_config(&models.describe))),
        }
    }
}
