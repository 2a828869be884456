//! Prompt rendering for the synthesis, critique and description collaborators.

use anyhow::Result;
use minijinja::{Environment, context};
use serde::Serialize;

use crate::core::describe::{requirements, tools};
use crate::core::trace::{ON_CHAT, ON_ERROR, Observation, Trace};
use crate::plan::SubGoal;

const SYNTHESIS_SYSTEM_TEMPLATE: &str = include_str!("prompts/synthesis_system.md");
const SYNTHESIS_TEMPLATE: &str = include_str!("prompts/synthesis.md");
const CRITIQUE_TEMPLATE: &str = include_str!("prompts/critique.md");

pub const CRITIQUE_SYSTEM: &str = include_str!("prompts/critique_system.md");
pub const DESCRIBE_SYSTEM: &str = include_str!("prompts/describe_system.md");

/// Observation fields pre-formatted for templates.
#[derive(Debug, Clone, Serialize)]
struct StatusContext {
    biome: String,
    time: String,
    nearby_blocks: String,
    entities: String,
    health: String,
    hunger: String,
    position: String,
    equipment: String,
    inventory_used: u32,
    inventory: String,
}

impl StatusContext {
    fn from_observation(observation: &Observation) -> Self {
        let status = &observation.status;

        let mut entities: Vec<(&String, &f64)> = status.entities.iter().collect();
        entities.sort_by(|a, b| a.1.total_cmp(b.1));
        let entities = if entities.is_empty() {
            "None".to_string()
        } else {
            entities
                .iter()
                .map(|(name, _)| name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };

        let equipment = status
            .equipment
            .iter()
            .map(|slot| slot.as_deref().unwrap_or("None"))
            .collect::<Vec<_>>()
            .join(", ");

        Self {
            biome: status.biome.clone(),
            time: status.time_of_day.clone(),
            nearby_blocks: none_if_empty(observation.voxels.join(", ")),
            entities,
            health: format!("{:.1}", status.health),
            hunger: format!("{:.1}", status.food),
            position: format!(
                "x={:.1}, y={:.1}, z={:.1}",
                status.position.x, status.position.y, status.position.z
            ),
            equipment: format!("[{equipment}]"),
            inventory_used: status.inventory_used,
            inventory: if observation.inventory.is_empty() {
                "Empty".to_string()
            } else {
                serde_json::to_string(&observation.inventory).unwrap_or_default()
            },
        }
    }
}

fn none_if_empty(text: String) -> String {
    if text.is_empty() { "None".to_string() } else { text }
}

/// Everything the synthesis prompt is built from.
pub struct SynthesisInputs<'a> {
    pub trace: &'a Trace,
    pub observation: &'a Observation,
    pub goal: &'a SubGoal,
    /// Code of the previous attempt, empty on the first.
    pub code: &'a str,
    pub critique: &'a str,
    pub chests: &'a str,
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("synthesis_system", SYNTHESIS_SYSTEM_TEMPLATE)
            .expect("synthesis system template should be valid");
        env.add_template("synthesis", SYNTHESIS_TEMPLATE)
            .expect("synthesis template should be valid");
        env.add_template("critique", CRITIQUE_TEMPLATE)
            .expect("critique template should be valid");
        Self { env }
    }

    /// System message listing the programs the generated code may call.
    pub fn synthesis_system(&self, programs: &str) -> Result<String> {
        let template = self.env.get_template("synthesis_system")?;
        Ok(template.render(context! { programs => programs.trim() })?)
    }

    pub fn synthesis_user(&self, input: &SynthesisInputs<'_>) -> Result<String> {
        let template = self.env.get_template("synthesis")?;
        let rendered = template.render(context! {
            code => input.code.trim(),
            errors => input.trace.messages(ON_ERROR),
            chat => input.trace.messages(ON_CHAT),
            status => StatusContext::from_observation(input.observation),
            chests => input.chests,
            task => input.goal.description,
            materials => requirements(input.goal),
            tools => tools(input.goal),
            critique => input.critique.trim(),
        })?;
        Ok(rendered)
    }

    pub fn critique_user(&self, observation: &Observation, task: &str, chests: &str) -> Result<String> {
        let template = self.env.get_template("critique")?;
        let rendered = template.render(context! {
            status => StatusContext::from_observation(observation),
            chests => chests,
            task => task,
        })?;
        Ok(rendered)
    }

    /// User message for the skill describer.
    pub fn describe_user(&self, name: &str, code: &str) -> String {
        format!("{code}\n\nThe main function is `{name}`.")
    }
}
