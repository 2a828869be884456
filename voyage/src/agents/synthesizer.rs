//! Program synthesis collaborator.

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::io::llm::LanguageModel;
use crate::io::prompt::{PromptEngine, SynthesisInputs};

pub struct Synthesizer {
    model: Box<dyn LanguageModel>,
    prompts: PromptEngine,
}

impl Synthesizer {
    pub fn new(model: Box<dyn LanguageModel>) -> Self {
        Self {
            model,
            prompts: PromptEngine::new(),
        }
    }

    /// Ask for a program that accomplishes `inputs.goal`; returns the raw response.
    #[instrument(skip_all, fields(sub_goal = %inputs.goal.label()))]
    pub fn propose(&self, programs: &str, inputs: &SynthesisInputs<'_>) -> Result<String> {
        let system = self.prompts.synthesis_system(programs)?;
        let user = self.prompts.synthesis_user(inputs)?;
        debug!(prompt = %user, "synthesis request");
        let response = self
            .model
            .complete(&system, &user)
            .context("synthesis request")?;
        debug!(response = %response, "synthesis response");
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::core::trace::Trace;
    use crate::plan::{Action, SubGoal};
    use crate::test_support::{ScriptedModel, observe_trace_value};

    #[test]
    fn propose_sends_system_and_user_prompts() {
        let model = Rc::new(ScriptedModel::new(["```js\nasync function a(bot) {}\n```"]));
        let synthesizer = Synthesizer::new(Box::new(Rc::clone(&model)));
        let trace = Trace::from_value(observe_trace_value(&[])).expect("trace");
        let observation = trace.observation().expect("observation");
        let mut goal = SubGoal::new(Action::Gather, "wood log", 2);
        goal.description = "Gather 2 wood logs and place them in the chest.".to_string();

        let response = synthesizer
            .propose(
                "async function mineBlock(bot, name, count) {}",
                &SynthesisInputs {
                    trace: &trace,
                    observation: &observation,
                    goal: &goal,
                    code: "",
                    critique: "",
                    chests: "Chests: None\n\n",
                },
            )
            .expect("propose");

        assert!(response.contains("async function a"));
        let requests = model.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].0.contains("mineBlock"));
        assert!(requests[0].1.contains("Task: Gather 2 wood logs"));
    }

    #[test]
    fn model_failure_is_propagated() {
        let synthesizer = Synthesizer::new(Box::new(ScriptedModel::default()));
        let trace = Trace::from_value(observe_trace_value(&[])).expect("trace");
        let observation = trace.observation().expect("observation");
        let goal = SubGoal::new(Action::Gather, "wood log", 1);
        let err = synthesizer
            .propose(
                "",
                &SynthesisInputs {
                    trace: &trace,
                    observation: &observation,
                    goal: &goal,
                    code: "",
                    critique: "",
                    chests: "",
                },
            )
            .expect_err("no response scripted");
        assert!(format!("{err:#}").contains("synthesis request"));
    }
}
