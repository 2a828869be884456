//! Success critic: decides whether one execution accomplished its sub-goal.

use std::cell::RefCell;
use std::io::{self, BufRead, Stdin, StdinLock, Stdout, Write};

use anyhow::{Context, Result, bail};
use tracing::{debug, error, instrument, warn};

use crate::core::judgment::{Judgment, parse_judgment, simplify_task};
use crate::core::trace::Trace;
use crate::io::llm::LanguageModel;
use crate::io::prompt::{CRITIQUE_SYSTEM, PromptEngine};

/// Human-in-the-loop verdict source.
pub trait Reviewer {
    fn review(&self, report: &str) -> Result<Judgment>;
}

/// Prompts for a verdict on a line-oriented reader/writer pair.
///
/// An empty answer counts as yes. The verdict is echoed and must be
/// confirmed before it is returned.
pub struct ConsoleReviewer<R, W> {
    input: RefCell<R>,
    output: RefCell<W>,
}

impl ConsoleReviewer<StdinLock<'static>, Stdout> {
    pub fn stdio() -> Self {
        let stdin: Stdin = io::stdin();
        Self::new(stdin.lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> ConsoleReviewer<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input: RefCell::new(input),
            output: RefCell::new(output),
        }
    }

    pub fn into_output(self) -> W {
        self.output.into_inner()
    }

    fn ask(&self, question: &str) -> Result<String> {
        {
            let mut output = self.output.borrow_mut();
            write!(output, "{question}")?;
            output.flush()?;
        }
        let mut line = String::new();
        let read = self
            .input
            .borrow_mut()
            .read_line(&mut line)
            .context("read reviewer answer")?;
        if read == 0 {
            bail!("reviewer input closed");
        }
        Ok(line.trim().to_string())
    }

    fn ask_yes(&self, question: &str) -> Result<bool> {
        let answer = self.ask(question)?.to_lowercase();
        Ok(answer.is_empty() || answer == "y")
    }
}

impl<R: BufRead, W: Write> Reviewer for ConsoleReviewer<R, W> {
    fn review(&self, report: &str) -> Result<Judgment> {
        writeln!(self.output.borrow_mut(), "{report}")?;
        loop {
            let success = self.ask_yes("Success? (y/n) ")?;
            let critique = if success {
                String::new()
            } else {
                self.ask("Enter your critique: ")?
            };
            writeln!(
                self.output.borrow_mut(),
                "Success: {success}\nCritique: {critique}"
            )?;
            if self.ask_yes("Confirm? (y/n) ")? {
                return Ok(Judgment { success, critique });
            }
        }
    }
}

enum Judge {
    Model {
        model: Box<dyn LanguageModel>,
        retries: u32,
    },
    Human(Box<dyn Reviewer>),
}

pub struct Critic {
    judge: Judge,
    prompts: PromptEngine,
}

impl Critic {
    /// Judge with a language model, re-asking up to `retries` times on unparsable output.
    pub fn automatic(model: Box<dyn LanguageModel>, retries: u32) -> Self {
        Self {
            judge: Judge::Model { model, retries },
            prompts: PromptEngine::new(),
        }
    }

    pub fn manual(reviewer: Box<dyn Reviewer>) -> Self {
        Self {
            judge: Judge::Human(reviewer),
            prompts: PromptEngine::new(),
        }
    }

    /// Verdict for the execution that produced `trace`.
    ///
    /// A trace with any `onError` event fails without consulting the judge.
    /// Exhausting the parse retries also yields `(false, "")`.
    #[instrument(skip_all, fields(task = %description))]
    pub fn judge(&self, trace: &Trace, description: &str, chests: &str) -> Result<Judgment> {
        if trace.has_error() {
            debug!("execution raised an error; skipping critique");
            return Ok(Judgment::failed());
        }
        let observation = trace.observation()?;
        let task = simplify_task(description);
        let report = self.prompts.critique_user(&observation, &task, chests)?;
        debug!(report = %report, "critique request");

        match &self.judge {
            Judge::Human(reviewer) => reviewer.review(&report),
            Judge::Model { model, retries } => {
                for attempt in 1..=*retries {
                    let response = model
                        .complete(CRITIQUE_SYSTEM, &report)
                        .context("critique request")?;
                    match parse_judgment(&response) {
                        Ok(judgment) => {
                            debug!(success = judgment.success, critique = %judgment.critique, "critique parsed");
                            return Ok(judgment);
                        }
                        Err(err) => {
                            warn!(attempt, err = %err, response = %response, "unparsable critique; asking again");
                        }
                    }
                }
                error!(retries, "no parsable critique; treating attempt as failed");
                Ok(Judgment::failed())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::rc::Rc;

    use super::*;
    use crate::test_support::{ScriptedModel, observe_trace_value};

    fn trace(events: &[(&str, &str)]) -> Trace {
        Trace::from_value(observe_trace_value(events)).expect("trace")
    }

    #[test]
    fn error_event_fails_without_request() {
        let model = Rc::new(ScriptedModel::default());
        let critic = Critic::automatic(Box::new(Rc::clone(&model)), 5);
        let judgment = critic
            .judge(&trace(&[("onError", "boom")]), "Gather 1 wood log.", "")
            .expect("judge");
        assert_eq!(judgment, Judgment::failed());
        assert_eq!(model.calls(), 0);
    }

    #[test]
    fn unparsable_responses_are_retried() {
        let model = Rc::new(ScriptedModel::new([
            "not json",
            "{\"success\": true, \"critique\": \"\"}",
        ]));
        let critic = Critic::automatic(Box::new(Rc::clone(&model)), 5);
        let judgment = critic
            .judge(&trace(&[]), "Gather 1 wood log and place it in the chest.", "")
            .expect("judge");
        assert!(judgment.success);
        assert_eq!(model.calls(), 2);
        assert!(
            model.requests()[0]
                .1
                .contains("Task: Gather 1 wood log. It's ok if they are in the inventory or in the chest.")
        );
    }

    #[test]
    fn exhausted_parse_retries_fail_quietly() {
        let model = Rc::new(ScriptedModel::new(["?", "??"]));
        let critic = Critic::automatic(Box::new(Rc::clone(&model)), 2);
        let judgment = critic.judge(&trace(&[]), "Kill 1 pig.", "").expect("judge");
        assert_eq!(judgment, Judgment::failed());
        assert_eq!(model.calls(), 2);
    }

    #[test]
    fn non_observe_terminal_event_is_an_error() {
        let critic = Critic::automatic(Box::new(ScriptedModel::default()), 1);
        let value = serde_json::json!([["onChat", {"onChat": "hi"}]]);
        let trace = Trace::from_value(value).expect("trace");
        assert!(critic.judge(&trace, "Kill 1 pig.", "").is_err());
    }

    #[test]
    fn console_reviewer_loops_until_confirmed() {
        let input = Cursor::new("n\nno logs\nn\n\n\ny\n");
        let reviewer = ConsoleReviewer::new(input, Vec::new());
        let judgment = reviewer.review("Task: Gather 1 wood log.").expect("review");
        assert_eq!(judgment, Judgment { success: true, critique: String::new() });

        let transcript = String::from_utf8(reviewer.into_output()).expect("utf8");
        assert!(transcript.contains("Critique: no logs"));
        assert_eq!(transcript.matches("Confirm? (y/n)").count(), 2);
    }

    #[test]
    fn console_reviewer_errors_on_closed_input() {
        let reviewer = ConsoleReviewer::new(Cursor::new(""), Vec::new());
        assert!(reviewer.review("report").is_err());
    }
}
