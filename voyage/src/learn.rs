//! Learning a single sub-goal: synthesize, execute, judge, persist.
//!
//! A [`Session`] owns everything one run talks to: the world bridge, the
//! ledger and the language-model collaborators. The per-sub-goal attempt
//! sequence lives here; plan-level selection and outer retries live in
//! [`crate::looping`].

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use chrono::{DateTime, Local, SecondsFormat, Utc};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::agents::Agents;
use crate::core::error::SynthesisParseError;
use crate::core::extract::{Program, extract_program};
use crate::core::judgment::Judgment;
use crate::core::trace::{Observation, Trace};
use crate::io::bridge::WorldBridge;
use crate::io::config::LearningConfig;
use crate::io::iteration_log::{AttemptMeta, AttemptOutcome, AttemptRecord, write_attempt};
use crate::io::ledger::Ledger;
use crate::io::process::WorkerProcess;
use crate::io::prompt::SynthesisInputs;
use crate::io::transport::{ProtocolError, WorldTransport};
use crate::plan::SubGoal;

/// The failure a learning run ends with.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LearnError {
    #[error("sub-goal `{sub_goal}` not accomplished after {attempts} attempts")]
    Exhausted { sub_goal: String, attempts: u32 },
    #[error("sub-goal `{sub_goal}` failed {attempts} times; last error: {last_error}")]
    Unrecoverable {
        sub_goal: String,
        attempts: u32,
        last_error: String,
    },
    #[error("no sub-goal is ready; `{sub_goal}` is missing tools or materials")]
    Blocked { sub_goal: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LearnSettings {
    pub max_retries: u32,
    pub parse_retries: u32,
    pub outer_attempts: u32,
    pub start_position: Option<[i64; 3]>,
}

impl LearnSettings {
    pub fn from_config(cfg: &LearningConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            parse_retries: cfg.parse_retries,
            outer_attempts: cfg.outer_attempts,
            start_position: cfg.start_position,
        }
    }
}

impl Default for LearnSettings {
    fn default() -> Self {
        Self::from_config(&LearningConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubGoalOutcome {
    /// A new skill was synthesized and judged successful.
    Learned { skill: String, attempts: u32 },
    /// A skill already paired with this sub-goal was executed.
    Replayed { skill: String },
}

impl SubGoalOutcome {
    pub fn skill(&self) -> &str {
        match self {
            SubGoalOutcome::Learned { skill, .. } | SubGoalOutcome::Replayed { skill } => skill,
        }
    }
}

/// Writes one iteration directory per attempt.
#[derive(Debug, Clone)]
pub struct Recorder {
    iterations_dir: PathBuf,
    run_id: String,
    next_iter: u32,
}

const RUN_ID_FORMAT: &str = "%Y%m%d-%H%M%S";

impl Recorder {
    pub fn new(iterations_dir: impl Into<PathBuf>, run_id: impl Into<String>) -> Self {
        Self {
            iterations_dir: iterations_dir.into(),
            run_id: run_id.into(),
            next_iter: 1,
        }
    }

    /// Run id derived from the current local time, like worker log names.
    pub fn fresh_run_id() -> String {
        format!("run-{}", Local::now().format(RUN_ID_FORMAT))
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Iteration logs are diagnostics; a failed write never fails the attempt.
    fn record(&mut self, entry: &AttemptEntry<'_>, clock: &AttemptClock) {
        let meta = AttemptMeta {
            run_id: self.run_id.clone(),
            iter: self.next_iter,
            sub_goal: entry.goal.label(),
            attempt: entry.attempt,
            outcome: entry.outcome,
            skill: entry.skill.map(str::to_string),
            started_at: clock.started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            ended_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            duration_ms: u64::try_from(clock.instant.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        let trace = entry.trace.map(Trace::to_value);
        let record = AttemptRecord {
            meta: &meta,
            candidate: entry.candidate,
            trace: trace.as_ref(),
            judgment: entry.judgment,
        };
        match write_attempt(&self.iterations_dir, &record) {
            Ok(paths) => debug!(dir = %paths.dir.display(), "attempt recorded"),
            Err(err) => warn!(err = %format!("{err:#}"), "failed to write iteration log"),
        }
        self.next_iter += 1;
    }
}

struct AttemptClock {
    started_at: DateTime<Utc>,
    instant: Instant,
}

impl AttemptClock {
    fn start() -> Self {
        Self {
            started_at: Utc::now(),
            instant: Instant::now(),
        }
    }
}

struct AttemptEntry<'a> {
    goal: &'a SubGoal,
    attempt: u32,
    outcome: AttemptOutcome,
    skill: Option<&'a str>,
    candidate: &'a str,
    trace: Option<&'a Trace>,
    judgment: Option<&'a Judgment>,
}

enum Synthesis {
    Program { program: Program, raw: String },
    Unparsed { error: SynthesisParseError, raw: String },
}

/// One learning run against one world.
pub struct Session<T: WorldTransport, P: WorkerProcess> {
    pub(crate) bridge: WorldBridge<T, P>,
    pub(crate) ledger: Ledger,
    agents: Agents,
    pub(crate) settings: LearnSettings,
    recorder: Option<Recorder>,
    observation: Option<Observation>,
}

impl<T: WorldTransport, P: WorkerProcess> Session<T, P> {
    pub fn new(
        bridge: WorldBridge<T, P>,
        ledger: Ledger,
        agents: Agents,
        settings: LearnSettings,
    ) -> Self {
        Self {
            bridge,
            ledger,
            agents,
            settings,
            recorder: None,
            observation: None,
        }
    }

    pub fn with_recorder(mut self, recorder: Recorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn bridge(&self) -> &WorldBridge<T, P> {
        &self.bridge
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Shut the world down; safe to call in any state.
    pub fn close(&mut self) -> Result<(), ProtocolError> {
        self.bridge.close()
    }

    /// The most recent terminal observation, if any step has run.
    pub fn observation(&self) -> Option<&Observation> {
        self.observation.as_ref()
    }

    /// Accomplish one sub-goal, replaying a stored skill when one is paired with it.
    #[instrument(skip_all, fields(sub_goal = %goal.label()))]
    pub fn learn(&mut self, goal: &SubGoal) -> Result<SubGoalOutcome> {
        if let Some((name, record)) = self.ledger.skill_for(&goal.description) {
            let (name, executable) = (name.to_string(), record.executable());
            return self.replay(goal, &name, &executable);
        }

        info!("learning sub-goal");
        let mut trace = self.bridge.step("", "")?;
        self.absorb(&trace)?;

        let mut code = String::new();
        let mut critique = String::new();
        for attempt in 1..=self.settings.max_retries {
            let clock = AttemptClock::start();
            let observation = trace.observation()?;
            let programs = self.ledger.programs();
            let chests = self.ledger.render_chests();
            let synthesis = self.synthesize(
                &programs,
                &SynthesisInputs {
                    trace: &trace,
                    observation: &observation,
                    goal,
                    code: &code,
                    critique: &critique,
                    chests: &chests,
                },
                attempt,
            )?;
            let (program, raw) = match synthesis {
                Synthesis::Program { program, raw } => (program, raw),
                Synthesis::Unparsed { error, raw } => {
                    warn!(attempt, err = %error, "no usable program; attempt failed");
                    self.record(
                        &AttemptEntry {
                            goal,
                            attempt,
                            outcome: AttemptOutcome::Unparsed,
                            skill: None,
                            candidate: &raw,
                            trace: None,
                            judgment: None,
                        },
                        &clock,
                    );
                    critique = error.to_string();
                    continue;
                }
            };

            debug!(attempt, entry = %program.name, "executing program");
            trace = self.bridge.step(&program.executable(), &programs)?;
            self.absorb(&trace)?;
            let chests = self.ledger.render_chests();
            let judgment = self.agents.critic.judge(&trace, &goal.description, &chests)?;

            if judgment.success {
                let description = self.describe(&program);
                let skill = self.ledger.persist_skill(
                    &program.name,
                    &program.code,
                    &program.invocation,
                    &description,
                )?;
                self.ledger.persist_pair(&goal.description, &skill)?;
                self.record(
                    &AttemptEntry {
                        goal,
                        attempt,
                        outcome: AttemptOutcome::Success,
                        skill: Some(&skill),
                        candidate: &raw,
                        trace: Some(&trace),
                        judgment: Some(&judgment),
                    },
                    &clock,
                );
                info!(skill = %skill, attempt, "sub-goal learned");
                return Ok(SubGoalOutcome::Learned {
                    skill,
                    attempts: attempt,
                });
            }

            self.record(
                &AttemptEntry {
                    goal,
                    attempt,
                    outcome: AttemptOutcome::Failure,
                    skill: None,
                    candidate: &raw,
                    trace: Some(&trace),
                    judgment: Some(&judgment),
                },
                &clock,
            );
            warn!(attempt, critique = %judgment.critique, "attempt judged unsuccessful");
            code = program.code;
            critique = judgment.critique;
        }

        error!(attempts = self.settings.max_retries, "sub-goal not learned");
        Err(LearnError::Exhausted {
            sub_goal: goal.label(),
            attempts: self.settings.max_retries,
        }
        .into())
    }

    fn replay(&mut self, goal: &SubGoal, name: &str, executable: &str) -> Result<SubGoalOutcome> {
        info!(skill = %name, "replaying learned skill");
        let clock = AttemptClock::start();
        let trace = self.bridge.step(executable, &self.ledger.programs())?;
        self.absorb(&trace)?;
        self.record(
            &AttemptEntry {
                goal,
                attempt: 1,
                outcome: AttemptOutcome::Replayed,
                skill: Some(name),
                candidate: executable,
                trace: Some(&trace),
                judgment: None,
            },
            &clock,
        );
        Ok(SubGoalOutcome::Replayed {
            skill: name.to_string(),
        })
    }

    /// Request programs until one parses, at most `parse_retries` times.
    fn synthesize(
        &self,
        programs: &str,
        inputs: &SynthesisInputs<'_>,
        attempt: u32,
    ) -> Result<Synthesis> {
        let mut last = None;
        for parse_attempt in 1..=self.settings.parse_retries.max(1) {
            let raw = self.agents.synthesizer.propose(programs, inputs)?;
            match extract_program(&raw) {
                Ok(program) => return Ok(Synthesis::Program { program, raw }),
                Err(error) => {
                    warn!(attempt, parse_attempt, err = %error, response = %raw, "unusable synthesis; asking again");
                    last = Some(Synthesis::Unparsed { error, raw });
                }
            }
        }
        Ok(last.unwrap_or(Synthesis::Unparsed {
            error: SynthesisParseError::NoCode,
            raw: String::new(),
        }))
    }

    fn describe(&self, program: &Program) -> String {
        let Some(describer) = &self.agents.describer else {
            return String::new();
        };
        match describer.describe(&program.name, &program.code) {
            Ok(description) => description,
            Err(err) => {
                warn!(skill = %program.name, err = %format!("{err:#}"), "skill description failed");
                String::new()
            }
        }
    }

    /// Fold a trace's observation into chest memory and remember it.
    pub(crate) fn absorb(&mut self, trace: &Trace) -> Result<()> {
        let observation = trace.observation()?;
        self.ledger.update_chests(&observation.nearby_chests)?;
        self.observation = Some(observation);
        Ok(())
    }

    fn record(&mut self, entry: &AttemptEntry<'_>, clock: &AttemptClock) {
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.record(entry, clock);
        }
    }
}
