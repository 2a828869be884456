//! Plan-level control loop for `voyage learn`.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{error, info, instrument, warn};

use crate::core::status::{Selection, merge_inventories, refresh, select_next};
use crate::io::bridge::{ResetMode, ResetOptions};
use crate::io::plan_store::write_plan;
use crate::io::process::WorkerProcess;
use crate::io::transport::{ProtocolError, WorldTransport};
use crate::learn::{LearnError, Session, SubGoalOutcome};
use crate::plan::{Inventory, Plan, Status, SubGoal};

/// One sub-goal reaching DONE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubGoalReport {
    pub index: usize,
    pub label: String,
    pub outcome: SubGoalOutcome,
}

/// Summary of a completed plan run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopOutcome {
    pub learned: u32,
    pub replayed: u32,
    /// Sub-goals that were already DONE when the run started.
    pub skipped: u32,
}

impl<T: WorldTransport, P: WorkerProcess> Session<T, P> {
    /// Hard-reset the world and move the agent to the configured start.
    #[instrument(skip_all)]
    pub fn bootstrap(&mut self) -> Result<()> {
        let trace = self.bridge.reset(&ResetOptions {
            mode: ResetMode::Hard,
            ..ResetOptions::default()
        })?;
        self.absorb(&trace)?;

        if let Some([x, y, z]) = self.settings.start_position {
            for command in [format!("/tp {x} {y} {z}"), "/time set day".to_string()] {
                let code = format!("bot.chat({});", serde_json::to_string(&command)?);
                let trace = self.bridge.step(&code, "")?;
                self.absorb(&trace)?;
            }
            info!(x, y, z, "agent moved to start position");
        }
        Ok(())
    }

    /// Work through `plan` until every sub-goal is DONE.
    ///
    /// Statuses are recomputed against observed inventory plus chest memory,
    /// and placed crafting tables or furnaces nearby, before each selection. When `plan_path` is given the plan is rewritten
    /// after every status transition so a restarted run resumes from it.
    #[instrument(skip_all, fields(plan = %plan.name))]
    pub fn run_plan<F: FnMut(&SubGoalReport)>(
        &mut self,
        plan: &mut Plan,
        plan_path: Option<&Path>,
        mut on_done: F,
    ) -> Result<LoopOutcome> {
        let mut outcome = LoopOutcome {
            skipped: u32::try_from(plan.done_count()).unwrap_or(u32::MAX),
            ..LoopOutcome::default()
        };

        loop {
            let (inventory, placed) = self.available();
            refresh(plan, &inventory, &placed);
            let index = match select_next(plan) {
                Selection::Complete => {
                    save(plan, plan_path)?;
                    info!(learned = outcome.learned, replayed = outcome.replayed, "plan complete");
                    return Ok(outcome);
                }
                Selection::Blocked(index) => {
                    save(plan, plan_path)?;
                    let sub_goal = plan.sub_goals[index].label();
                    error!(sub_goal = %sub_goal, "no sub-goal is ready");
                    return Err(LearnError::Blocked { sub_goal }.into());
                }
                Selection::Ready(index) => index,
            };

            plan.sub_goals[index].status = Status::InProgress;
            save(plan, plan_path)?;
            let goal = plan.sub_goals[index].clone();
            let result = self.learn_with_retries(&goal)?;

            plan.sub_goals[index].status = Status::Done;
            save(plan, plan_path)?;
            match result {
                SubGoalOutcome::Learned { .. } => outcome.learned += 1,
                SubGoalOutcome::Replayed { .. } => outcome.replayed += 1,
            }
            on_done(&SubGoalReport {
                index,
                label: goal.label(),
                outcome: result,
            });
        }
    }

    /// Restart the whole attempt sequence on unexpected errors.
    fn learn_with_retries(&mut self, goal: &SubGoal) -> Result<SubGoalOutcome> {
        let attempts = self.settings.outer_attempts.max(1);
        let mut last_error = None;
        for outer in 1..=attempts {
            match self.learn(goal) {
                Ok(result) => return Ok(result),
                Err(err) if err.downcast_ref::<LearnError>().is_some() => return Err(err),
                Err(err) => {
                    warn!(outer, sub_goal = %goal.label(), err = %format!("{err:#}"), "sub-goal failed unexpectedly");
                    if outer < attempts && err.downcast_ref::<ProtocolError>().is_some() {
                        self.recover();
                    }
                    last_error = Some(err);
                }
            }
        }
        let last_error = last_error.map_or_else(String::new, |err| format!("{err:#}"));
        error!(sub_goal = %goal.label(), attempts, "giving up on sub-goal");
        Err(LearnError::Unrecoverable {
            sub_goal: goal.label(),
            attempts,
            last_error,
        }
        .into())
    }

    /// Soft reset to get a fresh worker after a protocol failure.
    fn recover(&mut self) {
        let reset = self.bridge.reset(&ResetOptions {
            mode: ResetMode::Soft,
            ..ResetOptions::default()
        });
        match reset {
            Ok(trace) => {
                if let Err(err) = self.absorb(&trace) {
                    warn!(err = %format!("{err:#}"), "recovery trace unusable");
                }
            }
            Err(err) => warn!(err = %err, "soft reset after failure failed"),
        }
    }

    /// Held plus chest inventory, and the placeable tools standing nearby.
    fn available(&self) -> (Inventory, BTreeSet<String>) {
        let (observed, placed) = self
            .observation()
            .map(|observation| (observation.normalized_inventory(), observation.placed_items()))
            .unwrap_or_default();
        (merge_inventories(&observed, &self.ledger.chest_inventory()), placed)
    }
}

fn save(plan: &Plan, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => write_plan(path, plan).with_context(|| format!("save plan {}", path.display())),
        None => Ok(()),
    }
}
