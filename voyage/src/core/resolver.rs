//! Turn declared sub-goals into an executable, quantity-resolved plan.
//!
//! Resolution runs as two passes over the declared list:
//!
//! 1. A read-only backward walk that aggregates demand, folds wood
//!    intermediates when it reaches `gather wood log` and solves every
//!    `gather`/`smelt` quantity from the demand downstream of it.
//! 2. A forward pass that emits the final ordered sequence, inserting the
//!    synthetic wood crafts right after the log gather.
//!
//! Declared `craft wood plank` / `craft stick` sub-goals are dropped before
//! the walk and regenerated, so resolving a resolved plan is a no-op.

use std::collections::BTreeMap;

use crate::core::describe::annotate;
use crate::core::error::ConstructionError;
use crate::core::invariants::validate_tool_order;
use crate::core::items::{LOG, PLANK, STICK, ceil_to, normalize_item};
use crate::core::status::readiness;
use crate::plan::{Action, Inventory, Plan, SubGoal};

/// Sticks per craft batch.
const STICK_BATCH: u32 = 4;
/// Planks per craft batch (one log).
const PLANK_BATCH: u32 = 4;
/// Planks consumed per stick.
const STICKS_PER_PLANK: u32 = 2;

/// Quantities of the synthetic wood crafts produced by folding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct WoodFold {
    planks: u32,
    sticks: u32,
}

impl WoodFold {
    fn logs(self) -> u32 {
        self.planks / PLANK_BATCH
    }

    fn crafts(self) -> Vec<SubGoal> {
        let mut crafts = Vec::new();
        if self.planks > 0 {
            let mut planks = SubGoal::new(Action::Craft, PLANK, self.planks)
                .with_material(LOG, self.logs());
            planks.synthetic = true;
            crafts.push(planks);
        }
        if self.sticks > 0 {
            let mut sticks = SubGoal::new(Action::Craft, STICK, self.sticks)
                .with_material(PLANK, self.sticks / STICKS_PER_PLANK);
            sticks.synthetic = true;
            crafts.push(sticks);
        }
        crafts
    }
}

fn overflow(item: &str) -> ConstructionError {
    ConstructionError::Overflow {
        item: item.to_string(),
    }
}

/// Add `needed` to the demand for `item`, rejecting counts past `u32::MAX`.
fn demand_more(
    demand: &mut BTreeMap<String, u32>,
    item: &str,
    needed: u32,
) -> Result<(), ConstructionError> {
    let entry = demand.entry(item.to_string()).or_default();
    *entry = entry.checked_add(needed).ok_or_else(|| overflow(item))?;
    Ok(())
}

/// Fold stick and plank demand into log demand.
fn fold_wood(demand: &mut BTreeMap<String, u32>) -> Result<WoodFold, ConstructionError> {
    let sticks = ceil_to(demand.remove(STICK).unwrap_or(0), STICK_BATCH)
        .ok_or_else(|| overflow(STICK))?;
    let planks = demand
        .remove(PLANK)
        .unwrap_or(0)
        .checked_add(sticks / STICKS_PER_PLANK)
        .and_then(|planks| ceil_to(planks, PLANK_BATCH))
        .ok_or_else(|| overflow(PLANK))?;
    let fold = WoodFold { planks, sticks };
    if fold.logs() > 0 {
        demand_more(demand, LOG, fold.logs())?;
    }
    Ok(fold)
}

fn add_demand(
    demand: &mut BTreeMap<String, u32>,
    goal: &SubGoal,
    quantity: u32,
) -> Result<(), ConstructionError> {
    for (item, per_unit) in &goal.materials {
        let needed = per_unit.checked_mul(quantity).ok_or_else(|| overflow(item))?;
        if needed > 0 {
            demand_more(demand, item, needed)?;
        }
    }
    Ok(())
}

/// Normalize names, dedupe tools, validate shape, and drop declared wood crafts.
fn prepare(declared: &[SubGoal]) -> Result<Vec<SubGoal>, ConstructionError> {
    let mut prepared = Vec::with_capacity(declared.len());
    for (index, raw) in declared.iter().enumerate() {
        let item = normalize_item(&raw.item);
        if item.is_empty() {
            return Err(ConstructionError::Malformed {
                index,
                reason: "item name is empty".to_string(),
            });
        }
        if raw.action == Action::Craft && (item == PLANK || item == STICK) {
            continue;
        }

        let mut goal = SubGoal::new(raw.action, item, raw.quantity);
        for tool in &raw.tools {
            let tool = normalize_item(tool);
            if !goal.tools.contains(&tool) {
                goal.tools.push(tool);
            }
        }
        for (material, per_unit) in &raw.materials {
            let material = normalize_item(material);
            if material == goal.item {
                return Err(ConstructionError::Malformed {
                    index,
                    reason: format!("'{material}' requires itself as a material"),
                });
            }
            if *per_unit > 0 {
                goal = goal.with_material(material, *per_unit);
            }
        }
        if raw.action.is_solved() {
            goal.quantity = 0;
        }
        prepared.push(goal);
    }
    Ok(prepared)
}

/// Resolve declared sub-goals into the final ordered, quantity-resolved sequence.
///
/// Statuses and text fields are left for [`build_plan`] to fill.
pub fn resolve(declared: &[SubGoal]) -> Result<Vec<SubGoal>, ConstructionError> {
    let goals = prepare(declared)?;

    let violations = validate_tool_order(&goals);
    if !violations.is_empty() {
        return Err(ConstructionError::ToolOrder(violations));
    }

    let log_index = goals
        .iter()
        .position(|goal| goal.action == Action::Gather && goal.item == LOG);

    let mut demand: BTreeMap<String, u32> = BTreeMap::new();
    let mut quantities = vec![0u32; goals.len()];
    let mut fold = None;

    for (index, goal) in goals.iter().enumerate().rev() {
        if Some(index) == log_index {
            fold = Some(fold_wood(&mut demand)?);
        }
        match goal.action {
            Action::Gather | Action::Smelt => {
                let quantity =
                    demand
                        .remove(&goal.item)
                        .ok_or_else(|| ConstructionError::Unconsumed {
                            action: goal.action.as_str().to_string(),
                            item: goal.item.clone(),
                        })?;
                quantities[index] = quantity;
                if goal.action == Action::Smelt {
                    add_demand(&mut demand, goal, quantity)?;
                }
            }
            Action::Craft => {
                let consumed = demand.remove(&goal.item).unwrap_or(0);
                if consumed > goal.quantity {
                    return Err(ConstructionError::Shortfall {
                        item: goal.item.clone(),
                        produced: goal.quantity,
                        consumed,
                    });
                }
                quantities[index] = goal.quantity;
                add_demand(&mut demand, goal, goal.quantity)?;
            }
            Action::Kill | Action::Shoot | Action::Build => {
                quantities[index] = goal.quantity;
                add_demand(&mut demand, goal, goal.quantity)?;
            }
        }
    }

    let mut leading = Vec::new();
    if log_index.is_none() {
        let wood = fold_wood(&mut demand)?;
        if let Some(logs) = demand.remove(LOG) {
            leading.push(SubGoal::new(Action::Gather, LOG, logs));
        }
        leading.extend(wood.crafts());
    }

    if !demand.is_empty() {
        return Err(ConstructionError::Leftover(demand.into_iter().collect()));
    }

    let mut resolved = leading;
    for (index, mut goal) in goals.into_iter().enumerate() {
        goal.quantity = quantities[index];
        resolved.push(goal);
        if Some(index) == log_index {
            resolved.extend(fold.unwrap_or_default().crafts());
        }
    }
    Ok(resolved)
}

/// Resolve a declared plan and annotate it against an inventory snapshot.
pub fn build_plan(
    name: &str,
    goal: &str,
    declared: &[SubGoal],
    inventory: &Inventory,
) -> Result<Plan, ConstructionError> {
    let mut sub_goals = resolve(declared)?;
    for sub_goal in &mut sub_goals {
        annotate(sub_goal);
        sub_goal.status = readiness(sub_goal, inventory);
    }
    Ok(Plan {
        name: name.to_string(),
        goal: goal.to_string(),
        sub_goals,
    })
}
