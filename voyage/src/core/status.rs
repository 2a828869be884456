//! Readiness derivation and next-sub-goal selection.
//!
//! Pure and deterministic: a sub-goal is READY iff every required tool and
//! material name has a positive count in the inventory snapshot. A tool that
//! is placed in the world (crafting table, furnace) also counts when it is
//! among the nearby blocks. Quantities are not compared; the control loop
//! relies on the executed program to fail loudly when a count is short.

use std::collections::BTreeSet;

use crate::plan::{Inventory, Plan, Status, SubGoal};

/// Status of an open sub-goal against an inventory snapshot.
pub fn readiness(goal: &SubGoal, inventory: &Inventory) -> Status {
    readiness_near(goal, inventory, &BTreeSet::new())
}

/// Like [`readiness`], with `placed` blocks near the agent satisfying tools.
pub fn readiness_near(
    goal: &SubGoal,
    inventory: &Inventory,
    placed: &BTreeSet<String>,
) -> Status {
    let present = |name: &String| inventory.get(name).is_some_and(|count| *count > 0);
    let tools_ok = goal
        .tools
        .iter()
        .all(|tool| present(tool) || placed.contains(tool));
    let materials_ok = goal.materials.keys().all(present);
    if tools_ok && materials_ok {
        Status::Ready
    } else {
        Status::Blocked
    }
}

/// Recompute BLOCKED/READY for every sub-goal that is not DONE.
///
/// IN_PROGRESS sub-goals (left behind by an interrupted run) are re-derived so
/// they can be picked up again.
pub fn refresh(plan: &mut Plan, inventory: &Inventory, placed: &BTreeSet<String>) {
    for goal in &mut plan.sub_goals {
        if goal.status != Status::Done {
            goal.status = readiness_near(goal, inventory, placed);
        }
    }
}

/// Outcome of choosing the next sub-goal to work on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Index of the first READY sub-goal in plan order.
    Ready(usize),
    /// Every sub-goal is DONE.
    Complete,
    /// Open sub-goals remain but none is READY; carries the first open index.
    Blocked(usize),
}

/// Select the first not-DONE sub-goal that is READY, in plan order.
///
/// Call after [`refresh`] so statuses reflect the current inventory.
pub fn select_next(plan: &Plan) -> Selection {
    let mut first_open = None;
    for (index, goal) in plan.sub_goals.iter().enumerate() {
        match goal.status {
            Status::Done => {}
            Status::Ready | Status::InProgress => return Selection::Ready(index),
            Status::Blocked => {
                first_open.get_or_insert(index);
            }
        }
    }
    match first_open {
        Some(index) => Selection::Blocked(index),
        None => Selection::Complete,
    }
}

/// Union of two inventories with counts summed.
pub fn merge_inventories(observed: &Inventory, remembered: &Inventory) -> Inventory {
    let mut merged = observed.clone();
    for (item, count) in remembered {
        *merged.entry(item.clone()).or_default() += count;
    }
    merged
}
