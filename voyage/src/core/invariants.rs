//! Ordering invariants a declared plan must satisfy before resolution.

use crate::plan::{Action, SubGoal};
use std::collections::HashSet;

/// Check plan ordering invariants not expressible in JSON Schema:
/// - Every required tool is produced by an earlier `craft` sub-goal
/// - No item is crafted twice
///
/// All violations are returned together, in plan order.
pub fn validate_tool_order(sub_goals: &[SubGoal]) -> Vec<String> {
    let mut errors = Vec::new();
    let mut crafted = HashSet::new();

    for (index, goal) in sub_goals.iter().enumerate() {
        for tool in &goal.tools {
            if !crafted.contains(tool.as_str()) {
                errors.push(format!(
                    "{index} ({}): tool '{tool}' is not crafted by an earlier sub-goal",
                    goal.label()
                ));
            }
        }

        if goal.action == Action::Craft && !crafted.insert(goal.item.as_str()) {
            errors.push(format!(
                "{index} ({}): '{}' is crafted more than once",
                goal.label(),
                goal.item
            ));
        }
    }

    errors
}
