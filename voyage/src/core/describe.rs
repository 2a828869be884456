//! Natural-language renderings of sub-goals.

use crate::core::items::{PLACED_ITEMS, pluralize, quantity_phrase};
use crate::plan::{Action, SubGoal};

/// Task text handed to the synthesis and critique collaborators.
///
/// The wording doubles as the goal→skill pair key, so it must be a pure
/// function of the resolved sub-goal.
pub fn describe(goal: &SubGoal) -> String {
    let quantity = quantity_phrase(&goal.item, goal.quantity);
    let verb = goal.action.verb();
    let mut text = match goal.action {
        Action::Craft if PLACED_ITEMS.contains(&goal.item.as_str()) => {
            format!("{verb} {quantity}. Then place it 1 block away from you.")
        }
        Action::Craft | Action::Gather | Action::Smelt => {
            let pronoun = if goal.quantity == 1 { "it" } else { "them" };
            format!("{verb} {quantity} and place {pronoun} in the chest.")
        }
        Action::Kill | Action::Shoot | Action::Build => format!("{verb} {quantity}."),
    };

    let placed: Vec<&str> = goal
        .tools
        .iter()
        .map(String::as_str)
        .filter(|tool| PLACED_ITEMS.contains(tool))
        .collect();
    let borrowed: Vec<&str> = goal
        .tools
        .iter()
        .map(String::as_str)
        .filter(|tool| !PLACED_ITEMS.contains(tool))
        .collect();

    if !placed.is_empty() {
        text.push_str(&format!(" Use the placed {}.", placed.join(" and ")));
    }
    if !borrowed.is_empty() {
        let pronoun = if borrowed.len() == 1 { "it" } else { "them" };
        text.push_str(&format!(
            " Take the {} from the chest and put {pronoun} back when you are done.",
            borrowed.join(" and ")
        ));
    }
    text
}

/// Present-participle status line, e.g. `"Crafting 8 sticks"`.
pub fn progress(goal: &SubGoal) -> String {
    format!(
        "{} {}",
        goal.action.participle(),
        quantity_phrase(&goal.item, goal.quantity)
    )
}

/// Total material requirement, e.g. `"3 wood planks, 2 sticks"`, or `"None"`.
pub fn requirements(goal: &SubGoal) -> String {
    let totals = goal.material_totals();
    if totals.is_empty() {
        return "None".to_string();
    }
    totals
        .iter()
        .map(|(item, quantity)| format!("{quantity} {}", pluralize(item, *quantity)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Comma-separated tool list, or `"None"`.
pub fn tools(goal: &SubGoal) -> String {
    if goal.tools.is_empty() {
        "None".to_string()
    } else {
        goal.tools.join(", ")
    }
}

/// Fill the derived text fields of a resolved sub-goal.
pub fn annotate(goal: &mut SubGoal) {
    goal.description = describe(goal);
    goal.progress = progress(goal);
    goal.requirements = requirements(goal);
}
