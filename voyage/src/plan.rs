//! Plan data model: an ordered list of declarative sub-goals.
//!
//! A plan is produced by [`crate::core::resolver::build_plan`] and is the only
//! unit of work the control loop consumes. It serializes to `plan.json` in the
//! working directory so an interrupted run can resume.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Item name → count. Keys are always normalized item names.
pub type Inventory = BTreeMap<String, u32>;

/// What a sub-goal asks the agent to do with its item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Craft,
    Gather,
    Kill,
    Shoot,
    Smelt,
    Build,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Craft => "craft",
            Action::Gather => "gather",
            Action::Kill => "kill",
            Action::Shoot => "shoot",
            Action::Smelt => "smelt",
            Action::Build => "build",
        }
    }

    /// True when the quantity is solved from downstream demand instead of declared.
    pub fn is_solved(self) -> bool {
        matches!(self, Action::Gather | Action::Smelt)
    }

    pub fn verb(self) -> &'static str {
        match self {
            Action::Craft => "Craft",
            Action::Gather => "Gather",
            Action::Kill => "Kill",
            Action::Shoot => "Shoot",
            Action::Smelt => "Smelt",
            Action::Build => "Build",
        }
    }

    pub fn participle(self) -> &'static str {
        match self {
            Action::Craft => "Crafting",
            Action::Gather => "Gathering",
            Action::Kill => "Killing",
            Action::Shoot => "Shooting",
            Action::Smelt => "Smelting",
            Action::Build => "Building",
        }
    }
}

/// Execution status of a sub-goal.
///
/// `Blocked`/`Ready` are derived from an inventory snapshot; `InProgress` and
/// `Done` are owned by the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Blocked,
    Ready,
    InProgress,
    Done,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Blocked => "blocked",
            Status::Ready => "ready",
            Status::InProgress => "in progress",
            Status::Done => "done",
        }
    }
}

/// One declarative unit of plan work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubGoal {
    pub action: Action,
    pub item: String,
    /// Ignored on input for `gather`/`smelt`; always set after resolution.
    #[serde(default)]
    pub quantity: u32,
    /// Tools that must already exist; ordered, no duplicates.
    #[serde(default)]
    pub tools: Vec<String>,
    /// Per-unit material requirements (totals when `synthetic`).
    #[serde(default)]
    pub materials: BTreeMap<String, u32>,
    /// Inserted by wood folding; regenerated on every resolution.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub synthetic: bool,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub progress: String,
    /// Rendered total material requirement, e.g. `"3 wood plank, 2 stick"`.
    #[serde(default)]
    pub requirements: String,
}

impl SubGoal {
    pub fn new(action: Action, item: impl Into<String>, quantity: u32) -> Self {
        Self {
            action,
            item: item.into(),
            quantity,
            tools: Vec::new(),
            materials: BTreeMap::new(),
            synthetic: false,
            status: Status::Blocked,
            description: String::new(),
            progress: String::new(),
            requirements: String::new(),
        }
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tools.push(tool.into());
        self
    }

    pub fn with_material(mut self, item: impl Into<String>, per_unit: u32) -> Self {
        *self.materials.entry(item.into()).or_default() += per_unit;
        self
    }

    /// Total quantity of each material this sub-goal consumes.
    pub fn material_totals(&self) -> BTreeMap<String, u32> {
        if self.synthetic {
            return self.materials.clone();
        }
        self.materials
            .iter()
            .map(|(item, per_unit)| (item.clone(), per_unit * self.quantity))
            .collect()
    }

    /// Short `action quantity item` label used in logs and errors.
    pub fn label(&self) -> String {
        format!("{} {} {}", self.action.as_str(), self.quantity, self.item)
    }
}

/// An ordered, quantity-resolved, dependency-validated sequence of sub-goals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Working-directory identity (e.g. `stone_pickaxe`).
    pub name: String,
    /// The high-level goal in words.
    #[serde(default)]
    pub goal: String,
    pub sub_goals: Vec<SubGoal>,
}

impl Plan {
    pub fn is_complete(&self) -> bool {
        self.sub_goals.iter().all(|goal| goal.status == Status::Done)
    }

    pub fn done_count(&self) -> usize {
        self.sub_goals
            .iter()
            .filter(|goal| goal.status == Status::Done)
            .count()
    }
}
