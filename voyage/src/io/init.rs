//! Workdir scaffolding for `voyage init`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use crate::io::config::{AgentConfig, write_config};
use crate::io::ledger::Ledger;
use crate::io::plan_store::write_plan;
use crate::plan::{Action, Plan, SubGoal};

/// Canonical paths within a workdir.
#[derive(Debug, Clone)]
pub struct WorkPaths {
    pub root: PathBuf,
    pub config_path: PathBuf,
    /// Resolved plan with live statuses, rewritten after every transition.
    pub plan_path: PathBuf,
    /// Hand-editable declared plan written by `init`.
    pub template_path: PathBuf,
    pub ledger_dir: PathBuf,
    pub iterations_dir: PathBuf,
}

impl WorkPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            config_path: root.join("config.toml"),
            plan_path: root.join("plan.json"),
            template_path: root.join("declared_plan.json"),
            ledger_dir: root.clone(),
            iterations_dir: root.join("iterations"),
            root,
        }
    }

    /// Worker logs, relative paths taken from the workdir.
    pub fn log_dir(&self, cfg: &AgentConfig) -> PathBuf {
        let dir = Path::new(&cfg.worker.log_dir);
        if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            self.root.join(dir)
        }
    }

    pub fn primitives_dir(&self, cfg: &AgentConfig) -> Option<PathBuf> {
        cfg.learning.primitives_dir.as_deref().map(|dir| {
            let dir = Path::new(dir);
            if dir.is_absolute() {
                dir.to_path_buf()
            } else {
                self.root.join(dir)
            }
        })
    }
}

#[derive(Debug, Clone)]
pub struct InitOptions {
    /// Overwrite an existing config and plan template.
    pub force: bool,
}

/// Create a workdir with default config, a declared plan template and empty ledger files.
///
/// Fails if `config.toml` already exists unless `options.force` is set. Ledger
/// contents are never discarded; existing skills and pairs are reloaded.
pub fn init_workdir(root: &Path, options: &InitOptions) -> Result<WorkPaths> {
    let paths = WorkPaths::new(root);
    if paths.root.exists() && !paths.root.is_dir() {
        return Err(anyhow!(
            "voyage init: {} exists but is not a directory",
            paths.root.display()
        ));
    }
    if paths.config_path.exists() && !options.force {
        return Err(anyhow!(
            "voyage init: {} already exists (use --force to overwrite)",
            paths.config_path.display()
        ));
    }

    fs::create_dir_all(&paths.iterations_dir)
        .with_context(|| format!("create directory {}", paths.iterations_dir.display()))?;
    write_config(&paths.config_path, &AgentConfig::default())?;
    write_plan(&paths.template_path, &template_plan())?;
    Ledger::open(&paths.ledger_dir, true)?;

    Ok(paths)
}

/// A small declared plan showing the accepted shape.
pub fn template_plan() -> Plan {
    Plan {
        name: "wooden_pickaxe".to_string(),
        goal: "Craft a wooden pickaxe".to_string(),
        sub_goals: vec![
            SubGoal::new(Action::Gather, "wood log", 0),
            SubGoal::new(Action::Craft, "crafting table", 1).with_material("wood plank", 4),
            SubGoal::new(Action::Craft, "wooden pickaxe", 1)
                .with_tool("crafting table")
                .with_material("wood plank", 3)
                .with_material("stick", 2),
        ],
    }
}
