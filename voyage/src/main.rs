//! `voyage` command line: scaffold a workdir, resolve plans, run the learning loop.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use voyage::agents::Agents;
use voyage::core::items::normalize_item;
use voyage::core::resolver::build_plan;
use voyage::exit_codes;
use voyage::io::bridge::{BridgeSettings, WorldBridge};
use voyage::io::config::{AgentConfig, load_config};
use voyage::io::init::{InitOptions, WorkPaths, init_workdir};
use voyage::io::ledger::{Ledger, load_primitives};
use voyage::io::plan_store::load_plan;
use voyage::io::process::{Supervisor, SupervisorConfig};
use voyage::io::transport::HttpTransport;
use voyage::learn::{LearnError, LearnSettings, Recorder, Session};
use voyage::logging;
use voyage::plan::{Inventory, Plan, SubGoal};

#[derive(Parser)]
#[command(
    name = "voyage",
    version,
    about = "Learn reusable skills for a Minecraft-like world from a declared plan"
)]
struct Cli {
    /// Working directory holding config, plan state, ledger and logs.
    #[arg(short, long, global = true, default_value = ".")]
    workdir: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create config.toml, a declared plan template and empty ledger files.
    Init {
        /// Overwrite an existing config and template.
        #[arg(short, long)]
        force: bool,
    },
    /// Validate and resolve a declared plan, printing the ordered sub-goals.
    Resolve {
        plan: PathBuf,
        /// JSON object of item name to count used to compute statuses.
        #[arg(long)]
        inventory: Option<PathBuf>,
        /// Print the resolved plan as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Run the learning loop over a declared plan.
    Learn {
        plan: PathBuf,
        /// Ignore saved plan state and chest memory from a previous run.
        #[arg(long)]
        fresh: bool,
    },
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(()) => exit_codes::OK,
        Err(err) => {
            eprintln!("{err:#}");
            exit_code(&err)
        }
    };
    std::process::exit(code);
}

fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<LearnError>() {
        Some(LearnError::Exhausted { .. }) => exit_codes::EXHAUSTED,
        Some(LearnError::Unrecoverable { .. }) => exit_codes::UNRECOVERABLE,
        Some(LearnError::Blocked { .. }) => exit_codes::BLOCKED,
        None => exit_codes::INVALID,
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Init { force } => cmd_init(&cli.workdir, force),
        Command::Resolve {
            plan,
            inventory,
            json,
        } => cmd_resolve(&plan, inventory.as_deref(), json),
        Command::Learn { plan, fresh } => cmd_learn(&cli.workdir, &plan, fresh),
    }
}

fn cmd_init(workdir: &Path, force: bool) -> Result<()> {
    let paths = init_workdir(workdir, &InitOptions { force })?;
    println!("initialized {}", paths.root.display());
    println!("edit {} and run `voyage learn`", paths.template_path.display());
    Ok(())
}

fn cmd_resolve(plan_path: &Path, inventory: Option<&Path>, json: bool) -> Result<()> {
    let declared = load_plan(plan_path)?;
    let inventory = match inventory {
        Some(path) => load_inventory(path)?,
        None => Inventory::new(),
    };
    let plan = resolve_declared(&declared, &inventory)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }
    for (index, goal) in plan.sub_goals.iter().enumerate() {
        println!("{:>2}. [{}] {}", index + 1, goal.status.as_str(), goal.label());
        println!("    {}", goal.description);
    }
    Ok(())
}

fn cmd_learn(workdir: &Path, plan_path: &Path, fresh: bool) -> Result<()> {
    let paths = WorkPaths::new(workdir);
    let cfg = load_config(&paths.config_path)?;
    let declared = load_plan(plan_path)?;

    let resolved = resolve_declared(&declared, &Inventory::new())?;
    let saved = if !fresh && paths.plan_path.exists() {
        Some(load_plan(&paths.plan_path)?)
    } else {
        None
    };
    let (mut plan, resume) = choose_plan(saved, resolved);

    let mut session = open_session(&paths, &cfg, resume)?;
    let result = session.bootstrap().and_then(|()| {
        session.run_plan(&mut plan, Some(&paths.plan_path), |report| {
            println!("done: {} ({})", report.label, report.outcome.skill());
        })
    });
    if let Err(err) = session.close() {
        warn!(err = %err, "failed to close world session");
    }

    let outcome = result?;
    println!(
        "plan `{}` complete: {} learned, {} replayed, {} already done",
        plan.name, outcome.learned, outcome.replayed, outcome.skipped
    );
    Ok(())
}

fn open_session(
    paths: &WorkPaths,
    cfg: &AgentConfig,
    resume: bool,
) -> Result<Session<HttpTransport, Supervisor>> {
    let log_dir = paths.log_dir(cfg);
    let worker = Supervisor::new(SupervisorConfig::for_worker(&cfg.worker, &log_dir))?;
    let mut bridge = WorldBridge::new(
        HttpTransport::new(cfg.world.base_url()),
        worker,
        BridgeSettings::from_config(&cfg.world),
    );
    if let Some(instance) = &cfg.world.instance {
        let instance =
            Supervisor::new(SupervisorConfig::for_instance(instance, &cfg.worker, &log_dir))?;
        bridge = bridge.with_instance(instance);
    }

    let primitives = match paths.primitives_dir(cfg) {
        Some(dir) => load_primitives(&dir)?,
        None => Vec::new(),
    };
    let ledger = Ledger::open(&paths.ledger_dir, resume)?.with_primitives(primitives);
    let agents = Agents::from_config(
        &cfg.models,
        cfg.learning.judgment_retries,
        cfg.learning.describe_skills,
    );
    let recorder = Recorder::new(&paths.iterations_dir, Recorder::fresh_run_id());
    info!(run_id = %recorder.run_id(), "session opened");

    Ok(Session::new(bridge, ledger, agents, LearnSettings::from_config(&cfg.learning))
        .with_recorder(recorder))
}

/// Resume a saved plan only when it has the same name and resolves to the
/// same sub-goals as the declared one; otherwise start from `resolved`.
fn choose_plan(saved: Option<Plan>, resolved: Plan) -> (Plan, bool) {
    let Some(saved) = saved else {
        return (resolved, false);
    };
    if saved.name != resolved.name {
        return (resolved, false);
    }
    let labels = |plan: &Plan| plan.sub_goals.iter().map(SubGoal::label).collect::<Vec<_>>();
    if labels(&saved) != labels(&resolved) {
        warn!(plan = %resolved.name, "declared sub-goals changed since the saved run; starting over");
        return (resolved, false);
    }
    info!(done = saved.done_count(), total = saved.sub_goals.len(), "resuming saved plan");
    (saved, true)
}

fn resolve_declared(declared: &Plan, inventory: &Inventory) -> Result<Plan> {
    build_plan(&declared.name, &declared.goal, &declared.sub_goals, inventory)
        .with_context(|| format!("resolve plan `{}`", declared.name))
}

fn load_inventory(path: &Path) -> Result<Inventory> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read inventory {}", path.display()))?;
    let raw: Inventory = serde_json::from_str(&contents)
        .with_context(|| format!("parse inventory {}", path.display()))?;
    let mut inventory = Inventory::new();
    for (item, count) in raw {
        *inventory.entry(normalize_item(&item)).or_default() += count;
    }
    Ok(inventory)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init() {
        let cli = Cli::parse_from(["voyage", "init"]);
        assert!(matches!(cli.command, Command::Init { force: false }));
        assert_eq!(cli.workdir, PathBuf::from("."));
    }

    #[test]
    fn parse_learn_with_workdir() {
        let cli = Cli::parse_from(["voyage", "learn", "plan.json", "--workdir", "/tmp/w", "--fresh"]);
        assert!(matches!(cli.command, Command::Learn { fresh: true, .. }));
        assert_eq!(cli.workdir, PathBuf::from("/tmp/w"));
    }

    fn resolved(name: &str, logs: u32) -> Plan {
        let declared = [
            SubGoal::new(voyage::plan::Action::Craft, "crafting table", 1)
                .with_material("wood plank", logs * 4),
        ];
        build_plan(name, "", &declared, &Inventory::new()).expect("plan")
    }

    #[test]
    fn saved_plan_resumes_only_when_sub_goals_match() {
        let mut saved = resolved("table", 1);
        saved.sub_goals[0].status = voyage::plan::Status::Done;

        let (plan, resume) = choose_plan(Some(saved.clone()), resolved("table", 1));
        assert!(resume);
        assert_eq!(plan.done_count(), 1);

        let (plan, resume) = choose_plan(Some(saved.clone()), resolved("table", 2));
        assert!(!resume);
        assert_eq!(plan.done_count(), 0);

        let (_, resume) = choose_plan(Some(saved), resolved("chest", 1));
        assert!(!resume);
        let (_, resume) = choose_plan(None, resolved("table", 1));
        assert!(!resume);
    }

    #[test]
    fn learn_errors_map_to_exit_codes() {
        let blocked = anyhow::Error::new(LearnError::Blocked {
            sub_goal: "craft 1 stick".to_string(),
        });
        assert_eq!(exit_code(&blocked), exit_codes::BLOCKED);
        let wrapped = anyhow::Error::new(LearnError::Exhausted {
            sub_goal: "gather 1 wood log".to_string(),
            attempts: 4,
        })
        .context("learn");
        assert_eq!(exit_code(&wrapped), exit_codes::EXHAUSTED);
        assert_eq!(exit_code(&anyhow::anyhow!("bad config")), exit_codes::INVALID);
    }
}
