//! Loop-level lifecycle tests: a whole plan learned against scripted
//! collaborators, then replayed from the ledger in a second session.

use std::rc::Rc;
use std::time::Duration;

use voyage::agents::Agents;
use voyage::agents::critic::Critic;
use voyage::agents::synthesizer::Synthesizer;
use voyage::core::resolver::build_plan;
use voyage::io::bridge::{BridgeSettings, WorldBridge};
use voyage::io::init::{InitOptions, WorkPaths, init_workdir, template_plan};
use voyage::io::ledger::Ledger;
use voyage::io::plan_store::load_plan;
use voyage::io::transport::Endpoint;
use voyage::learn::{LearnSettings, Recorder, Session, SubGoalOutcome};
use voyage::plan::{Inventory, Plan};
use voyage::test_support::{FakeWorker, ScriptedModel, ScriptedTransport, TraceBuilder};

const SUCCESS: &str = "{\"reasoning\": \"looks right\", \"success\": true, \"critique\": \"\"}";

type TestSession = Session<ScriptedTransport, FakeWorker>;

fn stage(items: &[(&str, u32)], blocks: &[&str]) -> String {
    let builder = items
        .iter()
        .fold(TraceBuilder::empty(), |builder, (name, count)| builder.item(name, *count));
    blocks
        .iter()
        .fold(builder, |builder, block| builder.block(block))
        .body()
}

/// World after each of the five resolved sub-goals of the template plan. The
/// crafting table is placed once crafted, so it only shows up as a nearby block.
fn stages() -> Vec<String> {
    vec![
        stage(&[("oak_log", 3)], &[]),
        stage(&[("oak_planks", 12)], &[]),
        stage(&[("oak_planks", 10), ("stick", 4)], &[]),
        stage(&[("oak_planks", 6), ("stick", 4)], &["crafting_table"]),
        stage(&[("oak_planks", 3), ("stick", 2), ("wooden_pickaxe", 1)], &["crafting_table"]),
    ]
}

fn session(paths: &WorkPaths, synthesis: &Rc<ScriptedModel>, critique: &Rc<ScriptedModel>) -> TestSession {
    let bridge = WorldBridge::new(
        ScriptedTransport::auto_pause(),
        FakeWorker::new(),
        BridgeSettings {
            world_port: 25565,
            request_timeout: Duration::from_secs(1),
            wait_ticks: 20,
            settle: Duration::ZERO,
            start_attempts: 1,
        },
    );
    let agents = Agents {
        synthesizer: Synthesizer::new(Box::new(Rc::clone(synthesis))),
        critic: Critic::automatic(Box::new(Rc::clone(critique)), 5),
        describer: None,
    };
    let ledger = Ledger::open(&paths.ledger_dir, false).expect("ledger");
    Session::new(bridge, ledger, agents, LearnSettings::default())
        .with_recorder(Recorder::new(&paths.iterations_dir, "run-1"))
}

fn resolved_template() -> Plan {
    let declared = template_plan();
    build_plan(&declared.name, &declared.goal, &declared.sub_goals, &Inventory::new())
        .expect("resolve")
}

fn program(name: &str) -> String {
    format!(
        "Explain: start simple.\n```javascript\nasync function {name}(bot) {{\n  bot.chat(\"{name}\");\n}}\n```"
    )
}

/// Full lifecycle: every sub-goal of the template is learned once, with one
/// rejected attempt on the crafting table; a second session then replays all
/// of them from the ledger without synthesis or critique.
#[test]
fn template_plan_is_learned_then_replayed() {
    let temp = tempfile::tempdir().expect("tempdir");
    let paths = init_workdir(temp.path(), &InitOptions { force: false }).expect("init");

    let synthesis = Rc::new(ScriptedModel::default());
    let critique = Rc::new(ScriptedModel::default());
    let mut first = session(&paths, &synthesis, &critique);
    let transport = first.bridge().transport();
    transport.push_ok(stage(&[], &[]));
    let mut previous = stage(&[], &[]);
    for (index, after) in stages().into_iter().enumerate() {
        transport.push_ok(previous.clone());
        if index == 3 {
            transport.push_ok(previous.clone());
        }
        transport.push_ok(after.clone());
        previous = after;
    }
    for name in ["gatherLogs", "craftPlanks", "craftSticks"] {
        synthesis.push(program(name));
        critique.push(SUCCESS);
    }
    synthesis.push(program("craftTable"));
    critique.push("{\"success\": false, \"critique\": \"place the table first\"}");
    synthesis.push(program("craftTable"));
    critique.push(SUCCESS);
    synthesis.push(program("craftPickaxe"));
    critique.push(SUCCESS);

    let mut plan = resolved_template();
    first.bootstrap().expect("bootstrap");
    let mut done = Vec::new();
    let outcome = first
        .run_plan(&mut plan, Some(&paths.plan_path), |report| {
            done.push((report.label.clone(), report.outcome.clone()));
        })
        .expect("run");
    first.close().expect("close");

    assert_eq!(outcome.learned, 5);
    assert_eq!(done[3].0, "craft 1 crafting table");
    assert_eq!(
        done[3].1,
        SubGoalOutcome::Learned {
            skill: "craftTable".to_string(),
            attempts: 2
        }
    );
    assert!(load_plan(&paths.plan_path).expect("saved plan").is_complete());
    assert_eq!(first.ledger().skills().len(), 5);
    assert_eq!(first.ledger().pairs().len(), 5);
    assert!(paths.root.join("skills/code/craftPickaxe.js").is_file());
    assert!(paths.iterations_dir.join("run-1/6/meta.json").is_file());
    assert_eq!(synthesis.calls(), 6);

    let synthesis_calls = synthesis.calls();
    let critique_calls = critique.calls();
    let mut second = session(&paths, &synthesis, &critique);
    let transport = second.bridge().transport();
    transport.push_ok(stage(&[], &[]));
    for after in stages() {
        transport.push_ok(after);
    }
    second.bootstrap().expect("bootstrap");
    let mut plan = resolved_template();
    let outcome = second.run_plan(&mut plan, None, |_| {}).expect("replay");

    assert_eq!(outcome.replayed, 5);
    assert_eq!(outcome.learned, 0);
    assert_eq!(synthesis.calls(), synthesis_calls);
    assert_eq!(critique.calls(), critique_calls);
    let steps = second.bridge().transport().calls(Endpoint::Step);
    assert_eq!(steps.len(), 5);
    assert!(
        steps[0]["code"]
            .as_str()
            .is_some_and(|code| code.ends_with("await gatherLogs(bot);"))
    );
    assert!(
        steps[0]["programs"]
            .as_str()
            .is_some_and(|programs| programs.contains("async function craftPickaxe(bot)"))
    );
}

/// A run interrupted after some sub-goals resumes from the saved plan and
/// skips what is already DONE.
#[test]
fn saved_plan_resumes_after_done_sub_goals() {
    let temp = tempfile::tempdir().expect("tempdir");
    let paths = init_workdir(temp.path(), &InitOptions { force: false }).expect("init");
    let synthesis = Rc::new(ScriptedModel::default());
    let critique = Rc::new(ScriptedModel::default());

    let mut plan = resolved_template();
    for goal in plan.sub_goals.iter_mut().take(4) {
        goal.status = voyage::plan::Status::Done;
    }
    let stages = stages();
    let mut session = session(&paths, &synthesis, &critique);
    let transport = session.bridge().transport();
    transport.push_ok(stages[3].clone());
    transport.push_ok(stages[3].clone());
    transport.push_ok(stages[4].clone());
    synthesis.push(program("craftPickaxe"));
    critique.push(SUCCESS);

    session.bootstrap().expect("bootstrap");
    let outcome = session
        .run_plan(&mut plan, Some(&paths.plan_path), |_| {})
        .expect("run");
    assert_eq!(outcome.skipped, 4);
    assert_eq!(outcome.learned, 1);
    assert_eq!(synthesis.calls(), 1);
}
