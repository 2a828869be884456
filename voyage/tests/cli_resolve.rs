//! CLI tests for `voyage init` and `voyage resolve`.
//!
//! Spawns the binary and checks exit codes and the printed plan.

use std::fs;
use std::process::Command;

use voyage::exit_codes;
use voyage::io::init::{InitOptions, init_workdir};

#[test]
fn init_then_resolve_template() {
    let temp = tempfile::tempdir().expect("tempdir");
    let status = Command::new(env!("CARGO_BIN_EXE_voyage"))
        .args(["--workdir"])
        .arg(temp.path())
        .arg("init")
        .status()
        .expect("voyage init");
    assert_eq!(status.code(), Some(exit_codes::OK));

    let output = Command::new(env!("CARGO_BIN_EXE_voyage"))
        .arg("resolve")
        .arg(temp.path().join("declared_plan.json"))
        .output()
        .expect("voyage resolve");
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let labels: Vec<&str> = stdout
        .lines()
        .filter(|line| !line.starts_with("    "))
        .collect();
    assert_eq!(
        labels,
        vec![
            " 1. [ready] gather 3 wood log",
            " 2. [blocked] craft 12 wood plank",
            " 3. [blocked] craft 4 stick",
            " 4. [blocked] craft 1 crafting table",
            " 5. [blocked] craft 1 wooden pickaxe",
        ]
    );
    assert!(stdout.contains("    Gather 3 wood logs and place them in the chest."));
}

#[test]
fn resolve_uses_inventory_for_statuses() {
    let temp = tempfile::tempdir().expect("tempdir");
    let paths = init_workdir(temp.path(), &InitOptions { force: false }).expect("init");
    let inventory = temp.path().join("inventory.json");
    fs::write(&inventory, r#"{"oak_log": 3, "birch_planks": 4}"#).expect("write inventory");

    let output = Command::new(env!("CARGO_BIN_EXE_voyage"))
        .arg("resolve")
        .arg(&paths.template_path)
        .arg("--inventory")
        .arg(&inventory)
        .output()
        .expect("voyage resolve");
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(" 2. [ready] craft 12 wood plank"));
    assert!(stdout.contains(" 3. [ready] craft 4 stick"));
    assert!(stdout.contains(" 4. [ready] craft 1 crafting table"));
}

#[test]
fn construction_error_exits_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let plan = temp.path().join("bad.json");
    fs::write(
        &plan,
        r#"{"name": "bad", "sub_goals": [
            {"action": "gather", "item": "cobblestone", "tools": ["wooden pickaxe"]},
            {"action": "craft", "item": "wooden pickaxe", "quantity": 1, "materials": {"stick": 2}},
            {"action": "craft", "item": "furnace", "quantity": 1, "materials": {"cobblestone": 8}}
        ]}"#,
    )
    .expect("write plan");

    let output = Command::new(env!("CARGO_BIN_EXE_voyage"))
        .arg("resolve")
        .arg(&plan)
        .output()
        .expect("voyage resolve");
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("resolve plan `bad`"), "{stderr}");
}

#[test]
fn init_twice_without_force_exits_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    init_workdir(temp.path(), &InitOptions { force: false }).expect("init");
    let status = Command::new(env!("CARGO_BIN_EXE_voyage"))
        .arg("init")
        .current_dir(temp.path())
        .status()
        .expect("voyage init");
    assert_eq!(status.code(), Some(exit_codes::INVALID));
}
