//! Plan load/save helpers with schema validation.
//!
//! The same schema covers both a hand-written declared plan and the resolved
//! `plan.json` the control loop keeps for resume.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow};
use jsonschema::{Validator, validator_for};
use serde_json::Value;

use crate::io::atomic::write_json_atomic;
use crate::plan::Plan;

pub const PLAN_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/plan.schema.json"
));

static VALIDATOR: LazyLock<Result<Validator, String>> = LazyLock::new(|| {
    let schema: Value = serde_json::from_str(PLAN_SCHEMA).map_err(|err| err.to_string())?;
    validator_for(&schema).map_err(|err| err.to_string())
});

/// Load and schema-validate a plan file.
pub fn load_plan(path: &Path) -> Result<Plan> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read plan {}", path.display()))?;
    let value: Value = serde_json::from_str(&contents)
        .with_context(|| format!("parse plan {}", path.display()))?;
    validate_schema(&value).with_context(|| format!("validate plan {}", path.display()))?;
    serde_json::from_value(value).with_context(|| format!("deserialize plan {}", path.display()))
}

/// Atomically write a plan so an interrupted run can resume from it.
pub fn write_plan(path: &Path, plan: &Plan) -> Result<()> {
    write_json_atomic(path, plan)
}

fn validate_schema(plan: &Value) -> Result<()> {
    let validator = VALIDATOR
        .as_ref()
        .map_err(|err| anyhow!("invalid plan schema: {err}"))?;
    if !validator.is_valid(plan) {
        let messages = validator
            .iter_errors(plan)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "plan schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}
