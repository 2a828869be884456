//! Typed failures raised by the pure core.

use thiserror::Error;

/// A declared plan cannot be turned into an executable sequence.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstructionError {
    #[error("sub-goal {index} is malformed: {reason}")]
    Malformed { index: usize, reason: String },
    #[error("tool order violated:\n- {}", .0.join("\n- "))]
    ToolOrder(Vec<String>),
    #[error("material not gathered/crafted: `{action} {item}` has no downstream consumer")]
    Unconsumed { action: String, item: String },
    #[error("shortfall: {item} crafted {produced} but {consumed} consumed downstream")]
    Shortfall {
        item: String,
        produced: u32,
        consumed: u32,
    },
    #[error("quantity overflow: demand for {item} does not fit in u32")]
    Overflow { item: String },
    #[error("materials not used: {}", render_leftover(.0))]
    Leftover(Vec<(String, u32)>),
}

fn render_leftover(leftover: &[(String, u32)]) -> String {
    leftover
        .iter()
        .map(|(item, quantity)| format!("{quantity} {item}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// A synthesized response did not contain a usable entry function.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthesisParseError {
    #[error("no ```javascript code block found in the response")]
    NoCode,
    #[error("no function declaration found in the code")]
    NoFunction,
    #[error("no async function found; the entry function must be async")]
    NoAsyncEntry,
    #[error("entry function `{name}` takes {count} parameters; it must take exactly one (bot)")]
    EntryArity { name: String, count: usize },
}

/// A critique response could not be read as a judgment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JudgmentParseError {
    #[error("no JSON object in critique response")]
    NoObject,
    #[error("critique response is not valid JSON: {0}")]
    Json(String),
    #[error("critique response lacks a boolean `success` field")]
    MissingSuccess,
}

/// A trace cannot supply its terminal observation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraceError {
    #[error("trace is not an array of [event, payload] pairs: {0}")]
    Malformed(String),
    #[error("trace is empty")]
    Empty,
    #[error("last trace event must be `observe`, got `{0}`")]
    NotTerminated(String),
    #[error("observe payload is malformed: {0}")]
    Observation(String),
}
