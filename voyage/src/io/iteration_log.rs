//! Per-attempt artifacts under `<workdir>/iterations/<run-id>/<n>/`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;

use crate::core::judgment::Judgment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Failure,
    /// No usable program could be extracted.
    Unparsed,
    /// A stored skill was executed without synthesis.
    Replayed,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptMeta {
    pub run_id: String,
    pub iter: u32,
    pub sub_goal: String,
    pub attempt: u32,
    pub outcome: AttemptOutcome,
    pub skill: Option<String>,
    pub started_at: String,
    pub ended_at: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct IterationPaths {
    pub dir: PathBuf,
    pub meta_path: PathBuf,
    pub candidate_path: PathBuf,
    pub trace_path: PathBuf,
    pub judgment_path: PathBuf,
}

impl IterationPaths {
    pub fn new(iterations_dir: &Path, run_id: &str, iter: u32) -> Self {
        let dir = iterations_dir.join(run_id).join(iter.to_string());
        Self {
            dir: dir.clone(),
            meta_path: dir.join("meta.json"),
            candidate_path: dir.join("candidate.md"),
            trace_path: dir.join("trace.json"),
            judgment_path: dir.join("judgment.json"),
        }
    }
}

pub struct AttemptRecord<'a> {
    pub meta: &'a AttemptMeta,
    /// Raw synthesis response, or the replayed code.
    pub candidate: &'a str,
    pub trace: Option<&'a Value>,
    pub judgment: Option<&'a Judgment>,
}

pub fn write_attempt(iterations_dir: &Path, record: &AttemptRecord<'_>) -> Result<IterationPaths> {
    let paths = IterationPaths::new(iterations_dir, &record.meta.run_id, record.meta.iter);
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create iteration dir {}", paths.dir.display()))?;

    write_json(&paths.meta_path, record.meta)?;
    write_text(&paths.candidate_path, record.candidate)?;
    if let Some(trace) = record.trace {
        write_json(&paths.trace_path, trace)?;
    }
    if let Some(judgment) = record.judgment {
        write_json(&paths.judgment_path, judgment)?;
    }

    Ok(paths)
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    write_text(path, &buf)
}
