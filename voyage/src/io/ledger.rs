//! Persistent memory: chest contents, goal→skill pairs and the skill registry.
//!
//! Layout under the ledger directory:
//!
//! ```text
//! chest_memory.json        position → item map | "Unknown"
//! pairs.json               sub-goal description → skill name
//! skills.json              skill name → {code, invocation, description}
//! skills/code/<name>.js
//! skills/description/<name>.txt
//! ```
//!
//! Every mutation rewrites the affected file wholesale.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::core::items::normalize_item;
use crate::core::trace::ChestState;
use crate::io::atomic::{write_atomic, write_json_atomic};
use crate::plan::Inventory;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillRecord {
    pub code: String,
    /// `await <name>(bot);`
    pub invocation: String,
    #[serde(default)]
    pub description: String,
}

impl SkillRecord {
    /// Code followed by its invocation, as sent to `step`.
    pub fn executable(&self) -> String {
        format!("{}\n{}", self.code, self.invocation)
    }

    /// Name of the entry function the invocation calls.
    pub fn entry(&self) -> Option<&str> {
        let call = self.invocation.trim().strip_prefix("await ")?;
        call.split_once('(').map(|(name, _)| name.trim())
    }
}

/// Version of a stored skill name relative to its entry function:
/// `gatherLog` is 1, `gatherLogV3` is 3.
fn stored_version(stored: &str, entry: &str) -> u32 {
    match stored.strip_prefix(entry) {
        Some("") => 1,
        Some(rest) => rest
            .strip_prefix('V')
            .and_then(|number| number.parse().ok())
            .unwrap_or(1),
        None => 1,
    }
}

#[derive(Debug, Clone)]
pub struct LedgerPaths {
    pub chests: PathBuf,
    pub pairs: PathBuf,
    pub skills: PathBuf,
    pub code_dir: PathBuf,
    pub description_dir: PathBuf,
}

impl LedgerPaths {
    pub fn new(dir: &Path) -> Self {
        Self {
            chests: dir.join("chest_memory.json"),
            pairs: dir.join("pairs.json"),
            skills: dir.join("skills.json"),
            code_dir: dir.join("skills").join("code"),
            description_dir: dir.join("skills").join("description"),
        }
    }
}

#[derive(Debug)]
pub struct Ledger {
    paths: LedgerPaths,
    chests: BTreeMap<String, ChestState>,
    pairs: BTreeMap<String, String>,
    skills: BTreeMap<String, SkillRecord>,
    primitives: Vec<String>,
}

impl Ledger {
    /// Load the ledger under `dir`, creating missing files.
    ///
    /// Chest memory describes the previous world and is discarded unless
    /// `resume` is set; pairs and skills always reload.
    pub fn open(dir: &Path, resume: bool) -> Result<Self> {
        let paths = LedgerPaths::new(dir);
        for sub in [&paths.code_dir, &paths.description_dir] {
            fs::create_dir_all(sub).with_context(|| format!("create {}", sub.display()))?;
        }
        let chests = if resume {
            load_json(&paths.chests)?
        } else {
            BTreeMap::new()
        };
        let ledger = Self {
            chests,
            pairs: load_json(&paths.pairs)?,
            skills: load_json(&paths.skills)?,
            primitives: Vec::new(),
            paths,
        };
        write_json_atomic(&ledger.paths.chests, &ledger.chests)?;
        write_json_atomic(&ledger.paths.pairs, &ledger.pairs)?;
        write_json_atomic(&ledger.paths.skills, &ledger.skills)?;
        info!(
            chests = ledger.chests.len(),
            pairs = ledger.pairs.len(),
            skills = ledger.skills.len(),
            "ledger opened"
        );
        Ok(ledger)
    }

    /// Supporting programs sent with every step in addition to skills.
    pub fn with_primitives(mut self, primitives: Vec<String>) -> Self {
        self.primitives = primitives;
        self
    }

    pub fn paths(&self) -> &LedgerPaths {
        &self.paths
    }

    pub fn chests(&self) -> &BTreeMap<String, ChestState> {
        &self.chests
    }

    pub fn pairs(&self) -> &BTreeMap<String, String> {
        &self.pairs
    }

    pub fn skills(&self) -> &BTreeMap<String, SkillRecord> {
        &self.skills
    }

    pub fn skill(&self, name: &str) -> Option<&SkillRecord> {
        self.skills.get(name)
    }

    /// Merge an observation of nearby chests into memory and persist it.
    pub fn update_chests(&mut self, observed: &BTreeMap<String, ChestState>) -> Result<()> {
        for (position, state) in observed {
            if state.is_invalid() {
                if self.chests.remove(position).is_some() {
                    debug!(position = %position, "chest gone, forgetting");
                }
                continue;
            }
            self.chests.insert(position.clone(), state.clone());
        }
        write_json_atomic(&self.paths.chests, &self.chests)
    }

    /// Prompt rendering of chest memory, terminated by a blank line.
    pub fn render_chests(&self) -> String {
        let mut filled = Vec::new();
        let mut empty = Vec::new();
        let mut unknown = Vec::new();
        for (position, state) in &self.chests {
            match state {
                ChestState::Contents(items) if !items.is_empty() => {
                    let items = serde_json::to_string(items).unwrap_or_default();
                    filled.push(format!("{position}: {items}"));
                }
                ChestState::Contents(_) => empty.push(format!("{position}: Empty")),
                ChestState::Marker(_) => unknown.push(format!("{position}: Unknown items inside")),
            }
        }
        let lines: Vec<String> = filled.into_iter().chain(empty).chain(unknown).collect();
        if lines.is_empty() {
            "Chests: None\n\n".to_string()
        } else {
            format!("Chests:\n{}\n\n", lines.join("\n"))
        }
    }

    /// Summed counts over all remembered chest contents.
    pub fn chest_inventory(&self) -> Inventory {
        let mut inventory = Inventory::new();
        for state in self.chests.values() {
            if let ChestState::Contents(items) = state {
                for (item, count) in items {
                    *inventory.entry(normalize_item(item)).or_default() += count;
                }
            }
        }
        inventory
    }

    /// Register a skill; an existing name gets a `V2`, `V3`, … suffix.
    ///
    /// Returns the name the skill was stored under.
    pub fn persist_skill(
        &mut self,
        name: &str,
        code: &str,
        invocation: &str,
        description: &str,
    ) -> Result<String> {
        let stored = if self.skills.contains_key(name) {
            let mut version = 2;
            while self.skills.contains_key(&format!("{name}V{version}")) {
                version += 1;
            }
            let versioned = format!("{name}V{version}");
            info!(skill = %name, stored = %versioned, "skill exists, storing new version");
            versioned
        } else {
            name.to_string()
        };

        let record = SkillRecord {
            code: code.to_string(),
            invocation: invocation.to_string(),
            description: description.to_string(),
        };
        write_atomic(&self.paths.code_dir.join(format!("{stored}.js")), &record.code)?;
        write_atomic(
            &self.paths.description_dir.join(format!("{stored}.txt")),
            &record.description,
        )?;
        self.skills.insert(stored.clone(), record);
        write_json_atomic(&self.paths.skills, &self.skills)?;
        info!(skill = %stored, "skill persisted");
        Ok(stored)
    }

    pub fn persist_pair(&mut self, goal: &str, skill: &str) -> Result<()> {
        self.pairs.insert(goal.to_string(), skill.to_string());
        write_json_atomic(&self.paths.pairs, &self.pairs)
    }

    /// The skill previously learned for this exact sub-goal wording.
    pub fn skill_for(&self, goal: &str) -> Option<(&str, &SkillRecord)> {
        let name = self.pairs.get(goal)?;
        let record = self.skills.get(name)?;
        Some((name.as_str(), record))
    }

    /// Latest version of each registered skill followed by the primitives.
    ///
    /// Versions of one skill declare the same entry function, so only the
    /// newest is sent.
    pub fn programs(&self) -> String {
        let mut latest: BTreeMap<&str, (u32, &str)> = BTreeMap::new();
        for (stored, skill) in &self.skills {
            let entry = skill.entry().unwrap_or(stored.as_str());
            let version = stored_version(stored, entry);
            let slot = latest.entry(entry).or_insert((version, skill.code.as_str()));
            if version > slot.0 {
                *slot = (version, skill.code.as_str());
            }
        }
        latest
            .into_values()
            .map(|(_, code)| code)
            .chain(self.primitives.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Read every `*.js` file in `dir`, sorted by file name.
pub fn load_primitives(dir: &Path) -> Result<Vec<String>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("read primitives dir {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "js"))
        .collect();
    paths.sort();
    paths
        .iter()
        .map(|path| fs::read_to_string(path).with_context(|| format!("read {}", path.display())))
        .collect()
}

fn load_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(items: &[(&str, u32)]) -> ChestState {
        ChestState::Contents(
            items
                .iter()
                .map(|(name, count)| (name.to_string(), *count))
                .collect(),
        )
    }

    fn marker(text: &str) -> ChestState {
        ChestState::Marker(text.to_string())
    }

    #[test]
    fn chest_updates_follow_observation_rules() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut ledger = Ledger::open(temp.path(), false).expect("open");

        ledger
            .update_chests(&BTreeMap::from([
                ("(1, 64, 1)".to_string(), contents(&[("stick", 4)])),
                ("(2, 64, 1)".to_string(), marker("Unknown")),
                ("(3, 64, 1)".to_string(), marker("Invalid")),
            ]))
            .expect("update");
        assert_eq!(ledger.chests().len(), 2);

        ledger
            .update_chests(&BTreeMap::from([
                ("(1, 64, 1)".to_string(), marker("Invalid")),
                ("(2, 64, 1)".to_string(), contents(&[("coal", 2)])),
            ]))
            .expect("update");
        assert_eq!(
            ledger.chests(),
            &BTreeMap::from([("(2, 64, 1)".to_string(), contents(&[("coal", 2)]))])
        );

        let on_disk: BTreeMap<String, ChestState> =
            load_json(&ledger.paths().chests).expect("reload");
        assert_eq!(&on_disk, ledger.chests());
    }

    #[test]
    fn render_orders_filled_empty_unknown() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut ledger = Ledger::open(temp.path(), false).expect("open");
        assert_eq!(ledger.render_chests(), "Chests: None\n\n");

        ledger
            .update_chests(&BTreeMap::from([
                ("(0, 0, 0)".to_string(), marker("Unknown")),
                ("(1, 0, 0)".to_string(), contents(&[])),
                ("(2, 0, 0)".to_string(), contents(&[("oak_log", 3)])),
            ]))
            .expect("update");
        assert_eq!(
            ledger.render_chests(),
            "Chests:\n(2, 0, 0): {\"oak_log\":3}\n(1, 0, 0): Empty\n(0, 0, 0): Unknown items inside\n\n"
        );
        assert_eq!(ledger.chest_inventory().get("wood log"), Some(&3));
    }

    #[test]
    fn chest_memory_survives_only_on_resume() {
        let temp = tempfile::tempdir().expect("tempdir");
        {
            let mut ledger = Ledger::open(temp.path(), false).expect("open");
            ledger
                .update_chests(&BTreeMap::from([("(1, 2, 3)".to_string(), contents(&[("coal", 1)]))]))
                .expect("update");
            ledger.persist_pair("Gather 1 coal.", "mineCoal").expect("pair");
        }
        let resumed = Ledger::open(temp.path(), true).expect("resume");
        assert_eq!(resumed.chests().len(), 1);
        let fresh = Ledger::open(temp.path(), false).expect("fresh");
        assert!(fresh.chests().is_empty());
        assert_eq!(fresh.pairs().get("Gather 1 coal."), Some(&"mineCoal".to_string()));
    }

    #[test]
    fn skill_round_trips_through_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let code = "async function mineWoodLog(bot) {}";
        {
            let mut ledger = Ledger::open(temp.path(), false).expect("open");
            let stored = ledger
                .persist_skill("mineWoodLog", code, "await mineWoodLog(bot);", "// chop")
                .expect("persist");
            assert_eq!(stored, "mineWoodLog");
            ledger
                .persist_pair("Gather 1 wood log and place it in the chest.", &stored)
                .expect("pair");
        }

        let ledger = Ledger::open(temp.path(), false).expect("reopen");
        let (name, record) = ledger
            .skill_for("Gather 1 wood log and place it in the chest.")
            .expect("pair");
        assert_eq!(name, "mineWoodLog");
        assert_eq!(record.code, code);
        assert_eq!(record.invocation, "await mineWoodLog(bot);");
        assert_eq!(record.executable(), format!("{code}\nawait mineWoodLog(bot);"));
        assert_eq!(
            fs::read_to_string(ledger.paths().code_dir.join("mineWoodLog.js")).expect("code file"),
            code
        );
    }

    #[test]
    fn duplicate_names_are_versioned() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut ledger = Ledger::open(temp.path(), false).expect("open");
        let first = ledger.persist_skill("craftStick", "a", "await craftStick(bot);", "").expect("1");
        let second = ledger.persist_skill("craftStick", "b", "await craftStick(bot);", "").expect("2");
        let third = ledger.persist_skill("craftStick", "c", "await craftStick(bot);", "").expect("3");
        assert_eq!((first.as_str(), second.as_str(), third.as_str()), ("craftStick", "craftStickV2", "craftStickV3"));
        assert_eq!(ledger.skill("craftStick").map(|s| s.code.as_str()), Some("a"));
    }

    #[test]
    fn programs_send_only_the_latest_version() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut ledger = Ledger::open(temp.path(), false).expect("open");
        for round in 1..=11 {
            ledger
                .persist_skill(
                    "gatherLog",
                    &format!("async function gatherLog(bot) {{ /* {round} */ }}"),
                    "await gatherLog(bot);",
                    "",
                )
                .expect("skill");
        }
        ledger
            .persist_skill("craftStick", "async function craftStick(bot) {}", "await craftStick(bot);", "")
            .expect("skill");

        assert_eq!(ledger.skills().len(), 12);
        assert_eq!(
            ledger.programs(),
            "async function craftStick(bot) {}\n\nasync function gatherLog(bot) { /* 11 */ }"
        );
    }

    #[test]
    fn programs_join_primitives_and_skills() {
        let temp = tempfile::tempdir().expect("tempdir");
        let prim_dir = temp.path().join("primitives");
        fs::create_dir_all(&prim_dir).expect("mkdir");
        fs::write(prim_dir.join("b.js"), "function b() {}").expect("write");
        fs::write(prim_dir.join("a.js"), "function a() {}").expect("write");
        fs::write(prim_dir.join("notes.txt"), "ignored").expect("write");

        let primitives = load_primitives(&prim_dir).expect("load");
        let mut ledger = Ledger::open(&temp.path().join("ledger"), false)
            .expect("open")
            .with_primitives(primitives);
        ledger.persist_skill("s", "async function s(bot) {}", "await s(bot);", "").expect("skill");
        assert_eq!(
            ledger.programs(),
            "async function s(bot) {}\n\nfunction a() {}\n\nfunction b() {}"
        );
    }
}
