//! Critique parsing and task simplification.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::error::JudgmentParseError;

/// Verdict on one execution attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Judgment {
    pub success: bool,
    #[serde(default)]
    pub critique: String,
}

impl Judgment {
    /// `(false, "")`, used when no verdict can be obtained.
    pub fn failed() -> Self {
        Self {
            success: false,
            critique: String::new(),
        }
    }
}

/// Parse `{"success": bool, "critique": str}` out of a free-form response.
///
/// The first `{` through the last `}` is taken as the JSON object so prose
/// around it is tolerated. A missing critique reads as empty.
pub fn parse_judgment(response: &str) -> Result<Judgment, JudgmentParseError> {
    let start = response.find('{').ok_or(JudgmentParseError::NoObject)?;
    let end = response.rfind('}').ok_or(JudgmentParseError::NoObject)?;
    if end < start {
        return Err(JudgmentParseError::NoObject);
    }

    let value: Value = serde_json::from_str(&response[start..=end])
        .map_err(|err| JudgmentParseError::Json(err.to_string()))?;
    let success = value
        .get("success")
        .and_then(Value::as_bool)
        .ok_or(JudgmentParseError::MissingSuccess)?;
    let critique = value
        .get("critique")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Ok(Judgment { success, critique })
}

/// Reduce a sub-goal description to what the critic can verify from one observation.
///
/// Placement instructions are cut and "place them in the chest" is relaxed to
/// accept the items in the inventory too.
pub fn simplify_task(description: &str) -> String {
    let mut task = description.to_string();
    if let Some((head, _)) = task.split_once(" 1 block") {
        task = format!("{head}.");
    }
    if let Some((head, _)) = task.split_once(" Then place") {
        task = head.to_string();
    }
    if let Some((head, _)) = task.split_once(" and place") {
        task = format!("{head}. It's ok if they are in the inventory or in the chest.");
    }
    task
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_object_wrapped_in_prose() {
        let judgment = parse_judgment(
            "Reasoning: the inventory has 3 logs.\n{\"success\": true, \"critique\": \"\"}\nDone.",
        )
        .expect("judgment");
        assert!(judgment.success);
        assert!(judgment.critique.is_empty());
    }

    #[test]
    fn missing_critique_reads_as_empty() {
        let judgment = parse_judgment(r#"{"success": false}"#).expect("judgment");
        assert_eq!(judgment, Judgment::failed());
    }

    #[test]
    fn rejects_unusable_responses() {
        assert_eq!(parse_judgment("yes"), Err(JudgmentParseError::NoObject));
        assert!(matches!(
            parse_judgment("{success: yes}"),
            Err(JudgmentParseError::Json(_))
        ));
        assert_eq!(
            parse_judgment(r#"{"success": "yes"}"#),
            Err(JudgmentParseError::MissingSuccess)
        );
    }

    #[test]
    fn simplify_strips_placement() {
        assert_eq!(
            simplify_task("Craft 1 crafting table. Then place it 1 block away from you."),
            "Craft 1 crafting table."
        );
    }

    #[test]
    fn simplify_relaxes_chest_placement() {
        assert_eq!(
            simplify_task(
                "Gather 3 wood logs and place them in the chest. \
                 Take the wooden axe from the chest and put it back when you are done."
            ),
            "Gather 3 wood logs. It's ok if they are in the inventory or in the chest."
        );
        assert_eq!(simplify_task("Kill 2 zombies."), "Kill 2 zombies.");
    }
}
