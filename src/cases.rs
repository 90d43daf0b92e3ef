//! Local case files: JSON arrays of prepared dialogues.
//!
//! ```json
//! [{"id": "case_12", "dialogue": "Patient: ...\n\nDoctor: ...", "length": 312}]
//! ```
//!
//! Files are produced elsewhere; this module only reads and selects.
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// One dialogue from a case file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueCase {
    pub id: String,
    pub dialogue: String,
    /// Word count, used to order cases by complexity.
    pub length: usize,
}

/// How to pick a case from a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseSelector {
    Id(String),
    Index(usize),
    Last,
}

/// Load and validate a case file.
pub fn load_cases(path: &Path) -> Result<Vec<DialogueCase>> {
    let bytes = fs::read(path).with_context(|| format!("read case file {}", path.display()))?;
    let raw: serde_json::Value =
        serde_json::from_slice(&bytes).with_context(|| format!("parse {}", path.display()))?;
    let items = raw
        .as_array()
        .ok_or_else(|| anyhow!("case file {} is not a JSON array", path.display()))?;
    if items.is_empty() {
        return Err(anyhow!("case file {} has no cases", path.display()));
    }
    // Files from older exports lack `length`; treat them as stale.
    if items[0].get("length").is_none() {
        return Err(anyhow!(
            "case file {} is outdated (records lack `length`)",
            path.display()
        ));
    }
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            serde_json::from_value::<DialogueCase>(item.clone())
                .with_context(|| format!("case {idx} in {}", path.display()))
        })
        .collect()
}

/// Pick one case.
pub fn select_case<'a>(cases: &'a [DialogueCase], selector: &CaseSelector) -> Result<&'a DialogueCase> {
    match selector {
        CaseSelector::Id(id) => cases
            .iter()
            .find(|case| &case.id == id)
            .ok_or_else(|| anyhow!("no case with id {id:?}")),
        CaseSelector::Index(index) => cases.get(*index).ok_or_else(|| {
            anyhow!("case index {index} out of range (file has {} cases)", cases.len())
        }),
        CaseSelector::Last => cases.last().ok_or_else(|| anyhow!("case file is empty")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_cases(contents: &str) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        fs::write(file.path(), contents).unwrap();
        file
    }

    const CASES: &str = r#"[
        {"id": "case_3", "dialogue": "Patient: long\n\nDoctor: answer", "length": 40},
        {"id": "case_9", "dialogue": "Patient: short\n\nDoctor: ok", "length": 4}
    ]"#;

    #[test]
    fn loads_and_selects() {
        let file = write_cases(CASES);
        let cases = load_cases(file.path()).unwrap();
        assert_eq!(cases.len(), 2);

        assert_eq!(select_case(&cases, &CaseSelector::Last).unwrap().id, "case_9");
        assert_eq!(select_case(&cases, &CaseSelector::Index(0)).unwrap().id, "case_3");
        assert_eq!(
            select_case(&cases, &CaseSelector::Id("case_9".into()))
                .unwrap()
                .length,
            4
        );
        assert!(select_case(&cases, &CaseSelector::Index(5)).is_err());
        assert!(select_case(&cases, &CaseSelector::Id("nope".into())).is_err());
    }

    #[test]
    fn rejects_outdated_and_empty_files() {
        let stale = write_cases(r#"[{"id": "1", "dialogue": "x"}]"#);
        let err = load_cases(stale.path()).unwrap_err();
        assert!(err.to_string().contains("outdated"));

        let empty = write_cases("[]");
        assert!(load_cases(empty.path()).is_err());

        let object = write_cases(r#"{"id": "1"}"#);
        assert!(load_cases(object.path()).is_err());
    }
}
