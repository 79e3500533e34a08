//! Column resolution.
//!
//! Maps a logical column name onto physical header labels. The result is a
//! tagged [`Resolution`]; ambiguity is never resolved silently for writes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{LiveSheetError, Result};
use crate::structure::ColumnLabel;

/// How far fuzzy matching may go after an exact miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Verbatim label only.
    Exact,
    /// Label ends with the name, or has it after a whitespace boundary.
    #[default]
    Suffix,
    /// Label contains the name anywhere.
    Contains,
}

impl FromStr for MatchMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exact" => Ok(Self::Exact),
            "suffix" | "strict" => Ok(Self::Suffix),
            "contains" | "loose" => Ok(Self::Contains),
            other => Err(format!("unknown match mode '{other}' (expected exact, suffix or contains)")),
        }
    }
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Exact => "exact",
            Self::Suffix => "suffix",
            Self::Contains => "contains",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "columns", rename_all = "snake_case")]
pub enum Resolution {
    Found(ColumnLabel),
    Ambiguous(Vec<ColumnLabel>),
    NotFound,
}

impl Resolution {
    fn from_candidates(mut candidates: Vec<ColumnLabel>) -> Self {
        match candidates.len() {
            0 => Self::NotFound,
            1 => Self::Found(candidates.remove(0)),
            _ => Self::Ambiguous(candidates),
        }
    }

    pub fn found(&self) -> Option<&ColumnLabel> {
        match self {
            Self::Found(column) => Some(column),
            _ => None,
        }
    }
}

/// Resolve `name` against `columns`, most specific rule first.
pub fn resolve(name: &str, columns: &[ColumnLabel], mode: MatchMode) -> Resolution {
    if name.trim().is_empty() {
        return Resolution::NotFound;
    }

    let pick = |rule: &dyn Fn(&str) -> bool| -> Vec<ColumnLabel> {
        columns.iter().filter(|c| rule(&c.label)).cloned().collect()
    };

    let exact = pick(&|label: &str| label == name);
    if !exact.is_empty() || mode == MatchMode::Exact {
        return Resolution::from_candidates(exact);
    }

    let boundary = format!(" {name}");
    let suffix = pick(&|label: &str| label.ends_with(name) || label.contains(&boundary));
    if !suffix.is_empty() || mode == MatchMode::Suffix {
        return Resolution::from_candidates(suffix);
    }

    Resolution::from_candidates(pick(&|label: &str| label.contains(name)))
}

/// Resolution for mutating flows: exactly one column or an error.
pub fn require_unique(name: &str, columns: &[ColumnLabel], mode: MatchMode) -> Result<ColumnLabel> {
    match resolve(name, columns, mode) {
        Resolution::Found(column) => Ok(column),
        Resolution::Ambiguous(candidates) => Err(LiveSheetError::AmbiguousColumn {
            name: name.to_string(),
            candidates: candidates.into_iter().map(|c| c.label).collect(),
        }),
        Resolution::NotFound => Err(LiveSheetError::ColumnNotFound {
            name: name.to_string(),
            available: columns.iter().map(|c| c.label.clone()).collect(),
        }),
    }
}

/// Resolution for read-only reporting: ties go to the shortest label, then
/// the leftmost column. Never use this to pick a write target.
pub fn best_effort(name: &str, columns: &[ColumnLabel], mode: MatchMode) -> Option<ColumnLabel> {
    match resolve(name, columns, mode) {
        Resolution::Found(column) => Some(column),
        Resolution::Ambiguous(candidates) => {
            let chosen = candidates
                .into_iter()
                .min_by_key(|c| (c.label.chars().count(), c.index))?;
            log::debug!("'{name}' is ambiguous, reporting on '{}'", chosen.label);
            Some(chosen)
        }
        Resolution::NotFound => None,
    }
}

/// Resolve every name, keeping the caller's order.
pub fn resolve_all<S: AsRef<str>>(names: &[S], columns: &[ColumnLabel], mode: MatchMode) -> Vec<(String, Resolution)> {
    names
        .iter()
        .map(|name| (name.as_ref().to_string(), resolve(name.as_ref(), columns, mode)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(labels: &[&str]) -> Vec<ColumnLabel> {
        labels.iter().enumerate().map(|(i, l)| ColumnLabel::new(i + 1, *l)).collect()
    }

    #[test]
    fn suffix_matches_flattened_label() {
        let columns = cols(&["Category - Name", "Amount"]);
        assert_eq!(
            resolve("Name", &columns, MatchMode::Suffix),
            Resolution::Found(ColumnLabel::new(1, "Category - Name"))
        );
    }

    #[test]
    fn shared_suffix_is_ambiguous() {
        let columns = cols(&["ID", "Math - Score", "English - Score"]);
        let err = require_unique("Score", &columns, MatchMode::Suffix).unwrap_err();
        match err {
            LiveSheetError::AmbiguousColumn { candidates, .. } => {
                assert_eq!(candidates, vec!["Math - Score", "English - Score"]);
            }
            other => panic!("expected ambiguity, got {other:?}"),
        }
    }

    #[test]
    fn exact_short_circuits() {
        let columns = cols(&["Score", "Math - Score", "English - Score"]);
        assert_eq!(
            resolve("Score", &columns, MatchMode::Contains),
            Resolution::Found(ColumnLabel::new(1, "Score"))
        );
    }

    #[test]
    fn exact_mode_never_goes_fuzzy() {
        let columns = cols(&["Category - Name"]);
        assert_eq!(resolve("Name", &columns, MatchMode::Exact), Resolution::NotFound);
    }

    #[test]
    fn contains_is_the_broadest() {
        let columns = cols(&["Dept - Name", "Sub-Dept", "Total"]);
        assert_eq!(resolve("Dept", &columns, MatchMode::Suffix), Resolution::Found(ColumnLabel::new(2, "Sub-Dept")));
        match resolve("Dep", &columns, MatchMode::Contains) {
            Resolution::Ambiguous(found) => assert_eq!(found.len(), 2),
            other => panic!("expected ambiguity, got {other:?}"),
        }
    }

    #[test]
    fn not_found_lists_available_columns() {
        let columns = cols(&["Name", "Score"]);
        let err = require_unique("Grade", &columns, MatchMode::Contains).unwrap_err();
        assert!(err.to_string().contains("'Name', 'Score'"), "{err}");
        assert_eq!(resolve("  ", &columns, MatchMode::Contains), Resolution::NotFound);
    }

    #[test]
    fn duplicate_exact_labels_are_ambiguous() {
        let columns = cols(&["Name", "Name"]);
        assert!(matches!(resolve("Name", &columns, MatchMode::Exact), Resolution::Ambiguous(_)));
    }

    #[test]
    fn best_effort_prefers_shortest_then_leftmost() {
        let columns = cols(&["Q1 - Total Score", "Math - Score", "Art - Score"]);
        assert_eq!(best_effort("Score", &columns, MatchMode::Suffix).unwrap().label, "Art - Score");
        assert!(best_effort("Grade", &columns, MatchMode::Suffix).is_none());
    }

    #[test]
    fn mode_parses() {
        assert_eq!("Suffix".parse::<MatchMode>().unwrap(), MatchMode::Suffix);
        assert_eq!("loose".parse::<MatchMode>().unwrap(), MatchMode::Contains);
        assert!("fuzzy".parse::<MatchMode>().is_err());
    }
}
