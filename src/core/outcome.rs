//! Operation outcomes carrying their diffs.
//!
//! Editing operations never raise; they hand back an [`Outcome`] whose
//! success variant may carry per-file unified diffs. A [`BatchOutcome`]
//! aggregates several of them.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::core::diff::combine_diffs;

/// Anything that can show its pending changes as diff text
/// without performing them.
pub trait PreviewSource
{
    fn preview(&self) -> String;
}

/// Result of one editing operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome
{
    Success
    {
        message: String,
        #[serde(default)]
        files_changed: Vec<String>,
        /// Combined diff; derived from `diffs` when those are given
        #[serde(default, skip_serializing_if = "Option::is_none")]
        diff: Option<String>,
        #[serde(default)]
        diffs: BTreeMap<String, String>,
    },
    Failure
    {
        operation: String, message: String
    },
}

impl Outcome
{
    pub fn success(message: impl Into<String>) -> Self
    {
        Outcome::Success {
            message: message.into(),
            files_changed: Vec::new(),
            diff: None,
            diffs: BTreeMap::new(),
        }
    }

    pub fn failure(
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self
    {
        Outcome::Failure { operation: operation.into(), message: message.into() }
    }

    /// Record a per-file diff; the combined diff follows along.
    /// No effect on a failure.
    pub fn with_file_diff(
        mut self,
        path: impl Into<String>,
        file_diff: impl Into<String>,
    ) -> Self
    {
        if let Outcome::Success { files_changed, diff, diffs, .. } = &mut self
        {
            let path = path.into();
            if !files_changed.contains(&path)
            {
                files_changed.push(path.clone());
            }
            diffs.insert(path, file_diff.into());
            let combined = combine_diffs(diffs.iter());
            *diff = (!combined.is_empty()).then_some(combined);
        }
        self
    }

    /// Attach an already-combined diff.
    pub fn with_diff(
        mut self,
        text: impl Into<String>,
    ) -> Self
    {
        if let Outcome::Success { diff, .. } = &mut self
        {
            *diff = Some(text.into());
        }
        self
    }

    pub fn is_success(&self) -> bool
    {
        matches!(self, Outcome::Success { .. })
    }

    pub fn message(&self) -> &str
    {
        match self
        {
            Outcome::Success { message, .. } | Outcome::Failure { message, .. } => message,
        }
    }

    pub fn files_changed(&self) -> &[String]
    {
        match self
        {
            Outcome::Success { files_changed, .. } => files_changed,
            Outcome::Failure { .. } => &[],
        }
    }

    /// Combined diff, if any.
    pub fn diff(&self) -> Option<&str>
    {
        match self
        {
            Outcome::Success { diff, .. } => diff.as_deref(),
            Outcome::Failure { .. } => None,
        }
    }

    /// Diff of one file, if recorded.
    pub fn diff_for(
        &self,
        path: &str,
    ) -> Option<&str>
    {
        match self
        {
            Outcome::Success { diffs, .. } => diffs
                .get(path)
                .map(String::as_str),
            Outcome::Failure { .. } => None,
        }
    }

    pub fn diffs(&self) -> Option<&BTreeMap<String, String>>
    {
        match self
        {
            Outcome::Success { diffs, .. } => Some(diffs),
            Outcome::Failure { .. } => None,
        }
    }
}

/// Outcomes of several operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome
{
    pub outcomes: Vec<Outcome>,
}

impl BatchOutcome
{
    pub fn new(outcomes: Vec<Outcome>) -> Self
    {
        Self { outcomes }
    }

    pub fn push(
        &mut self,
        outcome: Outcome,
    )
    {
        self.outcomes
            .push(outcome);
    }

    pub fn len(&self) -> usize
    {
        self.outcomes
            .len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.outcomes
            .is_empty()
    }

    /// Every member succeeded.
    pub fn is_success(&self) -> bool
    {
        self.outcomes
            .iter()
            .all(Outcome::is_success)
    }

    pub fn partial_success(&self) -> bool
    {
        self.outcomes
            .iter()
            .any(Outcome::is_success)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &Outcome>
    {
        self.outcomes
            .iter()
            .filter(|o| o.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &Outcome>
    {
        self.outcomes
            .iter()
            .filter(|o| !o.is_success())
    }

    /// Distinct changed files, sorted.
    pub fn files_changed(&self) -> Vec<&str>
    {
        self.outcomes
            .iter()
            .flat_map(|o| o.files_changed())
            .map(String::as_str)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Per-file diffs of the succeeded members; later members win.
    pub fn diffs(&self) -> BTreeMap<String, String>
    {
        let mut merged = BTreeMap::new();
        for diffs in self
            .succeeded()
            .filter_map(Outcome::diffs)
        {
            merged.extend(
                diffs
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone())),
            );
        }
        merged
    }

    /// Combined diff of the succeeded members, or `None` if empty.
    ///
    /// Members that only carry a combined diff (no per-file map) are
    /// appended as-is after the per-file entries.
    pub fn diff(&self) -> Option<String>
    {
        let per_file = combine_diffs(self.diffs());
        let loose: Vec<&str> = self
            .succeeded()
            .filter(|o| {
                o.diffs()
                    .is_some_and(BTreeMap::is_empty)
            })
            .filter_map(Outcome::diff)
            .filter(|d| !d.is_empty())
            .collect();

        let mut parts: Vec<String> = Vec::new();
        if !per_file.is_empty()
        {
            parts.push(per_file);
        }
        parts.extend(
            loose
                .into_iter()
                .map(|d| if d.ends_with('\n') { d.to_string() } else { format!("{d}\n") }),
        );
        (!parts.is_empty()).then(|| parts.join("\n"))
    }
}

impl FromIterator<Outcome> for BatchOutcome
{
    fn from_iter<T: IntoIterator<Item = Outcome>>(iter: T) -> Self
    {
        Self {
            outcomes: iter
                .into_iter()
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn file_diffs_build_combined_diff()
    {
        let outcome = Outcome::success("renamed")
            .with_file_diff("b.py", "--- b\n")
            .with_file_diff("a.py", "--- a\n");
        assert_eq!(outcome.diff(), Some("--- a\n\n--- b\n"));
        assert_eq!(outcome.files_changed(), ["b.py", "a.py"]);
        assert_eq!(outcome.diff_for("a.py"), Some("--- a\n"));
    }

    #[test]
    fn failure_carries_no_diff()
    {
        let outcome = Outcome::failure("rename", "class not found").with_file_diff("a.py", "--- a\n");
        assert!(!outcome.is_success());
        assert_eq!(outcome.diff(), None);
        assert_eq!(outcome.message(), "class not found");
    }

    #[test]
    fn batch_merges_succeeded_diffs_only()
    {
        let batch: BatchOutcome = [
            Outcome::success("one").with_file_diff("z.py", "--- z\n"),
            Outcome::failure("two", "boom"),
            Outcome::success("three").with_file_diff("a.py", "--- a\n"),
        ]
        .into_iter()
        .collect();

        assert!(!batch.is_success());
        assert!(batch.partial_success());
        assert_eq!(
            batch
                .failed()
                .count(),
            1
        );
        assert_eq!(batch.diff().as_deref(), Some("--- a\n\n--- z\n"));
        assert_eq!(batch.files_changed(), vec!["a.py", "z.py"]);
    }

    #[test]
    fn empty_batch_has_no_diff()
    {
        assert_eq!(BatchOutcome::default().diff(), None);
    }

    #[test]
    fn serializes_with_status_tag()
    {
        let json = serde_json::to_value(Outcome::failure("op", "msg")).unwrap();
        assert_eq!(json["status"], "failure");
    }
}
