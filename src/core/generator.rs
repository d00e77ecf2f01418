//! Glue from editing operations to [`Patch`] values.
//!
//! Everything funnels through the diff generator and the parser, so a
//! patch built here is exactly what re-reading its text would give.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::Result;
use tracing::debug;

use crate::core::diff::{DiffOptions, combine_diffs, generate_file_diff};
use crate::core::model::Patch;
use crate::core::outcome::{BatchOutcome, Outcome, PreviewSource};
use crate::core::parser::parse;
use crate::infra::io::write_output;

#[derive(Debug, Clone, Copy, Default)]
pub struct PatchGenerator
{
    options: DiffOptions,
}

impl PatchGenerator
{
    pub fn new(context_lines: usize) -> Self
    {
        Self { options: DiffOptions::with_context(context_lines) }
    }

    pub fn with_options(options: DiffOptions) -> Self
    {
        Self { options }
    }

    /// Failures and diff-less outcomes give an empty patch.
    pub fn from_outcome(
        &self,
        outcome: &Outcome,
    ) -> Patch
    {
        match outcome.diff()
        {
            Some(text) if outcome.is_success() => self.from_diff_text(text),
            _ => Patch::default(),
        }
    }

    /// Combined diff of the batch's succeeded members.
    pub fn from_batch(
        &self,
        batch: &BatchOutcome,
    ) -> Patch
    {
        batch
            .diff()
            .map(|text| self.from_diff_text(&text))
            .unwrap_or_default()
    }

    /// What a transaction would do, without doing it.
    pub fn from_preview(
        &self,
        source: &impl PreviewSource,
    ) -> Patch
    {
        self.from_diff_text(&source.preview())
    }

    /// Diff two path → content maps. A path present on one side only
    /// is a creation or deletion.
    pub fn from_files(
        &self,
        original: &BTreeMap<String, String>,
        modified: &BTreeMap<String, String>,
    ) -> Patch
    {
        let paths: BTreeSet<&String> = original
            .keys()
            .chain(modified.keys())
            .collect();

        let diffs: Vec<(&String, String)> = paths
            .into_iter()
            .map(|path| {
                let before = original
                    .get(path)
                    .map(String::as_str);
                let after = modified
                    .get(path)
                    .map(String::as_str);
                (path, generate_file_diff(before, after, path, &self.options))
            })
            .filter(|(_, diff)| !diff.is_empty())
            .collect();

        debug!(changed = diffs.len(), "diffed file maps");
        self.from_diff_text(&combine_diffs(diffs))
    }

    pub fn from_diff_text(
        &self,
        text: &str,
    ) -> Patch
    {
        parse(text)
    }

    /// Write `patch` as unified diff text; refuses to clobber unless
    /// `overwrite`.
    pub fn to_file(
        &self,
        patch: &Patch,
        path: &Path,
        overwrite: bool,
    ) -> Result<()>
    {
        write_output(path, &patch.to_unified_diff(), overwrite)?;
        debug!(path = %path.display(), files = patch.len(), "patch written");
        Ok(())
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::core::diff::generate_diff;
    use crate::core::model::FileStatus;

    fn map(entries: &[(&str, &str)]) -> BTreeMap<String, String>
    {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn from_files_covers_create_modify_delete()
    {
        let before = map(&[("keep.py", "same\n"), ("edit.py", "a\n"), ("gone.py", "bye\n")]);
        let after = map(&[("keep.py", "same\n"), ("edit.py", "b\n"), ("new.py", "hi\n")]);
        let patch = PatchGenerator::default().from_files(&before, &after);

        let paths: Vec<_> = patch
            .paths()
            .collect();
        assert_eq!(paths, vec!["edit.py", "gone.py", "new.py"]);
        assert_eq!(patch.get("new.py").map(|f| f.status()), Some(FileStatus::Added));
        assert_eq!(patch.get("gone.py").map(|f| f.status()), Some(FileStatus::Deleted));
        assert_eq!(patch.get("edit.py").map(|f| f.status()), Some(FileStatus::Modified));
    }

    #[test]
    fn failure_outcome_gives_empty_patch()
    {
        let generator = PatchGenerator::new(3);
        assert!(
            generator
                .from_outcome(&Outcome::failure("rename", "nope"))
                .is_empty()
        );
        assert!(
            generator
                .from_outcome(&Outcome::success("noop"))
                .is_empty()
        );
    }

    #[test]
    fn batch_patch_holds_succeeded_members()
    {
        let batch = BatchOutcome::new(vec![
            Outcome::success("a").with_file_diff("a.py", generate_diff("1\n", "2\n", "a.py", 3)),
            Outcome::failure("b", "boom"),
        ]);
        let patch = PatchGenerator::new(3).from_batch(&batch);
        assert_eq!(patch.len(), 1);
        assert!(
            patch
                .get("a.py")
                .is_some()
        );
    }

    #[test]
    fn to_file_refuses_to_clobber()
    {
        let tmp = tempfile::TempDir::new().unwrap();
        let out = tmp
            .path()
            .join("change.patch");
        let patch = PatchGenerator::new(3).from_diff_text(&generate_diff("a\n", "b\n", "f", 3));
        let generator = PatchGenerator::new(3);

        generator
            .to_file(&patch, &out, false)
            .unwrap();
        assert!(
            generator
                .to_file(&patch, &out, false)
                .is_err()
        );
        let written = std::fs::read_to_string(&out).unwrap();
        assert_eq!(crate::core::parser::parse(&written), patch);
    }
}
