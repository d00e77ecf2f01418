//! Staged multi-file changes over a [`FileProvider`].
//!
//! Nothing reaches the underlying provider until `commit()`. Reads see
//! staged content first, so several operations can build on each other.
//! `commit` and `rollback` take the transaction by value; a finalized
//! transaction cannot be reused.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::core::diff::{DiffOptions, combine_diffs, generate_file_diff};
use crate::core::outcome::{BatchOutcome, Outcome, PreviewSource};
use crate::core::provider::{FileProvider, ProviderError};

/// One file's staged change
#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingChange
{
    /// Content before the first staged change; None if the file was absent
    original: Option<String>,
    /// None stages a removal
    content: Option<String>,
    operations: Vec<String>,
}

pub struct Transaction<'p, P: FileProvider + ?Sized>
{
    provider: &'p mut P,
    pending: BTreeMap<String, PendingChange>,
    options: DiffOptions,
    dry_run: bool,
}

impl<'p, P: FileProvider + ?Sized> Transaction<'p, P>
{
    pub fn new(provider: &'p mut P) -> Self
    {
        Self { provider, pending: BTreeMap::new(), options: DiffOptions::default(), dry_run: false }
    }

    pub fn with_diff_options(
        mut self,
        options: DiffOptions,
    ) -> Self
    {
        self.options = options;
        self
    }

    /// Commit reports what would happen but writes nothing.
    pub fn with_dry_run(
        mut self,
        dry_run: bool,
    ) -> Self
    {
        self.dry_run = dry_run;
        self
    }

    /// Staged content if any, else what the provider holds.
    pub fn current_content(
        &self,
        path: &str,
    ) -> Result<Option<String>, ProviderError>
    {
        match self
            .pending
            .get(path)
        {
            Some(change) => Ok(change
                .content
                .clone()),
            None => self
                .provider
                .read(path),
        }
    }

    /// Stage new content for `path`; returns a pending outcome with the
    /// diff of this step.
    pub fn stage(
        &mut self,
        path: &str,
        content: impl Into<String>,
        operation: &str,
    ) -> Result<Outcome, ProviderError>
    {
        self.stage_change(path, Some(content.into()), operation)
    }

    /// Stage deletion of `path`.
    pub fn stage_removal(
        &mut self,
        path: &str,
        operation: &str,
    ) -> Result<Outcome, ProviderError>
    {
        self.stage_change(path, None, operation)
    }

    fn stage_change(
        &mut self,
        path: &str,
        content: Option<String>,
        operation: &str,
    ) -> Result<Outcome, ProviderError>
    {
        let before = self.current_content(path)?;
        let step_diff = generate_file_diff(before.as_deref(), content.as_deref(), path, &self.options);

        match self
            .pending
            .get_mut(path)
        {
            Some(change) =>
            {
                change.content = content;
                change
                    .operations
                    .push(operation.to_string());
            }
            None =>
            {
                self.pending
                    .insert(
                        path.to_string(),
                        PendingChange { original: before, content, operations: vec![operation.to_string()] },
                    );
            }
        }
        debug!(path, operation, "staged");

        Ok(Outcome::success(format!("[PENDING] {operation}")).with_file_diff(path, step_diff))
    }

    pub fn pending_count(&self) -> usize
    {
        self.pending
            .len()
    }

    pub fn pending_paths(&self) -> impl Iterator<Item = &str>
    {
        self.pending
            .keys()
            .map(String::as_str)
    }

    /// Per-file diff of original vs staged content; unchanged files omitted.
    pub fn diffs(&self) -> BTreeMap<String, String>
    {
        self.pending
            .iter()
            .map(|(path, change)| {
                let diff = generate_file_diff(
                    change
                        .original
                        .as_deref(),
                    change
                        .content
                        .as_deref(),
                    path,
                    &self.options,
                );
                (path.clone(), diff)
            })
            .filter(|(_, diff)| !diff.is_empty())
            .collect()
    }

    /// Write every staged change. If one fails, files already written
    /// are put back and a single failure is reported.
    pub fn commit(self) -> BatchOutcome
    {
        if self
            .pending
            .is_empty()
        {
            return BatchOutcome::new(vec![Outcome::success("No changes to commit")]);
        }

        let diffs = self.diffs();
        if self.dry_run
        {
            let mut outcome = Outcome::success(format!("[DRY RUN] Would apply {} change(s)", self.pending.len()));
            for (path, diff) in diffs
            {
                outcome = outcome.with_file_diff(path, diff);
            }
            return BatchOutcome::new(vec![outcome]);
        }

        let Transaction { provider, pending, .. } = self;
        let mut written: Vec<(&String, &PendingChange)> = Vec::new();
        let mut outcomes = Vec::with_capacity(pending.len());

        for (path, change) in &pending
        {
            let result = match &change.content
            {
                Some(content) => provider.write(path, content),
                None if provider.exists(path) => provider.remove(path),
                None => Ok(()),
            };

            if let Err(err) = result
            {
                warn!(path, %err, "commit failed, restoring");
                restore(provider, &written);
                return BatchOutcome::new(vec![Outcome::failure(
                    "commit",
                    format!("Transaction failed, rolled back: {err}"),
                )]);
            }

            written.push((path, change));
            let diff = diffs
                .get(path)
                .cloned()
                .unwrap_or_default();
            outcomes.push(
                Outcome::success(format!("Applied: {}", change.operations.join(", "))).with_file_diff(path.as_str(), diff),
            );
        }

        info!(files = outcomes.len(), "transaction committed");
        BatchOutcome::new(outcomes)
    }

    /// Drop every staged change.
    pub fn rollback(self) -> Outcome
    {
        let count = self
            .pending
            .len();
        debug!(count, "rolled back");
        Outcome::success(format!("Rolled back {count} pending change(s)"))
    }
}

/// Best-effort return of written files to their original state.
fn restore<P: FileProvider + ?Sized>(
    provider: &mut P,
    written: &[(&String, &PendingChange)],
)
{
    for (path, change) in written
    {
        let result = match &change.original
        {
            Some(original) => provider.write(path, original),
            None => provider.remove(path),
        };
        if let Err(err) = result
        {
            warn!(path = path.as_str(), %err, "could not restore");
        }
    }
}

impl<P: FileProvider + ?Sized> PreviewSource for Transaction<'_, P>
{
    fn preview(&self) -> String
    {
        combine_diffs(self.diffs())
    }
}

/// Lets the applier and script replay stage into a transaction.
impl<P: FileProvider + ?Sized> FileProvider for Transaction<'_, P>
{
    fn read(
        &self,
        path: &str,
    ) -> Result<Option<String>, ProviderError>
    {
        self.current_content(path)
    }

    fn write(
        &mut self,
        path: &str,
        content: &str,
    ) -> Result<(), ProviderError>
    {
        self.stage(path, content, "write")
            .map(|_| ())
    }

    fn exists(
        &self,
        path: &str,
    ) -> bool
    {
        self.current_content(path)
            .is_ok_and(|c| c.is_some())
    }

    fn remove(
        &mut self,
        path: &str,
    ) -> Result<(), ProviderError>
    {
        if !self.exists(path)
        {
            return Err(ProviderError::NotFound { path: path.to_string() });
        }
        self.stage_removal(path, "remove")
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::core::provider::MemoryProvider;

    /// Provider whose writes to one path always fail.
    struct FailingOn<'a>
    {
        inner: MemoryProvider,
        bad: &'a str,
    }

    impl FileProvider for FailingOn<'_>
    {
        fn read(
            &self,
            path: &str,
        ) -> Result<Option<String>, ProviderError>
        {
            self.inner
                .read(path)
        }

        fn write(
            &mut self,
            path: &str,
            content: &str,
        ) -> Result<(), ProviderError>
        {
            if path == self.bad
            {
                return Err(ProviderError::Io {
                    path: path.to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
                });
            }
            self.inner
                .write(path, content)
        }

        fn exists(
            &self,
            path: &str,
        ) -> bool
        {
            self.inner
                .exists(path)
        }

        fn remove(
            &mut self,
            path: &str,
        ) -> Result<(), ProviderError>
        {
            self.inner
                .remove(path)
        }
    }

    #[test]
    fn staged_changes_build_on_each_other()
    {
        let mut fs = MemoryProvider::new().with_file("a.py", "x = 1\n");
        let mut tx = Transaction::new(&mut fs);
        tx.stage("a.py", "x = 2\n", "bump")
            .unwrap();
        let step = tx
            .stage("a.py", "x = 3\n", "bump again")
            .unwrap();

        // The step diff is relative to the previous stage
        assert!(
            step.diff()
                .unwrap()
                .contains("-x = 2\n+x = 3\n")
        );
        // The preview is relative to the original
        assert!(
            tx.preview()
                .contains("-x = 1\n+x = 3\n")
        );
        assert_eq!(
            tx.current_content("a.py")
                .unwrap()
                .as_deref(),
            Some("x = 3\n")
        );
    }

    #[test]
    fn nothing_written_before_commit()
    {
        let mut fs = MemoryProvider::new().with_file("a.py", "old\n");
        {
            let mut tx = Transaction::new(&mut fs);
            tx.stage("a.py", "new\n", "edit")
                .unwrap();
            tx.stage("b.py", "created\n", "create")
                .unwrap();
            let outcome = tx.rollback();
            assert_eq!(outcome.message(), "Rolled back 2 pending change(s)");
        }
        assert_eq!(fs.get("a.py"), Some("old\n"));
        assert!(!fs.exists("b.py"));
    }

    #[test]
    fn commit_writes_and_reports_diffs()
    {
        let mut fs = MemoryProvider::new()
            .with_file("a.py", "old\n")
            .with_file("gone.py", "bye\n");
        let mut tx = Transaction::new(&mut fs);
        tx.stage("a.py", "new\n", "edit")
            .unwrap();
        tx.stage_removal("gone.py", "delete")
            .unwrap();
        let batch = tx.commit();

        assert!(batch.is_success());
        assert_eq!(batch.files_changed(), vec!["a.py", "gone.py"]);
        let diff = batch
            .diff()
            .unwrap();
        assert!(diff.contains("+++ /dev/null"));
        assert_eq!(fs.get("a.py"), Some("new\n"));
        assert!(!fs.exists("gone.py"));
    }

    #[test]
    fn failed_commit_restores_written_files()
    {
        let mut fs = FailingOn { inner: MemoryProvider::new().with_file("a.py", "old\n"), bad: "z.py" };
        let mut tx = Transaction::new(&mut fs);
        tx.stage("a.py", "new\n", "edit")
            .unwrap();
        tx.stage("n.py", "fresh\n", "create")
            .unwrap();
        tx.stage("z.py", "nope\n", "create")
            .unwrap();
        let batch = tx.commit();

        assert!(!batch.is_success());
        assert!(
            batch.outcomes[0]
                .message()
                .starts_with("Transaction failed, rolled back")
        );
        assert_eq!(fs.inner.get("a.py"), Some("old\n"));
        assert!(!fs.inner.exists("n.py"));
    }

    #[test]
    fn dry_run_commit_writes_nothing()
    {
        let mut fs = MemoryProvider::new().with_file("a.py", "old\n");
        let before = fs.clone();
        let mut tx = Transaction::new(&mut fs).with_dry_run(true);
        tx.stage("a.py", "new\n", "edit")
            .unwrap();
        let batch = tx.commit();
        assert!(batch.outcomes[0].message().starts_with("[DRY RUN]"));
        assert_eq!(fs, before);
    }
}
