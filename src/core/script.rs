//! Search/replace scripts derived from patches.
//!
//! A script is a flat, reviewable list of edit operations in the
//! `FILE:` / `REPLACE lines` / `OLD:` / `NEW:` block dialect. Every
//! replace carries a `GUARD-CID` (xxh64 of the normalized old block) so a
//! hand-edited script is caught before it touches a file.
//!
//! Grammar (text form):
//!
//! ```text
//! script   := header? file*
//! file     := "FILE: " path NL ("# status: " status NL)? op*
//! op       := replace | insert
//! replace  := ("GUARD-CID: " hex NL)? "REPLACE lines " N "-" M ":" NL
//!             "OLD:" NL block "NEW:" NL block
//! insert   := "INSERT at " N ":" NL "NEW:" NL block
//! block    := fence NL line* fence NL ("NO-NEWLINE-AT-EOF" NL)?
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use similar::DiffTag;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::core::apply::{
    ApplyConflict, ApplyReport, ConflictReason, FileOutcome, HunkPlacement, application_rank, locate, shifted,
    signed_distance,
};
use crate::core::model::{ChangeKind, FilePatch, FileStatus, Hunk, Patch};
use crate::core::provider::{FileProvider, ProviderError};
use crate::core::transaction::Transaction;
use crate::infra::io::write_output;
use crate::infra::lines::{Line, join_lines, split_lines};

/// Content identifier (16 hex chars)
pub type ContentId = String;

const NO_NEWLINE_DIRECTIVE: &str = "NO-NEWLINE-AT-EOF";
const RENAMED_FROM: &str = "renamed from ";

/// Normalize content for hashing: trailing blanks and '\r' are ignored.
pub fn normalize_for_cid(s: &str) -> String {
    s.lines()
        .map(|l| l.trim_end_matches(&[' ', '\t', '\r'][..]))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Deterministic content ID using xxh64 with a fixed seed
pub fn generate_cid(content: &str) -> ContentId {
    let normalized = normalize_for_cid(content);
    let h = xxhash_rust::xxh64::xxh64(normalized.as_bytes(), 0);
    format!("{h:016x}")
}

/// Serialization of a script on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptFormat {
    #[default]
    Text,
    Json,
}

/// One edit. Blocks are stored line by line; a `*_no_newline` flag
/// marks a block whose last line ends the file without a newline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ScriptOp {
    Replace {
        start_line: usize, // 1-based inclusive
        end_line: usize,   // 1-based inclusive
        #[serde(default, skip_serializing_if = "Option::is_none")]
        guard_cid: Option<ContentId>,
        old: Vec<String>,
        new: Vec<String>,
        #[serde(default)]
        old_no_newline: bool,
        #[serde(default)]
        new_no_newline: bool,
    },
    Insert {
        at_line: usize, // insert after this line; 0 = top of file
        new: Vec<String>,
        #[serde(default)]
        new_no_newline: bool,
    },
}

impl ScriptOp {
    fn from_hunk(hunk: &Hunk) -> Self {
        let side = |on_side: fn(ChangeKind) -> bool| {
            let changes: Vec<_> = hunk
                .changes()
                .iter()
                .filter(|c| on_side(c.kind))
                .collect();
            let no_newline = changes.last().is_some_and(|c| c.no_newline);
            let text: Vec<String> = changes.into_iter().map(|c| c.text.clone()).collect();
            (text, no_newline)
        };
        let (old, old_no_newline) = side(ChangeKind::on_old_side);
        let (new, new_no_newline) = side(ChangeKind::on_new_side);

        if old.is_empty() {
            return ScriptOp::Insert {
                at_line: hunk.old_start(),
                new,
                new_no_newline,
            };
        }

        ScriptOp::Replace {
            start_line: hunk.old_start(),
            end_line: hunk.old_end(),
            guard_cid: Some(generate_cid(&old.join("\n"))),
            old,
            new,
            old_no_newline,
            new_no_newline,
        }
    }

    /// 1-based line the operation is declared at.
    pub fn declared_line(&self) -> usize {
        match self {
            ScriptOp::Replace { start_line, .. } => *start_line,
            ScriptOp::Insert { at_line, .. } => *at_line,
        }
    }

    /// 0-based buffer index of the expected window.
    fn declared_index(&self) -> usize {
        match self {
            ScriptOp::Replace { start_line, .. } => start_line.saturating_sub(1),
            ScriptOp::Insert { at_line, .. } => *at_line,
        }
    }

    fn old_lines(&self) -> Vec<Line<'_>> {
        match self {
            ScriptOp::Replace {
                old, old_no_newline, ..
            } => block_lines(old, *old_no_newline),
            ScriptOp::Insert { .. } => Vec::new(),
        }
    }

    fn new_lines(&self) -> Vec<Line<'_>> {
        match self {
            ScriptOp::Replace {
                new, new_no_newline, ..
            }
            | ScriptOp::Insert {
                new, new_no_newline, ..
            } => block_lines(new, *new_no_newline),
        }
    }

    /// Lines added and removed, ignoring context carried in both blocks.
    fn additions_deletions(&self) -> (usize, usize) {
        let (old, new): (&[String], &[String]) = match self {
            ScriptOp::Replace { old, new, .. } => (old.as_slice(), new.as_slice()),
            ScriptOp::Insert { new, .. } => (&[][..], new.as_slice()),
        };
        similar::capture_diff_slices(similar::Algorithm::Myers, old, new)
            .iter()
            .fold((0, 0), |(adds, dels), op| {
                let (tag, o, n) = op.as_tag_tuple();
                match tag {
                    DiffTag::Equal => (adds, dels),
                    DiffTag::Delete => (adds, dels + o.len()),
                    DiffTag::Insert => (adds + n.len(), dels),
                    DiffTag::Replace => (adds + n.len(), dels + o.len()),
                }
            })
    }
}

fn block_lines(lines: &[String], no_newline: bool) -> Vec<Line<'_>> {
    let last = lines.len().saturating_sub(1);
    lines
        .iter()
        .enumerate()
        .map(|(i, text)| Line {
            text: text.as_str(),
            newline: !(no_newline && i == last),
        })
        .collect()
}

/// All operations for one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileScript {
    pub path: String,
    pub status: FileStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renamed_from: Option<String>,
    #[serde(default)]
    pub binary: bool,
    pub ops: Vec<ScriptOp>,
}

impl FileScript {
    fn from_file_patch(fp: &FilePatch) -> Self {
        let renamed_from = match fp.status() {
            FileStatus::Renamed => fp.old_path().map(str::to_string),
            _ => None,
        };
        Self {
            path: fp.key().to_string(),
            status: fp.status(),
            renamed_from,
            binary: fp.is_binary(),
            ops: fp.hunks().iter().map(ScriptOp::from_hunk).collect(),
        }
    }

    /// `renamed from` is always last; its path runs to the end of the line.
    fn status_words(&self) -> Vec<String> {
        let mut words = Vec::new();
        if matches!(self.status, FileStatus::Added | FileStatus::Deleted) {
            words.push(self.status.as_str().to_string());
        }
        if self.binary {
            words.push("binary".into());
        }
        if self.status == FileStatus::Renamed {
            words.push(format!(
                "{RENAMED_FROM}{}",
                self.renamed_from.as_deref().unwrap_or_default()
            ));
        }
        words
    }
}

/// Ordered edit script over several files
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    pub files: Vec<FileScript>,
}

/// Script text that could not be read back
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("line {line}: {msg}")]
    InvalidOperation { line: usize, msg: String },
    #[error("line {line}: operation outside a FILE block")]
    OrphanOperation { line: usize },
    #[error("line {line}: invalid line number `{value}`")]
    InvalidLineNumber { line: usize, value: String },
    #[error("line {line}: expected {marker}")]
    MissingMarker { line: usize, marker: &'static str },
    #[error("line {line}: block is never closed")]
    UnterminatedBlock { line: usize },
    #[error("invalid JSON script: {0}")]
    Json(String),
}

impl Script {
    /// One operation per hunk, by file key then hunk position.
    pub fn from_patch(patch: &Patch) -> Self {
        Self {
            files: patch.files().map(FileScript::from_file_patch).collect(),
        }
    }

    pub fn op_count(&self) -> usize {
        self.files.iter().map(|f| f.ops.len()).sum()
    }

    /// Render the text form.
    pub fn render(&self) -> String {
        let (adds, dels) = self
            .files
            .iter()
            .flat_map(|f| f.ops.iter())
            .map(ScriptOp::additions_deletions)
            .fold((0, 0), |(a, d), (x, y)| (a + x, d + y));

        let mut out = format!(
            "# hunkwise script: {} file(s), {} operation(s), +{}/-{} lines\n",
            self.files.len(),
            self.op_count(),
            adds,
            dels
        );

        for file in &self.files {
            out.push_str(&format!("FILE: {}\n", file.path));
            let words = file.status_words();
            if !words.is_empty() {
                out.push_str(&format!("# status: {}\n", words.join(", ")));
            }
            for op in &file.ops {
                render_op(&mut out, op);
            }
            out.push('\n');
        }
        out
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(text: &str) -> Result<Self, ScriptError> {
        serde_json::from_str(text).map_err(|e| ScriptError::Json(e.to_string()))
    }

    /// Read either form back; JSON is recognized by its leading brace.
    pub fn parse(text: &str) -> Result<Self, ScriptError> {
        let trimmed = text.trim_start_matches('\u{FEFF}').trim_start();
        if trimmed.starts_with('{') {
            return Self::from_json(trimmed);
        }
        ScriptReader::new(text).read()
    }

    /// Execute the script through `provider`, one file at a time, in the
    /// same dependency order as patch application.
    #[instrument(level = "debug", skip_all, fields(files = self.files.len(), dry_run = dry_run))]
    pub fn replay<P: FileProvider + ?Sized>(&self, provider: &mut P, dry_run: bool) -> ApplyReport {
        let mut ordered: Vec<&FileScript> = self.files.iter().collect();
        ordered.sort_by_key(|file| application_rank(file.status));

        let files = if dry_run {
            let mut overlay = Transaction::new(provider);
            ordered
                .into_iter()
                .map(|file| replay_file(file, &mut overlay, true))
                .collect()
        } else {
            ordered
                .into_iter()
                .map(|file| replay_file(file, provider, false))
                .collect()
        };
        ApplyReport { dry_run, files }
    }
}

/// Text form of `Script::from_patch(patch)`.
pub fn to_script(patch: &Patch) -> String {
    Script::from_patch(patch).render()
}

/// Write a patch as a script file, refusing to clobber unless asked.
pub fn save_script(patch: &Patch, path: &Path, overwrite: bool, format: ScriptFormat) -> Result<()> {
    let script = Script::from_patch(patch);
    let text = match format {
        ScriptFormat::Text => script.render(),
        ScriptFormat::Json => script.to_json().context("serializing script")?,
    };
    write_output(path, &text, overwrite)?;
    debug!(path = %path.display(), ops = script.op_count(), "script saved");
    Ok(())
}

fn render_op(out: &mut String, op: &ScriptOp) {
    match op {
        ScriptOp::Replace {
            start_line,
            end_line,
            guard_cid,
            old,
            new,
            old_no_newline,
            new_no_newline,
        } => {
            if let Some(cid) = guard_cid {
                out.push_str(&format!("GUARD-CID: {cid}\n"));
            }
            out.push_str(&format!("REPLACE lines {start_line}-{end_line}:\n"));
            out.push_str("OLD:\n");
            render_block(out, old, *old_no_newline);
            out.push_str("NEW:\n");
            render_block(out, new, *new_no_newline);
        }
        ScriptOp::Insert {
            at_line,
            new,
            new_no_newline,
        } => {
            out.push_str(&format!("INSERT at {at_line}:\n"));
            out.push_str("NEW:\n");
            render_block(out, new, *new_no_newline);
        }
    }
}

/// Fence with one more backtick than any fence-like line inside.
fn fence_for(lines: &[String]) -> String {
    let longest = lines
        .iter()
        .map(|l| l.trim_start().chars().take_while(|c| *c == '`').count())
        .max()
        .unwrap_or(0);
    "`".repeat(longest.max(2) + 1)
}

fn render_block(out: &mut String, lines: &[String], no_newline: bool) {
    let fence = fence_for(lines);
    out.push_str(&fence);
    out.push('\n');
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    out.push_str(&fence);
    out.push('\n');
    if no_newline {
        out.push_str(NO_NEWLINE_DIRECTIVE);
        out.push('\n');
    }
}

/// Line cursor over script text
struct ScriptReader<'t> {
    lines: Vec<&'t str>,
    i: usize,
}

impl<'t> ScriptReader<'t> {
    fn new(text: &'t str) -> Self {
        let mut lines: Vec<&str> = text.split('\n').collect();
        if text.is_empty() || text.ends_with('\n') {
            lines.pop();
        }
        Self { lines, i: 0 }
    }

    /// Current line, trimmed of '\r' and surrounding blanks
    fn directive(&self) -> Option<&'t str> {
        self.lines.get(self.i).map(|l| l.trim())
    }

    fn read(mut self) -> Result<Script, ScriptError> {
        let mut files: Vec<FileScript> = Vec::new();
        let mut guard: Option<ContentId> = None;

        while let Some(line) = self.directive() {
            let line_no = self.i + 1;

            if let Some(path) = line.strip_prefix("FILE:") {
                let path = path.trim();
                if path.is_empty() {
                    return Err(ScriptError::InvalidOperation {
                        line: line_no,
                        msg: "empty file path".into(),
                    });
                }
                files.push(FileScript {
                    path: path.to_string(),
                    status: FileStatus::Modified,
                    renamed_from: None,
                    binary: false,
                    ops: Vec::new(),
                });
                self.i += 1;
                continue;
            }

            if let Some(words) = line.strip_prefix("# status:") {
                if let Some(file) = files.last_mut() {
                    apply_status_words(file, words);
                }
                self.i += 1;
                continue;
            }

            // Skip blanks and comments between operations
            if line.is_empty() || line.starts_with('#') {
                self.i += 1;
                continue;
            }

            if let Some(cid) = line.strip_prefix("GUARD-CID:") {
                guard = Some(cid.trim().to_string());
                self.i += 1;
                continue;
            }

            let Some(file) = files.last_mut() else {
                return Err(ScriptError::OrphanOperation { line: line_no });
            };

            let op = if let Some(span) = line.strip_prefix("REPLACE lines") {
                let (start_line, end_line) = parse_span(span, line_no)?;
                self.i += 1;
                let (old, old_no_newline) = self.block("OLD:")?;
                let (new, new_no_newline) = self.block("NEW:")?;
                ScriptOp::Replace {
                    start_line,
                    end_line,
                    guard_cid: guard.take(),
                    old,
                    new,
                    old_no_newline,
                    new_no_newline,
                }
            } else if let Some(at) = line.strip_prefix("INSERT at") {
                let at_line = parse_number(at.trim().trim_end_matches(':').trim(), line_no)?;
                self.i += 1;
                let (new, new_no_newline) = self.block("NEW:")?;
                ScriptOp::Insert {
                    at_line,
                    new,
                    new_no_newline,
                }
            } else {
                return Err(ScriptError::InvalidOperation {
                    line: line_no,
                    msg: format!("unknown directive `{line}`"),
                });
            };
            file.ops.push(op);
        }

        Ok(Script { files })
    }

    /// Read `marker`, a fenced block, and an optional no-newline line.
    fn block(&mut self, marker: &'static str) -> Result<(Vec<String>, bool), ScriptError> {
        if self.directive() != Some(marker) {
            return Err(ScriptError::MissingMarker {
                line: self.i + 1,
                marker,
            });
        }
        self.i += 1;

        let open_line = self.i + 1;
        let fence = match self.directive() {
            Some(f) if f.len() >= 3 && f.chars().all(|c| c == '`') => f,
            _ => {
                return Err(ScriptError::MissingMarker {
                    line: open_line,
                    marker: "opening fence",
                });
            }
        };
        self.i += 1;

        let mut body = Vec::new();
        loop {
            let Some(raw) = self.lines.get(self.i) else {
                return Err(ScriptError::UnterminatedBlock { line: open_line });
            };
            self.i += 1;
            if raw.trim_end_matches('\r') == fence {
                break;
            }
            body.push(raw.to_string());
        }

        let no_newline = self.directive() == Some(NO_NEWLINE_DIRECTIVE);
        if no_newline {
            self.i += 1;
        }
        Ok((body, no_newline))
    }
}

fn apply_status_words(file: &mut FileScript, words: &str) {
    let (flags, renamed_from) = match words.find(RENAMED_FROM) {
        Some(at) => (&words[..at], Some(&words[at + RENAMED_FROM.len()..])),
        None => (words, None),
    };

    for word in flags.split(',').map(str::trim) {
        match word {
            "added" => file.status = FileStatus::Added,
            "deleted" => file.status = FileStatus::Deleted,
            "binary" => file.binary = true,
            _ => {}
        }
    }

    if let Some(from) = renamed_from {
        file.status = FileStatus::Renamed;
        file.renamed_from = Some(from.to_string());
    }
}

fn parse_number(value: &str, line: usize) -> Result<usize, ScriptError> {
    value.parse().map_err(|_| ScriptError::InvalidLineNumber {
        line,
        value: value.to_string(),
    })
}

/// Parse line span " 10-15:" or single line " 10:"
fn parse_span(span: &str, line: usize) -> Result<(usize, usize), ScriptError> {
    let span = span.trim().trim_end_matches(':').trim();
    match span.split_once('-') {
        Some((s, e)) => Ok((parse_number(s.trim(), line)?, parse_number(e.trim(), line)?)),
        None => {
            let n = parse_number(span, line)?;
            Ok((n, n))
        }
    }
}

/// Run one file's operations and persist the result in one step.
/// `dry_run` only decides whether the content goes into the outcome;
/// the caller passes an overlay provider for dry runs.
fn replay_file<P: FileProvider + ?Sized>(file: &FileScript, provider: &mut P, dry_run: bool) -> FileOutcome {
    let path = file.path.as_str();
    let failed = |p: &str, e: ProviderError| FileOutcome::Failed {
        path: p.to_string(),
        error: e.to_string(),
    };

    if file.binary {
        return FileOutcome::Skipped {
            path: path.to_string(),
            reason: "binary file".into(),
        };
    }

    let source = match file.status {
        FileStatus::Added => {
            if provider.exists(path) {
                return FileOutcome::Conflict(ApplyConflict::new(path, None, ConflictReason::AlreadyExists));
            }
            None
        }
        FileStatus::Renamed => {
            if provider.exists(path) {
                return FileOutcome::Conflict(ApplyConflict::new(path, None, ConflictReason::AlreadyExists));
            }
            Some(file.renamed_from.as_deref().unwrap_or(path))
        }
        FileStatus::Deleted | FileStatus::Modified => Some(path),
    };

    let current = match source {
        None => String::new(),
        Some(src) => match provider.read(src) {
            Ok(Some(c)) => c,
            Ok(None) => return failed(src, ProviderError::NotFound { path: src.to_string() }),
            Err(e) => return failed(src, e),
        },
    };

    let (content, placements) = match run_ops(file, &current) {
        Ok(done) => done,
        Err(conflict) => {
            warn!(%conflict, "script operation does not apply");
            return FileOutcome::Conflict(conflict);
        }
    };

    if file.status == FileStatus::Deleted {
        if !content.is_empty() {
            return FileOutcome::Conflict(ApplyConflict::new(path, None, ConflictReason::ContentMismatch));
        }
        if let Err(e) = provider.remove(path) {
            return failed(path, e);
        }
        return FileOutcome::Deleted {
            path: path.to_string(),
        };
    }

    if let Err(e) = provider.write(path, &content) {
        return failed(path, e);
    }
    if let Some(old) = source.filter(|s| *s != path) {
        if let Err(e) = provider.remove(old) {
            return failed(old, e);
        }
    }

    let content = dry_run.then_some(content);
    match file.status {
        FileStatus::Added => FileOutcome::Created {
            path: path.to_string(),
            content,
        },
        _ => FileOutcome::Applied {
            path: path.to_string(),
            renamed_from: file.renamed_from.clone(),
            hunks: placements,
            content,
        },
    }
}

/// Locate and splice each operation; the nearest exact occurrence wins.
fn run_ops(file: &FileScript, content: &str) -> Result<(String, Vec<HunkPlacement>), ApplyConflict> {
    let mut lines = split_lines(content);
    let mut placements = Vec::with_capacity(file.ops.len());
    let mut delta: isize = 0;
    let mut floor = 0usize;

    for (index, op) in file.ops.iter().enumerate() {
        if let ScriptOp::Replace {
            guard_cid: Some(cid),
            old,
            ..
        } = op
        {
            if generate_cid(&old.join("\n")) != *cid {
                return Err(ApplyConflict::new(
                    &file.path,
                    Some(index),
                    ConflictReason::GuardMismatch,
                ));
            }
        }

        let old = op.old_lines();
        let new = op.new_lines();
        let wanted = shifted(op.declared_index(), delta);
        let radius = lines.len().max(wanted).saturating_add(1);

        let Some(at) = locate(&lines, &old, wanted, floor, radius) else {
            return Err(ApplyConflict::new(
                &file.path,
                Some(index),
                ConflictReason::ContextNotFound {
                    expected_line: wanted.saturating_add(1),
                    searched: lines.len(),
                },
            ));
        };

        let offset = signed_distance(at, wanted);
        lines.splice(at..at + old.len(), new.iter().copied());
        placements.push(HunkPlacement {
            index,
            declared_line: op.declared_line(),
            applied_line: at + 1,
            offset,
        });
        floor = at + new.len();
        delta = delta
            .saturating_add(offset)
            .saturating_add(new.len() as isize - old.len() as isize);
    }

    Ok((join_lines(lines), placements))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::diff::{DiffOptions, generate_diff, generate_file_diff};
    use crate::core::parser::parse;
    use crate::core::provider::MemoryProvider;

    fn scenario_a() -> Patch {
        parse(&generate_diff("a\nb\nc\n", "a\nX\nc\n", "src/app.py", 1))
    }

    #[test]
    fn renders_replace_block() {
        let text = to_script(&scenario_a());
        let cid = generate_cid("a\nb\nc");
        let expected = format!(
            "# hunkwise script: 1 file(s), 1 operation(s), +1/-1 lines\n\
             FILE: src/app.py\n\
             GUARD-CID: {cid}\n\
             REPLACE lines 1-3:\n\
             OLD:\n```\na\nb\nc\n```\n\
             NEW:\n```\na\nX\nc\n```\n\n"
        );
        assert_eq!(text, expected);
    }

    #[test]
    fn text_form_reads_back() {
        let script = Script::from_patch(&scenario_a());
        assert_eq!(Script::parse(&script.render()).unwrap(), script);
    }

    #[test]
    fn json_form_reads_back() {
        let script = Script::from_patch(&scenario_a());
        let json = script.to_json().unwrap();
        assert!(json.contains("\"op\": \"replace\""));
        assert_eq!(Script::parse(&json).unwrap(), script);
    }

    #[test]
    fn fence_grows_past_inner_fences() {
        let old = "intro\n```rust\nfn a() {}\n```\n";
        let new = "intro\n```rust\nfn b() {}\n```\n";
        let script = Script::from_patch(&parse(&generate_diff(old, new, "README.md", 3)));
        let text = script.render();
        assert!(text.contains("OLD:\n````\n"));
        assert_eq!(Script::parse(&text).unwrap(), script);
    }

    #[test]
    fn creation_becomes_insert_with_status() {
        let patch = parse(&generate_file_diff(
            None,
            Some("hello"),
            "new.txt",
            &DiffOptions::default(),
        ));
        let script = Script::from_patch(&patch);
        let text = script.render();
        assert!(text.contains("# status: added\n"));
        assert!(text.contains("INSERT at 0:\nNEW:\n```\nhello\n```\nNO-NEWLINE-AT-EOF\n"));
        assert_eq!(Script::parse(&text).unwrap(), script);

        let mut fs = MemoryProvider::new();
        let report = script.replay(&mut fs, false);
        assert!(report.is_clean());
        assert_eq!(fs.get("new.txt"), Some("hello"));
    }

    #[test]
    fn rename_source_may_contain_commas() {
        let file = FileScript {
            path: "notes.txt".into(),
            status: FileStatus::Renamed,
            renamed_from: Some("notes, draft, v2.txt".into()),
            binary: true,
            ops: Vec::new(),
        };
        let script = Script { files: vec![file] };
        let text = script.render();
        assert!(text.contains("# status: binary, renamed from notes, draft, v2.txt\n"));
        assert_eq!(Script::parse(&text).unwrap(), script);

        let patch = Patch::from_files([FilePatch::renamed("a, b.txt", "c.txt", Vec::new())]);
        let script = Script::from_patch(&patch);
        let read_back = Script::parse(&script.render()).unwrap();
        assert_eq!(read_back.files[0].renamed_from.as_deref(), Some("a, b.txt"));

        let mut fs = MemoryProvider::new().with_file("a, b.txt", "kept\n");
        assert!(read_back.replay(&mut fs, false).is_clean());
        assert_eq!(fs.get("c.txt"), Some("kept\n"));
        assert!(!fs.exists("a, b.txt"));
    }

    #[test]
    fn replay_frees_rename_source_before_recreating_it() {
        let patch = parse(
            "diff --git a/a.txt b/a.txt\nnew file mode 100644\n--- /dev/null\n+++ b/a.txt\n@@ -0,0 +1 @@\n+fresh\n\
             diff --git a/a.txt b/b.txt\nsimilarity index 100%\nrename from a.txt\nrename to b.txt\n",
        );
        let script = Script::from_patch(&patch);
        let start = MemoryProvider::new().with_file("a.txt", "moved\n");

        let mut preview = start.clone();
        let report = script.replay(&mut preview, true);
        assert!(report.is_clean(), "{report:?}");
        assert_eq!(preview, start);

        let mut fs = start;
        assert!(script.replay(&mut fs, false).is_clean());
        assert_eq!(fs.get("a.txt"), Some("fresh\n"));
        assert_eq!(fs.get("b.txt"), Some("moved\n"));
    }

    #[test]
    fn replay_matches_drifted_content() {
        let script = Script::from_patch(&scenario_a());
        let mut fs = MemoryProvider::new().with_file("src/app.py", "top\nmore\na\nb\nc\n");
        let report = script.replay(&mut fs, false);
        assert!(report.is_clean());
        assert_eq!(fs.get("src/app.py"), Some("top\nmore\na\nX\nc\n"));
    }

    #[test]
    fn edited_old_block_trips_guard() {
        let text = to_script(&scenario_a()).replace("OLD:\n```\na\nb\n", "OLD:\n```\na\nB\n");
        let script = Script::parse(&text).unwrap();
        let mut fs = MemoryProvider::new().with_file("src/app.py", "a\nB\nc\n");
        let report = script.replay(&mut fs, false);
        assert_eq!(report.conflicts()[0].reason, ConflictReason::GuardMismatch);
        assert_eq!(fs.get("src/app.py"), Some("a\nB\nc\n"));
    }

    #[test]
    fn parse_errors_name_the_line() {
        assert_eq!(
            Script::parse("REPLACE lines 1-2:\n").unwrap_err(),
            ScriptError::OrphanOperation { line: 1 }
        );
        assert!(matches!(
            Script::parse("FILE: x\nREPLACE lines a-b:\n").unwrap_err(),
            ScriptError::InvalidLineNumber { line: 2, .. }
        ));
        assert!(matches!(
            Script::parse("FILE: x\nINSERT at 1:\nNEW:\n```\nunterminated\n").unwrap_err(),
            ScriptError::UnterminatedBlock { line: 4 }
        ));
    }

    #[test]
    fn save_refuses_to_clobber() {
        let tmp = tempfile::TempDir::new().unwrap();
        let out = tmp.path().join("edits.txt");
        save_script(&scenario_a(), &out, false, ScriptFormat::Text).unwrap();
        assert!(save_script(&scenario_a(), &out, false, ScriptFormat::Text).is_err());
        save_script(&scenario_a(), &out, true, ScriptFormat::Json).unwrap();
        let saved = std::fs::read_to_string(&out).unwrap();
        assert!(saved.trim_start().starts_with('{'));
    }
}
