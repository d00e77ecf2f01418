//! CLI command handlers for the patch workflow.
//!
//! Each `run_*` function loads the configuration, does its work through
//! the library, and prints either colored status lines or JSON.

use std::fs;
use std::io::{ErrorKind, IsTerminal};
use std::path::Path;

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use tracing::{info, instrument, warn};

use crate::cli::{AppContext, ApplyArgs, DiffArgs, ReplayArgs, ReverseArgs, ScriptArgs, ShowArgs};
use crate::core::apply::{ApplyReport, Applier, FileOutcome};
use crate::core::diff::generate_file_diff;
use crate::core::generator::PatchGenerator;
use crate::core::model::{FileStatus, Patch};
use crate::core::parser::{parse_file, parse_report};
use crate::core::provider::FsProvider;
use crate::core::script::{Script, ScriptFormat, save_script};
use crate::infra::config::load_config;
use crate::infra::io::write_output;

/// Exit status when a patch leaves conflicts behind
pub const CONFLICT_EXIT_CODE: i32 = 2;

/// Print a unified diff of two files.
#[instrument(skip_all, fields(old = %args.old.display(), new = %args.new.display()))]
pub fn run_diff(
    args: DiffArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let config = load_config()?;
    let mut options = config.diff_options();
    if let Some(context) = args.context
    {
        options.context_lines = context;
    }

    let old = read_optional(&args.old)?;
    let new = read_optional(&args.new)?;
    if old.is_none() && new.is_none()
    {
        anyhow::bail!("neither {} nor {} exists", args.old.display(), args.new.display());
    }

    let path = match args.path
    {
        Some(path) => path,
        None if new.is_some() => display_path(&args.new),
        None => display_path(&args.old),
    };

    let diff = generate_file_diff(old.as_deref(), new.as_deref(), &path, &options);
    if diff.is_empty()
    {
        if !ctx.quiet
        {
            eprintln!("No differences");
        }
        return Ok(());
    }

    match args.output
    {
        Some(out) => write_to(&out, &diff, args.force, ctx),
        None =>
        {
            print_diff(&diff, ctx);
            Ok(())
        }
    }
}

/// Summarize a patch file.
#[instrument(skip_all, fields(patch = %args.patch.display()))]
pub fn run_show(
    args: ShowArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let text = fs::read_to_string(&args.patch).with_context(|| format!("reading patch {}", args.patch.display()))?;
    let report = parse_report(&text);

    if args.json
    {
        println!("{}", serde_json::to_string_pretty(&report.patch)?);
        return Ok(());
    }

    let patch = &report.patch;
    println!("{}", paint_bold(&format!("Patch: {} file(s)", patch.len()), ctx));
    println!(
        "  {}/{} lines in {} hunk(s)",
        paint_green(&format!("+{}", patch.total_additions()), ctx),
        paint_red(&format!("-{}", patch.total_deletions()), ctx),
        patch.hunk_count()
    );

    for fp in patch.files()
    {
        let label = match fp.status()
        {
            FileStatus::Renamed => format!(
                "{} -> {}",
                fp.old_path()
                    .unwrap_or_default(),
                fp.key()
            ),
            _ => fp
                .key()
                .to_string(),
        };
        let status = format!("{:>8}", fp.status().as_str());
        let status = match fp.status()
        {
            FileStatus::Added => paint_green(&status, ctx),
            FileStatus::Deleted => paint_red(&status, ctx),
            _ => paint_yellow(&status, ctx),
        };
        let binary = if fp.is_binary() { " (binary)" } else { "" };
        println!("{status}  {label}{binary}  +{}/-{}", fp.additions(), fp.deletions());
    }

    for skipped in &report.skipped
    {
        let path = skipped
            .path
            .as_deref()
            .unwrap_or("<unknown>");
        eprintln!("{} skipped {path}: {}", paint_yellow("warning:", ctx), skipped.error);
    }
    Ok(())
}

/// Apply a patch under `--root`. Conflicts exit with status 2.
#[instrument(skip_all, fields(patch = %args.patch.display(), root = %args.root.display()))]
pub fn run_apply(
    args: ApplyArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let config = load_config()?;
    let mut options = config.apply_options(ctx.dry_run);
    if let Some(max_offset) = args.max_offset
    {
        options.max_offset = max_offset;
    }

    let mut patch = parse_file(&args.patch)?;
    if args.reverse
    {
        patch = patch.reverse();
    }
    if patch.is_empty()
    {
        warn!("patch contains no file changes");
    }

    let mut provider = FsProvider::new(&args.root);
    let report = Applier::new(options).apply(&patch, &mut provider);
    finish_report(&report, args.json, ctx)
}

/// Write the patch that undoes a patch.
#[instrument(skip_all, fields(patch = %args.patch.display()))]
pub fn run_reverse(
    args: ReverseArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let reversed = parse_file(&args.patch)?.reverse();
    match args.output
    {
        Some(out) if !ctx.dry_run =>
        {
            PatchGenerator::default().to_file(&reversed, &out, args.force)?;
            if !ctx.quiet
            {
                println!("{} {}", paint_green("Wrote", ctx), out.display());
            }
            Ok(())
        }
        _ =>
        {
            print_diff(&reversed.to_unified_diff(), ctx);
            Ok(())
        }
    }
}

/// Export a patch as a script.
#[instrument(skip_all, fields(patch = %args.patch.display()))]
pub fn run_script(
    args: ScriptArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let config = load_config()?;
    let format: ScriptFormat = args
        .format
        .map(Into::into)
        .unwrap_or(config.script.format);
    let patch = parse_file(&args.patch)?;

    match args.output
    {
        Some(out) if !ctx.dry_run =>
        {
            save_script(&patch, &out, args.force, format)?;
            if !ctx.quiet
            {
                println!("{} {}", paint_green("Wrote", ctx), out.display());
            }
        }
        _ => print!("{}", render_script(&patch, format)?),
    }
    Ok(())
}

/// Re-execute a saved script under `--root`.
#[instrument(skip_all, fields(script = %args.script.display(), root = %args.root.display()))]
pub fn run_replay(
    args: ReplayArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let text = fs::read_to_string(&args.script).with_context(|| format!("reading script {}", args.script.display()))?;
    let script = Script::parse(&text).with_context(|| format!("parsing script {}", args.script.display()))?;
    info!(files = script.files.len(), ops = script.op_count(), "replaying script");

    let mut provider = FsProvider::new(&args.root);
    let report = script.replay(&mut provider, ctx.dry_run);
    finish_report(&report, args.json, ctx)
}

fn render_script(
    patch: &Patch,
    format: ScriptFormat,
) -> Result<String>
{
    let script = Script::from_patch(patch);
    match format
    {
        ScriptFormat::Text => Ok(script.render()),
        ScriptFormat::Json => Ok(script.to_json()? + "\n"),
    }
}

/// Print the report, then exit with the conflict status if needed.
fn finish_report(
    report: &ApplyReport,
    json: bool,
    ctx: &AppContext,
) -> Result<()>
{
    if json
    {
        println!("{}", serde_json::to_string_pretty(report)?);
    }
    else
    {
        print_report(report, ctx);
    }

    if !report.is_clean()
    {
        std::process::exit(CONFLICT_EXIT_CODE);
    }
    Ok(())
}

fn print_report(
    report: &ApplyReport,
    ctx: &AppContext,
)
{
    let verb = if report.dry_run { "would" } else { "did" };
    for outcome in &report.files
    {
        match outcome
        {
            FileOutcome::Applied { path, renamed_from, hunks, .. } =>
            {
                if ctx.quiet
                {
                    continue;
                }
                let shifted = hunks
                    .iter()
                    .filter(|h| h.offset != 0)
                    .count();
                let target = match renamed_from
                {
                    Some(from) => format!("{from} -> {path}"),
                    None => path.clone(),
                };
                let mut line = format!("{} {target} ({} hunk(s)", paint_green("patched", ctx), hunks.len());
                if shifted > 0
                {
                    line.push_str(&format!(", {shifted} at an offset"));
                }
                line.push(')');
                println!("{line}");
            }
            FileOutcome::Created { path, .. } if !ctx.quiet => println!("{} {path}", paint_green("created", ctx)),
            FileOutcome::Deleted { path } if !ctx.quiet => println!("{} {path}", paint_green("deleted", ctx)),
            FileOutcome::Skipped { path, reason } if !ctx.quiet =>
            {
                println!("{} {path}: {reason}", paint_yellow("skipped", ctx))
            }
            FileOutcome::Conflict(conflict) => eprintln!("{} {conflict}", paint_red("conflict", ctx)),
            FileOutcome::Failed { path, error } => eprintln!("{} {path}: {error}", paint_red("failed", ctx)),
            _ => {}
        }
    }

    if !ctx.quiet
    {
        let failed = report
            .files
            .iter()
            .filter(|f| !f.is_success() && !matches!(f, FileOutcome::Skipped { .. }))
            .count();
        let summary = format!(
            "{} file(s) {verb} apply, {failed} failed{}",
            report
                .applied_paths()
                .len(),
            if report.dry_run { " (dry run, nothing written)" } else { "" }
        );
        if failed == 0 { println!("{}", paint_bold(&summary, ctx)) } else { eprintln!("{}", paint_bold(&summary, ctx)) }
    }
}

/// Color diff lines when writing to a terminal.
fn print_diff(
    diff: &str,
    ctx: &AppContext,
)
{
    if ctx.no_color || !std::io::stdout().is_terminal()
    {
        print!("{diff}");
        return;
    }

    for line in diff.lines()
    {
        if line.starts_with("+++") || line.starts_with("---") || line.starts_with("diff ")
        {
            println!("{}", line.bold());
        }
        else if line.starts_with("@@")
        {
            println!("{}", line.cyan());
        }
        else if line.starts_with('+')
        {
            println!("{}", line.green());
        }
        else if line.starts_with('-')
        {
            println!("{}", line.red());
        }
        else
        {
            println!("{line}");
        }
    }
}

fn write_to(
    out: &Path,
    text: &str,
    force: bool,
    ctx: &AppContext,
) -> Result<()>
{
    if ctx.dry_run
    {
        if !ctx.quiet
        {
            println!("Would write {}", out.display());
        }
        return Ok(());
    }
    write_output(out, text, force)?;
    if !ctx.quiet
    {
        println!("{} {}", paint_green("Wrote", ctx), out.display());
    }
    Ok(())
}

/// Missing files read as `None`; other errors propagate.
fn read_optional(path: &Path) -> Result<Option<String>>
{
    match fs::read_to_string(path)
    {
        Ok(text) => Ok(Some(text)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", path.display())),
    }
}

/// Forward-slash form of a path for diff headers.
fn display_path(path: &Path) -> String
{
    let text = path
        .to_string_lossy()
        .replace('\\', "/");
    text.trim_start_matches("./")
        .to_string()
}

fn paint_green(
    text: &str,
    ctx: &AppContext,
) -> String
{
    if ctx.no_color { text.to_string() } else { text.green().bold().to_string() }
}

fn paint_red(
    text: &str,
    ctx: &AppContext,
) -> String
{
    if ctx.no_color { text.to_string() } else { text.red().bold().to_string() }
}

fn paint_yellow(
    text: &str,
    ctx: &AppContext,
) -> String
{
    if ctx.no_color { text.to_string() } else { text.yellow().to_string() }
}

fn paint_bold(
    text: &str,
    ctx: &AppContext,
) -> String
{
    if ctx.no_color { text.to_string() } else { text.bold().to_string() }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::core::diff::generate_diff;

    #[test]
    fn display_path_uses_forward_slashes()
    {
        assert_eq!(display_path(Path::new("./src/lib.rs")), "src/lib.rs");
        assert_eq!(display_path(Path::new("a\\b.txt")), "a/b.txt");
    }

    #[test]
    fn missing_file_reads_as_none()
    {
        let tmp = tempfile::TempDir::new().unwrap();
        assert_eq!(
            read_optional(
                &tmp.path()
                    .join("nope.txt")
            )
            .unwrap(),
            None
        );
    }

    #[test]
    fn json_script_ends_with_newline()
    {
        let patch = crate::core::parser::parse(&generate_diff("a\n", "b\n", "f.txt", 3));
        let json = render_script(&patch, ScriptFormat::Json).unwrap();
        assert!(json.starts_with('{') && json.ends_with("}\n"));
        assert!(
            render_script(&patch, ScriptFormat::Text)
                .unwrap()
                .contains("FILE: f.txt")
        );
    }
}
