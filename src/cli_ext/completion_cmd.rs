//! `hunkwise completions`: shell completion scripts from the clap definition.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::CommandFactory;
use clap_complete::Generator;
use tracing::{debug, instrument};

use crate::cli::{AppContext, Cli, CompletionsArgs, Shell};
use crate::infra::io::write_atomic;

const BIN_NAME: &str = "hunkwise";

fn generator(shell: &Shell) -> clap_complete::Shell
{
    match shell
    {
        Shell::Bash => clap_complete::Shell::Bash,
        Shell::Zsh => clap_complete::Shell::Zsh,
        Shell::Fish => clap_complete::Shell::Fish,
        Shell::PowerShell => clap_complete::Shell::PowerShell,
        Shell::Elvish => clap_complete::Shell::Elvish,
    }
}

/// Completion script for `shell`, as bytes.
pub fn completion_script(shell: &Shell) -> Vec<u8>
{
    let mut buf = Vec::new();
    clap_complete::generate(generator(shell), &mut Cli::command(), BIN_NAME, &mut buf);
    buf
}

/// File name the shell expects the script under, e.g. `_hunkwise` for zsh.
pub fn script_file_name(shell: &Shell) -> String
{
    generator(shell).file_name(BIN_NAME)
}

/// Print the script or write it into `--out-dir`.
#[instrument(skip_all, fields(shell = ?args.shell))]
pub fn run_completions(
    args: CompletionsArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let script = completion_script(&args.shell);

    if args.stdout
    {
        std::io::stdout()
            .write_all(&script)
            .context("write completion script")?;
        return Ok(());
    }

    let dir: PathBuf = args
        .out_dir
        .context("--out-dir is required unless --stdout is set")?;
    let path = dir.join(script_file_name(&args.shell));
    write_atomic(&path, &script).with_context(|| format!("writing {}", path.display()))?;
    debug!(path = %path.display(), bytes = script.len(), "completion written");

    if !ctx.quiet
    {
        eprintln!("Wrote completion to {}", path.display());
    }
    Ok(())
}
