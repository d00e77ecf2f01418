use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::core::script::ScriptFormat;

/// Shared application context for global flags
#[derive(Clone, Debug)]
pub struct AppContext {
    pub quiet: bool,    // global --quiet
    pub no_color: bool, // global --no-color
    pub dry_run: bool,  // global --dry-run
    pub verbose: bool,  // global --verbose
}

#[derive(Parser)]
#[command(name = "hunkwise")]
#[command(about = "Generate, inspect, apply and reverse multi-file patches")]
#[command(version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Show what would be done without writing files
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Debug logging (overrides HUNKWISE_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Cli {
    pub fn context(&self) -> AppContext {
        AppContext {
            quiet: self.quiet,
            no_color: self.no_color,
            dry_run: self.dry_run,
            verbose: self.verbose,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print a unified diff of two files
    Diff(DiffArgs),

    /// Summarize a patch file
    Show(ShowArgs),

    /// Apply a patch to a directory tree
    Apply(ApplyArgs),

    /// Write the patch that undoes a patch
    Reverse(ReverseArgs),

    /// Export a patch as a search/replace script
    Script(ScriptArgs),

    /// Re-execute a saved script
    Replay(ReplayArgs),

    /// Initialize a hunkwise.toml config file
    Init(InitArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Parser)]
pub struct DiffArgs {
    /// Original file (missing file = creation)
    pub old: PathBuf,

    /// Modified file (missing file = deletion)
    pub new: PathBuf,

    /// Path to record in the headers (defaults to NEW, or OLD if NEW is missing)
    #[arg(long)]
    pub path: Option<String>,

    /// Lines of context around each change
    #[arg(short = 'U', long = "unified")]
    pub context: Option<usize>,

    /// Write the diff to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Overwrite the output file if it exists
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Parser)]
pub struct ShowArgs {
    /// Patch file to read
    pub patch: PathBuf,

    /// Emit the parsed patch as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct ApplyArgs {
    /// Patch file to apply
    pub patch: PathBuf,

    /// Directory the patch paths are relative to
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Apply the patch in reverse (undo it)
    #[arg(short = 'R', long)]
    pub reverse: bool,

    /// Lines to search either side of a hunk's declared position
    #[arg(long)]
    pub max_offset: Option<usize>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct ReverseArgs {
    /// Patch file to reverse
    pub patch: PathBuf,

    /// Output file (stdout if omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Overwrite the output file if it exists
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Parser)]
pub struct ScriptArgs {
    /// Patch file to convert
    pub patch: PathBuf,

    /// Output file (stdout if omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Overwrite the output file if it exists
    #[arg(long)]
    pub force: bool,

    /// Script format (defaults to the configured one)
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,
}

#[derive(Debug, Parser)]
pub struct ReplayArgs {
    /// Script file (text or JSON form)
    pub script: PathBuf,

    /// Directory the script paths are relative to
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

impl From<OutputFormat> for ScriptFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Text => ScriptFormat::Text,
            OutputFormat::Json => ScriptFormat::Json,
        }
    }
}

#[derive(Debug, Parser)]
pub struct InitArgs {
    /// Directory to initialize config in
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite existing config file
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Parser)]
pub struct CompletionsArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,

    /// Output directory; if omitted and --stdout not set, prints error
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Print completion script to stdout instead of a file
    #[arg(long)]
    pub stdout: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_reach_context() {
        let cli = Cli::parse_from(["hunkwise", "--dry-run", "-v", "apply", "fix.patch", "-R"]);
        let ctx = cli.context();
        assert!(ctx.dry_run && ctx.verbose && !ctx.quiet);
        match cli.command {
            Commands::Apply(args) => {
                assert!(args.reverse);
                assert_eq!(args.root, PathBuf::from("."));
            }
            _ => panic!("expected apply"),
        }
    }
}
