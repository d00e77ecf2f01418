use anyhow::Result;
use clap::Parser;
use hunkwise::cli::{AppContext, Cli, Commands};
use hunkwise::cli_ext::{completion_cmd, patch_cmd};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Build a context once, pass everywhere
    let ctx = cli.context();
    init_tracing(&ctx);

    match cli.command {
        Commands::Diff(args) => patch_cmd::run_diff(args, &ctx),
        Commands::Show(args) => patch_cmd::run_show(args, &ctx),
        Commands::Apply(args) => patch_cmd::run_apply(args, &ctx),
        Commands::Reverse(args) => patch_cmd::run_reverse(args, &ctx),
        Commands::Script(args) => patch_cmd::run_script(args, &ctx),
        Commands::Replay(args) => patch_cmd::run_replay(args, &ctx),
        Commands::Init(args) => hunkwise::infra::config::init(args, &ctx),
        Commands::Completions(args) => completion_cmd::run_completions(args, &ctx),
    }
}

/// Logs go to stderr; `HUNKWISE_LOG` picks the filter, `--verbose` forces debug.
fn init_tracing(ctx: &AppContext) {
    let filter = if ctx.verbose {
        EnvFilter::new("hunkwise=debug")
    } else {
        EnvFilter::try_from_env("HUNKWISE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(!ctx.no_color)
        .with_target(false)
        .init();
}
