use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cli::{AppContext, InitArgs};
use crate::core::apply::{ApplyOptions, DEFAULT_MAX_OFFSET};
use crate::core::diff::{DEFAULT_CONTEXT_LINES, DiffAlgorithm, DiffOptions};
use crate::core::script::ScriptFormat;
use crate::infra::io::write_atomic;

/// Config files looked up in priority order; the first one found wins.
pub const CONFIG_FILES: [&str; 4] = ["hunkwise.toml", "hunkwise.yaml", "hunkwise.json", ".hunkwise.toml"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config
{
    /// Diff generation settings
    pub diff: DiffConfig,

    /// Patch application settings
    pub apply: ApplyConfig,

    /// Script export settings
    pub script: ScriptConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffConfig
{
    pub context_lines: usize,
    pub algorithm: DiffAlgorithm,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplyConfig
{
    /// Lines searched either side of a hunk's declared position
    pub max_offset: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig
{
    pub format: ScriptFormat,
}

impl Default for DiffConfig
{
    fn default() -> Self
    {
        Self { context_lines: DEFAULT_CONTEXT_LINES, algorithm: DiffAlgorithm::default() }
    }
}

impl Default for ApplyConfig
{
    fn default() -> Self
    {
        Self { max_offset: DEFAULT_MAX_OFFSET }
    }
}

impl Config
{
    pub fn diff_options(&self) -> DiffOptions
    {
        DiffOptions { context_lines: self.diff.context_lines, algorithm: self.diff.algorithm }
    }

    pub fn apply_options(
        &self,
        dry_run: bool,
    ) -> ApplyOptions
    {
        ApplyOptions { max_offset: self.apply.max_offset, dry_run }
    }
}

/// Load configuration from the working directory and environment.
pub fn load_config() -> Result<Config>
{
    load_config_from(Path::new("."))
}

/// Defaults, then the first config file in `dir`, then `HUNKWISE_*`
/// environment variables (`HUNKWISE_APPLY__MAX_OFFSET=20`).
pub fn load_config_from(dir: &Path) -> Result<Config>
{
    let mut builder = config::Config::builder();

    // Load from config files in priority order
    for name in CONFIG_FILES
    {
        let path = dir.join(name);
        if path.exists()
        {
            debug!(path = %path.display(), "using config file");
            builder = builder.add_source(config::File::from(path.as_path()));
            break;
        }
    }

    // Add environment variables with HUNKWISE_ prefix
    builder = builder.add_source(
        config::Environment::with_prefix("HUNKWISE")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let cfg = builder
        .build()
        .context("Failed to load configuration")?;
    let parsed: Config = cfg
        .try_deserialize()
        .context("Failed to parse configuration")?;

    Ok(parsed)
}

pub fn init(
    args: InitArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let config_path = args
        .path
        .join(CONFIG_FILES[0]);

    if config_path.exists() && !args.force
    {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    let config = Config::default();
    let toml_string = toml::to_string_pretty(&config).context("Failed to serialize default config")?;

    if ctx.dry_run
    {
        print!("{toml_string}");
        return Ok(());
    }

    write_atomic(&config_path, toml_string.as_bytes()).context("Failed to write config file")?;

    if !ctx.quiet
    {
        println!("Created config file at {}", config_path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests
{
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults()
    {
        let tmp = TempDir::new().unwrap();
        let cfg = load_config_from(tmp.path()).unwrap();
        assert_eq!(cfg.diff.context_lines, 3);
        assert_eq!(cfg.apply.max_offset, 100);
        assert_eq!(cfg.script.format, ScriptFormat::Text);
    }

    #[test]
    fn partial_toml_overrides_only_given_keys()
    {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path()
                .join("hunkwise.toml"),
            "[diff]\nalgorithm = \"patience\"\n\n[apply]\nmax_offset = 7\n",
        )
        .unwrap();
        let cfg = load_config_from(tmp.path()).unwrap();
        assert_eq!(cfg.diff.algorithm, DiffAlgorithm::Patience);
        assert_eq!(cfg.diff.context_lines, 3);
        assert_eq!(cfg.apply_options(true), ApplyOptions { max_offset: 7, dry_run: true });
    }

    #[test]
    fn default_config_serializes_and_reads_back()
    {
        let text = toml::to_string_pretty(&Config::default()).unwrap();
        assert!(text.contains("[apply]"));
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back, Config::default());
    }

    #[test]
    fn init_refuses_to_overwrite()
    {
        let tmp = TempDir::new().unwrap();
        let ctx = AppContext { quiet: true, no_color: true, dry_run: false, verbose: false };
        let args = || InitArgs { path: tmp.path().to_path_buf(), force: false };

        init(args(), &ctx).unwrap();
        assert!(
            tmp.path()
                .join("hunkwise.toml")
                .exists()
        );
        assert!(init(args(), &ctx).is_err());
        init(InitArgs { force: true, ..args() }, &ctx).unwrap();
    }
}
