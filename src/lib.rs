//! **hunkwise** - Previewable, reversible patches for multi-file refactorings
//!
//! Generates unified diffs, parses them (git extended headers included),
//! applies them with bounded offset search and dry runs, reverses them,
//! and exports them as search/replace scripts.

/// Command-line interface with clap integration
pub mod cli;

/// Patch engine - model, diff, parse, apply, script
pub mod core {
    /// Patch, file patch, hunk and change types with rendering and reversal
    pub mod model;
    pub use model::{Change, ChangeKind, FilePatch, FileStatus, Hunk, Patch, PatchFormat};

    /// Unified diff generation over `similar` (Myers/Patience/LCS)
    pub mod diff;
    pub use diff::{DiffAlgorithm, DiffOptions, combine_diffs, generate_diff, generate_file_diff};

    /// Tolerant unified/git diff parser with per-block recovery
    pub mod parser;
    pub use parser::{ParseError, ParseReport, parse, parse_file, parse_report};

    /// Whole-file access: filesystem (root-confined) and in-memory
    pub mod provider;
    pub use provider::{FileProvider, FsProvider, MemoryProvider, ProviderError};

    /// Hunk placement with fuzzy offset search, dry runs and reversal
    pub mod apply;
    pub use apply::{Applier, ApplyConflict, ApplyOptions, ApplyReport, ConflictReason, FileOutcome, apply, reverse};

    /// Patch to search/replace script conversion and replay
    pub mod script;
    pub use script::{Script, ScriptFormat, ScriptOp, save_script, to_script};

    /// Operation results carrying diffs
    pub mod outcome;
    pub use outcome::{BatchOutcome, Outcome, PreviewSource};

    /// Staged multi-file changes with commit/rollback
    pub mod transaction;
    pub use transaction::Transaction;

    /// Outcome/preview/file-map to patch glue
    pub mod generator;
    pub use generator::PatchGenerator;
}

/// Infrastructure - Configuration, I/O, and line handling
pub mod infra {
    /// Layered configuration (file + HUNKWISE_* env)
    pub mod config;
    pub use config::{Config, init as config_init, load_config};

    /// Atomic writes and overwrite-protected output
    pub mod io;
    pub use io::{write_atomic, write_output};

    /// Newline-aware line splitting
    pub mod lines;
    pub use lines::{Line, join_lines, split_lines};
}

/// CLI command handlers
pub mod cli_ext {
    /// diff/show/apply/reverse/script/replay runners
    pub mod patch_cmd;

    /// Shell completion scripts
    pub mod completion_cmd;
}

// Strategic re-exports for clean CLI interface
pub use cli::{AppContext, Cli, Commands};
pub use infra::{Config, load_config};

// Core types for external consumers
pub use crate::core::{Applier, FileProvider, Patch, PatchGenerator, generate_diff, parse};
