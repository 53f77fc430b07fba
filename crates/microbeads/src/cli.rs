//! Command-line interface definitions using clap.

use clap::{ArgAction, Parser, Subcommand};
use crate::output::ExitCode;
use std::path::PathBuf;

/// Microbeads issue tracker
///
/// Stores one JSON file per issue so concurrent branches merge cleanly.
/// Dependencies between issues drive the `ready` and `blocked` views.
#[derive(Parser, Debug)]
#[command(name = "mb", version)]
#[command(about = "File-per-record issue tracker", long_about = None)]
#[command(after_help = ExitCode::all_codes_documentation())]
pub struct Cli {
    /// Emit JSON envelopes instead of human-readable output
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output (for scripting)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the issue store in the current directory
    Init {
        /// Identifier prefix (derived from the directory name if omitted)
        #[arg(long)]
        prefix: Option<String>,

        /// Import open issues from the beads CLI (`bd list --json`)
        #[arg(long)]
        import_beads: bool,

        /// Import from a saved `bd list --json` export instead of running bd
        #[arg(long, value_name = "PATH", conflicts_with = "import_beads")]
        import_beads_file: Option<PathBuf>,
    },

    /// Create a new issue
    Create {
        /// Issue title
        title: String,

        /// Longer description
        #[arg(short, long, default_value = "")]
        description: String,

        /// Issue type (bug, feature, task, epic, chore)
        #[arg(short = 't', long = "type", default_value = "task")]
        issue_type: String,

        /// Priority from 0 (critical) to 4 (low)
        #[arg(short, long, default_value = "2")]
        priority: String,

        /// Label to attach (repeatable)
        #[arg(short, long = "label")]
        labels: Vec<String>,
    },

    /// Show one issue and the issues that depend on it
    Show {
        /// Issue id (full or unique partial)
        id: String,
    },

    /// List issues
    List {
        /// Filter by status (open, in_progress, blocked, closed)
        #[arg(short, long)]
        status: Option<String>,

        /// Filter by priority
        #[arg(short, long)]
        priority: Option<String>,

        /// Filter by type
        #[arg(short = 't', long = "type")]
        issue_type: Option<String>,

        /// Require a label (repeatable; all must match)
        #[arg(short, long = "label")]
        labels: Vec<String>,
    },

    /// Update fields of an issue
    Update {
        /// Issue id (full or unique partial)
        id: String,

        #[arg(short, long)]
        status: Option<String>,

        #[arg(short, long)]
        priority: Option<String>,

        #[arg(long)]
        title: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(short = 't', long = "type")]
        issue_type: Option<String>,

        /// Replace the whole label set (repeatable)
        #[arg(long = "label")]
        labels: Option<Vec<String>>,

        /// Add a label (repeatable)
        #[arg(long = "add-label")]
        add_labels: Vec<String>,

        /// Remove a label (repeatable)
        #[arg(long = "remove-label")]
        remove_labels: Vec<String>,
    },

    /// Close an issue
    Close {
        id: String,

        /// Why the issue was closed
        #[arg(short, long)]
        reason: String,
    },

    /// Reopen a closed issue
    Reopen { id: String },

    /// Open issues whose dependencies are all closed
    Ready,

    /// Issues waiting on unfinished dependencies
    Blocked,

    /// Dependency management commands
    #[command(subcommand)]
    Dep(DepCommands),

    /// Print the JSON Schema of the record file format
    Schema,

    /// Three-way merge of one record file (for use as a git merge driver)
    #[command(hide = true)]
    MergeDriver {
        /// Common ancestor (%O)
        base: PathBuf,
        /// Current branch version (%A); overwritten with the result
        ours: PathBuf,
        /// Other branch version (%B)
        theirs: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
pub enum DepCommands {
    /// CHILD is blocked until PARENT is closed
    ///
    /// Examples:
    ///   mb dep add bd-1a2b bd-3c4d
    Add {
        /// Issue that waits (CHILD)
        child: String,
        /// Issue that must finish first (PARENT)
        parent: String,
    },

    /// Remove a dependency
    Rm { child: String, parent: String },

    /// Show the dependency tree of an issue
    Tree { id: String },
}
