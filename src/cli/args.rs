//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueHint};

use crate::config::OutputFormat;
use crate::domain::PathStrategy;

/// Identifiability and numerical diagnostics for fitted phylogenetic substitution models
#[derive(Parser, Debug)]
#[command(name = "phylim")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Log verbosity: -d info, -dd debug, -ddd trace
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub debug: u8,

    /// Config file layered over the global config
    #[arg(short, long, global = true, env = "PHYLIM_CONFIG", value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Output format (overrides config)
    #[arg(short, long, global = true, value_enum)]
    pub format: Option<OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

fn parse_strategy(s: &str) -> Result<PathStrategy, String> {
    s.parse()
}

/// Flags shared by the commands that run the identifiability check.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct IdentArgs {
    /// Treat identity matrices as fatal
    #[arg(long)]
    pub strict: bool,

    /// Path test formulation: path-union or rerooting
    #[arg(long, value_parser = parse_strategy)]
    pub strategy: Option<PathStrategy>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check identifiability of fits (exit 1 if any is not identifiable)
    Check {
        /// Fit files or directories of fit files
        #[arg(required = true, value_hint = ValueHint::AnyPath)]
        fits: Vec<PathBuf>,
        #[command(flatten)]
        ident: IdentArgs,
    },

    /// Classify every branch matrix of a fit
    Classify {
        /// Fit file
        #[arg(value_hint = ValueHint::FilePath)]
        fit: PathBuf,
        /// Relative tolerance
        #[arg(long)]
        rtol: Option<f64>,
        /// Absolute tolerance
        #[arg(long)]
        atol: Option<f64>,
    },

    /// Build full records for many fits in parallel
    Record {
        /// Fit files or directories of fit files
        #[arg(required = true, value_hint = ValueHint::AnyPath)]
        inputs: Vec<PathBuf>,
        #[command(flatten)]
        ident: IdentArgs,
        /// Worker threads
        #[arg(short, long)]
        jobs: Option<usize>,
        /// Write one record file per fit into this directory
        #[arg(short, long, value_hint = ValueHint::DirPath)]
        output: Option<PathBuf>,
    },

    /// Report parameters fitted on their bounds
    Boundary {
        /// Fit file
        #[arg(value_hint = ValueHint::FilePath)]
        fit: PathBuf,
        /// Distance from a bound counted as hitting it
        #[arg(long)]
        tolerance: Option<f64>,
    },

    /// Show a fit's tree, optionally rerooted
    Tree {
        /// Fit file (branches are labelled with their category)
        #[arg(value_hint = ValueHint::FilePath, required_unless_present = "newick")]
        fit: Option<PathBuf>,
        /// Newick string instead of a fit file
        #[arg(long, conflicts_with = "fit")]
        newick: Option<String>,
        /// Internal node to reroot at
        #[arg(long)]
        reroot: Option<String>,
        /// Print newick instead of the ASCII tree
        #[arg(long)]
        as_newick: bool,
    },

    /// Manage settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show merged config
    Show,

    /// Print config template
    Template,

    /// Show config paths
    Path,
}
