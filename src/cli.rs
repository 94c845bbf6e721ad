use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mdtctl")]
#[command(version)]
#[command(about = "Declarative management of MDT deployment shares", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Reconcile a request document against the share
    Apply(ApplyArgs),

    /// Preview what apply would change, without touching the share
    Plan(PlanArgs),

    /// Show the current state of share entities
    Show(ShowArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(clap::Args)]
pub struct ApplyArgs {
    /// The request document to apply
    pub file: PathBuf,

    /// Compute and report changes without applying them
    #[arg(long)]
    pub check: bool,

    /// Deployment share path; overrides the document and the config file
    #[arg(long)]
    pub share: Option<PathBuf>,

    /// Emit results as JSON instead of human-readable lines
    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args)]
pub struct PlanArgs {
    /// The request document to preview
    pub file: PathBuf,

    /// Deployment share path; overrides the document and the config file
    #[arg(long)]
    pub share: Option<PathBuf>,

    /// Emit results as JSON instead of human-readable lines
    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args)]
pub struct ShowArgs {
    /// Entity kind to show
    #[arg(value_enum)]
    pub kind: ShowKind,

    /// Select one entity by GUID
    #[arg(long, conflicts_with = "name")]
    pub guid: Option<String>,

    /// Select one entity by name
    #[arg(long)]
    pub name: Option<String>,

    /// Deployment share path; overrides the config file
    #[arg(long)]
    pub share: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ShowKind {
    Applications,
    OperatingSystems,
    Drivers,
    TaskSequences,
    SelectionProfiles,
}
