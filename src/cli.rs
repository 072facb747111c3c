use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "iamsync")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Converge declared IAM resources with an account", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// State file to use instead of the configured one
    #[arg(long, global = true, env = "IAMSYNC_STATE_FILE")]
    pub state: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create, update or replace resources to match a manifest
    Apply(ApplyArgs),

    /// Tear down managed resources (all of them when no id is given)
    Destroy(DestroyArgs),

    /// Show the observed state of one managed resource
    Read {
        /// Resource id from the manifest
        id: String,
    },

    /// List managed resources
    List,

    /// List supported resource types
    Types,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Manifest file (TOML)
    pub manifest: PathBuf,

    /// Show what would change without touching the account
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args)]
pub struct DestroyArgs {
    /// Resource id; omit to destroy everything
    pub id: Option<String>,

    /// Show what would be destroyed without touching the account
    #[arg(long)]
    pub dry_run: bool,
}
