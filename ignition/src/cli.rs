use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::launch::PullPolicy;

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)] // read from Cargo.toml
pub struct Cli {
    /// Descriptor file, looked up in the working directory by default
    #[arg(
        global = true,
        env = "IGNITION_FILE",
        short = 'f',
        long = "file",
        value_name = "path"
    )]
    pub file: Option<PathBuf>,

    /// Project name, defaults to the descriptor `name` or its directory name
    #[arg(
        global = true,
        env = "IGNITION_PROJECT_NAME",
        short = 'p',
        long = "project-name",
        value_name = "name"
    )]
    pub project_name: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Clone, Debug, Subcommand)]
pub enum Command {
    /// Create and start the declared services
    Up(UpArgs),

    /// Stop and remove the containers of the project
    Down,

    /// Validate the descriptor and print the resolved project
    Config,
}

#[derive(Clone, Debug, Args)]
pub struct UpArgs {
    /// Return once the services are started instead of following their logs
    #[arg(env = "IGNITION_DETACH", short = 'd', long = "detach")]
    pub detach: bool,

    /// When to pull service images: missing, always or never
    #[arg(
        env = "IGNITION_PULL_POLICY",
        long = "pull",
        value_name = "policy",
        default_value_t = PullPolicy::Missing
    )]
    pub pull: PullPolicy,

    /// Remove project containers of services no longer declared
    #[arg(env = "IGNITION_REMOVE_ORPHANS", long = "remove-orphans")]
    pub remove_orphans: bool,
}

pub fn parse() -> Cli {
    Parser::parse()
}
