//! tty-harness — boots a sandbox, bridges its console to this process and
//! runs a test guest against a locally built artifact.

pub mod artifact;
pub mod config;
pub mod guest;
pub mod launcher;

use std::path::PathBuf;

use anyhow::Result;
pub use clap::Parser;
use clap::{Args, Subcommand};
use sandbox_tty::HostStreams;
use tracing::info;

pub use artifact::{find_artifact, Artifact, ArtifactError};
pub use config::{load_config, HarnessConfig};
pub use guest::{EchoGuest, Guest};
pub use launcher::Launcher;

#[derive(Parser)]
#[command(author, version, about = "Run a test guest in a sandbox wired to this terminal", long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the artifact that would be tested
    Locate(LocateArgs),
    /// Boot the sandbox and run the tests
    Run(RunArgs),
}

impl Commands {
    /// Returns the process exit code
    pub async fn run(&self) -> Result<i32> {
        match self {
            Commands::Locate(args) => args.run().await,
            Commands::Run(args) => args.run().await,
        }
    }
}

#[derive(Args)]
pub struct LocateArgs {
    /// Package directory containing `dist/`
    pub pkg_dir: PathBuf,

    /// Configuration file (JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

impl LocateArgs {
    pub async fn run(&self) -> Result<i32> {
        let launcher = Launcher::new(load_config(self.config.as_deref())?);
        let artifact = launcher.locate(&self.pkg_dir).await?;
        println!("{}", artifact.path().display());
        Ok(0)
    }
}

#[derive(Args)]
pub struct RunArgs {
    /// Package directory containing `dist/`
    pub pkg_dir: PathBuf,

    /// Configuration file (JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Copy stdin to stdout inside the sandbox after printing the arguments
    #[arg(long)]
    pub echo_stdin: bool,

    /// Arguments forwarded verbatim to the test entry point
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub test_args: Vec<String>,
}

impl RunArgs {
    pub async fn run(&self) -> Result<i32> {
        let launcher = Launcher::new(load_config(self.config.as_deref())?);
        let artifact = launcher.locate(&self.pkg_dir).await?;
        info!("Testing {}", artifact.path().display());

        let mut guest = EchoGuest::new(self.echo_stdin);
        launcher.execute(&artifact, &self.test_args, &mut guest, HostStreams::process())
    }
}
