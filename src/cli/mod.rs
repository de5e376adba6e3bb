use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "colloquy", about = "Meeting service backend", version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand)]
pub enum CliCommand {
    /// Run the API server and transcript job runner (default)
    Serve,
    /// Print version information
    Version,
    /// Print resolved config and data paths
    Paths,
}
