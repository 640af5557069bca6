use crate::commands::{run_calculate, run_pulse, CalculateArgs, PulseArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use rent_linkage::error::AppError;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Rent Linkage",
    about = "Link lease rents to published price and currency indices",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Link a single rent from the command line
    Calculate(CalculateArgs),
    /// Show the latest figure of every index
    Pulse(PulseArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// CSV of index figures to serve (overrides INDEX_DATA_CSV)
    #[arg(long)]
    pub(crate) data: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Calculate(args) => run_calculate(args).await,
        Command::Pulse(args) => run_pulse(args).await,
    }
}
