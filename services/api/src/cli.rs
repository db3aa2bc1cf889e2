use crate::jobs::{run_audit, run_rescore, RescoreArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use opportunity_ranker::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Opportunity Ranker",
    about = "Score buildings by elevator modernization opportunity and serve the ranked pipeline",
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
    /// Recompute and persist the score of every building
    Rescore(RescoreArgs),
    /// List opportunities whose stored priority disagrees with their score
    Audit,
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Rescore(args) => run_rescore(args).await,
        Command::Audit => run_audit().await,
    }
}
