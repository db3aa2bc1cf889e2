mod cli;
mod infra;
mod jobs;
mod routes;
mod server;

use opportunity_ranker::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
