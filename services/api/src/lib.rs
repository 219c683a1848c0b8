//! HTTP service and command-line entry points for the casework compliance engine.

mod cli;
mod demo;
mod infra;
mod routes;
mod rules;
mod server;

use casework::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
