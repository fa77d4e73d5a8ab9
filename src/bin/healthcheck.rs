//! Exits 0 when the API answers its health route with a 2xx, 1 otherwise.

use std::process::ExitCode;

use clap::Parser;
use meme_generator::client::{probe, ApiClient, DEFAULT_API_URL};

#[derive(Parser, Debug)]
#[command(name = "healthcheck", about = "Liveness probe for the meme generator API")]
struct Args {
    /// Base URL of the API
    #[arg(long, env = "MEME_API_URL", default_value = DEFAULT_API_URL)]
    url: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let outcome = probe::probe(&ApiClient::new(args.url)).await;
    ExitCode::from(outcome.exit_code())
}
