mod cli;
mod config;
mod error;
mod fanout;
mod http;
mod model;
mod providers;
mod util;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("extract") => cli::handle_extract(&args[1..]).await,
        Some("complete") => cli::handle_complete(&args[1..]).await,
        Some("help" | "-h" | "--help") => {
            cli::print_help();
            Ok(())
        }
        // bare flags go straight to extract
        Some(flag) if flag.starts_with('-') => cli::handle_extract(&args).await,
        None => cli::handle_extract(&[]).await,
        Some(other) => {
            cli::print_help();
            anyhow::bail!("Unknown command: {other}")
        }
    }
}
