//! # myutils
//!
//! Command-line front end for the utility library: one-shot completions
//! against the unified LLM endpoint and inspection of the model config.

use clap::Parser;
use myutils::cli::{self, Cli, Commands};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG controls verbosity, e.g. RUST_LOG=myutils=debug
    fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli_args = Cli::parse();

    match cli_args.command {
        Commands::Complete(args) => {
            if let Err(e) = cli::handle_complete(args).await {
                eprintln!("Error running completion: {:?}", e);
                std::process::exit(1);
            }
        }
        Commands::ShowConfig(args) => {
            if let Err(e) = cli::handle_show_config(args).await {
                eprintln!("Error showing config: {:?}", e);
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
