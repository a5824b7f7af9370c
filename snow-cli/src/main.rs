//! Snow CLI Entry Point
//!
//! Configuration is loaded from environment variables (via .env file).
//! Command-line arguments override environment variables.
//!
//! Usage:
//!   snow batch        - Configure and inspect draw batches
//!   snow participant  - Register participants and manage eligibility
//!   snow draw         - Draw winners
//!   snow verify       - Verify a winning code
//!   snow winners      - List winners

use clap::Parser;
use snow_cli::{handler, Cli};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Load .env file (ignore if not found)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if cli.verbose {
        init_logging();
    }

    if let Err(e) = handler::run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

/// Initialize logging with tracing
fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "snow_cli=debug,snow_draw=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
