//! httpkit CLI application
//!
//! Command-line interface for fetching URLs through the request engine and
//! managing its disk cache.

use std::process;

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use httpkit::cli::{handle_cache, handle_fetch, Cli, Commands};
use httpkit::config::AppConfig;
use httpkit::errors::Result;

#[tokio::main]
async fn main() {
    let result = run().await;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Main application logic
async fn run() -> Result<()> {
    let cli = Cli::parse_args();
    let config = AppConfig::load(cli.global.config.clone()).await;

    let level = match &config {
        Ok(config) => cli.log_level(&config.logging.level),
        Err(_) => cli.log_level("info"),
    };
    let colored = config.as_ref().map_or(true, |c| c.logging.colored_output);
    init_logging(&cli, &level, colored);
    let config = config?;

    info!("httpkit v{} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Fetch(args) => {
            info!("Executing fetch command");
            handle_fetch(args, &cli.global, &config).await
        }
        Commands::Cache(args) => {
            info!("Executing cache command");
            handle_cache(args, &cli.global, &config).await
        }
    }
}

/// Initialize logging based on CLI verbosity and configuration
fn init_logging(cli: &Cli, level: &str, colored: bool) {
    let mut filter = EnvFilter::from_default_env();
    match format!("httpkit={}", level).parse() {
        Ok(directive) => filter = filter.add_directive(directive),
        Err(e) => eprintln!("Ignoring invalid log level '{}': {}", level, e),
    }

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(colored)
        .with_level(cli.global.very_verbose)
        .init();

    if cli.global.very_verbose {
        info!("Very verbose logging enabled");
    } else if cli.global.verbose {
        info!("Verbose logging enabled");
    }
}
