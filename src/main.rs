use std::str::FromStr;
use dotenv::dotenv;
use log::error;
use pepal_helper::{server, Config};
use simplelog::{ColorChoice, ConfigBuilder, LevelFilter, TermLogger, TerminalMode};

// Entry point for the async main function, powered by tokio runtime.
#[tokio::main]
async fn main() {
    // Loads environment variables from a `.env` file, if present.
    dotenv().ok();

    let level = std::env::var("LOG_LEVEL")
        .ok()
        .and_then(|raw| LevelFilter::from_str(&raw).ok())
        .unwrap_or(LevelFilter::Info);

    // Terminal logging, mixed stdout/stderr output with automatic color support.
    if let Err(e) = TermLogger::init(
        level,
        ConfigBuilder::new().set_time_format_rfc3339().build(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    ) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server::start(&config).await {
        error!("Server stopped: {:#}", e);
        std::process::exit(1);
    }
}
