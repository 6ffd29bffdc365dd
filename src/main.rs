// Airtouch command-line entry point

use std::process::ExitCode;

use airtouch_lib::config::Cli;
use clap::Parser;
use log::LevelFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Cli::parse().into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("airtouch: {}", e);
            return ExitCode::from(2);
        }
    };

    let level = config.log_level_filter().unwrap_or(LevelFilter::Info);
    if let Err(e) = airtouch_lib::logging::init(level) {
        eprintln!("airtouch: logger already initialized: {}", e);
    }

    match airtouch_lib::run(config, true).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
