//! CLI smoke entry point.
//!
//! Loads configuration, opens the database (applying migrations) and prints
//! what the service would run with. Usage: `route_builder_cli [config.toml]`.

use route_builder_core::config::AppConfig;
use route_builder_core::db::migrations::schema_version;
use route_builder_core::logging::init_from_config;
use route_builder_core::{core_version, open_db};
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("route_builder_cli: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())?;
    let logging = init_from_config(&config.log)?;

    let conn = open_db(&config.database_path)?;
    println!("route_builder_core version={}", core_version());
    println!(
        "database path={} schema_version={}",
        config.database_path.display(),
        schema_version(&conn)?
    );
    println!(
        "broker url={} queue={} prefetch={} reply_timeout_secs={}",
        config.broker.url_redacted(),
        config.broker.queue,
        config.broker.prefetch_count,
        config.broker.reply_timeout_secs
    );
    println!("logging active={logging}");
    Ok(())
}
