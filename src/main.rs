//! VahanaIO - differential-drive base driver daemon
//!
//! Exchanges ASCII-framed messages with the base microcontroller over a
//! serial link, publishes odometry over TCP, and accepts velocity commands
//! over TCP. Runs until SIGINT/SIGTERM and always leaves the base stopped.

use std::env;
use std::path::Path;
use std::process;
use vahana_io::app::App;
use vahana_io::config::AppConfig;

/// Default configuration path when none is given
const DEFAULT_CONFIG_PATH: &str = "/etc/vahana-io.toml";

/// Parse config path from command line arguments.
///
/// Supports:
/// - `vahana-io <path>` (positional)
/// - `vahana-io --config <path>` (flag-based)
/// - `vahana-io -c <path>` (short flag)
fn parse_config_path() -> String {
    let args: Vec<String> = env::args().collect();

    // Look for --config or -c flag
    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }

    // Fall back to first positional argument (if it doesn't start with -)
    if args.len() > 1 && !args[1].starts_with('-') {
        return args[1].clone();
    }

    DEFAULT_CONFIG_PATH.to_string()
}

fn main() {
    let config_path = parse_config_path();

    // Every key has a default, so a missing default-path file just means
    // "run with defaults"; an unreadable or invalid file is an error
    let config = if Path::new(&config_path).exists() {
        match AppConfig::from_file(&config_path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config {}: {}", config_path, e);
                process::exit(1);
            }
        }
    } else if config_path == DEFAULT_CONFIG_PATH {
        AppConfig::default()
    } else {
        eprintln!("Config file not found: {}", config_path);
        process::exit(1);
    };

    // Initialize logger (RUST_LOG overrides the configured level)
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    log::info!("VahanaIO v{} starting...", env!("CARGO_PKG_VERSION"));
    log::info!("Using config: {}", config_path);
    log::info!(
        "Serial: {} at {} baud (timeout {}ms)",
        config.serial.port,
        config.serial.baud_rate,
        config.serial.timeout_ms
    );
    log::info!(
        "Rates: control {:.0}Hz, odometry {:.0}Hz, command timeout {:.2}s",
        config.timing.control_rate_hz,
        config.timing.odom_rate_hz,
        config.timing.cmd_timeout_s
    );

    let mut app = match App::new(config) {
        Ok(app) => app,
        Err(e) => {
            log::error!("Initialization failed: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = app.run() {
        log::error!("Runtime error: {}", e);
        process::exit(1);
    }
}
