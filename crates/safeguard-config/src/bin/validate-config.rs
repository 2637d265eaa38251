//! Config validation CLI tool
//!
//! Validates a safeguardd configuration file and reports any errors.

use safeguard_util::{default_config_path, format_duration};
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a safeguardd configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            eprintln!();
            eprintln!("Example:");
            eprintln!("  validate-config {}", default_path.display());
            eprintln!("  validate-config config.example.toml");
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match safeguard_config::load_config(&config_path) {
        Ok(settings) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", safeguard_config::CURRENT_CONFIG_VERSION);
            println!("  Backend: {}", settings.api.base_url);
            println!("  Token file: {}", settings.api.token_file.display());
            println!("  Socket: {}", settings.service.socket_path.display());
            println!();
            println!("SOS:");
            println!("  Countdown: {}s", settings.sos.countdown_seconds);
            println!(
                "  Location timeout: {}ms (grace {}ms)",
                settings.sos.location_timeout.as_millis(),
                settings.sos.location_grace.as_millis()
            );
            println!("  Alert message: {}", settings.sos.alert_message);
            println!();
            println!("Sessions:");
            println!(
                "  Evaluation interval: {}",
                format_duration(settings.sessions.tick_interval)
            );
            println!(
                "  Retry interval: {}",
                format_duration(settings.sessions.retry_interval)
            );
            println!(
                "  Max duration: {} minutes",
                settings.sessions.max_duration_minutes
            );

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                safeguard_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                safeguard_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                safeguard_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                safeguard_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        safeguard_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
