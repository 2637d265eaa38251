//! Default paths for safeguard components
//!
//! Paths are user-writable by default:
//! - Socket: `$XDG_RUNTIME_DIR/safeguard/safeguardd.sock` or `/tmp/safeguard-$USER/safeguardd.sock`
//! - Data: `$XDG_DATA_HOME/safeguard` or `~/.local/share/safeguard`
//! - Config: `$XDG_CONFIG_HOME/safeguard/config.toml` or `~/.config/safeguard/config.toml`

use std::path::PathBuf;

/// Environment variable for overriding the socket path
pub const SAFEGUARD_SOCKET_ENV: &str = "SAFEGUARD_SOCKET";

/// Environment variable for overriding the data directory
pub const SAFEGUARD_DATA_DIR_ENV: &str = "SAFEGUARD_DATA_DIR";

const SOCKET_FILENAME: &str = "safeguardd.sock";
const CONFIG_FILENAME: &str = "config.toml";
const TOKEN_FILENAME: &str = "token";
const APP_DIR: &str = "safeguard";

fn home_dir(parts: &[&str]) -> Option<PathBuf> {
    let home = std::env::var("HOME").ok()?;
    let mut path = PathBuf::from(home);
    for part in parts {
        path.push(part);
    }
    Some(path.join(APP_DIR))
}

/// Get the default socket path.
///
/// Order of precedence:
/// 1. `$SAFEGUARD_SOCKET`
/// 2. `$XDG_RUNTIME_DIR/safeguard/safeguardd.sock`
/// 3. `/tmp/safeguard-$USER/safeguardd.sock`
pub fn default_socket_path() -> PathBuf {
    if let Ok(path) = std::env::var(SAFEGUARD_SOCKET_ENV) {
        return PathBuf::from(path);
    }

    socket_path_without_env()
}

/// Socket path ignoring `$SAFEGUARD_SOCKET`, for config defaults where the
/// env var is handled by the CLI layer
pub fn socket_path_without_env() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join(APP_DIR).join(SOCKET_FILENAME);
    }

    let username = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    PathBuf::from(format!("/tmp/{}-{}", APP_DIR, username)).join(SOCKET_FILENAME)
}

/// Get the default data directory (`$SAFEGUARD_DATA_DIR` wins)
pub fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(SAFEGUARD_DATA_DIR_ENV) {
        return PathBuf::from(path);
    }

    data_dir_without_env()
}

pub fn data_dir_without_env() -> PathBuf {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    home_dir(&[".local", "share"]).unwrap_or_else(|| PathBuf::from("/tmp").join(APP_DIR).join("data"))
}

/// Default configuration file location
pub fn default_config_path() -> PathBuf {
    let dir = match std::env::var("XDG_CONFIG_HOME") {
        Ok(config_home) => PathBuf::from(config_home).join(APP_DIR),
        Err(_) => home_dir(&[".config"]).unwrap_or_else(|| PathBuf::from("/etc").join(APP_DIR)),
    };
    dir.join(CONFIG_FILENAME)
}

/// Default bearer-token file, written by the login flow
pub fn default_token_path() -> PathBuf {
    data_dir_without_env().join(TOKEN_FILENAME)
}
