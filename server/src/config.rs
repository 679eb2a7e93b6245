//! Configuration management for the server.

use std::env;
use std::path::PathBuf;

/// Page size used when neither the request nor the list names one.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// JSON file the backing lists are seeded from
    pub lists_path: Option<PathBuf>,
    /// Bearer token required to mutate lists; None leaves them open
    pub auth_secret: Option<String>,
    /// Items per page for lists that do not set their own
    pub default_page_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            lists_path: None,
            auth_secret: None,
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let lists_path = env::var("LISTS_PATH").ok().map(PathBuf::from);

        let auth_secret = env::var("AUTH_SECRET").ok().filter(|s| !s.is_empty());

        let default_page_size = match env::var("DEFAULT_PAGE_SIZE") {
            Ok(value) => value
                .parse()
                .ok()
                .filter(|&size: &usize| size > 0)
                .ok_or(ConfigError::InvalidPageSize)?,
            Err(_) => DEFAULT_PAGE_SIZE,
        };

        Ok(Self {
            host,
            port,
            lists_path,
            auth_secret,
            default_page_size,
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid PORT value")]
    InvalidPort,

    #[error("DEFAULT_PAGE_SIZE must be a positive integer")]
    InvalidPageSize,
}
