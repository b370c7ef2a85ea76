use crate::error::InventoryError;

/// Runtime configuration, assembled once at startup and passed by
/// reference to the components that need it.
#[derive(Debug, Clone)]
pub struct Config {
    /// API key for the vision model endpoint.
    pub api_key: String,
    /// Vision model identifier.
    pub model: String,
    /// SQLite database path.
    pub db_path: String,
    /// Log level used when no RUST_LOG filter is set.
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// A missing `GOOGLE_API_KEY` is a startup failure, not something to
    /// discover halfway through a batch.
    pub fn from_env() -> Result<Config, InventoryError> {
        let api_key = std::env::var("GOOGLE_API_KEY").map_err(|_| {
            InventoryError::Config("GOOGLE_API_KEY environment variable is not set".to_string())
        })?;
        Ok(Config {
            api_key,
            model: std::env::var("SPINES_MODEL").unwrap_or_else(|_| "gemini-1.5-flash".to_string()),
            db_path: std::env::var("SPINES_DB").unwrap_or_else(|_| "spines.db".to_string()),
            log_level: std::env::var("SPINES_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}
