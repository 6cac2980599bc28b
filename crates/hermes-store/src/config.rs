use std::path::PathBuf;

use hermes_core::AppError;

pub const DEFAULT_JOBS_FILE: &str = "jobs_data.json";

/// Configuration for job snapshot persistence.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read configuration from environment variables.
    ///
    /// - `HERMES_JOBS_FILE` (optional, defaults to `jobs_data.json`)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_value(std::env::var("HERMES_JOBS_FILE").ok())
    }

    fn from_value(raw: Option<String>) -> Result<Self, AppError> {
        match raw {
            None => Ok(Self::new(DEFAULT_JOBS_FILE)),
            Some(raw) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Err(AppError::ConfigError(
                        "HERMES_JOBS_FILE is set but empty".into(),
                    ));
                }
                if trimmed.ends_with('/') {
                    return Err(AppError::ConfigError(format!(
                        "HERMES_JOBS_FILE '{trimmed}' must name a file, not a directory"
                    )));
                }
                Ok(Self::new(trimmed))
            }
        }
    }
}
