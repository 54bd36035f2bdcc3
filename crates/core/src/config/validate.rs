use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Event channel capacity is not 0
/// - Progress weights sum to 100, including per-type overrides
/// - Paths are not empty
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.events.capacity == 0 {
        return Err(ConfigError::ValidationError(
            "events.capacity cannot be 0".to_string(),
        ));
    }

    if !config.analyzers.progress.is_valid() {
        return Err(ConfigError::ValidationError(
            "analyzers.progress weights must sum to 100".to_string(),
        ));
    }

    for (analysis_type, weights) in &config.analyzers.progress_overrides {
        if !weights.is_valid() {
            return Err(ConfigError::ValidationError(format!(
                "analyzers.progress_overrides.{analysis_type} weights must sum to 100"
            )));
        }
    }

    if config.database.path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "database.path cannot be empty".to_string(),
        ));
    }

    if config.output.root.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "output.root cannot be empty".to_string(),
        ));
    }

    Ok(())
}
