use crate::config::types::{Config, CrawlerConfig, StorageConfig, UserAgentConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_storage_config(&config.storage)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.request_timeout_secs < 1 || config.request_timeout_secs > 300 {
        return Err(ConfigError::Validation(format!(
            "request_timeout_secs must be between 1 and 300, got {}",
            config.request_timeout_secs
        )));
    }

    if config.max_concurrent_crawls < 1 || config.max_concurrent_crawls > 64 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_crawls must be between 1 and 64, got {}",
            config.max_concurrent_crawls
        )));
    }

    if config.default_max_links < 1 {
        return Err(ConfigError::Validation(format!(
            "default_max_links must be >= 1, got {}",
            config.default_max_links
        )));
    }

    if config.heartbeat_interval_secs < 1 || config.heartbeat_interval_secs > 300 {
        return Err(ConfigError::Validation(format!(
            "heartbeat_interval_secs must be between 1 and 300, got {}",
            config.heartbeat_interval_secs
        )));
    }

    // A live worker must miss several beats before it looks orphaned
    if config.stale_task_secs < config.heartbeat_interval_secs * 3 {
        return Err(ConfigError::Validation(format!(
            "stale_task_secs must be at least 3x heartbeat_interval_secs ({}), got {}",
            config.heartbeat_interval_secs * 3,
            config.stale_task_secs
        )));
    }

    for extension in &config.excluded_extensions {
        if extension.len() < 2 || !extension.starts_with('.') {
            return Err(ConfigError::Validation(format!(
                "excluded extension must look like '.ext', got '{}'",
                extension
            )));
        }
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates storage configuration
fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.download_dir.is_empty() {
        return Err(ConfigError::Validation(
            "download_dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let (local, domain) = email.split_once('@').ok_or_else(|| {
        ConfigError::Validation(format!("Invalid email format: '{}'", email))
    })?;

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
