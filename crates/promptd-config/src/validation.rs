// SPDX-FileCopyrightText: 2026 Promptd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.

use crate::diagnostic::ConfigError;
use crate::model::PromptdConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration.
///
/// Collects every failure instead of stopping at the first one.
pub fn validate_config(config: &PromptdConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let level = config.daemon.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ConfigError::validation(format!(
            "daemon.log_level `{}` is not one of {}",
            config.daemon.log_level,
            LOG_LEVELS.join(", ")
        )));
    }

    let host = config.server.host.trim();
    if host.is_empty() {
        errors.push(ConfigError::validation("server.host must not be empty"));
    } else if host.parse::<std::net::IpAddr>().is_err()
        && !host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        errors.push(ConfigError::validation(format!(
            "server.host `{host}` is not a valid IP address or hostname"
        )));
    }

    if config.server.port == 0 {
        errors.push(ConfigError::validation("server.port must not be 0"));
    }

    if config.server.sse_poll_interval_ms < 10 {
        errors.push(ConfigError::validation(format!(
            "server.sse_poll_interval_ms must be at least 10, got {}",
            config.server.sse_poll_interval_ms
        )));
    }

    if let Some(token) = &config.server.bearer_token
        && token.trim().is_empty()
    {
        errors.push(ConfigError::validation(
            "server.bearer_token must not be empty when set",
        ));
    }

    let base_url = config.backend.base_url.trim();
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        errors.push(ConfigError::validation(format!(
            "backend.base_url `{base_url}` must start with http:// or https://"
        )));
    }

    if config.backend.model.trim().is_empty() {
        errors.push(ConfigError::validation("backend.model must not be empty"));
    }

    if config.backend.request_timeout_secs == 0 {
        errors.push(ConfigError::validation(
            "backend.request_timeout_secs must be greater than 0",
        ));
    }

    if let Some(path) = &config.storage.database_path
        && path.trim().is_empty()
    {
        errors.push(ConfigError::validation(
            "storage.database_path must not be empty when set",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_message(errors: &[ConfigError], needle: &str) -> bool {
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains(needle)))
    }

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&PromptdConfig::default()).is_ok());
    }

    #[test]
    fn bad_base_url_fails() {
        let mut config = PromptdConfig::default();
        config.backend.base_url = "localhost:11434".into();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "backend.base_url"));
    }

    #[test]
    fn unknown_log_level_fails() {
        let mut config = PromptdConfig::default();
        config.daemon.log_level = "loud".into();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "daemon.log_level"));
    }

    #[test]
    fn log_level_is_case_insensitive() {
        let mut config = PromptdConfig::default();
        config.daemon.log_level = "DEBUG".into();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn collects_all_errors() {
        let mut config = PromptdConfig::default();
        config.server.port = 0;
        config.backend.model = "  ".into();
        config.backend.request_timeout_secs = 0;
        config.server.sse_poll_interval_ms = 1;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn empty_optional_strings_fail() {
        let mut config = PromptdConfig::default();
        config.server.bearer_token = Some(String::new());
        config.storage.database_path = Some(" ".into());
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "bearer_token"));
        assert!(has_message(&errors, "database_path"));
    }
}
