// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks semantic constraints serde cannot express: non-zero windows and
//! batch sizes, bounded retry counts, positive TTLs.

use courier_core::CacheType;
use strum::IntoEnumIterator;

use crate::diagnostic::ConfigError;
use crate::model::CourierConfig;

/// Upper bound on `delivery.max_retries`; beyond this the backoff exceeds any useful wait.
pub const MAX_RETRIES_LIMIT: u32 = 10;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration.
///
/// Collects every violation rather than stopping at the first.
pub fn validate_config(config: &CourierConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let client = &config.client;
    if client.device_id.trim().is_empty() {
        errors.push(ConfigError::validation("client.device_id must not be empty"));
    } else if !client
        .device_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        errors.push(ConfigError::validation(format!(
            "client.device_id `{}` may only contain ASCII letters, digits, `-` and `_`",
            client.device_id
        )));
    }

    if !LOG_LEVELS.contains(&client.log_level.as_str()) {
        errors.push(ConfigError::validation(format!(
            "client.log_level `{}` must be one of: {}",
            client.log_level,
            LOG_LEVELS.join(", ")
        )));
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::validation(
            "storage.database_path must not be empty",
        ));
    }

    let delivery = &config.delivery;
    if delivery.max_retries > MAX_RETRIES_LIMIT {
        errors.push(ConfigError::validation(format!(
            "delivery.max_retries must be at most {MAX_RETRIES_LIMIT}, got {}",
            delivery.max_retries
        )));
    }
    require_non_zero(&mut errors, "delivery.backoff_base_ms", delivery.backoff_base_ms);
    require_non_zero(&mut errors, "delivery.retry_tick_ms", delivery.retry_tick_ms);

    let batcher = &config.batcher;
    require_non_zero(
        &mut errors,
        "batcher.preview_debounce_ms",
        batcher.preview_debounce_ms,
    );
    require_non_zero(
        &mut errors,
        "batcher.local_cache_debounce_ms",
        batcher.local_cache_debounce_ms,
    );
    require_non_zero(
        &mut errors,
        "batcher.local_cache_limit",
        batcher.local_cache_limit as u64,
    );

    let cache = &config.cache;
    require_non_zero(&mut errors, "cache.batch_chunk_size", cache.batch_chunk_size as u64);
    require_non_zero(
        &mut errors,
        "cache.cleanup_batch_size",
        cache.cleanup_batch_size as u64,
    );
    require_non_zero(
        &mut errors,
        "cache.cleanup_interval_secs",
        cache.cleanup_interval_secs,
    );
    for kind in CacheType::iter() {
        if cache.ttl_secs.ttl_for(kind).is_zero() {
            errors.push(ConfigError::validation(format!(
                "cache.ttl_secs.{kind} must be greater than zero"
            )));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn require_non_zero(errors: &mut Vec<ConfigError>, key: &str, value: u64) {
    if value == 0 {
        errors.push(ConfigError::validation(format!(
            "{key} must be greater than zero"
        )));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(errors: &[ConfigError]) -> Vec<String> {
        errors.iter().map(|e| e.to_string()).collect()
    }

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&CourierConfig::default()).is_ok());
    }

    #[test]
    fn empty_database_path_is_rejected() {
        let mut config = CourierConfig::default();
        config.storage.database_path = "  ".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(messages(&errors)[0].contains("storage.database_path"));
    }

    #[test]
    fn max_retries_above_limit_is_rejected() {
        let mut config = CourierConfig::default();
        config.delivery.max_retries = 11;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(messages(&errors)[0].contains("at most 10"));
    }

    #[test]
    fn max_retries_of_zero_is_allowed() {
        let mut config = CourierConfig::default();
        config.delivery.max_retries = 0;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn all_violations_are_collected() {
        let mut config = CourierConfig::default();
        config.batcher.preview_debounce_ms = 0;
        config.cache.batch_chunk_size = 0;
        config.cache.ttl_secs.summary = 0;
        config.client.log_level = "loud".to_string();
        let errors = validate_config(&config).unwrap_err();
        let text = messages(&errors).join("\n");
        assert_eq!(errors.len(), 4, "{text}");
        assert!(text.contains("batcher.preview_debounce_ms"));
        assert!(text.contains("cache.batch_chunk_size"));
        assert!(text.contains("cache.ttl_secs.summary"));
        assert!(text.contains("client.log_level"));
    }

    #[test]
    fn device_id_with_separator_characters_is_rejected() {
        let mut config = CourierConfig::default();
        config.client.device_id = "phone/1".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(messages(&errors)[0].contains("client.device_id"));
    }
}
