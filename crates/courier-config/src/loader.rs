// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading with Figment.
//!
//! Lookup order: `/etc/courier/courier.toml`, then
//! `~/.config/courier/courier.toml`, then `./courier.toml`, then `COURIER_*`
//! environment variables. Later layers override earlier ones.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::CourierConfig;

/// Config sections addressable from the environment.
const ENV_SECTIONS: &[&str] = &["client", "storage", "delivery", "batcher", "cache"];

pub(crate) const SYSTEM_CONFIG_PATH: &str = "/etc/courier/courier.toml";
pub(crate) const LOCAL_CONFIG_PATH: &str = "courier.toml";

pub(crate) fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("courier").join("courier.toml"))
}

/// Figment with every standard layer merged, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(CourierConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG_PATH))
        .merge(env_provider())
}

/// Load configuration from the standard hierarchy with env var overrides.
pub fn load_config() -> Result<CourierConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from an explicit file, still honouring env overrides.
pub fn load_config_from_path(path: &Path) -> Result<CourierConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CourierConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Load configuration from an inline TOML document. No files, no environment.
pub fn load_config_from_str(toml_content: &str) -> Result<CourierConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CourierConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// `COURIER_<SECTION>_<KEY>` maps to `<section>.<key>`.
///
/// Only the first underscore after the section name is a separator, so
/// `COURIER_DELIVERY_MAX_RETRIES` becomes `delivery.max_retries`. The nested
/// TTL table is reached with `COURIER_CACHE_TTL_SECS_<KIND>`.
fn env_provider() -> Env {
    Env::prefixed("COURIER_").map(|key| map_env_key(key.as_str()).into())
}

fn map_env_key(key: &str) -> String {
    for section in ENV_SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|r| r.strip_prefix('_'))
        {
            if *section == "cache"
                && let Some(kind) = rest.strip_prefix("ttl_secs_")
            {
                return format!("cache.ttl_secs.{kind}");
            }
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_split_on_section_only() {
        assert_eq!(map_env_key("delivery_max_retries"), "delivery.max_retries");
        assert_eq!(
            map_env_key("batcher_local_cache_limit"),
            "batcher.local_cache_limit"
        );
        assert_eq!(map_env_key("client_device_id"), "client.device_id");
    }

    #[test]
    fn env_keys_reach_nested_ttl_table() {
        assert_eq!(
            map_env_key("cache_ttl_secs_ai_reply"),
            "cache.ttl_secs.ai_reply"
        );
        assert_eq!(map_env_key("cache_top_keys"), "cache.top_keys");
    }

    #[test]
    fn unknown_sections_pass_through() {
        assert_eq!(map_env_key("unknown_thing"), "unknown_thing");
    }
}
