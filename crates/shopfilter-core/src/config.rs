//! Environment-backed construction of [`AppConfig`].
//!
//! All parsing happens against a plain `HashMap` snapshot of the process
//! environment, so tests hand in a literal map and never mutate global
//! state. Only the Elasticsearch URL is mandatory; everything else has a
//! serviceable default.

use std::collections::HashMap;
use std::str::FromStr;

use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

impl AppConfig {
    /// Reads configuration from the process environment, after giving
    /// `dotenvy` a chance to populate it from a `.env` file.
    ///
    /// # Errors
    ///
    /// Fails when `SHOPFILTER_ELASTIC_URL` is absent or any present
    /// override does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_vars(&std::env::vars().collect())
    }

    /// Builds configuration from an explicit variable snapshot.
    ///
    /// # Errors
    ///
    /// Same conditions as [`AppConfig::from_env`].
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let elastic_url = required(vars, "SHOPFILTER_ELASTIC_URL")?;

        let allowed_shop_domains = vars
            .get("SHOPFILTER_ALLOWED_SHOP_DOMAINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(str::to_lowercase)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            env: Environment::from_name(
                vars.get("SHOPFILTER_ENV").map_or("development", String::as_str),
            ),
            bind_addr: parsed(vars, "SHOPFILTER_BIND_ADDR", "0.0.0.0:3000")?,
            log_level: text(vars, "SHOPFILTER_LOG_LEVEL", "info"),
            elastic_url,
            elastic_username: vars.get("SHOPFILTER_ELASTIC_USERNAME").cloned(),
            elastic_password: vars.get("SHOPFILTER_ELASTIC_PASSWORD").cloned(),
            allowed_shop_domains,
            cache_disabled: switch(vars, "SHOPFILTER_CACHE_DISABLED"),
            cache_max_entries: parsed(vars, "SHOPFILTER_CACHE_MAX_ENTRIES", "1000")?,
            search_cache_ttl_secs: parsed(vars, "SHOPFILTER_SEARCH_CACHE_TTL_SECS", "300")?,
            facet_cache_ttl_secs: parsed(vars, "SHOPFILTER_FACET_CACHE_TTL_SECS", "600")?,
            filter_list_cache_ttl_secs: parsed(
                vars,
                "SHOPFILTER_FILTER_LIST_CACHE_TTL_SECS",
                "600",
            )?,
            config_cache_ttl_secs: parsed(vars, "SHOPFILTER_CONFIG_CACHE_TTL_SECS", "60")?,
            products_timeout_secs: parsed(vars, "SHOPFILTER_PRODUCTS_TIMEOUT_SECS", "10")?,
            filters_timeout_secs: parsed(vars, "SHOPFILTER_FILTERS_TIMEOUT_SECS", "8")?,
        })
    }
}

impl Environment {
    /// Anything that is not explicitly production or test counts as
    /// development.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "production" => Self::Production,
            "test" => Self::Test,
            _ => Self::Development,
        }
    }
}

fn required(vars: &HashMap<String, String>, key: &str) -> Result<String, ConfigError> {
    vars.get(key)
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

fn text(vars: &HashMap<String, String>, key: &str, default: &str) -> String {
    vars.get(key).cloned().unwrap_or_else(|| default.to_string())
}

/// Boolean switch: set to `1`/`true`/`yes` (any case) means on; absent or
/// anything else means off.
fn switch(vars: &HashMap<String, String>, key: &str) -> bool {
    vars.get(key)
        .is_some_and(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
}

/// Parses the variable (or its default) into any `FromStr` target, naming
/// the offending variable on failure.
fn parsed<T>(vars: &HashMap<String, String>, key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = vars.get(key).map_or(default, String::as_str);
    raw.parse().map_err(|e: T::Err| ConfigError::InvalidEnvVar {
        var: key.to_string(),
        reason: e.to_string(),
    })
}
