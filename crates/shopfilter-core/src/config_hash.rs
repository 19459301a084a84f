//! Deterministic fingerprints for cache keying.
//!
//! The configuration hash changes iff a field that affects query or
//! aggregation output changes, so cached results invalidate implicitly when
//! an admin republishes. Canonical form: JSON with lexicographic keys (the
//! default `serde_json::Map` ordering), options sorted by handle, value
//! lists sorted.

use chrono::{DateTime, Utc};
use md5::{Digest, Md5};

use crate::filter_config::FilterConfiguration;
use crate::filter_input::FilterInput;

/// Hash value standing in for "no active configuration".
pub const NO_FILTER_HASH: &str = "no-filter";

fn md5_hex(data: &str) -> String {
    format!("{:x}", Md5::digest(data.as_bytes()))
}

/// 12-hex-digit fingerprint of a configuration.
///
/// `fallback_time` substitutes for a document missing both `updated_at` and
/// `created_at`; callers pass a stable process-start timestamp so the hash
/// stays deterministic within a process lifetime.
#[must_use]
pub fn config_hash(
    config: Option<&FilterConfiguration>,
    fallback_time: DateTime<Utc>,
) -> String {
    let Some(config) = config else {
        return NO_FILTER_HASH.to_string();
    };

    let updated_at = config
        .updated_at
        .or(config.created_at)
        .unwrap_or(fallback_time);

    let mut options: Vec<&crate::filter_config::FilterOption> = config.options.iter().collect();
    options.sort_by(|a, b| a.handle.cmp(&b.handle));

    let options_canonical: Vec<serde_json::Value> = options
        .into_iter()
        .map(|o| {
            let mut allowed = o.allowed_options.clone();
            allowed.sort();
            let mut selected = o.option_settings.selected_values.clone();
            selected.sort();
            serde_json::json!({
                "handle": o.handle,
                "optionType": o.option_type,
                "status": o.status,
                "variantOptionKey": o.option_settings.variant_option_key,
                "targetScope": o.target_scope,
                "allowedOptions": allowed,
                "selectedValues": selected,
                "baseOptionType": o.option_settings.base_option_type,
            })
        })
        .collect();

    let canonical = serde_json::json!({
        "id": config.id,
        "version": config.version,
        "updatedAt": updated_at.to_rfc3339(),
        "targetScope": config.target_scope,
        "options": options_canonical,
    });

    let mut hash = md5_hex(&canonical.to_string());
    hash.truncate(12);
    hash
}

/// 16-hex-digit fingerprint of a filter input, for cache keys.
#[must_use]
pub fn filter_input_hash(input: &FilterInput) -> String {
    let mut hash = md5_hex(&input.canonical_json());
    hash.truncate(16);
    hash
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::filter_config::{
        ConfigSettings, ConfigStatus, DeploymentChannel, FilterOption, OptionSettings, TargetScope,
    };

    fn fallback() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn option(handle: &str) -> FilterOption {
        FilterOption {
            handle: handle.to_string(),
            position: 0,
            option_type: "Size".to_string(),
            label: None,
            option_settings: OptionSettings {
                variant_option_key: None,
                base_option_type: None,
                selected_values: vec!["M".to_string(), "XL".to_string()],
            },
            target_scope: TargetScope::All,
            allowed_options: vec!["b".to_string(), "a".to_string()],
            status: ConfigStatus::Published,
        }
    }

    fn config(options: Vec<FilterOption>) -> FilterConfiguration {
        FilterConfiguration {
            id: "cfg-1".to_string(),
            version: 3,
            updated_at: Some(fallback()),
            created_at: None,
            status: ConfigStatus::Published,
            deployment_channel: DeploymentChannel::App,
            target_scope: TargetScope::All,
            allowed_collections: Vec::new(),
            settings: ConfigSettings::default(),
            options,
        }
    }

    #[test]
    fn null_config_hashes_to_constant() {
        assert_eq!(config_hash(None, fallback()), NO_FILTER_HASH);
    }

    #[test]
    fn hash_is_twelve_hex_chars() {
        let hash = config_hash(Some(&config(vec![option("pr_a")])), fallback());
        assert_eq!(hash.len(), 12);
        assert!(hash.bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn hash_is_stable_under_option_reordering() {
        let a = config(vec![option("pr_a"), option("pr_b")]);
        let b = config(vec![option("pr_b"), option("pr_a")]);
        assert_eq!(
            config_hash(Some(&a), fallback()),
            config_hash(Some(&b), fallback())
        );
    }

    #[test]
    fn hash_is_stable_under_value_list_reordering() {
        let mut a = config(vec![option("pr_a")]);
        a.options[0].allowed_options = vec!["a".to_string(), "b".to_string()];
        let mut b = config(vec![option("pr_a")]);
        b.options[0].allowed_options = vec!["b".to_string(), "a".to_string()];
        assert_eq!(
            config_hash(Some(&a), fallback()),
            config_hash(Some(&b), fallback())
        );
    }

    #[test]
    fn updated_at_change_changes_hash() {
        let a = config(vec![option("pr_a")]);
        let mut b = a.clone();
        b.updated_at = Some(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap());
        assert_ne!(
            config_hash(Some(&a), fallback()),
            config_hash(Some(&b), fallback())
        );
    }

    #[test]
    fn created_at_is_the_fallback_for_missing_updated_at() {
        let mut a = config(vec![option("pr_a")]);
        a.updated_at = None;
        a.created_at = Some(fallback());
        let mut b = a.clone();
        b.created_at = Some(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap());
        assert_ne!(
            config_hash(Some(&a), fallback()),
            config_hash(Some(&b), fallback())
        );
    }

    #[test]
    fn filter_input_hash_is_sixteen_hex_chars() {
        let hash = filter_input_hash(&FilterInput::new());
        assert_eq!(hash.len(), 16);
        assert!(hash.bytes().all(|b| b.is_ascii_hexdigit()));
    }
}
