//! Applies the tenant's filter configuration to a parsed [`FilterInput`].
//!
//! The rewrite steps run in a fixed order: settings injection, collection
//! scope enforcement, handle resolution, standard-filter extraction,
//! per-option restriction, derived-option restriction. Reordering them
//! changes observable behavior — extraction must see resolved names, and
//! restrictions must see extracted options gone.

use std::collections::BTreeMap;

use crate::filter_config::{
    normalize_collection_id, FilterConfiguration, StandardFilter, TargetScope,
    NONE_COLLECTION_SENTINEL,
};
use crate::filter_input::FilterInput;

/// Rewrites `input` under `config`. A null configuration passes through
/// unchanged.
#[must_use]
pub fn apply_config(mut input: FilterInput, config: Option<&FilterConfiguration>) -> FilterInput {
    let Some(config) = config else {
        return input;
    };

    inject_settings(&mut input, config);
    enforce_collection_scope(&mut input, config);
    resolve_handles(&mut input, config);
    extract_standard_filters(&mut input);
    restrict_entitled_options(&mut input, config);
    restrict_derived_options(&mut input, config);

    input.options.retain(|_, values| !values.is_empty());
    input
}

fn inject_settings(input: &mut FilterInput, config: &FilterConfiguration) {
    if config.settings.hide_out_of_stock_items {
        input.hide_out_of_stock_items = true;
    }
}

/// For entitled configurations, confines the query to the allowed
/// collections. A requested collection outside the allowed set becomes the
/// unmatchable sentinel so the response is cleanly empty rather than
/// unfiltered.
fn enforce_collection_scope(input: &mut FilterInput, config: &FilterConfiguration) {
    if config.target_scope != TargetScope::Entitled {
        return;
    }
    let allowed = config.allowed_collection_ids();
    if allowed.is_empty() {
        return;
    }

    if input.collections.is_empty() {
        input.collections = allowed;
        return;
    }

    let requested: Vec<String> = input
        .collections
        .iter()
        .map(|c| normalize_collection_id(c).unwrap_or_else(|| c.clone()))
        .collect();
    let intersection: Vec<String> = requested
        .into_iter()
        .filter(|c| allowed.contains(c))
        .collect();

    input.collections = if intersection.is_empty() {
        vec![NONE_COLLECTION_SENTINEL.to_string()]
    } else {
        intersection
    };
}

/// Replaces URL handles with the option names they resolve to, merging
/// value sets when several handles point at the same name. Keys that match
/// neither a handle nor the standard-filter table are dropped — the
/// discovery heuristic in the parser is deliberately generous, and this is
/// where its false positives die.
fn resolve_handles(input: &mut FilterInput, config: &FilterConfiguration) {
    let handle_map = config.handle_to_option();

    let mut resolved: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, values) in std::mem::take(&mut input.options) {
        let name = if let Some(name) = handle_map.get(&key) {
            Some(name.clone())
        } else if StandardFilter::from_name(&key).is_some() {
            Some(key)
        } else {
            None
        };

        if let Some(name) = name {
            let entry = resolved.entry(name).or_default();
            for value in values {
                if !entry.contains(&value) {
                    entry.push(value);
                }
            }
        }
    }
    input.options = resolved;
}

/// Moves option entries whose name is a product-level field into the
/// matching top-level list. Product-level filters must query
/// `vendor.keyword` and friends, never `optionPairs.keyword`.
fn extract_standard_filters(input: &mut FilterInput) {
    let keys: Vec<String> = input.options.keys().cloned().collect();
    for key in keys {
        let Some(standard) = StandardFilter::from_name(&key) else {
            continue;
        };
        let target = match standard {
            StandardFilter::Vendor => &mut input.vendors,
            StandardFilter::ProductType => &mut input.product_types,
            StandardFilter::Tag => &mut input.tags,
            StandardFilter::Collection => &mut input.collections,
            // Price options keep their facet semantics; values stay put.
            StandardFilter::Price => continue,
        };
        if let Some(values) = input.options.remove(&key) {
            for value in values {
                if !target.contains(&value) {
                    target.push(value);
                }
            }
        }
    }
}

/// Intersects selected values with `allowed_options` for entitled options.
/// Restriction limits what can be selected; it never forces a selection, so
/// absent input for the option is left alone.
fn restrict_entitled_options(input: &mut FilterInput, config: &FilterConfiguration) {
    for option in config.published_options() {
        if option.target_scope != TargetScope::Entitled || option.allowed_options.is_empty() {
            continue;
        }
        if let Some(values) = input.options.get_mut(option.resolved_name()) {
            values.retain(|v| option.allowed_options.contains(v));
        }
    }
}

/// Intersects input values for a derived option's *base* name with the
/// derived option's curated `selected_values`.
fn restrict_derived_options(input: &mut FilterInput, config: &FilterConfiguration) {
    for option in config.options.iter() {
        let Some(base) = option.option_settings.base_option_type.as_deref() else {
            continue;
        };
        if option.option_settings.selected_values.is_empty() {
            continue;
        }
        let base_name = if base.trim().eq_ignore_ascii_case("option") {
            option.option_type.as_str()
        } else {
            base
        };
        let key = input
            .options
            .keys()
            .find(|k| k.eq_ignore_ascii_case(base_name))
            .cloned();
        if let Some(key) = key {
            if let Some(values) = input.options.get_mut(&key) {
                values.retain(|v| option.option_settings.selected_values.contains(v));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter_config::{
        AllowedCollection, ConfigSettings, ConfigStatus, DeploymentChannel, FilterOption,
        OptionSettings,
    };

    fn option(handle: &str, option_type: &str) -> FilterOption {
        FilterOption {
            handle: handle.to_string(),
            position: 0,
            option_type: option_type.to_string(),
            label: None,
            option_settings: OptionSettings::default(),
            target_scope: TargetScope::All,
            allowed_options: Vec::new(),
            status: ConfigStatus::Published,
        }
    }

    fn config(options: Vec<FilterOption>) -> FilterConfiguration {
        FilterConfiguration {
            id: "cfg-1".to_string(),
            version: 1,
            updated_at: None,
            created_at: None,
            status: ConfigStatus::Published,
            deployment_channel: DeploymentChannel::App,
            target_scope: TargetScope::All,
            allowed_collections: Vec::new(),
            settings: ConfigSettings::default(),
            options,
        }
    }

    fn input_with_option(name: &str, values: &[&str]) -> FilterInput {
        let mut input = FilterInput::new();
        input.options.insert(
            name.to_string(),
            values.iter().map(|v| (*v).to_string()).collect(),
        );
        input
    }

    #[test]
    fn null_config_passes_through() {
        let input = input_with_option("pr_a3k9x", &["M"]);
        let result = apply_config(input.clone(), None);
        assert_eq!(result, input);
    }

    #[test]
    fn hide_out_of_stock_is_injected_from_settings() {
        let mut cfg = config(vec![]);
        cfg.settings.hide_out_of_stock_items = true;
        let result = apply_config(FilterInput::new(), Some(&cfg));
        assert!(result.hide_out_of_stock_items);
    }

    #[test]
    fn handles_resolve_to_option_names() {
        let cfg = config(vec![option("pr_a3k9x", "Size")]);
        let input = input_with_option("pr_a3k9x", &["M", "XL"]);
        let result = apply_config(input, Some(&cfg));
        assert_eq!(
            result.options.get("Size"),
            Some(&vec!["M".to_string(), "XL".to_string()])
        );
        assert!(!result.options.contains_key("pr_a3k9x"));
    }

    #[test]
    fn two_handles_for_one_name_merge_with_dedup() {
        let cfg = config(vec![option("pr_one11", "Size"), option("pr_two22", "Size")]);
        let mut input = input_with_option("pr_one11", &["M", "XL"]);
        input
            .options
            .insert("pr_two22".to_string(), vec!["XL".to_string(), "S".to_string()]);
        let result = apply_config(input, Some(&cfg));
        assert_eq!(
            result.options.get("Size"),
            Some(&vec!["M".to_string(), "XL".to_string(), "S".to_string()])
        );
    }

    #[test]
    fn unresolvable_keys_are_dropped() {
        let cfg = config(vec![option("pr_a3k9x", "Size")]);
        let input = input_with_option("zz_unknown", &["x"]);
        let result = apply_config(input, Some(&cfg));
        assert!(result.options.is_empty());
    }

    #[test]
    fn literal_option_names_are_not_handles() {
        // Only handles resolve; an option *name* arriving as a key is
        // dropped like any other unknown key.
        let cfg = config(vec![option("pr_size1", "Size")]);
        let input = input_with_option("Size", &["M"]);
        let result = apply_config(input, Some(&cfg));
        assert!(result.options.is_empty());
    }

    #[test]
    fn standard_filters_move_to_top_level() {
        let cfg = config(vec![option("vnd_1", "vendor")]);
        let input = input_with_option("vnd_1", &["Nike"]);
        let result = apply_config(input, Some(&cfg));
        assert_eq!(result.vendors, vec!["Nike"]);
        assert!(result.options.is_empty());
    }

    #[test]
    fn standard_filter_union_dedups() {
        let cfg = config(vec![option("vnd_1", "vendor")]);
        let mut input = input_with_option("vnd_1", &["Nike", "Puma"]);
        input.vendors = vec!["Nike".to_string()];
        let result = apply_config(input, Some(&cfg));
        assert_eq!(result.vendors, vec!["Nike", "Puma"]);
    }

    #[test]
    fn scope_violation_yields_none_sentinel() {
        let mut cfg = config(vec![]);
        cfg.target_scope = TargetScope::Entitled;
        cfg.allowed_collections = vec![AllowedCollection {
            id: "100".to_string(),
            title: None,
        }];
        let mut input = FilterInput::new();
        input.collections = vec!["200".to_string()];
        let result = apply_config(input, Some(&cfg));
        assert_eq!(result.collections, vec![NONE_COLLECTION_SENTINEL]);
    }

    #[test]
    fn scope_without_request_fills_allowed_collections() {
        let mut cfg = config(vec![]);
        cfg.target_scope = TargetScope::Entitled;
        cfg.allowed_collections = vec![
            AllowedCollection {
                id: "100".to_string(),
                title: None,
            },
            AllowedCollection {
                id: "101".to_string(),
                title: None,
            },
        ];
        let result = apply_config(FilterInput::new(), Some(&cfg));
        assert_eq!(result.collections, vec!["100", "101"]);
    }

    #[test]
    fn scope_intersects_requested_collections() {
        let mut cfg = config(vec![]);
        cfg.target_scope = TargetScope::Entitled;
        cfg.allowed_collections = vec![
            AllowedCollection {
                id: "100".to_string(),
                title: None,
            },
            AllowedCollection {
                id: "101".to_string(),
                title: None,
            },
        ];
        let mut input = FilterInput::new();
        input.collections = vec!["101".to_string(), "200".to_string()];
        let result = apply_config(input, Some(&cfg));
        assert_eq!(result.collections, vec!["101"]);
    }

    #[test]
    fn entitled_option_restriction_intersects_values() {
        let mut opt = option("pr_size1", "Size");
        opt.target_scope = TargetScope::Entitled;
        opt.allowed_options = vec!["M".to_string(), "L".to_string()];
        let cfg = config(vec![opt]);
        let input = input_with_option("pr_size1", &["M", "XXL"]);
        let result = apply_config(input, Some(&cfg));
        assert_eq!(result.options.get("Size"), Some(&vec!["M".to_string()]));
    }

    #[test]
    fn entitled_option_restriction_skips_absent_input() {
        let mut opt = option("pr_size1", "Size");
        opt.target_scope = TargetScope::Entitled;
        opt.allowed_options = vec!["M".to_string()];
        let cfg = config(vec![opt]);
        let result = apply_config(FilterInput::new(), Some(&cfg));
        assert!(result.options.is_empty());
    }

    #[test]
    fn derived_option_restricts_base_values() {
        let mut derived = option("pr_prem1", "Premium Sizes");
        derived.option_settings.base_option_type = Some("Size".to_string());
        derived.option_settings.selected_values = vec!["XL".to_string()];
        let cfg = config(vec![option("pr_size1", "Size"), derived]);
        let input = input_with_option("pr_size1", &["M", "XL"]);
        let result = apply_config(input, Some(&cfg));
        assert_eq!(result.options.get("Size"), Some(&vec!["XL".to_string()]));
    }

    #[test]
    fn emptied_options_are_removed() {
        let mut opt = option("pr_size1", "Size");
        opt.target_scope = TargetScope::Entitled;
        opt.allowed_options = vec!["M".to_string()];
        let cfg = config(vec![opt]);
        let input = input_with_option("pr_size1", &["XXL"]);
        let result = apply_config(input, Some(&cfg));
        assert!(result.options.is_empty());
    }

    #[test]
    fn no_handle_survives_and_no_standard_name_survives() {
        let cfg = config(vec![
            option("pr_size1", "Size"),
            option("vnd_1", "vendor"),
            option("tag_1", "tags"),
        ]);
        let mut input = input_with_option("pr_size1", &["M"]);
        input
            .options
            .insert("vnd_1".to_string(), vec!["Nike".to_string()]);
        input
            .options
            .insert("tag_1".to_string(), vec!["sale".to_string()]);
        let result = apply_config(input, Some(&cfg));

        let handle_map = cfg.handle_to_option();
        for key in result.options.keys() {
            assert!(!handle_map.contains_key(key), "handle {key} survived");
            assert!(
                StandardFilter::from_name(key).is_none(),
                "standard name {key} survived"
            );
        }
        assert_eq!(result.vendors, vec!["Nike"]);
        assert_eq!(result.tags, vec!["sale"]);
    }
}
