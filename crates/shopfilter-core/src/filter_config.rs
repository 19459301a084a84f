//! The per-tenant filter configuration document.
//!
//! Owned by an external admin system and read from the tenant's
//! `<shop>_filters` index; this module models the document and the lookup
//! indices derived from it. Status, deployment channel, and target scope are
//! normalized to lowercase during deserialization so comparisons never have
//! to worry about casing drift between writers.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::de::Deserializer;
use serde::{Deserialize, Serialize};

/// Sentinel collection ID that matches no product. Installed by the applier
/// when a requested collection falls outside an entitled configuration's
/// allowed set, so downstream cleanly returns zero results.
pub const NONE_COLLECTION_SENTINEL: &str = "__none__";

/// Lifecycle status of a configuration or of a single option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigStatus {
    Draft,
    Published,
}

impl<'de> Deserialize<'de> for ConfigStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.trim().to_lowercase().as_str() {
            "published" => Self::Published,
            _ => Self::Draft,
        })
    }
}

impl Default for ConfigStatus {
    fn default() -> Self {
        Self::Draft
    }
}

/// Where the configuration is deployed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentChannel {
    App,
    Theme,
    Other,
}

impl<'de> Deserialize<'de> for DeploymentChannel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.trim().to_lowercase().as_str() {
            "app" => Self::App,
            "theme" => Self::Theme,
            _ => Self::Other,
        })
    }
}

impl Default for DeploymentChannel {
    fn default() -> Self {
        Self::Other
    }
}

/// Whether a configuration (or option) applies everywhere or only to an
/// entitled subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetScope {
    All,
    Entitled,
}

impl<'de> Deserialize<'de> for TargetScope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.trim().to_lowercase().as_str() {
            "entitled" => Self::Entitled,
            _ => Self::All,
        })
    }
}

impl Default for TargetScope {
    fn default() -> Self {
        Self::All
    }
}

/// A collection a scoped configuration is entitled to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllowedCollection {
    /// Normalized numeric collection ID.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Per-option settings for variant-backed and derived facets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionSettings {
    /// The indexed variant-option name this facet targets (e.g. `"Color"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_option_key: Option<String>,
    /// For derived options: the option name they aggregate over.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_option_type: Option<String>,
    /// Whitelist of facet values for derived options.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selected_values: Vec<String>,
}

/// One ordered facet definition inside a configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOption {
    /// Opaque URL key exposed to the storefront (e.g. `pr_a3k9x`).
    pub handle: String,
    /// Frontend sort order.
    #[serde(default)]
    pub position: i32,
    /// The indexed field name this facet targets when no
    /// `variant_option_key` is set.
    #[serde(default)]
    pub option_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub option_settings: OptionSettings,
    #[serde(default)]
    pub target_scope: TargetScope,
    /// Per-option value restriction when `target_scope == entitled`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_options: Vec<String>,
    #[serde(default)]
    pub status: ConfigStatus,
}

impl FilterOption {
    /// The option name this facet resolves to: `variant_option_key`, else
    /// `option_type`, else the handle itself.
    #[must_use]
    pub fn resolved_name(&self) -> &str {
        match &self.option_settings.variant_option_key {
            Some(key) if !key.trim().is_empty() => key,
            _ if !self.option_type.trim().is_empty() => &self.option_type,
            _ => &self.handle,
        }
    }

    #[must_use]
    pub fn is_published(&self) -> bool {
        self.status == ConfigStatus::Published
    }
}

/// Configuration settings that flow into query semantics or untouched to
/// the frontend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSettings {
    #[serde(default)]
    pub hide_out_of_stock_items: bool,
    /// Display-only settings, passed through to the storefront verbatim.
    #[serde(flatten)]
    pub display: serde_json::Map<String, serde_json::Value>,
}

/// A versioned filter-configuration document for one tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterConfiguration {
    pub id: String,
    #[serde(default)]
    pub version: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: ConfigStatus,
    #[serde(default)]
    pub deployment_channel: DeploymentChannel,
    #[serde(default)]
    pub target_scope: TargetScope,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_collections: Vec<AllowedCollection>,
    #[serde(default)]
    pub settings: ConfigSettings,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<FilterOption>,
}

impl FilterConfiguration {
    /// Only `published` configurations deployed through the app or theme
    /// channel serve storefront traffic.
    #[must_use]
    pub fn is_eligible(&self) -> bool {
        self.status == ConfigStatus::Published
            && matches!(
                self.deployment_channel,
                DeploymentChannel::App | DeploymentChannel::Theme
            )
    }

    /// Iterator over published options only.
    pub fn published_options(&self) -> impl Iterator<Item = &FilterOption> {
        self.options.iter().filter(|o| o.is_published())
    }

    /// `handle → resolved option name` for all published options.
    #[must_use]
    pub fn handle_to_option(&self) -> HashMap<String, String> {
        self.published_options()
            .map(|o| (o.handle.clone(), o.resolved_name().to_string()))
            .collect()
    }

    /// Normalized IDs of the collections an entitled configuration covers.
    #[must_use]
    pub fn allowed_collection_ids(&self) -> Vec<String> {
        self.allowed_collections
            .iter()
            .filter_map(|c| normalize_collection_id(&c.id))
            .collect()
    }

    /// Whether this configuration is explicitly scoped to `collection_id`.
    #[must_use]
    pub fn covers_collection(&self, collection_id: &str) -> bool {
        normalize_collection_id(collection_id)
            .is_some_and(|id| self.allowed_collection_ids().iter().any(|c| *c == id))
    }

    /// Variant-option names the configuration exposes as facets, lowercased.
    ///
    /// Per published option: `variant_option_key` wins; a derived option with
    /// `base_option_type == "option"` contributes its `option_type`; other
    /// derived options contribute the base name itself. Standard-filter names
    /// are excluded. An empty set means "pass all buckets through".
    #[must_use]
    pub fn variant_option_keys(&self) -> HashSet<String> {
        let mut keys = HashSet::new();
        for option in self.published_options() {
            let name = match (
                &option.option_settings.variant_option_key,
                &option.option_settings.base_option_type,
            ) {
                (Some(key), _) if !key.trim().is_empty() => key.clone(),
                (_, Some(base)) if base.trim().eq_ignore_ascii_case("option") => {
                    option.option_type.clone()
                }
                (_, Some(base)) if !base.trim().is_empty() => base.clone(),
                _ => option.option_type.clone(),
            };
            let name = name.trim().to_lowercase();
            if !name.is_empty() && StandardFilter::from_name(&name).is_none() {
                keys.insert(name);
            }
        }
        keys
    }
}

/// Product-level filter fields that must not be queried through
/// `optionPairs.keyword`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandardFilter {
    Vendor,
    ProductType,
    Tag,
    Collection,
    Price,
}

impl StandardFilter {
    /// Looks up a lowercased, trimmed option name in the standard-filter
    /// table. `Price` is recognized for aggregation mapping only — the
    /// applier never moves price values out of `options`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "vendor" | "vendors" => Some(Self::Vendor),
            "producttype" | "product_type" | "producttypes" => Some(Self::ProductType),
            "tag" | "tags" => Some(Self::Tag),
            "collection" | "collections" => Some(Self::Collection),
            "price" | "pricerange" | "price_range" => Some(Self::Price),
            _ => None,
        }
    }
}

/// Reduces a raw collection reference to its numeric ID.
///
/// Accepts bare digits and `gid://shopify/Collection/<digits>` URLs; anything
/// else yields `None`.
#[must_use]
pub fn normalize_collection_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let candidate = trimmed
        .rsplit_once('/')
        .map_or(trimmed, |(_, tail)| tail);
    if !candidate.is_empty() && candidate.bytes().all(|b| b.is_ascii_digit()) {
        Some(candidate.to_string())
    } else {
        None
    }
}
