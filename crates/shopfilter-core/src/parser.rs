//! Query-string parsing and sanitization.
//!
//! Turns a raw, untrusted key/value multi-map into a [`FilterInput`].
//! Sanitization never rejects: control bytes and the HTML-injection
//! blocklist (`<`, `>`, backtick) are stripped, oversize input is truncated,
//! and malformed numerics or JSON are silently dropped. Everything else —
//! quotes, ampersands, percent signs, slashes, parentheses — is preserved,
//! because product catalogs legitimately contain them and downstream
//! matching is exact-term.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;

use crate::filter_config::normalize_collection_id;
use crate::filter_input::{FilterInput, SortSpec, DEFAULT_LIMIT, DEFAULT_PAGE, MAX_LIMIT};

const MAX_KEY_CHARS: usize = 200;
const MAX_VALUE_CHARS: usize = 500;
const MAX_OPTION_CHARS: usize = 200;
const MAX_TERM_CHARS: usize = 100;
const MAX_TERMS: usize = 100;

/// Bare 5–10 char alphanumeric keys that are common words rather than
/// storefront handles; the handle heuristic skips these.
const COMMON_WORD_BLOCKLIST: &[&str] = &[
    "about", "admin", "cache", "callback", "checkout", "count", "currency", "debug", "email",
    "false", "filter", "format", "locale", "login", "offset", "order", "phone", "preview",
    "source", "state", "status", "theme", "title", "token", "total", "track", "true", "update",
    "version",
];

fn handle_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z]{2,3}_[a-z0-9]{3,10}$").expect("valid handle regex"))
}

fn bare_key_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9]{5,10}$").expect("valid bare-key regex"))
}

/// Strips NUL/control bytes and the injection blocklist, then truncates to
/// `max_chars`. Idempotent: stripping never introduces characters, and a
/// truncated string re-truncates to itself.
#[must_use]
pub fn sanitize_text(raw: &str, max_chars: usize) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_control() && !matches!(c, '<' | '>' | '`'))
        .collect();
    if cleaned.chars().count() > max_chars {
        cleaned.chars().take(max_chars).collect()
    } else {
        cleaned
    }
}

/// Splits a comma-separated value into sanitized, deduplicated terms.
fn split_terms(values: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut terms = Vec::new();
    for value in values {
        for term in value.split(',') {
            let term = sanitize_text(term.trim(), MAX_TERM_CHARS);
            if !term.is_empty() && seen.insert(term.clone()) {
                terms.push(term);
                if terms.len() >= MAX_TERMS {
                    return terms;
                }
            }
        }
    }
    terms
}

fn parse_price(values: &[String]) -> Option<f64> {
    values
        .first()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|n| n.is_finite() && *n >= 0.0)
}

fn parse_bool(values: &[String]) -> bool {
    values
        .first()
        .is_some_and(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
}

fn first_nonempty(values: &[String]) -> Option<String> {
    values
        .iter()
        .map(|v| sanitize_text(v.trim(), MAX_VALUE_CHARS))
        .find(|v| !v.is_empty())
}

/// Extracts the option name from explicit option-key shapes:
/// `options[NAME]`, `option.NAME`, `option_NAME`.
fn explicit_option_name(key: &str) -> Option<&str> {
    if let Some(inner) = key.strip_prefix("options[").and_then(|k| k.strip_suffix(']')) {
        return Some(inner);
    }
    if let Some(name) = key.strip_prefix("option.") {
        return Some(name);
    }
    if let Some(name) = key.strip_prefix("option_") {
        return Some(name);
    }
    None
}

/// Applies the handle heuristic: `xx_yyyy`-shaped keys and bare 5–10 char
/// alphanumerics that are not common words. Generous on purpose — keys that
/// resolve to nothing are dropped when the configuration is applied.
fn looks_like_option_key(key: &str) -> bool {
    if handle_regex().is_match(key) {
        return true;
    }
    bare_key_regex().is_match(key) && !COMMON_WORD_BLOCKLIST.contains(&key)
}

fn insert_option(options: &mut BTreeMap<String, Vec<String>>, name: &str, values: Vec<String>) {
    let name = sanitize_text(name.trim(), MAX_OPTION_CHARS);
    if name.is_empty() || values.is_empty() {
        return;
    }
    let entry = options.entry(name).or_default();
    for value in values {
        let value = sanitize_text(value.trim(), MAX_OPTION_CHARS);
        if !value.is_empty() && !entry.contains(&value) {
            entry.push(value);
        }
    }
}

/// Merges an explicit `options=<json>` body: an object of
/// `name → string | [string]`. Malformed JSON is ignored entirely; other
/// parameters still parse.
fn merge_options_json(options: &mut BTreeMap<String, Vec<String>>, raw: &str) {
    let Ok(serde_json::Value::Object(body)) = serde_json::from_str(raw) else {
        return;
    };
    for (name, value) in body {
        let values = match value {
            serde_json::Value::String(s) => vec![s],
            serde_json::Value::Array(items) => items
                .into_iter()
                .filter_map(|v| match v {
                    serde_json::Value::String(s) => Some(s),
                    other => Some(other.to_string()),
                })
                .collect(),
            other => vec![other.to_string()],
        };
        insert_option(options, &name, values);
    }
}

/// Parses a decoded query multi-map into a [`FilterInput`].
///
/// Recognition is name-driven; unknown keys only become option filters via
/// the explicit shapes or the handle heuristic, never silently. Repeated
/// keys accumulate.
#[must_use]
pub fn parse_query(pairs: &[(String, String)]) -> FilterInput {
    let mut grouped: Vec<(String, Vec<String>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for (key, value) in pairs {
        let key = sanitize_text(key.trim(), MAX_KEY_CHARS);
        if key.is_empty() {
            continue;
        }
        let value = sanitize_text(value, MAX_VALUE_CHARS);
        match index.get(&key) {
            Some(&i) => grouped[i].1.push(value),
            None => {
                index.insert(key.clone(), grouped.len());
                grouped.push((key, vec![value]));
            }
        }
    }

    let mut input = FilterInput::new();
    let mut leftovers: Vec<(String, Vec<String>)> = Vec::new();

    for (key, values) in grouped {
        match key.to_lowercase().as_str() {
            "search" | "q" | "query" => {
                if input.search.is_none() {
                    input.search = first_nonempty(&values);
                }
            }
            "vendor" | "vendors" => merge_terms(&mut input.vendors, &values),
            "producttype" | "producttypes" | "product_type" => {
                merge_terms(&mut input.product_types, &values);
            }
            "tag" | "tags" => merge_terms(&mut input.tags, &values),
            "collection" | "collections" => merge_terms(&mut input.collections, &values),
            "variantkey" | "variantkeys" | "variantoptionkeys" => {
                merge_terms(&mut input.variant_option_keys, &values);
            }
            "variantsku" | "variantskus" => merge_terms(&mut input.variant_skus, &values),
            "pricemin" | "price_min" => input.price_min = parse_price(&values),
            "pricemax" | "price_max" => input.price_max = parse_price(&values),
            "variantpricemin" => input.variant_price_min = parse_price(&values),
            "variantpricemax" => input.variant_price_max = parse_price(&values),
            "page" => {
                input.page = values
                    .first()
                    .and_then(|v| v.trim().parse::<u32>().ok())
                    .filter(|p| *p >= 1)
                    .unwrap_or(DEFAULT_PAGE);
            }
            "limit" => {
                input.limit = values
                    .first()
                    .and_then(|v| v.trim().parse::<u32>().ok())
                    .map_or(DEFAULT_LIMIT, |l| l.clamp(1, MAX_LIMIT));
            }
            "sort" => input.sort = values.first().and_then(|v| SortSpec::parse(v)),
            "includefilters" => input.include_filters = parse_bool(&values),
            "fields" => merge_terms(&mut input.fields, &values),
            "keep" | "preserveoptionaggregations" => {
                input.keep_option = first_nonempty(&values)
                    .map(|v| sanitize_text(v.trim(), MAX_OPTION_CHARS));
            }
            "cpid" => input.cpid = first_nonempty(&values),
            "options" => {
                for value in &values {
                    merge_options_json(&mut input.options, value);
                }
            }
            "shop" | "price" => {}
            _ => leftovers.push((key, values)),
        }
    }

    for (key, values) in leftovers {
        if let Some(name) = explicit_option_name(&key) {
            insert_option(&mut input.options, name, split_values(&values));
        } else if looks_like_option_key(&key) {
            // Pending re-validation against the configuration; unresolved
            // keys are dropped by the applier.
            insert_option(&mut input.options, &key, split_values(&values));
        }
        // Anything else is ignored — never promoted silently to a filter.
    }

    combine_cpid(&mut input);
    input
}

fn merge_terms(target: &mut Vec<String>, values: &[String]) {
    for term in split_terms(values) {
        if !target.contains(&term) && target.len() < MAX_TERMS {
            target.push(term);
        }
    }
}

fn split_values(values: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    for value in values {
        for part in value.split(',') {
            let part = part.trim();
            if !part.is_empty() && out.len() < MAX_TERMS {
                out.push(part.to_string());
            }
        }
    }
    out
}

/// AND-s the current collection page into the `collections` filter: products
/// must belong to the page's collection *and* any explicitly requested one.
fn combine_cpid(input: &mut FilterInput) {
    let Some(cpid) = input.cpid.as_deref() else {
        return;
    };
    let Some(id) = normalize_collection_id(cpid) else {
        return;
    };
    if !input.collections.contains(&id) {
        input.collections.push(id);
    }
}
