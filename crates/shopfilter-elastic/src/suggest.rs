//! Suggestion plumbing for the search endpoint.
//!
//! Two outputs ride on the term suggester: title suggestions shown directly
//! to the shopper, and "did you mean" candidates — corrected queries that
//! the caller validates with count probes before offering, so only
//! corrections with actual hits surface.

use serde_json::{json, Value};

use crate::response::SuggestGroup;

/// Name of the suggester section in requests and responses.
pub const TITLE_SUGGESTER: &str = "title_suggestions";

/// Maximum corrected-query candidates to validate.
pub const MAX_CANDIDATES: usize = 3;

/// The `suggest` section of a search body: a term suggester over titles.
#[must_use]
pub fn suggest_section(query: &str) -> Value {
    let mut section = serde_json::Map::new();
    section.insert(
        TITLE_SUGGESTER.to_string(),
        json!({
            "text": query,
            "term": {
                "field": "title",
                "suggest_mode": "always",
                "size": 5
            }
        }),
    );
    Value::Object(section)
}

/// Flattens suggester options into a deduplicated suggestion list.
#[must_use]
pub fn suggestion_terms(groups: &[SuggestGroup]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut terms = Vec::new();
    for group in groups {
        for option in &group.options {
            if seen.insert(option.text.clone()) {
                terms.push(option.text.clone());
            }
        }
    }
    terms
}

/// Builds corrected-query candidates by swapping misspelled tokens for
/// suggester options. Candidate 0 uses every token's best option; later
/// candidates walk down the option lists. Candidates equal to the original
/// query are dropped.
#[must_use]
pub fn correction_candidates(original: &str, groups: &[SuggestGroup]) -> Vec<String> {
    if groups.iter().all(|g| g.options.is_empty()) {
        return Vec::new();
    }

    let tokens: Vec<&str> = original.split_whitespace().collect();
    let mut candidates = Vec::new();
    for rank in 0..MAX_CANDIDATES {
        let corrected: Vec<String> = tokens
            .iter()
            .map(|token| {
                groups
                    .iter()
                    .find(|g| g.text.eq_ignore_ascii_case(token))
                    .and_then(|g| {
                        let i = rank.min(g.options.len().saturating_sub(1));
                        g.options.get(i).map(|o| o.text.clone())
                    })
                    .unwrap_or_else(|| (*token).to_string())
            })
            .collect();
        let corrected = corrected.join(" ");
        if !corrected.eq_ignore_ascii_case(original) && !candidates.contains(&corrected) {
            candidates.push(corrected);
        }
    }
    candidates
}

#[cfg(test)]
mod tests {
    use crate::response::{SuggestGroup, SuggestOption};

    use super::*;

    fn group(text: &str, options: &[(&str, f64)]) -> SuggestGroup {
        SuggestGroup {
            text: text.to_string(),
            offset: 0,
            length: text.len(),
            options: options
                .iter()
                .map(|(t, score)| SuggestOption {
                    text: (*t).to_string(),
                    score: *score,
                    freq: 1,
                })
                .collect(),
        }
    }

    #[test]
    fn suggest_section_targets_title_field() {
        let section = suggest_section("sheo");
        assert_eq!(section[TITLE_SUGGESTER]["text"], "sheo");
        assert_eq!(section[TITLE_SUGGESTER]["term"]["field"], "title");
    }

    #[test]
    fn suggestion_terms_flatten_and_dedup() {
        let groups = vec![
            group("sheo", &[("shoe", 0.8), ("shoes", 0.6)]),
            group("rde", &[("red", 0.9), ("shoe", 0.2)]),
        ];
        assert_eq!(suggestion_terms(&groups), vec!["shoe", "shoes", "red"]);
    }

    #[test]
    fn best_correction_replaces_each_misspelled_token() {
        let groups = vec![group("sheo", &[("shoe", 0.8)]), group("rde", &[("red", 0.9)])];
        let candidates = correction_candidates("rde sheo", &groups);
        assert_eq!(candidates.first().map(String::as_str), Some("red shoe"));
    }

    #[test]
    fn correct_tokens_pass_through_unchanged() {
        let groups = vec![group("sheo", &[("shoe", 0.8)])];
        let candidates = correction_candidates("running sheo", &groups);
        assert_eq!(candidates.first().map(String::as_str), Some("running shoe"));
    }

    #[test]
    fn no_options_means_no_candidates() {
        let groups = vec![group("shoe", &[])];
        assert!(correction_candidates("shoe", &groups).is_empty());
    }

    #[test]
    fn candidates_are_deduplicated() {
        let groups = vec![group("sheo", &[("shoe", 0.8)])];
        let candidates = correction_candidates("sheo", &groups);
        assert_eq!(candidates, vec!["shoe".to_string()]);
    }
}
