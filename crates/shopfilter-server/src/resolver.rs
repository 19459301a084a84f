//! Resolves the tenant's active filter configuration.
//!
//! Candidate documents live in the tenant's `<shop>_filters` index, written
//! by the admin system. Resolution picks the published app/theme candidate,
//! preferring configurations scoped to the collection currently being
//! rendered, and caches the outcome briefly so a storefront burst does not
//! stampede the index. Every failure mode here — missing index, unreadable
//! documents, no eligible candidate — degrades to "no configuration".

use std::convert::Infallible;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use shopfilter_cache::{CacheConfig, QueryCache};
use shopfilter_core::{FilterConfiguration, ShopDomain};
use shopfilter_elastic::ElasticClient;

const CANDIDATE_FETCH_SIZE: u32 = 50;
const RESOLVE_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct ConfigResolver {
    elastic: ElasticClient,
    cache: QueryCache<Option<FilterConfiguration>, Infallible>,
}

impl ConfigResolver {
    #[must_use]
    pub fn new(elastic: ElasticClient, ttl: Duration, disabled: Arc<AtomicBool>) -> Self {
        Self {
            elastic,
            cache: QueryCache::new(CacheConfig {
                name: "config-lookup",
                ttl,
                max_size: 500,
                disabled,
            }),
        }
    }

    /// The active configuration for `(shop, collection, cpid)`, or `None`.
    pub async fn resolve(
        &self,
        shop: &ShopDomain,
        collection: Option<&str>,
        cpid: Option<&str>,
    ) -> Option<FilterConfiguration> {
        let key = format!(
            "config:{}:{}:{}",
            shop,
            collection.unwrap_or("-"),
            cpid.unwrap_or("-")
        );

        let elastic = self.elastic.clone();
        let shop_owned = shop.clone();
        let collection_owned = collection.map(str::to_string);
        let cpid_owned = cpid.map(str::to_string);

        let result = self
            .cache
            .get_or_compute(&key, move || async move {
                Ok::<_, Infallible>(
                    fetch_and_select(
                        &elastic,
                        &shop_owned,
                        collection_owned.as_deref(),
                        cpid_owned.as_deref(),
                    )
                    .await,
                )
            })
            .await;

        result.unwrap_or_default()
    }

    /// Drops cached resolutions for one tenant.
    pub fn invalidate(&self, shop: &ShopDomain) {
        self.cache.invalidate_pattern(&format!("config:{shop}:*"));
    }

    pub fn start_sweeper(&self, interval: Duration) {
        self.cache.start_sweeper(interval);
    }

    pub fn stop_sweeper(&self) {
        self.cache.stop_sweeper();
    }
}

async fn fetch_and_select(
    elastic: &ElasticClient,
    shop: &ShopDomain,
    collection: Option<&str>,
    cpid: Option<&str>,
) -> Option<FilterConfiguration> {
    let body = serde_json::json!({
        "query": { "match_all": {} },
        "size": CANDIDATE_FETCH_SIZE,
    });

    let response = match elastic
        .search(&shop.filters_index(), &body, RESOLVE_DEADLINE)
        .await
    {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!(shop = %shop, error = %e, "config lookup failed; proceeding without configuration");
            return None;
        }
    };

    let candidates: Vec<FilterConfiguration> = response
        .hits
        .hits
        .into_iter()
        .filter_map(|hit| serde_json::from_value(hit.source).ok())
        .collect();

    select_configuration(candidates, collection, cpid)
}

/// Selection rules: only published app/theme candidates qualify;
/// collection-scoped candidates outrank unscoped ones; ties break by most
/// recent `updated_at`.
#[must_use]
pub fn select_configuration(
    candidates: Vec<FilterConfiguration>,
    collection: Option<&str>,
    cpid: Option<&str>,
) -> Option<FilterConfiguration> {
    let current = collection.or(cpid);

    let mut eligible: Vec<FilterConfiguration> =
        candidates.into_iter().filter(FilterConfiguration::is_eligible).collect();
    if eligible.is_empty() {
        return None;
    }

    eligible.sort_by(|a, b| {
        let a_scoped = current.is_some_and(|c| a.covers_collection(c));
        let b_scoped = current.is_some_and(|c| b.covers_collection(c));
        b_scoped
            .cmp(&a_scoped)
            .then_with(|| b.updated_at.cmp(&a.updated_at))
    });
    eligible.into_iter().next()
}
