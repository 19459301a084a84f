//! The request pipeline: resolve configuration, apply it, compile, execute
//! through the cached single-flight layer, format.
//!
//! Three response caches share one implementation: the filter list for a
//! collection page, search results, and facet aggregations. Search and facet
//! keys embed the configuration hash, so republishing a configuration is an
//! implicit cache invalidation; the filter-list cache is keyed per page and
//! rides on its TTL.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use shopfilter_cache::{BuildError, CacheConfig, QueryCache, DEFAULT_SWEEP_INTERVAL};
use shopfilter_core::{
    apply_config, config_hash, filter_input_hash, AppConfig, FilterConfiguration, FilterInput,
    ShopDomain,
};
use shopfilter_elastic::{
    compile_query, correction_candidates, facet_search_body, format_facets, product_search_body,
    project_product, suggest_section, suggestion_terms, ElasticClient, ElasticError, FacetSet,
    PriceMode, SearchBody, SearchResponse, TITLE_SUGGESTER,
};

use crate::resolver::ConfigResolver;

/// Failures that cross the service boundary; the HTTP layer maps them onto
/// status codes.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ServiceError {
    #[error("upstream search timed out")]
    UpstreamTimeout,

    #[error("upstream search failed: {0}")]
    Upstream(String),

    #[error("internal error")]
    Internal,
}

impl From<ElasticError> for ServiceError {
    fn from(e: ElasticError) -> Self {
        if e.is_timeout() {
            Self::UpstreamTimeout
        } else {
            // Sanitized: status + reason only, never the query payload.
            Self::Upstream(e.to_string())
        }
    }
}

impl From<BuildError<ServiceError>> for ServiceError {
    fn from(e: BuildError<ServiceError>) -> Self {
        match e {
            BuildError::Build(inner) => (*inner).clone(),
            BuildError::Aborted => Self::Internal,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
}

impl Pagination {
    fn new(total: u64, page: u32, limit: u32) -> Self {
        let limit = limit.max(1);
        let total_pages = u32::try_from(total.div_ceil(u64::from(limit))).unwrap_or(u32::MAX);
        Self {
            total,
            page,
            limit,
            total_pages,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductsPayload {
    pub products: Vec<Value>,
    pub pagination: Pagination,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<FacetSet>,
}

/// Echo of the filter input after configuration rewriting, so the
/// storefront can render active filter chips.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub vendors: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub product_types: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub collections: Vec<String>,
    #[serde(skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    pub options: std::collections::BTreeMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_max: Option<f64>,
}

impl AppliedFilters {
    fn from_input(input: &FilterInput) -> Self {
        Self {
            search: input.search.clone(),
            vendors: input.vendors.clone(),
            product_types: input.product_types.clone(),
            tags: input.tags.clone(),
            collections: input.collections.clone(),
            options: input.options.clone(),
            price_min: input.price_min,
            price_max: input.price_max,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FiltersPayload {
    pub filters: Vec<shopfilter_elastic::Facet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_range: Option<shopfilter_elastic::PriceRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant_price_range: Option<shopfilter_elastic::PriceRange>,
    pub applied_filters: AppliedFilters,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryCorrection {
    pub original: String,
    pub corrected: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMetadata {
    pub query: String,
    pub total: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub took_ms: Option<u64>,
    pub zero_results: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPayload {
    pub products: Vec<Value>,
    pub pagination: Pagination,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zero_results: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternative_queries: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub did_you_mean: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_correction: Option<QueryCorrection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facets: Option<FacetSet>,
    pub search_metadata: SearchMetadata,
}

/// Behaviour switches for the search endpoint.
#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
    pub suggestions: bool,
    pub handle_zero_results: bool,
    pub include_facets: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            suggestions: false,
            handle_zero_results: true,
            include_facets: false,
        }
    }
}

struct ServiceInner {
    elastic: ElasticClient,
    resolver: ConfigResolver,
    search_cache: QueryCache<SearchPayload, ServiceError>,
    products_cache: QueryCache<ProductsPayload, ServiceError>,
    facet_cache: QueryCache<FiltersPayload, ServiceError>,
    filter_list_cache: QueryCache<FiltersPayload, ServiceError>,
    products_deadline: Duration,
    filters_deadline: Duration,
    /// Config-hash fallback for documents missing both timestamps.
    started_at: DateTime<Utc>,
}

/// The storefront query service; cheap to clone, state is shared.
#[derive(Clone)]
pub struct SearchService {
    inner: Arc<ServiceInner>,
}

impl SearchService {
    #[must_use]
    pub fn new(elastic: ElasticClient, config: &AppConfig) -> Self {
        let disabled = Arc::new(AtomicBool::new(config.cache_disabled));
        let resolver = ConfigResolver::new(
            elastic.clone(),
            Duration::from_secs(config.config_cache_ttl_secs),
            Arc::clone(&disabled),
        );
        let cache = |name: &'static str, ttl_secs: u64| CacheConfig {
            name,
            ttl: Duration::from_secs(ttl_secs),
            max_size: config.cache_max_entries,
            disabled: Arc::clone(&disabled),
        };
        Self {
            inner: Arc::new(ServiceInner {
                elastic,
                resolver,
                search_cache: QueryCache::new(cache("search", config.search_cache_ttl_secs)),
                products_cache: QueryCache::new(cache("products", config.search_cache_ttl_secs)),
                facet_cache: QueryCache::new(cache("facets", config.facet_cache_ttl_secs)),
                filter_list_cache: QueryCache::new(cache(
                    "filter-list",
                    config.filter_list_cache_ttl_secs,
                )),
                products_deadline: Duration::from_secs(config.products_timeout_secs),
                filters_deadline: Duration::from_secs(config.filters_timeout_secs),
                started_at: Utc::now(),
            }),
        }
    }

    /// The shared cluster client (health checks, admin hooks).
    #[must_use]
    pub fn elastic(&self) -> &ElasticClient {
        &self.inner.elastic
    }

    /// Starts the background sweepers for every cache.
    pub fn start_sweepers(&self) {
        self.inner.search_cache.start_sweeper(DEFAULT_SWEEP_INTERVAL);
        self.inner.products_cache.start_sweeper(DEFAULT_SWEEP_INTERVAL);
        self.inner.facet_cache.start_sweeper(DEFAULT_SWEEP_INTERVAL);
        self.inner
            .filter_list_cache
            .start_sweeper(DEFAULT_SWEEP_INTERVAL);
        self.inner.resolver.start_sweeper(DEFAULT_SWEEP_INTERVAL);
    }

    /// Stops the sweepers; part of graceful shutdown.
    pub fn stop_sweepers(&self) {
        self.inner.search_cache.stop_sweeper();
        self.inner.products_cache.stop_sweeper();
        self.inner.facet_cache.stop_sweeper();
        self.inner.filter_list_cache.stop_sweeper();
        self.inner.resolver.stop_sweeper();
    }

    /// Drops every cached entry belonging to one tenant.
    pub fn invalidate_shop(&self, shop: &ShopDomain) {
        let cfg_pattern = format!("*:{shop}:cfg:*");
        self.inner.search_cache.invalidate_pattern(&cfg_pattern);
        self.inner.products_cache.invalidate_pattern(&cfg_pattern);
        self.inner.facet_cache.invalidate_pattern(&cfg_pattern);
        self.inner
            .filter_list_cache
            .invalidate_pattern(&format!("filters:{shop}:*"));
        self.inner.resolver.invalidate(shop);
    }

    async fn resolve_and_apply(
        &self,
        shop: &ShopDomain,
        input: FilterInput,
    ) -> (FilterInput, Option<FilterConfiguration>, String) {
        let collection = input.collections.first().map(String::as_str);
        let cpid = input.cpid.as_deref();
        let config = self.inner.resolver.resolve(shop, collection, cpid).await;
        let hash = config_hash(config.as_ref(), self.inner.started_at);
        let applied = apply_config(input, config.as_ref());
        (applied, config, hash)
    }

    /// `GET /storefront/products`: documents plus optional facets.
    ///
    /// # Errors
    ///
    /// Surfaces upstream failures; a missing index is not one (empty page).
    pub async fn products(
        &self,
        shop: &ShopDomain,
        input: FilterInput,
    ) -> Result<ProductsPayload, ServiceError> {
        let (applied, config, hash) = self.resolve_and_apply(shop, input).await;
        let key = format!(
            "products:{shop}:cfg:{hash}:{}",
            filter_input_hash(&applied)
        );

        let service = self.clone();
        let shop = shop.clone();
        self.inner
            .products_cache
            .get_or_compute(&key, move || async move {
                service.execute_products(&shop, &applied, config.as_ref()).await
            })
            .await
            .map_err(ServiceError::from)
    }

    async fn execute_products(
        &self,
        shop: &ShopDomain,
        input: &FilterInput,
        config: Option<&FilterConfiguration>,
    ) -> Result<ProductsPayload, ServiceError> {
        let body = product_search_body(input, config);
        let response = self
            .inner
            .elastic
            .search(
                &shop.products_index(),
                &body.to_value(),
                self.inner.products_deadline,
            )
            .await?;

        let filters = input
            .include_filters
            .then(|| format_facets(response.aggregations.as_ref(), config));

        Ok(ProductsPayload {
            products: project_hits(&response, &input.fields),
            pagination: Pagination::new(response.total(), input.page, input.limit),
            filters,
        })
    }

    /// `GET /storefront/filters`: facets plus the applied-filters echo.
    ///
    /// # Errors
    ///
    /// Surfaces upstream failures.
    pub async fn filters(
        &self,
        shop: &ShopDomain,
        input: FilterInput,
    ) -> Result<FiltersPayload, ServiceError> {
        let (applied, config, hash) = self.resolve_and_apply(shop, input).await;

        // A bare collection-page render hits the long-lived filter-list
        // cache; anything carrying user refinement goes through the facet
        // cache keyed by input and config hash.
        let (cache, key) = if is_default_filter_request(&applied) {
            let page = applied
                .cpid
                .as_deref()
                .and_then(shopfilter_core::normalize_collection_id)
                .unwrap_or_else(|| "all".to_string());
            (&self.inner.filter_list_cache, format!("filters:{shop}:{page}"))
        } else {
            (
                &self.inner.facet_cache,
                format!("facets:{shop}:cfg:{hash}:{}", filter_input_hash(&applied)),
            )
        };

        let service = self.clone();
        let shop = shop.clone();
        cache
            .get_or_compute(&key, move || async move {
                service.execute_filters(&shop, &applied, config.as_ref()).await
            })
            .await
            .map_err(ServiceError::from)
    }

    async fn execute_filters(
        &self,
        shop: &ShopDomain,
        input: &FilterInput,
        config: Option<&FilterConfiguration>,
    ) -> Result<FiltersPayload, ServiceError> {
        let body = facet_search_body(input, config);
        let response = self
            .inner
            .elastic
            .search(
                &shop.products_index(),
                &body.to_value(),
                self.inner.filters_deadline,
            )
            .await?;

        let facet_set = format_facets(response.aggregations.as_ref(), config);
        Ok(FiltersPayload {
            filters: facet_set.facets,
            price_range: facet_set.price_range,
            variant_price_range: facet_set.variant_price_range,
            applied_filters: AppliedFilters::from_input(input),
        })
    }

    /// `GET /storefront/search`: documents, optional facets, and
    /// suggestion/correction handling for zero-result queries.
    ///
    /// # Errors
    ///
    /// Surfaces upstream failures from the primary search; suggestion
    /// lookups degrade silently.
    pub async fn search(
        &self,
        shop: &ShopDomain,
        input: FilterInput,
        options: SearchOptions,
    ) -> Result<SearchPayload, ServiceError> {
        let (applied, config, hash) = self.resolve_and_apply(shop, input).await;
        let key = format!(
            "search:{shop}:cfg:{hash}:{}:s{}z{}f{}",
            filter_input_hash(&applied),
            u8::from(options.suggestions),
            u8::from(options.handle_zero_results),
            u8::from(options.include_facets),
        );

        let service = self.clone();
        let shop = shop.clone();
        self.inner
            .search_cache
            .get_or_compute(&key, move || async move {
                service
                    .execute_search(&shop, &applied, config.as_ref(), options)
                    .await
            })
            .await
            .map_err(ServiceError::from)
    }

    async fn execute_search(
        &self,
        shop: &ShopDomain,
        input: &FilterInput,
        config: Option<&FilterConfiguration>,
        options: SearchOptions,
    ) -> Result<SearchPayload, ServiceError> {
        let index = shop.products_index();
        let deadline = self.inner.products_deadline;

        // One round-trip serves the whole render: documents plus, when
        // requested, the facet query against the same filter.
        let mut entries = vec![(index.clone(), product_search_body(input, config).to_value())];
        if options.include_facets {
            entries.push((index.clone(), facet_search_body(input, config).to_value()));
        }
        let mut responses = self.inner.elastic.msearch(&entries, deadline).await?;
        let facet_response = if options.include_facets {
            responses.pop()
        } else {
            None
        };
        let document_response = responses
            .into_iter()
            .next()
            .ok_or(ServiceError::Internal)?;

        let total = document_response.total();
        let zero_results = total == 0;
        let query_text = input.search.clone().unwrap_or_default();

        let mut payload = SearchPayload {
            products: project_hits(&document_response, &input.fields),
            pagination: Pagination::new(total, input.page, input.limit),
            suggestions: None,
            zero_results: zero_results.then_some(true),
            alternative_queries: None,
            did_you_mean: None,
            query_correction: None,
            facets: facet_response
                .map(|r| format_facets(r.aggregations.as_ref(), config)),
            search_metadata: SearchMetadata {
                query: query_text.clone(),
                total,
                took_ms: document_response.took,
                zero_results,
            },
        };

        let want_suggestions = !query_text.is_empty()
            && (options.suggestions || (zero_results && options.handle_zero_results));
        if want_suggestions {
            self.attach_suggestions(&index, &query_text, input, &mut payload)
                .await;
        }

        Ok(payload)
    }

    /// Runs the suggest query and validates "did you mean" candidates with
    /// count probes. Any failure here is absorbed — suggestions are garnish,
    /// never worth failing the response over.
    async fn attach_suggestions(
        &self,
        index: &str,
        query_text: &str,
        input: &FilterInput,
        payload: &mut SearchPayload,
    ) {
        let deadline = self.inner.filters_deadline;
        let suggest_body = SearchBody {
            query: None,
            from: None,
            size: Some(0),
            sort: Vec::new(),
            aggs: std::collections::BTreeMap::new(),
            suggest: Some(suggest_section(query_text)),
        };

        let response = match self
            .inner
            .elastic
            .search(index, &suggest_body.to_value(), deadline)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(error = %e, "suggestion lookup failed; skipping");
                return;
            }
        };

        let groups = response.suggest_groups(TITLE_SUGGESTER);
        let suggestions = suggestion_terms(&groups);
        if !suggestions.is_empty() {
            payload.suggestions = Some(suggestions);
        }

        let candidates = correction_candidates(query_text, &groups);
        if candidates.is_empty() {
            return;
        }

        // Probe each candidate; only corrections with hits are offered.
        let probes: Vec<(String, Value)> = candidates
            .iter()
            .map(|candidate| {
                let mut probe_input = input.clone();
                probe_input.search = Some(candidate.clone());
                let body = SearchBody {
                    query: Some(compile_query(&probe_input, PriceMode::Search)),
                    from: None,
                    size: Some(0),
                    sort: Vec::new(),
                    aggs: std::collections::BTreeMap::new(),
                    suggest: None,
                };
                (index.to_string(), body.to_value())
            })
            .collect();

        let results = match self.inner.elastic.msearch(&probes, deadline).await {
            Ok(results) => results,
            Err(e) => {
                tracing::debug!(error = %e, "correction probes failed; skipping");
                return;
            }
        };

        let alternatives: Vec<String> = candidates
            .iter()
            .zip(results.iter())
            .filter(|(_, r)| r.total() > 0)
            .map(|(c, _)| c.clone())
            .collect();

        if let Some(best) = alternatives.first() {
            payload.did_you_mean = Some(best.clone());
            payload.query_correction = Some(QueryCorrection {
                original: query_text.to_string(),
                corrected: best.clone(),
                message: format!("Showing results for \"{best}\""),
            });
        }
        if !alternatives.is_empty() {
            payload.alternative_queries = Some(alternatives);
        }
    }
}

fn project_hits(response: &SearchResponse, fields: &[String]) -> Vec<Value> {
    response
        .hits
        .hits
        .iter()
        .map(|hit| project_product(&hit.source, fields))
        .collect()
}

/// Whether a filters request is a bare page render (cacheable per page)
/// rather than a refined query. The only collection filter allowed is the
/// one implied by the page's own CPID.
fn is_default_filter_request(input: &FilterInput) -> bool {
    let unrefined = input.search.is_none()
        && input.vendors.is_empty()
        && input.product_types.is_empty()
        && input.tags.is_empty()
        && input.variant_option_keys.is_empty()
        && input.variant_skus.is_empty()
        && input.options.is_empty()
        && input.price_min.is_none()
        && input.price_max.is_none()
        && input.variant_price_min.is_none()
        && input.variant_price_max.is_none()
        && input.keep_option.is_none();
    if !unrefined {
        return false;
    }
    match (input.cpid.as_deref(), input.collections.as_slice()) {
        (_, []) => true,
        (Some(cpid), [only]) => {
            shopfilter_core::normalize_collection_id(cpid).is_some_and(|id| id == *only)
        }
        _ => false,
    }
}
