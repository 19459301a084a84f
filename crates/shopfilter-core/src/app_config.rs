use std::net::SocketAddr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub elastic_url: String,
    pub elastic_username: Option<String>,
    pub elastic_password: Option<String>,
    /// Extra shop domains accepted besides `*.myshopify.com`.
    pub allowed_shop_domains: Vec<String>,
    pub cache_disabled: bool,
    pub cache_max_entries: usize,
    pub search_cache_ttl_secs: u64,
    pub facet_cache_ttl_secs: u64,
    pub filter_list_cache_ttl_secs: u64,
    pub config_cache_ttl_secs: u64,
    pub products_timeout_secs: u64,
    pub filters_timeout_secs: u64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("elastic_url", &self.elastic_url)
            .field(
                "elastic_username",
                &self.elastic_username.as_ref().map(|_| "[redacted]"),
            )
            .field(
                "elastic_password",
                &self.elastic_password.as_ref().map(|_| "[redacted]"),
            )
            .field("allowed_shop_domains", &self.allowed_shop_domains)
            .field("cache_disabled", &self.cache_disabled)
            .field("cache_max_entries", &self.cache_max_entries)
            .field("search_cache_ttl_secs", &self.search_cache_ttl_secs)
            .field("facet_cache_ttl_secs", &self.facet_cache_ttl_secs)
            .field(
                "filter_list_cache_ttl_secs",
                &self.filter_list_cache_ttl_secs,
            )
            .field("config_cache_ttl_secs", &self.config_cache_ttl_secs)
            .field("products_timeout_secs", &self.products_timeout_secs)
            .field("filters_timeout_secs", &self.filters_timeout_secs)
            .finish()
    }
}
