pub mod app_config;
pub mod applier;
pub mod config;
pub mod config_hash;
pub mod filter_config;
pub mod filter_input;
pub mod parser;
pub mod shop;

pub use app_config::{AppConfig, Environment};
pub use applier::apply_config;
pub use config_hash::{config_hash, filter_input_hash, NO_FILTER_HASH};
pub use filter_config::{
    normalize_collection_id, AllowedCollection, ConfigSettings, ConfigStatus, DeploymentChannel,
    FilterConfiguration, FilterOption, OptionSettings, StandardFilter, TargetScope,
    NONE_COLLECTION_SENTINEL,
};
pub use filter_input::{FilterInput, SortOrder, SortSpec, DEFAULT_LIMIT, DEFAULT_PAGE, MAX_LIMIT};
pub use parser::{parse_query, sanitize_text};
pub use shop::{normalize_shop_domain, ShopDomain};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env var: {0}")]
    MissingEnvVar(String),

    #[error("invalid env var {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ShopDomainError {
    #[error("shop domain is empty")]
    Empty,

    #[error("shop domain not allowed: {0}")]
    NotAllowed(String),
}
