//! Shop-domain normalization and index-name derivation.
//!
//! Every request carries a `shop` parameter identifying the tenant. The raw
//! value may arrive with a scheme, path, port, mixed case, or a trailing dot;
//! [`normalize_shop_domain`] reduces all of those to the bare lowercase host
//! and rejects anything that is not a `*.myshopify.com` domain or an entry in
//! the configured whitelist.

use crate::ShopDomainError;

/// A validated, normalized shop domain such as `acme.myshopify.com`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShopDomain(String);

impl ShopDomain {
    /// The normalized domain string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the tenant's product index.
    #[must_use]
    pub fn products_index(&self) -> String {
        format!("{}-products", self.0)
    }

    /// Name of the tenant's filter-configuration index.
    #[must_use]
    pub fn filters_index(&self) -> String {
        format!("{}_filters", self.0)
    }
}

impl std::fmt::Display for ShopDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalizes and validates a raw shop-domain value.
///
/// Lowercases, strips an `http(s)://` scheme, any path or query suffix, a
/// port, and a trailing dot. The result must end in `.myshopify.com` or
/// appear in `allowed_domains` (already lowercased).
///
/// # Errors
///
/// Returns [`ShopDomainError::Empty`] when nothing is left after stripping,
/// and [`ShopDomainError::NotAllowed`] for hosts outside the allowed set.
pub fn normalize_shop_domain(
    raw: &str,
    allowed_domains: &[String],
) -> Result<ShopDomain, ShopDomainError> {
    let mut host = raw.trim().to_lowercase();

    if let Some(rest) = host.strip_prefix("https://") {
        host = rest.to_string();
    } else if let Some(rest) = host.strip_prefix("http://") {
        host = rest.to_string();
    }

    if let Some(idx) = host.find(['/', '?', '#']) {
        host.truncate(idx);
    }
    if let Some(idx) = host.find(':') {
        host.truncate(idx);
    }
    let host = host.trim_end_matches('.').to_string();

    if host.is_empty() {
        return Err(ShopDomainError::Empty);
    }

    let is_myshopify = host.ends_with(".myshopify.com") && host.len() > ".myshopify.com".len();
    if is_myshopify || allowed_domains.iter().any(|d| d == &host) {
        Ok(ShopDomain(host))
    } else {
        Err(ShopDomainError::NotAllowed(host))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_myshopify_domain() {
        let shop = normalize_shop_domain("acme.myshopify.com", &[]).unwrap();
        assert_eq!(shop.as_str(), "acme.myshopify.com");
    }

    #[test]
    fn lowercases_and_strips_scheme_path_and_trailing_dot() {
        let shop = normalize_shop_domain("HTTPS://Acme.MyShopify.com./admin?x=1", &[]).unwrap();
        assert_eq!(shop.as_str(), "acme.myshopify.com");
    }

    #[test]
    fn strips_port() {
        let shop = normalize_shop_domain("acme.myshopify.com:443", &[]).unwrap();
        assert_eq!(shop.as_str(), "acme.myshopify.com");
    }

    #[test]
    fn rejects_foreign_domain() {
        let result = normalize_shop_domain("evil.example.com", &[]);
        assert!(matches!(result, Err(ShopDomainError::NotAllowed(ref h)) if h == "evil.example.com"));
    }

    #[test]
    fn rejects_bare_myshopify_suffix() {
        assert!(normalize_shop_domain(".myshopify.com", &[]).is_err());
    }

    #[test]
    fn accepts_whitelisted_domain() {
        let allowed = vec!["shop.example.com".to_string()];
        let shop = normalize_shop_domain("Shop.Example.com", &allowed).unwrap();
        assert_eq!(shop.as_str(), "shop.example.com");
    }

    #[test]
    fn rejects_empty_input() {
        assert!(matches!(
            normalize_shop_domain("  ", &[]),
            Err(ShopDomainError::Empty)
        ));
    }

    #[test]
    fn index_names_follow_convention() {
        let shop = normalize_shop_domain("acme.myshopify.com", &[]).unwrap();
        assert_eq!(shop.products_index(), "acme.myshopify.com-products");
        assert_eq!(shop.filters_index(), "acme.myshopify.com_filters");
    }
}
