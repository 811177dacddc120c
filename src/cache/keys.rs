//! Cache key derivation.
//!
//! A key fingerprints one logical request: method, URL and the query
//! parameters sorted by name, so that parameter order never splits the cache.

use std::collections::BTreeMap;
use std::fmt;

/// Fingerprint of a cacheable request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build the key for `method url` with the given parameters.
    ///
    /// `params` is a `BTreeMap`, so iteration is already sorted by name.
    pub fn fingerprint(method: &str, url: &str, params: &BTreeMap<String, String>) -> Self {
        let mut key = format!("{} {url}", method.to_ascii_uppercase());
        let mut separator = '?';
        for (name, value) in params {
            key.push(separator);
            key.push_str(name);
            key.push('=');
            key.push_str(value);
            separator = '&';
        }
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn parameter_order_does_not_change_the_key() {
        let first = CacheKey::fingerprint(
            "GET",
            "https://registry.test/materials",
            &params(&[("q", "steel"), ("limit", "10")]),
        );
        let second = CacheKey::fingerprint(
            "GET",
            "https://registry.test/materials",
            &params(&[("limit", "10"), ("q", "steel")]),
        );

        assert_eq!(first, second);
        assert_eq!(
            first.as_str(),
            "GET https://registry.test/materials?limit=10&q=steel"
        );
    }

    #[test]
    fn method_is_normalised_and_part_of_the_key() {
        let get = CacheKey::fingerprint("get", "https://registry.test/a", &BTreeMap::new());
        let post = CacheKey::fingerprint("POST", "https://registry.test/a", &BTreeMap::new());

        assert_eq!(get.as_str(), "GET https://registry.test/a");
        assert_ne!(get, post);
    }

    #[test]
    fn different_params_produce_different_keys() {
        let url = "https://registry.test/materials";
        let a = CacheKey::fingerprint("GET", url, &params(&[("q", "steel")]));
        let b = CacheKey::fingerprint("GET", url, &params(&[("q", "timber")]));
        assert_ne!(a, b);
    }
}
