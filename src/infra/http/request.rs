//! Request descriptors.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Method;
use url::Url;

use crate::cache::CacheKey;

/// One logical upstream request. Built per call and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    pub url: Url,
    pub params: BTreeMap<String, String>,
    /// Bearer token; not part of the cache key.
    pub bearer_token: Option<String>,
    pub cacheable: bool,
    pub ttl: Duration,
}

impl RequestDescriptor {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            params: BTreeMap::new(),
            bearer_token: None,
            cacheable: false,
            ttl: Duration::ZERO,
        }
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn bearer(mut self, token: Option<&str>) -> Self {
        self.bearer_token = token.map(str::to_string);
        self
    }

    /// Mark the response cacheable for `ttl`. A zero TTL disables caching.
    pub fn cached_for(mut self, ttl: Duration) -> Self {
        self.cacheable = !ttl.is_zero();
        self.ttl = ttl;
        self
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey::fingerprint(self.method.as_str(), self.url.as_str(), &self.params)
    }

    /// URL with the parameters encoded into the query string.
    pub fn full_url(&self) -> Url {
        let mut url = self.url.clone();
        if !self.params.is_empty() {
            url.set_query(None);
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &self.params {
                pairs.append_pair(name, value);
            }
        }
        url
    }
}

/// Append path segments to a base URL, percent-encoding each segment.
///
/// Bases that cannot carry a path are rejected at configuration time.
pub fn endpoint_url(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}
