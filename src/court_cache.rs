// =============================================================================
// court_cache.rs -- SHORT NAMES FOR LONG COURTS
// =============================================================================
//
// Dockets point at their court by API URL. The report wants "N.D. Cal.",
// not a URL. Looking the court up costs a request, and twenty dockets from
// the same district would cost twenty. So we remember.
//
// The cache is an explicit object handed to the aggregator, never a global.
// Each run (and each test) builds its own.
// =============================================================================

use std::num::NonZeroUsize;

use lru::LruCache;
use tracing::debug;

use crate::fetch::{Query, RecordsFetch};
use crate::models::UNKNOWN;

pub struct CourtCache {
    entries: LruCache<String, String>,
}

impl CourtCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
        }
    }

    /// Normalize whatever the docket said about its court into an API URL.
    ///
    /// Full URLs pass through, site-relative paths get the site prefix, and
    /// anything else is treated as a legacy court slug.
    pub fn court_api_url(raw: &str, site: &str, api_base: &str) -> String {
        if raw.starts_with("http") {
            raw.to_string()
        } else if raw.starts_with('/') {
            format!("{site}{raw}")
        } else {
            format!("{api_base}/courts/{raw}/")
        }
    }

    /// Resolve a court to its short display name. On any failure, the raw
    /// value comes back unchanged and nothing is cached, so the next docket
    /// gets another chance.
    pub async fn short_name(
        &mut self,
        fetch: &dyn RecordsFetch,
        raw: &str,
        site: &str,
        api_base: &str,
    ) -> String {
        if raw.is_empty() || raw == UNKNOWN {
            return UNKNOWN.to_string();
        }

        let url = Self::court_api_url(raw, site, api_base);
        if let Some(name) = self.entries.get(&url) {
            return name.clone();
        }

        let short = fetch
            .get_json(&url, &Query::new())
            .await
            .and_then(|json| crate::models::str_field(&json, "short_name"));

        match short {
            Some(name) => {
                debug!(court = url.as_str(), short_name = name.as_str(), "Court short name cached");
                self.entries.put(url, name.clone());
                name
            }
            None => raw.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
