//! Process-wide header-name cache (§4.1, §9 "process-wide header-name
//! cache").
//!
//! Maps an incoming (arbitrarily cased) header name to its interned
//! lowercase [`http::HeaderName`], so repeated requests for a header like
//! `"Content-Type"` don't re-allocate and re-validate the lowercase form
//! every time. Grounded on the teacher's own "interned, write-through"
//! framing of the `string::String<Bytes>` pattern used throughout
//! `frame/headers.rs`, generalized here to an explicit concurrent map
//! (the teacher ran single-threaded per connection and had no need for
//! one); the corpus's `salvo` pairs `indexmap` with `parking_lot` for
//! exactly this kind of shared lookup table, which this module follows.

use std::sync::OnceLock;

use indexmap::IndexMap;
use parking_lot::RwLock;

use http::HeaderName;

/// Caps we don't expect to ever hit in practice, but bound growth anyway
/// per §9: "If unbounded growth is a concern, cap size and evict at
/// random; correctness does not depend on hits."
const MAX_ENTRIES: usize = 4096;

pub struct HeaderNameCache {
    // Keyed by the as-received cased spelling; insert-if-absent, safe for
    // concurrent readers and writers. `IndexMap::new()` isn't a `const fn`
    // (its default hasher isn't one), so the map itself is built lazily
    // behind a `OnceLock` rather than in a literal `const fn` constructor.
    entries: OnceLock<RwLock<IndexMap<String, HeaderName>>>,
}

impl HeaderNameCache {
    pub const fn new() -> HeaderNameCache {
        HeaderNameCache {
            entries: OnceLock::new(),
        }
    }

    fn entries(&self) -> &RwLock<IndexMap<String, HeaderName>> {
        self.entries.get_or_init(|| RwLock::new(IndexMap::new()))
    }

    /// Returns the interned lowercase `HeaderName` for `name`, lower-casing
    /// and validating it the first time it's seen.
    pub fn intern(&self, name: &str) -> Result<HeaderName, http::header::InvalidHeaderName> {
        if let Some(cached) = self.entries().read().get(name) {
            return Ok(cached.clone());
        }

        let lower = name.to_ascii_lowercase();
        let header_name = HeaderName::from_bytes(lower.as_bytes())?;

        let mut entries = self.entries().write();
        if entries.len() >= MAX_ENTRIES {
            // Evict an arbitrary entry; correctness never depends on a hit.
            entries.swap_remove_index(0);
        }
        entries
            .entry(name.to_owned())
            .or_insert_with(|| header_name.clone());

        Ok(header_name)
    }
}

/// The single process-wide instance used by [`crate::headers`].
pub static HEADER_NAME_CACHE: HeaderNameCache = HeaderNameCache::new();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interns_case_insensitively_to_lowercase() {
        let cache = HeaderNameCache::new();
        let a = cache.intern("Content-Type").unwrap();
        let b = cache.intern("content-type").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "content-type");
    }

    #[test]
    fn rejects_invalid_names() {
        let cache = HeaderNameCache::new();
        assert!(cache.intern("bad header").is_err());
    }
}
