//! # Rendering Caches
//!
//! Three memo tables owned by the view context:
//!
//! | cache    | key                          | value                   |
//! |----------|------------------------------|-------------------------|
//! | content  | formats + template source    | compiled template       |
//! | file     | file location                | compiled template       |
//! | template | `view/[name;name;...]`       | located template file   |
//!
//! Each one can be disabled on its own; a disabled cache always computes.

use crate::error::ViewResult;
use crate::finder::FoundTemplate;
use crate::template::TemplateRef;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

/// A memo table with hit/miss counters.
#[derive(Debug)]
pub struct Cache<K, V> {
    name: &'static str,
    entries: RwLock<HashMap<K, V>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone,
{
    /// Creates an empty cache.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns the cached value for `key`, computing and storing it on a
    /// miss. With `disabled` the cache is bypassed entirely.
    ///
    /// # Errors
    ///
    /// Propagates the error of `compute`; nothing is stored then.
    pub fn fetch<F>(&self, key: &K, disabled: bool, compute: F) -> ViewResult<V>
    where
        F: FnOnce() -> ViewResult<V>,
    {
        if disabled {
            return compute();
        }
        if let Some(v) = self.entries.read().get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(cache = self.name, ?key, "cache hit");
            return Ok(v.clone());
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(cache = self.name, ?key, "cache miss");
        let value = compute()?;
        self.entries.write().insert(key.clone(), value.clone());
        Ok(value)
    }

    /// Drops every entry and resets the counters.
    pub fn clear(&self) {
        self.entries.write().clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True if empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Lookups answered from the cache.
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Lookups that had to compute.
    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

/// The renderer's caches.
#[derive(Debug)]
pub struct RenderCaches {
    /// Compiled templates by formats and source.
    pub content: Cache<(Vec<String>, String), TemplateRef>,
    /// Compiled templates by file location.
    pub file: Cache<String, TemplateRef>,
    /// Located files by view and template hierarchy.
    pub template: Cache<String, FoundTemplate>,
}

impl RenderCaches {
    /// Creates empty caches.
    #[must_use]
    pub fn new() -> Self {
        Self {
            content: Cache::new("content"),
            file: Cache::new("file"),
            template: Cache::new("template"),
        }
    }

    /// Clears all three caches.
    pub fn clear_all(&self) {
        self.content.clear();
        self.file.clear();
        self.template.clear();
        tracing::debug!("rendering caches cleared");
    }
}

impl Default for RenderCaches {
    fn default() -> Self {
        Self::new()
    }
}

/// Key of the template cache.
#[must_use]
pub fn template_key(view: &str, hierarchy: &[String]) -> String {
    format!("{view}/[{}]", hierarchy.join(";"))
}
