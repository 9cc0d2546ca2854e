//! Read-through cache over the distinct tag name set.
//!
//! One fixed key maps to the full list. Mutations that touch the tag set
//! delete the entry instead of updating it, trading one extra miss for
//! simplicity. An empty list is cached like any other value.

use std::time::Duration;

use tracing::debug;

use crate::cache::Cache;
use crate::error::Error;
use crate::store::Store;

pub const TAGS_CACHE_KEY: &str = "tags_list";
pub const TAGS_CACHE_TTL: Duration = Duration::from_secs(300);

pub fn list_tags(store: &dyn Store, cache: &dyn Cache) -> Result<Vec<String>, Error> {
    if let Some(raw) = cache.get(TAGS_CACHE_KEY) {
        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(names) => return Ok(names),
            // Undecodable entry: drop it and rebuild from the store.
            Err(_) => cache.delete(TAGS_CACHE_KEY),
        }
    }

    let names = store.distinct_tags()?;
    match serde_json::to_string(&names) {
        Ok(raw) => cache.set(TAGS_CACHE_KEY, &raw, TAGS_CACHE_TTL),
        Err(err) => debug!(error = %err, "skipping tag cache fill"),
    }
    Ok(names)
}

/// Called by article mutations whenever tag associations change.
pub(crate) fn invalidate(cache: &dyn Cache) {
    cache.delete(TAGS_CACHE_KEY);
    debug!("tag list cache invalidated");
}
