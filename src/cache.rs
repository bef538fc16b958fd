//! Caching of fetched statistics tables, keyed by table, year and the dimensions a table was
//! requested with.

use crate::core::matrix::KeyString;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct CacheKey {
    pub table_id: KeyString,
    pub year: u16,
    /// Dimension name/value pairs, kept sorted so the same request always makes the same key.
    dimensions: Vec<(KeyString, KeyString)>,
}

impl CacheKey {
    pub fn new<'a>(
        table_id: &str,
        year: u16,
        dimensions: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        let mut dimensions = dimensions
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .collect::<Vec<(KeyString, KeyString)>>();
        dimensions.sort();

        Self {
            table_id: table_id.into(),
            year,
            dimensions,
        }
    }

    pub fn dimensions(&self) -> &[(KeyString, KeyString)] {
        &self.dimensions
    }

    pub fn dimension(&self, name: &str) -> Option<&str> {
        self.dimensions
            .iter()
            .find(|(dimension, _)| dimension.as_str() == name)
            .map(|(_, value)| value.as_str())
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.table_id, self.year)?;
        for (_, value) in &self.dimensions {
            write!(f, "_{value}")?;
        }
        Ok(())
    }
}

pub trait TableCache<T> {
    fn get(&self, key: &CacheKey) -> Option<Arc<T>>;
    fn put(&self, key: CacheKey, table: Arc<T>);
    fn invalidate(&self, key: &CacheKey);
    fn clear(&self);
}

/// A process-wide cache that can be shared between concurrent runs.
#[derive(Debug)]
pub struct InMemoryTableCache<T> {
    tables: RwLock<HashMap<CacheKey, Arc<T>>>,
}

impl<T> Default for InMemoryTableCache<T> {
    fn default() -> Self {
        Self {
            tables: Default::default(),
        }
    }
}

impl<T> InMemoryTableCache<T> {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn len(&self) -> usize {
        self.tables.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.read().is_empty()
    }
}

impl<T> TableCache<T> for InMemoryTableCache<T> {
    fn get(&self, key: &CacheKey) -> Option<Arc<T>> {
        self.tables.read().get(key).cloned()
    }

    fn put(&self, key: CacheKey, table: Arc<T>) {
        self.tables.write().insert(key, table);
    }

    fn invalidate(&self, key: &CacheKey) {
        self.tables.write().remove(key);
    }

    fn clear(&self) {
        self.tables.write().clear();
    }
}

/// Return the cached table for `key`, calling `fetch` and caching its result on a miss or when a
/// refresh is forced. Failed fetches are not cached.
pub fn fetch_with_cache<T, C, F>(
    cache: &C,
    key: &CacheKey,
    force_refresh: bool,
    fetch: F,
) -> anyhow::Result<Arc<T>>
where
    C: TableCache<T> + ?Sized,
    F: FnOnce(&CacheKey) -> anyhow::Result<T>,
{
    if !force_refresh {
        if let Some(table) = cache.get(key) {
            debug!(key = %key, "statistics table served from cache");
            return Ok(table);
        }
    }

    let table = Arc::new(fetch(key)?);
    cache.put(key.clone(), table.clone());
    debug!(key = %key, force_refresh, "statistics table fetched");

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use pretty_assertions::assert_eq;
    use rstest::*;
    use std::cell::Cell;

    #[fixture]
    fn key() -> CacheKey {
        CacheKey::new("ugr", 2015, [("fuel", "gas")])
    }

    #[rstest]
    fn test_dimension_order_does_not_change_key() {
        let first = CacheKey::new("jevi", 2015, [("fuel", "gas"), ("scope", "industry")]);
        let second = CacheKey::new("jevi", 2015, [("scope", "industry"), ("fuel", "gas")]);

        assert_eq!(first, second);
        assert_eq!(first.to_string(), "jevi_2015_gas_industry");
        assert_eq!(first.dimension("scope"), Some("industry"));
    }

    #[rstest]
    fn test_second_fetch_is_served_from_cache(key: CacheKey) {
        let cache = InMemoryTableCache::new();
        let calls = Cell::new(0);
        let fetch = |_: &CacheKey| {
            calls.set(calls.get() + 1);
            Ok(vec![1., 2.])
        };

        let first = fetch_with_cache(&cache, &key, false, fetch).unwrap();
        let second = fetch_with_cache(&cache, &key, false, fetch).unwrap();

        assert_eq!(calls.get(), 1);
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
    }

    #[rstest]
    fn test_force_refresh_bypasses_cache(key: CacheKey) {
        let cache = InMemoryTableCache::new();
        cache.put(key.clone(), Arc::new(vec![1.]));

        let table = fetch_with_cache(&cache, &key, true, |_| Ok(vec![2.])).unwrap();

        assert_eq!(*table, vec![2.]);
        assert_eq!(*cache.get(&key).unwrap(), vec![2.]);
    }

    #[rstest]
    fn test_failed_fetch_is_not_cached(key: CacheKey) {
        let cache: InMemoryTableCache<Vec<f64>> = InMemoryTableCache::new();

        let result = fetch_with_cache(&cache, &key, false, |key| bail!("{key} unavailable"));

        assert_eq!(result.unwrap_err().to_string(), "ugr_2015_gas unavailable");
        assert!(cache.is_empty());
    }

    #[rstest]
    fn test_invalidate_removes_entry(key: CacheKey) {
        let cache = InMemoryTableCache::new();
        cache.put(key.clone(), Arc::new(0u8));

        cache.invalidate(&key);

        assert!(cache.get(&key).is_none());
    }

    #[rstest]
    fn test_clear_empties_cache(key: CacheKey) {
        let cache = InMemoryTableCache::new();
        cache.put(key, Arc::new(0u8));
        cache.put(CacheKey::new("employees", 2015, []), Arc::new(1u8));

        cache.clear();

        assert!(cache.is_empty());
    }
}
