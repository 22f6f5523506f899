//! Memoization of the search results keyed by the target and the search mode

use crate::aggregate::SearchResult;
use crate::error::CacheError;
use crate::float_trait::Float;

use std::collections::HashMap;
use std::fs;
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Identity of a stored search result
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub target: String,
    pub joint_fit: bool,
}

impl CacheKey {
    pub fn new(target: impl Into<String>, joint_fit: bool) -> Self {
        Self {
            target: target.into(),
            joint_fit,
        }
    }
}

/// Storage of the search results
///
/// `get` returns `Ok(None)` for an absent entry, errors are reserved for unreadable storage.
pub trait SearchCache<T>: Send + Sync
where
    T: Float,
{
    fn get(&self, key: &CacheKey) -> Result<Option<SearchResult<T>>, CacheError>;

    fn put(&self, key: &CacheKey, result: &SearchResult<T>) -> Result<(), CacheError>;
}

/// Cache which stores nothing, every search is recomputed
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCache;

impl<T> SearchCache<T> for NoCache
where
    T: Float,
{
    fn get(&self, _key: &CacheKey) -> Result<Option<SearchResult<T>>, CacheError> {
        Ok(None)
    }

    fn put(&self, _key: &CacheKey, _result: &SearchResult<T>) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Process-local cache
#[derive(Debug)]
pub struct MemoryCache<T> {
    entries: Mutex<HashMap<CacheKey, SearchResult<T>>>,
}

impl<T> Default for MemoryCache<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> MemoryCache<T>
where
    T: Float,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> SearchCache<T> for MemoryCache<T>
where
    T: Float,
{
    fn get(&self, key: &CacheKey) -> Result<Option<SearchResult<T>>, CacheError> {
        let entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &CacheKey, result: &SearchResult<T>) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        entries.insert(key.clone(), result.clone());
        Ok(())
    }
}

/// Directory of JSON files, one per target and search mode
///
/// File names are `target<id>.search<0|1>.json` where the digit is the joint-fit flag. Targets
/// must be non-empty and free of path separators, so every file stays inside the directory.
#[derive(Clone, Debug)]
pub struct JsonFileCache {
    dir: PathBuf,
}

impl JsonFileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, key: &CacheKey) -> Result<PathBuf, CacheError> {
        let target = &key.target;
        if target.is_empty() || target.contains(['/', '\\', '\0']) {
            return Err(CacheError::InvalidTarget(target.clone()));
        }
        Ok(self.dir.join(format!(
            "target{}.search{}.json",
            target,
            u8::from(key.joint_fit)
        )))
    }
}

impl<T> SearchCache<T> for JsonFileCache
where
    T: Float,
{
    fn get(&self, key: &CacheKey) -> Result<Option<SearchResult<T>>, CacheError> {
        let path = self.path(key)?;
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CacheError::Io { path, source }),
        };
        let result = serde_json::from_reader(BufReader::new(file))
            .map_err(|source| CacheError::Serde { path, source })?;
        Ok(Some(result))
    }

    fn put(&self, key: &CacheKey, result: &SearchResult<T>) -> Result<(), CacheError> {
        let path = self.path(key)?;
        fs::create_dir_all(&self.dir).map_err(|source| CacheError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let file = fs::File::create(&path).map_err(|source| CacheError::Io {
            path: path.clone(),
            source,
        })?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, result).map_err(|source| CacheError::Serde {
            path: path.clone(),
            source,
        })?;
        writer
            .flush()
            .map_err(|source| CacheError::Io { path, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> SearchResult<f64> {
        SearchResult::from_arrays(
            vec![0.1, 0.2, 0.3],
            vec![1e-3, f64::NAN, -2.5e-4],
            vec![1.0 / 3.0, f64::NAN, 7e-9],
            vec![0.123456789012345, f64::NAN, -1e300],
        )
        .unwrap()
    }

    fn assert_bitwise_eq(a: &SearchResult<f64>, b: &SearchResult<f64>) {
        for (x, y) in [
            (a.time(), b.time()),
            (a.depth(), b.depth()),
            (a.variance(), b.variance()),
            (a.delta_chisq(), b.delta_chisq()),
        ] {
            let x: Vec<_> = x.iter().map(|x| x.to_bits()).collect();
            let y: Vec<_> = y.iter().map(|y| y.to_bits()).collect();
            assert_eq!(x, y);
        }
    }

    #[test]
    fn file_name() {
        let cache = JsonFileCache::new("/data");
        assert_eq!(
            cache.path(&CacheKey::new("07", true)).unwrap(),
            PathBuf::from("/data/target07.search1.json")
        );
        assert_eq!(
            cache.path(&CacheKey::new("201367065", false)).unwrap(),
            PathBuf::from("/data/target201367065.search0.json")
        );
    }

    #[test]
    fn targets_stay_inside_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let cache = JsonFileCache::new(dir.path().join("cache"));
        for target in ["../escape", "a/b", "a\\b", ""] {
            let key = CacheKey::new(target, false);
            assert!(matches!(
                cache.path(&key),
                Err(CacheError::InvalidTarget(t)) if t == target
            ));
            assert!(matches!(
                cache.put(&key, &result()),
                Err(CacheError::InvalidTarget(_))
            ));
            assert!(matches!(
                SearchCache::<f64>::get(&cache, &key),
                Err(CacheError::InvalidTarget(_))
            ));
        }
        assert!(!dir.path().join("escape.search0.json").exists());
        // dots alone are a part of the file name
        assert_eq!(
            cache.path(&CacheKey::new("..", false)).unwrap(),
            dir.path().join("cache").join("target...search0.json")
        );
    }

    #[test]
    fn file_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = JsonFileCache::new(dir.path().join("nested"));
        let key = CacheKey::new("1", false);
        assert!(SearchCache::<f64>::get(&cache, &key).unwrap().is_none());

        let result = result();
        cache.put(&key, &result).unwrap();
        let restored: SearchResult<f64> = cache.get(&key).unwrap().unwrap();
        assert_bitwise_eq(&restored, &result);

        let other = CacheKey::new("1", true);
        assert!(SearchCache::<f64>::get(&cache, &other).unwrap().is_none());
    }

    #[test]
    fn corrupted_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = JsonFileCache::new(dir.path());
        let key = CacheKey::new("2", true);
        fs::write(cache.path(&key).unwrap(), "{not json").unwrap();
        assert!(matches!(
            SearchCache::<f64>::get(&cache, &key),
            Err(CacheError::Serde { .. })
        ));
    }

    #[test]
    fn memory_cache() {
        let cache = MemoryCache::<f64>::new();
        let key = CacheKey::new("3", false);
        assert!(cache.get(&key).unwrap().is_none());
        cache.put(&key, &result()).unwrap();
        assert_eq!(cache.len(), 1);
        assert_bitwise_eq(&cache.get(&key).unwrap().unwrap(), &result());
    }

    #[test]
    fn no_cache_stores_nothing() {
        let key = CacheKey::new("4", false);
        NoCache.put(&key, &result()).unwrap();
        assert!(SearchCache::<f64>::get(&NoCache, &key).unwrap().is_none());
    }
}
