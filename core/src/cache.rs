/*
    spotfm-rs | Rust CLI tool to mirror a Spotify library and find duplicate tracks.
    Copyright (C) 2025  Israel Alberto Roldan Vega

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU Affero General Public License as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Affero General Public License for more details.

    You should have received a copy of the GNU Affero General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cache serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// An entity that can be stored in the object cache.
pub trait Cacheable: Serialize + DeserializeOwned {
    /// Sub-directory holding this kind of entity.
    const KIND: &'static str;

    fn cache_id(&self) -> &str;
}

/// On-disk cache of serialized entities, one JSON file per object.
#[derive(Debug, Clone)]
pub struct ObjectCache {
    root: PathBuf,
}

impl ObjectCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, kind: &str, id: &str) -> PathBuf {
        self.root.join(kind).join(format!("{}.json", id))
    }

    /// Returns the cached object, or `None` on a miss.
    ///
    /// Unreadable or corrupt entries count as misses.
    pub fn get<T: Cacheable>(&self, id: &str) -> Option<T> {
        let path = self.path_for(T::KIND, id);
        if !path.exists() {
            return None;
        }
        match Self::read(&path) {
            Ok(object) => {
                debug!("Cache hit for {} {}", T::KIND, id);
                Some(object)
            }
            Err(e) => {
                warn!("Ignoring unreadable cache entry {}: {}", path.display(), e);
                None
            }
        }
    }

    fn read<T: Cacheable>(path: &Path) -> Result<T, CacheError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn try_put<T: Cacheable>(&self, object: &T) -> Result<(), CacheError> {
        let path = self.path_for(T::KIND, object.cache_id());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_vec(object)?)?;
        Ok(())
    }

    /// Stores the object, logging (not returning) failures.
    pub fn put<T: Cacheable>(&self, object: &T) {
        if let Err(e) = self.try_put(object) {
            warn!(
                "Failed to cache {} {}: {}",
                T::KIND,
                object.cache_id(),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Dummy {
        id: String,
        value: u32,
    }

    impl Cacheable for Dummy {
        const KIND: &'static str = "dummy";

        fn cache_id(&self) -> &str {
            &self.id
        }
    }

    #[test]
    fn test_put_then_get() {
        let dir = TempDir::new().unwrap();
        let cache = ObjectCache::new(dir.path().join("cache"));
        let object = Dummy {
            id: "abc".to_string(),
            value: 42,
        };

        cache.put(&object);

        assert!(dir.path().join("cache/dummy/abc.json").exists());
        assert_eq!(cache.get::<Dummy>("abc"), Some(object));
    }

    #[test]
    fn test_missing_directory_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let cache = ObjectCache::new(dir.path().join("does-not-exist"));
        assert_eq!(cache.get::<Dummy>("abc"), None);
    }

    #[test]
    fn test_corrupt_entry_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let cache = ObjectCache::new(dir.path());
        fs::create_dir_all(dir.path().join("dummy")).unwrap();
        fs::write(dir.path().join("dummy/abc.json"), "{not json").unwrap();

        assert_eq!(cache.get::<Dummy>("abc"), None);
    }

    #[test]
    fn test_write_failure_is_swallowed() {
        let dir = TempDir::new().unwrap();
        // A file where the cache root should be makes every write fail.
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "").unwrap();
        let cache = ObjectCache::new(&blocker);
        let object = Dummy {
            id: "abc".to_string(),
            value: 1,
        };

        assert!(cache.try_put(&object).is_err());
        cache.put(&object);
        assert_eq!(cache.get::<Dummy>("abc"), None);
    }
}
