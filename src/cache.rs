//! Content-addressed store for downloaded patch sources.
//!
//! Each URL maps to `<dir>/<xxh3 of url>.patch`, so repeated runs reuse the
//! same local file and produce identical resolved paths.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use xxhash_rust::xxh3::xxh3_64;

#[derive(Debug, Clone)]
pub struct DownloadCache {
    dir: PathBuf,
}

impl DownloadCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `~/.cache/patch-resolver/downloads`, or a temp-dir fallback when no
    /// home directory is known.
    pub fn default_location() -> Self {
        let base = home::home_dir()
            .map(|home| home.join(".cache"))
            .unwrap_or_else(std::env::temp_dir);
        Self::new(base.join("patch-resolver").join("downloads"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, url: &str) -> PathBuf {
        self.dir.join(format!("{:016x}.patch", xxh3_64(url.as_bytes())))
    }

    /// Cached file for `url`, if present.
    pub fn get(&self, url: &str) -> Option<PathBuf> {
        let path = self.path_for(url);
        path.is_file().then_some(path)
    }

    /// Store contents for `url` and return the local path.
    ///
    /// Written to a tempfile in the cache dir, fsynced, then renamed.
    pub fn store(&self, url: &str, contents: &[u8]) -> std::io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(url);

        let mut temp = tempfile::NamedTempFile::new_in(&self.dir)?;
        temp.write_all(contents)?;
        temp.as_file().sync_all()?;
        temp.persist(&path).map_err(|e| e.error)?;

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DownloadCache::new(dir.path().join("downloads"));
        let url = "https://example.com/fix.patch";

        assert!(cache.get(url).is_none());
        let stored = cache.store(url, b"patch body").unwrap();
        assert_eq!(cache.get(url), Some(stored.clone()));
        assert_eq!(fs::read(&stored).unwrap(), b"patch body");
    }

    #[test]
    fn test_path_is_stable_per_url() {
        let cache = DownloadCache::new("/tmp/cache");
        assert_eq!(cache.path_for("a"), cache.path_for("a"));
        assert_ne!(cache.path_for("a"), cache.path_for("b"));
    }
}
