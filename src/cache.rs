//! On-disk artifact cache, one JSON file per (stage, key).
//!
//! Layout: `<root>/<stage namespace>/<key>`, where the key already carries
//! its `.json` extension. Remote calls are slow and cost money, so every
//! stage consults this cache before doing any work; a crashed or repeated run
//! resumes from whatever was persisted.
//!
//! The cache never fails a run. Reads treat a missing, unreadable or corrupt
//! entry as a miss. Writes are best-effort: a failure is logged and the value
//! is still used in memory for the current run.

use crate::menu::{ImageItem, Stage};
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Longest file name most file systems accept.
const MAX_KEY_BYTES: usize = 255;

/// Namespaced JSON cache rooted at a directory.
#[derive(Debug, Clone)]
pub struct ContentCache {
    root: PathBuf,
}

impl ContentCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the entry for `key` in `stage`'s namespace.
    pub fn entry_path(&self, stage: Stage, key: &str) -> PathBuf {
        self.root.join(stage.namespace()).join(key)
    }

    /// Look up an entry. Any failure degrades to `None`.
    pub async fn get<T: DeserializeOwned>(&self, stage: Stage, key: &str) -> Option<T> {
        let path = self.entry_path(stage, key);
        let data = tokio::fs::read_to_string(&path).await.ok()?;
        match serde_json::from_str(&data) {
            Ok(value) => {
                debug!("Cache hit: {}", path.display());
                Some(value)
            }
            Err(e) => {
                debug!("Ignoring unreadable cache entry {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Persist an entry. Failures are logged, never returned.
    pub async fn put<T: Serialize>(&self, stage: Stage, key: &str, value: &T) {
        if let Err(e) = self.try_put(stage, key, value).await {
            warn!(
                "Cannot write cache entry {}: {}",
                self.entry_path(stage, key).display(),
                e
            );
        }
    }

    async fn try_put<T: Serialize>(&self, stage: Stage, key: &str, value: &T) -> std::io::Result<()> {
        let dir = self.root.join(stage.namespace());
        tokio::fs::create_dir_all(&dir).await?;
        let json = serde_json::to_string(value)?;
        tokio::fs::write(dir.join(key), json).await
    }
}

/// Cache key of a per-image artifact: the file name plus `.json`.
///
/// Keys depend on the name only, so replacing a photo with another of the
/// same name reuses the old artifacts until the cache is cleared.
pub fn item_key(item: &ImageItem) -> String {
    format!("{}.json", item.file_name)
}

/// Cache key of the aggregate stage, derived from every file name in order.
///
/// Adding, removing or renaming any photo changes the key. Keys too long to
/// be a file name fall back to a SHA-256 digest of the same joined names.
pub fn batch_key(items: &[ImageItem]) -> String {
    let joined = items
        .iter()
        .map(|i| i.file_name.as_str())
        .collect::<Vec<_>>()
        .join("_");
    let key = format!("all_{joined}.json");
    if key.len() <= MAX_KEY_BYTES {
        return key;
    }
    let digest = Sha256::digest(joined.as_bytes());
    format!("all_{}.json", hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::menu::{RecognizedText, UpscaledImage};
    use tempfile::TempDir;

    fn item(name: &str) -> ImageItem {
        ImageItem {
            file_name: name.to_string(),
            path: PathBuf::from("/photos").join(name),
        }
    }

    #[tokio::test]
    async fn put_then_get() {
        let dir = TempDir::new().unwrap();
        let cache = ContentCache::new(dir.path());
        let value = UpscaledImage {
            url: "https://example.com/x.png".into(),
        };
        cache.put(Stage::Upscale, "x.jpg.json", &value).await;

        let back: Option<UpscaledImage> = cache.get(Stage::Upscale, "x.jpg.json").await;
        assert_eq!(back, Some(value));
        assert!(dir.path().join("upscaled").join("x.jpg.json").exists());
    }

    #[tokio::test]
    async fn namespaces_do_not_leak() {
        let dir = TempDir::new().unwrap();
        let cache = ContentCache::new(dir.path());
        cache
            .put(Stage::Upscale, "x.json", &UpscaledImage { url: "u".into() })
            .await;

        let ocr: Option<RecognizedText> = cache.get(Stage::Recognize, "x.json").await;
        assert!(ocr.is_none());
        let raw: Option<serde_json::Value> = cache.get(Stage::Recognize, "x.json").await;
        assert!(raw.is_none());
    }

    #[tokio::test]
    async fn corrupt_entry_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let ocr_dir = dir.path().join("ocr");
        std::fs::create_dir_all(&ocr_dir).unwrap();
        std::fs::write(ocr_dir.join("bad.json"), "{\"text\": ").unwrap();

        let cache = ContentCache::new(dir.path());
        let hit: Option<RecognizedText> = cache.get(Stage::Recognize, "bad.json").await;
        assert!(hit.is_none());
    }

    #[tokio::test]
    async fn wrong_shape_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let cache = ContentCache::new(dir.path());
        cache
            .put(Stage::Recognize, "a.json", &serde_json::json!({"url": "x"}))
            .await;
        let hit: Option<RecognizedText> = cache.get(Stage::Recognize, "a.json").await;
        assert!(hit.is_none());
    }

    #[tokio::test]
    async fn unwritable_root_does_not_panic() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file in the way").unwrap();

        let cache = ContentCache::new(&blocker);
        cache
            .put(Stage::Recognize, "a.json", &RecognizedText { text: "t".into() })
            .await;
        let hit: Option<RecognizedText> = cache.get(Stage::Recognize, "a.json").await;
        assert!(hit.is_none());
    }

    #[test]
    fn item_key_is_file_name() {
        assert_eq!(item_key(&item("page-1.jpg")), "page-1.jpg.json");
    }

    #[test]
    fn batch_key_follows_file_set() {
        let two = vec![item("a.jpg"), item("b.png")];
        let three = vec![item("a.jpg"), item("b.png"), item("c.jpeg")];
        assert_eq!(batch_key(&two), "all_a.jpg_b.png.json");
        assert_ne!(batch_key(&two), batch_key(&three));
        assert_ne!(batch_key(&two), batch_key(&three[..1]));
    }

    #[test]
    fn long_batch_key_is_hashed() {
        let many: Vec<_> = (0..40).map(|i| item(&format!("menu-photo-{i:03}.jpeg"))).collect();
        let key = batch_key(&many);
        assert!(key.len() <= MAX_KEY_BYTES, "{key}");
        assert!(key.starts_with("all_") && key.ends_with(".json"));
        assert_eq!(key, batch_key(&many));
        assert_ne!(key, batch_key(&many[1..]));
    }
}
