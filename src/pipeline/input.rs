//! Input handling: discover menu photos and fetch image bytes by reference.
//!
//! Image references travel between stages as plain strings. A reference is
//! one of four kinds, told apart only by its prefix (never by sniffing the
//! content):
//!
//! | Prefix              | Meaning                         |
//! |---------------------|---------------------------------|
//! | `http://`/`https://`| downloaded over the network     |
//! | `file://`           | local file, scheme stripped     |
//! | `data:`             | inline base64 after the comma   |
//! | anything else       | bare local path                 |

use crate::error::{ItemError, MenuError};
use crate::menu::ImageItem;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Extensions accepted as menu photos (compared case-insensitively).
const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// The kind of an image reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Url,
    FileUri,
    DataUri,
    LocalPath,
}

/// Classify a reference by its textual prefix.
pub fn source_kind(reference: &str) -> SourceKind {
    if reference.starts_with("http://") || reference.starts_with("https://") {
        SourceKind::Url
    } else if reference.starts_with("file://") {
        SourceKind::FileUri
    } else if reference.starts_with("data:") {
        SourceKind::DataUri
    } else {
        SourceKind::LocalPath
    }
}

/// Whether a file name has one of the accepted photo extensions.
pub fn is_image_file(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
        .unwrap_or(false)
}

/// List the photos in `dir`, sorted by file name.
///
/// Sorting makes the batch order (and therefore the extraction cache key)
/// independent of the platform's directory iteration order.
pub async fn discover_images(dir: &Path) -> Result<Vec<ImageItem>, MenuError> {
    let unreadable = |source| MenuError::InputDirUnreadable {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(unreadable)?;
    let mut items = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(unreadable)? {
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if !is_image_file(&file_name) {
            continue;
        }
        if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        items.push(ImageItem {
            path: entry.path(),
            file_name,
        });
    }

    if items.is_empty() {
        return Err(MenuError::NoImages {
            dir: dir.to_path_buf(),
        });
    }

    items.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    info!("Found {} menu photos in {}", items.len(), dir.display());
    Ok(items)
}

/// Fetch the raw bytes behind an image reference.
pub async fn fetch_bytes(reference: &str, download_timeout_secs: u64) -> Result<Vec<u8>, ItemError> {
    match source_kind(reference) {
        SourceKind::Url => download(reference, download_timeout_secs).await,
        SourceKind::FileUri => read_local(reference, &reference["file://".len()..]).await,
        SourceKind::DataUri => decode_data_uri(reference),
        SourceKind::LocalPath => read_local(reference, reference).await,
    }
}

/// Wrap raw bytes in a `data:` URI.
pub fn to_data_uri(bytes: &[u8], mime_type: &str) -> String {
    format!("data:{};base64,{}", mime_type, STANDARD.encode(bytes))
}

fn source_error(reference: &str, detail: impl ToString) -> ItemError {
    // Data URIs can be megabytes long; keep error messages readable.
    let reference = if reference.len() > 64 {
        format!("{}…", reference.chars().take(64).collect::<String>())
    } else {
        reference.to_string()
    };
    ItemError::Source {
        reference,
        detail: detail.to_string(),
    }
}

async fn read_local(reference: &str, path: &str) -> Result<Vec<u8>, ItemError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| source_error(reference, e))?;
    debug!("Read {} bytes from {}", bytes.len(), path);
    Ok(bytes)
}

fn decode_data_uri(reference: &str) -> Result<Vec<u8>, ItemError> {
    let (_, payload) = reference
        .split_once(',')
        .ok_or_else(|| source_error(reference, "data URI has no ',' separator"))?;
    STANDARD
        .decode(payload.trim())
        .map_err(|e| source_error(reference, format!("invalid base64: {e}")))
}

async fn download(url: &str, timeout_secs: u64) -> Result<Vec<u8>, ItemError> {
    debug!("Downloading image from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| source_error(url, e))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            source_error(url, format!("download timed out after {timeout_secs}s"))
        } else {
            source_error(url, e)
        }
    })?;

    if !response.status().is_success() {
        return Err(source_error(url, format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| source_error(url, e))?;
    debug!("Downloaded {} bytes from {}", bytes.len(), url);
    Ok(bytes.to_vec())
}
