//! Firmware download pipeline.
//!
//! Downloads a list of firmware artifacts one after another. Each item moves
//! through explicit states (`Pending → Verifying → Downloading → Done` or
//! `Failed`), and the aggregate progress, the mean of the per-item progress,
//! is recomputed and published after every transition. A failed item never
//! stops the items after it.

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

use layerkit_core::{CellView, ObservableCell};

/// Errors raised while processing one artifact
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OtaError {
    /// The fetcher could not retrieve the artifact
    #[error("Download of {url} failed: {reason}")]
    Fetch {
        /// Artifact URL.
        url: String,
        /// Fetcher message.
        reason: String,
    },

    /// Cached file does not match the expected checksum
    #[error("Checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Cache path.
        path: String,
        /// Checksum from the manifest.
        expected: String,
        /// Checksum of the file on disk.
        actual: String,
    },

    /// The manifest path would leave the cache root
    #[error("Refusing cache path {path}: must stay inside the cache root")]
    UnsafePath {
        /// Path from the manifest.
        path: String,
    },

    /// Reading or writing the cache failed
    #[error("Cache I/O error for {path}: {reason}")]
    Io {
        /// Cache path.
        path: String,
        /// I/O error message.
        reason: String,
    },
}

/// One artifact from the update manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadItem {
    /// Where to download from
    pub url: String,
    /// Path relative to the cache root
    #[serde(rename = "localPath", alias = "local_path")]
    pub local_path: PathBuf,
    /// Expected MD5, lowercase hex
    pub md5: String,
}

/// Processing state of one artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    /// Not looked at yet
    Pending,
    /// Checking the cached copy
    Verifying,
    /// Fetching from the network
    Downloading,
    /// Available in the cache
    Done,
    /// Gave up on this item
    Failed,
}

/// Progress record for one artifact
#[derive(Debug, Clone, PartialEq)]
pub struct ItemStatus {
    /// The artifact
    pub item: DownloadItem,
    /// Current state
    pub state: ItemState,
    /// Fraction downloaded, 0.0..=1.0
    pub progress: f64,
    /// Why the item failed, if it did
    pub error: Option<OtaError>,
}

/// Result of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DownloadSummary {
    /// Items available in the cache afterwards
    pub done: usize,
    /// Items that failed
    pub failed: usize,
}

/// Retrieves artifact bytes from the network.
///
/// Implemented by the host; `progress` receives `(loaded, total)` byte
/// counts whenever the total is known.
pub trait Fetcher: Send + Sync {
    /// Fetch the whole artifact at `url`
    fn fetch(&self, url: &str, progress: &mut dyn FnMut(u64, u64)) -> Result<Vec<u8>, OtaError>;
}

/// On-disk artifact cache rooted at one directory
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    root: PathBuf,
}

impl ArtifactCache {
    /// Cache rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Absolute path of a cached artifact.
    ///
    /// A leading `/` is relative to the cache root. `..` and drive prefixes
    /// are rejected.
    pub fn path_of(&self, local_path: &Path) -> Result<PathBuf, OtaError> {
        let mut path = self.root.clone();
        for component in local_path.components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::RootDir | Component::CurDir => {}
                Component::ParentDir | Component::Prefix(_) => {
                    return Err(OtaError::UnsafePath {
                        path: local_path.display().to_string(),
                    })
                }
            }
        }
        Ok(path)
    }

    /// Cached bytes, `None` if the file is missing or empty
    pub fn read(&self, local_path: &Path) -> Result<Option<Vec<u8>>, OtaError> {
        let path = self.path_of(local_path)?;
        match std::fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(OtaError::Io {
                path: path.display().to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Store bytes, creating parent directories as needed
    pub fn write(&self, local_path: &Path, bytes: &[u8]) -> Result<(), OtaError> {
        let path = self.path_of(local_path)?;
        let io_err = |e: std::io::Error| OtaError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(&path, bytes).map_err(io_err)
    }
}

/// Lowercase hex MD5 of `bytes`
pub fn md5_hex(bytes: &[u8]) -> String {
    hex::encode(Md5::digest(bytes))
}

/// Sequential download pipeline
pub struct DownloadPipeline<F: Fetcher> {
    fetcher: F,
    cache: ArtifactCache,
    items: Vec<ItemStatus>,
    progress: ObservableCell<f64>,
}

impl<F: Fetcher> DownloadPipeline<F> {
    /// Create a pipeline with every item pending
    pub fn new(fetcher: F, cache: ArtifactCache, items: Vec<DownloadItem>) -> Self {
        let items = items
            .into_iter()
            .map(|item| ItemStatus {
                item,
                state: ItemState::Pending,
                progress: 0.0,
                error: None,
            })
            .collect();
        Self {
            fetcher,
            cache,
            items,
            progress: ObservableCell::new("download_progress", 0.0),
        }
    }

    /// Per-item status
    pub fn items(&self) -> &[ItemStatus] {
        &self.items
    }

    /// Aggregate progress, 0.0..=1.0
    pub fn progress(&self) -> CellView<'_, f64> {
        self.progress.view()
    }

    /// Process every pending item in order
    pub fn run(&mut self) -> DownloadSummary {
        for index in 0..self.items.len() {
            if self.items[index].state == ItemState::Pending {
                self.process(index);
            }
        }

        let summary = DownloadSummary {
            done: self.count(ItemState::Done),
            failed: self.count(ItemState::Failed),
        };
        tracing::info!(
            "All files processed: {} done, {} failed",
            summary.done,
            summary.failed
        );
        summary
    }

    fn count(&self, state: ItemState) -> usize {
        self.items.iter().filter(|s| s.state == state).count()
    }

    fn process(&mut self, index: usize) {
        self.transition(index, ItemState::Verifying, 0.0);
        let item = self.items[index].item.clone();

        match self.cache.read(&item.local_path) {
            Ok(Some(bytes)) => {
                let actual = md5_hex(&bytes);
                tracing::debug!(
                    "{}: expected md5 {}, calculated {} for cached copy",
                    item.local_path.display(),
                    item.md5,
                    actual
                );
                if actual.eq_ignore_ascii_case(&item.md5) {
                    self.transition(index, ItemState::Done, 1.0);
                } else {
                    self.fail(
                        index,
                        OtaError::ChecksumMismatch {
                            path: item.local_path.display().to_string(),
                            expected: item.md5.clone(),
                            actual,
                        },
                    );
                }
            }
            Ok(None) => {
                tracing::debug!("{}: not cached", item.local_path.display());
                self.download(index, &item);
            }
            Err(e) => self.fail(index, e),
        }
    }

    fn download(&mut self, index: usize, item: &DownloadItem) {
        self.transition(index, ItemState::Downloading, 0.0);
        tracing::info!("Downloading {} to {}", item.url, item.local_path.display());

        let Self {
            fetcher,
            items,
            progress,
            ..
        } = self;
        let result = fetcher.fetch(&item.url, &mut |loaded, total| {
            if total > 0 {
                items[index].progress = (loaded as f64 / total as f64).clamp(0.0, 1.0);
                progress.set(mean_progress(items));
            }
        });

        let stored = result.and_then(|bytes| {
            tracing::debug!("Downloaded {} bytes from {}", bytes.len(), item.url);
            self.cache.write(&item.local_path, &bytes)
        });
        match stored {
            Ok(()) => self.transition(index, ItemState::Done, 1.0),
            Err(e) => self.fail(index, e),
        }
    }

    fn fail(&mut self, index: usize, error: OtaError) {
        tracing::warn!("{}", error);
        self.items[index].error = Some(error);
        self.transition(index, ItemState::Failed, 0.0);
    }

    fn transition(&mut self, index: usize, state: ItemState, progress: f64) {
        let status = &mut self.items[index];
        status.state = state;
        status.progress = progress;
        let total = mean_progress(&self.items);
        tracing::debug!("Total progress: {:.1}%", total * 100.0);
        self.progress.set(total);
    }
}

impl<F: Fetcher> std::fmt::Debug for DownloadPipeline<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadPipeline")
            .field("cache", &self.cache)
            .field("items", &self.items)
            .finish()
    }
}

fn mean_progress(items: &[ItemStatus]) -> f64 {
    if items.is_empty() {
        return 0.0;
    }
    items.iter().map(|s| s.progress).sum::<f64>() / items.len() as f64
}
