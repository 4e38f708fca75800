use layerkit_communication::ota::md5_hex;
use layerkit_communication::{
    ArtifactCache, DownloadItem, DownloadPipeline, DownloadSummary, Fetcher, ItemState, OtaError,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Serves artifacts from memory, reporting progress in two halves
#[derive(Default)]
struct MemoryFetcher {
    files: HashMap<String, Vec<u8>>,
    requested: Mutex<Vec<String>>,
}

impl MemoryFetcher {
    fn with(mut self, url: &str, bytes: &[u8]) -> Self {
        self.files.insert(url.to_string(), bytes.to_vec());
        self
    }
}

impl Fetcher for MemoryFetcher {
    fn fetch(&self, url: &str, progress: &mut dyn FnMut(u64, u64)) -> Result<Vec<u8>, OtaError> {
        self.requested.lock().push(url.to_string());
        let bytes = self.files.get(url).cloned().ok_or_else(|| OtaError::Fetch {
            url: url.to_string(),
            reason: "404".to_string(),
        })?;
        let total = bytes.len() as u64;
        progress(total / 2, total);
        progress(total, total);
        Ok(bytes)
    }
}

fn item(name: &str, bytes: &[u8]) -> DownloadItem {
    DownloadItem {
        url: format!("http://updates.local/{}", name),
        local_path: PathBuf::from(format!("/firmware/{}", name)),
        md5: md5_hex(bytes),
    }
}

#[test]
fn test_downloads_missing_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let cache = ArtifactCache::new(dir.path());
    let fetcher = MemoryFetcher::default()
        .with("http://updates.local/ota.bin", b"ota image!")
        .with("http://updates.local/ams.bin", b"ams image");

    let mut pipeline = DownloadPipeline::new(
        fetcher,
        cache.clone(),
        vec![item("ota.bin", b"ota image!"), item("ams.bin", b"ams image")],
    );

    let history = Arc::new(Mutex::new(Vec::new()));
    let recorded = history.clone();
    pipeline.progress().subscribe(move |p| {
        recorded.lock().push(*p);
        Ok(())
    });

    let summary = pipeline.run();
    assert_eq!(summary, DownloadSummary { done: 2, failed: 0 });
    assert!(pipeline.items().iter().all(|s| s.state == ItemState::Done));
    assert_eq!(pipeline.progress().get(), 1.0);
    assert_eq!(
        std::fs::read(dir.path().join("firmware/ota.bin")).unwrap(),
        b"ota image!"
    );

    let history = history.lock();
    assert_eq!(*history.last().unwrap(), 1.0);
    // Half of the first of two items
    assert!(history.contains(&0.25));
}

#[test]
fn test_valid_cache_skips_download() {
    let dir = tempfile::tempdir().unwrap();
    let cache = ArtifactCache::new(dir.path());
    cache
        .write(&PathBuf::from("/firmware/ota.bin"), b"ota image")
        .unwrap();

    let mut pipeline = DownloadPipeline::new(
        MemoryFetcher::default(),
        cache,
        vec![item("ota.bin", b"ota image")],
    );
    assert_eq!(pipeline.run(), DownloadSummary { done: 1, failed: 0 });
}

#[test]
fn test_failures_do_not_stop_later_items() {
    let dir = tempfile::tempdir().unwrap();
    let cache = ArtifactCache::new(dir.path());
    cache
        .write(&PathBuf::from("/firmware/stale.bin"), b"old bytes")
        .unwrap();

    let fetcher = MemoryFetcher::default().with("http://updates.local/good.bin", b"good");
    let mut pipeline = DownloadPipeline::new(
        fetcher,
        cache,
        vec![
            item("stale.bin", b"new bytes"),
            item("missing.bin", b"whatever"),
            item("good.bin", b"good"),
        ],
    );

    let summary = pipeline.run();
    assert_eq!(summary, DownloadSummary { done: 1, failed: 2 });

    let items = pipeline.items();
    assert!(matches!(
        items[0].error,
        Some(OtaError::ChecksumMismatch { .. })
    ));
    assert!(matches!(items[1].error, Some(OtaError::Fetch { .. })));
    assert_eq!(items[2].state, ItemState::Done);
    assert!((pipeline.progress().get() - 1.0 / 3.0).abs() < 1e-9);
}

#[test]
fn test_empty_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline =
        DownloadPipeline::new(MemoryFetcher::default(), ArtifactCache::new(dir.path()), vec![]);
    assert_eq!(pipeline.run(), DownloadSummary::default());
    assert_eq!(pipeline.progress().get(), 0.0);
}

#[test]
fn test_path_escaping_cache_root_fails_item() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("cache");
    let fetcher = MemoryFetcher::default()
        .with("http://updates.local/evil.bin", b"payload")
        .with("http://updates.local/ok.bin", b"fine");

    let escaping = DownloadItem {
        local_path: PathBuf::from("/firmware/../../evil.bin"),
        ..item("evil.bin", b"payload")
    };
    let mut pipeline = DownloadPipeline::new(
        fetcher,
        ArtifactCache::new(&root),
        vec![escaping, item("ok.bin", b"fine")],
    );

    let summary = pipeline.run();
    assert_eq!(summary, DownloadSummary { done: 1, failed: 1 });
    assert!(matches!(
        pipeline.items()[0].error,
        Some(OtaError::UnsafePath { .. })
    ));
    assert!(!dir.path().join("evil.bin").exists());
    assert_eq!(pipeline.items()[1].state, ItemState::Done);
}
