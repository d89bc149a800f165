// Batch downloader module
// Makes referenced source videos available locally, one item at a time,
// with every outcome recorded in the CSV ledger as soon as it is known.

pub mod catalog;
pub mod fetch;
pub mod ledger;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use serde::Serialize;
use crate::constants::*;
use crate::error::{AnnotatorError, Result};
use crate::records::{Document, Layout};

pub use catalog::{SourceKind, VideoCatalog};
pub use fetch::{HubFetcher, RemoteFetcher};
pub use ledger::{Ledger, LedgerRow, LedgerStatus};

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutcome {
    pub success: Vec<String>,
    pub failed: Vec<String>,
    /// Subset of `success` that was already complete locally
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadStatistics {
    pub total: usize,
    pub present: usize,
    pub missing: usize,
    pub failed: usize,
    /// Percentage of videos present locally
    pub presence_rate: f64,
}

/// Check if a cancel was requested
pub fn is_cancelled(flag: &AtomicBool) -> bool {
    flag.load(Ordering::SeqCst)
}

pub struct BatchDownloader<F: RemoteFetcher> {
    cache_dir: PathBuf,
    catalog: VideoCatalog,
    fetcher: F,
    ledger: Ledger,
    cancel: Arc<AtomicBool>,
}

impl<F: RemoteFetcher> BatchDownloader<F> {
    pub fn new(cache_dir: impl Into<PathBuf>, catalog: VideoCatalog, fetcher: F, ledger: Ledger) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            catalog,
            fetcher,
            ledger,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag to set from a signal handler; checked before each item and between chunks
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Clear any earlier cancel request and hand out the flag for a new run
    pub fn arm_cancel(&self) -> Arc<AtomicBool> {
        self.cancel.store(false, Ordering::SeqCst);
        self.cancel_flag()
    }

    pub fn catalog(&self) -> &VideoCatalog {
        &self.catalog
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn target_dir(&self, name: &str) -> PathBuf {
        self.cache_dir.join(name)
    }

    /// Completeness depends on the payload type:
    /// single files need `<name>/<name>.mp4` with non-zero size, archives need
    /// at least one meaningful entry in `<name>/`.
    pub fn is_complete(&self, name: &str) -> bool {
        let dir = self.target_dir(name);
        if !dir.is_dir() {
            return false;
        }

        if self.catalog.classify(name).is_archive() {
            has_meaningful_entries(&dir)
        } else {
            let file = dir.join(format!("{}.{}", name, SINGLE_FILE_EXTENSION));
            fs::metadata(&file).map(|m| m.is_file() && m.len() > 0).unwrap_or(false)
        }
    }

    pub fn check_local(&self, names: &[String]) -> HashMap<String, bool> {
        names
            .iter()
            .map(|name| (name.clone(), self.is_complete(name)))
            .collect()
    }

    pub fn missing(&self, names: &[String]) -> Vec<String> {
        names
            .iter()
            .filter(|name| !self.is_complete(name))
            .cloned()
            .collect()
    }

    /// Fetch one video into `<cache>/<name>/`.
    /// On any failure the target directory is removed.
    pub fn download_one(&self, name: &str) -> Result<()> {
        let target = self.target_dir(name);
        let result = self.fetch_into(name, &target);

        if let Err(e) = &result {
            log::warn!("Download of {} failed: {}", name, e);
            if target.exists() {
                if let Err(cleanup) = fs::remove_dir_all(&target) {
                    log::warn!("Could not remove {}: {}", target.display(), cleanup);
                }
            }
        }
        result
    }

    fn fetch_into(&self, name: &str, target: &Path) -> Result<()> {
        let kind = self.catalog.classify(name);
        let remote_path = self.catalog.remote_path(name);
        log::info!("Downloading {} ({}) from {}", name, kind.as_str(), remote_path);

        fs::create_dir_all(target)?;
        let staging = target.join(STAGING_DIR_NAME);
        fs::create_dir_all(&staging)?;

        let payload = self.fetcher.fetch(&remote_path, &staging, &self.cancel)?;

        if kind.is_archive() {
            let file = fs::File::open(&payload)?;
            let mut archive = zip::ZipArchive::new(file)?;
            archive.extract(target)?;
        } else {
            let dest = target.join(format!("{}.{}", name, SINGLE_FILE_EXTENSION));
            if dest.exists() {
                fs::remove_file(&dest)?;
            }
            fs::rename(&payload, &dest)?;
        }

        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        cleanup_cache_files(target);

        if !self.is_complete(name) {
            return Err(AnnotatorError::Verification(format!("{} is incomplete after download", name)));
        }
        log::info!("Downloaded {}", name);
        Ok(())
    }

    /// Process names in order. Complete items are skipped and marked success;
    /// fetch errors are recorded and the loop moves on. An interruption marks
    /// the in-flight item failed and stops the batch with `Interrupted`.
    pub fn run_batch(&mut self, names: &[String]) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        let total = names.len();

        for (i, name) in names.iter().enumerate() {
            if is_cancelled(&self.cancel) {
                log::warn!("Batch interrupted before {}", name);
                return Err(AnnotatorError::Interrupted);
            }
            log::info!("[{}/{}] {}", i + 1, total, name);

            let target = self.target_dir(name);
            if target.exists() {
                if self.is_complete(name) {
                    log::info!("{} already present, skipping", name);
                    outcome.success.push(name.clone());
                    outcome.skipped.push(name.clone());
                    self.record(name, LedgerStatus::Success);
                    continue;
                }
                if let Err(e) = fs::remove_dir_all(&target) {
                    log::warn!("Could not remove incomplete {}: {}", target.display(), e);
                }
            }

            match self.download_one(name) {
                Ok(()) => {
                    outcome.success.push(name.clone());
                    self.record(name, LedgerStatus::Success);
                }
                Err(AnnotatorError::Interrupted) => {
                    outcome.failed.push(name.clone());
                    self.record(name, LedgerStatus::Error);
                    log::warn!(
                        "Interrupted during {}: {} done, {} failed",
                        name,
                        outcome.success.len(),
                        outcome.failed.len()
                    );
                    return Err(AnnotatorError::Interrupted);
                }
                Err(_) => {
                    outcome.failed.push(name.clone());
                    self.record(name, LedgerStatus::Error);
                }
            }
        }

        log::info!(
            "Batch finished: {} succeeded ({} already present), {} failed",
            outcome.success.len(),
            outcome.skipped.len(),
            outcome.failed.len()
        );
        Ok(outcome)
    }

    /// Download the rows picked in the ledger, then clear every pick.
    /// A finished batch is reconciled into the ledger in the same write.
    pub fn download_selected(&mut self) -> Result<BatchOutcome> {
        self.ledger.refresh()?;
        let selected = self.ledger.selected();
        let result = self.run_batch(&selected);

        let cleared = match &result {
            Ok(outcome) => self.ledger.apply_batch(&outcome.success, &outcome.failed),
            Err(_) => self.ledger.clear_picks(),
        };
        if let Err(e) = cleared {
            log::warn!("Could not clear ledger picks: {}", e);
        }
        result
    }

    pub fn download_missing(&mut self, names: &[String]) -> Result<BatchOutcome> {
        let missing = self.missing(names);
        self.run_batch(&missing)
    }

    /// Retry every row marked as failed
    pub fn download_failed(&mut self) -> Result<BatchOutcome> {
        self.ledger.refresh()?;
        let failed = self.ledger.failed();
        self.run_batch(&failed)
    }

    /// Scan local state, rewrite the ledger and summarize
    pub fn statistics(&mut self, names: &[String]) -> Result<DownloadStatistics> {
        let local = self.check_local(names);
        self.ledger.rewrite_from_scan(names, &local)?;

        let present = local.values().filter(|v| **v).count();
        let total = names.len();
        let presence_rate = if total == 0 {
            0.0
        } else {
            present as f64 * 100.0 / total as f64
        };

        Ok(DownloadStatistics {
            total,
            present,
            missing: total - present,
            failed: self.ledger.failed().len(),
            presence_rate,
        })
    }

    fn record(&mut self, name: &str, status: LedgerStatus) {
        if let Err(e) = self.ledger.set_status(name, status) {
            log::warn!("Could not update ledger for {}: {}", name, e);
        }
    }
}

fn is_temp_name(name: &str) -> bool {
    TEMP_SUFFIXES.iter().any(|s| name.ends_with(s))
}

/// True when the directory holds something other than hidden, temp or cache entries
pub fn has_meaningful_entries(dir: &Path) -> bool {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return false,
    };

    entries.filter_map(|e| e.ok()).any(|entry| {
        let name = entry.file_name().to_string_lossy().to_string();
        !name.starts_with('.') && !is_temp_name(&name) && !IGNORED_ENTRY_NAMES.contains(&name.as_str())
    })
}

/// Remove cache directories, stray hidden entries and temp files from a download target.
/// Failures are logged and otherwise ignored.
pub fn cleanup_cache_files(dir: &Path) {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            log::warn!("Cleanup of {} skipped: {}", dir.display(), e);
            return;
        }
    };

    for entry in entries.filter_map(|e| e.ok()) {
        let name = entry.file_name().to_string_lossy().to_string();
        let path = entry.path();

        let remove = CACHE_ARTIFACT_NAMES.contains(&name.as_str())
            || (name.starts_with('.') && !KEEP_HIDDEN_SUFFIXES.iter().any(|s| name.ends_with(s)))
            || is_temp_name(&name);
        if !remove {
            continue;
        }

        let result = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        match result {
            Ok(()) => log::debug!("Removed {}", path.display()),
            Err(e) => log::warn!("Could not remove {}: {}", path.display(), e),
        }
    }
}

/// Collect the video names referenced by QA files in `dir`.
/// Only `*.json` files whose name contains `pattern` are read, in name order;
/// unreadable files are skipped.
pub fn scan_qa_files(dir: &Path, pattern: &str) -> Result<Vec<String>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
        .filter(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().contains(pattern))
                .unwrap_or(false)
        })
        .collect();
    files.sort();

    let mut names: Vec<String> = Vec::new();
    for file in &files {
        let doc = match Document::read(file, &Layout::Segments) {
            Ok(d) => d,
            Err(e) => {
                log::warn!("Skipping {}: {}", file.display(), e);
                continue;
            }
        };
        // Segments name their video even before any record exists
        let mut found: Vec<String> = doc
            .groups()
            .iter()
            .filter_map(|g| g.meta_str(FIELD_VIDEO_NAME))
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();
        found.extend(doc.referenced_videos());

        for name in found {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }

    log::info!("Found {} referenced videos in {} QA files", names.len(), files.len());
    Ok(names)
}
