// Remote file fetch

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use crate::config::HubConfig;
use crate::constants::DOWNLOAD_CHUNK_SIZE;
use crate::error::{AnnotatorError, Result};

/// Fetch one file by repository-relative path into a local directory.
/// Implementations return the path of the written file and must stop with
/// `AnnotatorError::Interrupted` once `cancel` is set.
pub trait RemoteFetcher {
    fn fetch(&self, repo_path: &str, dest_dir: &Path, cancel: &Arc<AtomicBool>) -> Result<PathBuf>;
}

/// Blocking client for a dataset hub exposing
/// `<endpoint>/datasets/<repo>/resolve/<revision>/<path>`
pub struct HubFetcher {
    client: reqwest::blocking::Client,
    config: HubConfig,
}

impl HubFetcher {
    pub fn new(config: HubConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("spatialbench/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()?;

        Ok(Self { client, config })
    }

    pub fn file_url(&self, repo_path: &str) -> String {
        let kind_prefix = match self.config.repo_type.as_str() {
            "dataset" => "datasets/",
            "space" => "spaces/",
            _ => "",
        };
        format!(
            "{}/{}{}/resolve/{}/{}",
            self.config.endpoint.trim_end_matches('/'),
            kind_prefix,
            self.config.repo,
            self.config.revision,
            repo_path.trim_start_matches('/')
        )
    }
}

impl RemoteFetcher for HubFetcher {
    fn fetch(&self, repo_path: &str, dest_dir: &Path, cancel: &Arc<AtomicBool>) -> Result<PathBuf> {
        let url = self.file_url(repo_path);
        log::debug!("GET {}", url);

        let mut request = self.client.get(&url);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let mut response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(AnnotatorError::Fetch(format!("{} returned {}", url, status)));
        }

        let file_name = Path::new(repo_path)
            .file_name()
            .ok_or_else(|| AnnotatorError::Fetch(format!("no file name in {}", repo_path)))?;
        fs::create_dir_all(dest_dir)?;
        let dest = dest_dir.join(file_name);

        let written = copy_with_cancel(&mut response, &dest, cancel)?;
        log::info!("Fetched {} ({} bytes)", repo_path, written);
        Ok(dest)
    }
}

/// Stream a reader to `dest` in chunks, checking the cancel flag between chunks.
/// The partial file is removed on any failure.
pub fn copy_with_cancel<R: Read>(reader: &mut R, dest: &Path, cancel: &Arc<AtomicBool>) -> Result<u64> {
    let result = (|| -> Result<u64> {
        let mut file = fs::File::create(dest)?;
        let mut buffer = vec![0u8; DOWNLOAD_CHUNK_SIZE];
        let mut total = 0u64;

        loop {
            if cancel.load(Ordering::SeqCst) {
                return Err(AnnotatorError::Interrupted);
            }
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            file.write_all(&buffer[..n])?;
            total += n as u64;
        }

        file.sync_all()?;
        Ok(total)
    })();

    if result.is_err() {
        let _ = fs::remove_file(dest);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn hub() -> HubConfig {
        HubConfig {
            endpoint: "https://hub.example.org/".to_string(),
            repo: "team/videos".to_string(),
            repo_type: "dataset".to_string(),
            revision: "main".to_string(),
            token: None,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_file_url() {
        let fetcher = HubFetcher::new(hub()).unwrap();
        assert_eq!(
            fetcher.file_url("videos/youtube/youtube_001.mp4"),
            "https://hub.example.org/datasets/team/videos/resolve/main/videos/youtube/youtube_001.mp4"
        );

        let mut model = hub();
        model.repo_type = "model".to_string();
        let fetcher = HubFetcher::new(model).unwrap();
        assert_eq!(
            fetcher.file_url("/a.zip"),
            "https://hub.example.org/team/videos/resolve/main/a.zip"
        );
    }

    #[test]
    fn test_copy_with_cancel() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("out.bin");
        let cancel = Arc::new(AtomicBool::new(false));

        let mut data: &[u8] = b"payload";
        assert_eq!(copy_with_cancel(&mut data, &dest, &cancel).unwrap(), 7);
        assert_eq!(std::fs::read(&dest).unwrap(), b"payload");

        cancel.store(true, Ordering::SeqCst);
        let mut data: &[u8] = b"payload";
        assert!(matches!(
            copy_with_cancel(&mut data, &dest, &cancel),
            Err(AnnotatorError::Interrupted)
        ));
        assert!(!dest.exists());
    }
}
