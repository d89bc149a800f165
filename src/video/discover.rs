// Video directory discovery

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;
use crate::constants::VIDEO_EXTENSIONS;

/// How a logical video is laid out on disk
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VideoKind {
    /// `<base>/<name>.<ext>`
    Single,
    /// `<base>/<name>/<perspective>.<ext>`
    Multi,
}

impl VideoKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoKind::Single => "single",
            VideoKind::Multi => "multi",
        }
    }
}

/// One discovered video source.
/// For `Single`, `path` is the file itself; for `Multi` it is the folder
/// and `files` lists the perspective files inside it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoEntry {
    pub name: String,
    pub kind: VideoKind,
    pub path: PathBuf,
    pub files: Vec<String>,
}

pub type VideoMap = BTreeMap<String, VideoEntry>;

/// Check if a file name carries a recognized video extension
pub fn is_video_file(path: &Path) -> bool {
    let ext = match path.extension().and_then(|e| e.to_str()) {
        Some(e) => e.to_lowercase(),
        None => return false,
    };

    VIDEO_EXTENSIONS.contains(&ext.as_str())
}

/// Scan the base directory and build the name -> entry map.
///
/// Top-level video files become single entries named by their stem; top-level
/// folders holding video files become multi entries named by the folder. With
/// `strict` off, one more level is descended for the legacy
/// `<base>/<group>/<name>/<cam>.<ext>` layout.
pub fn scan_video_directory(base_dir: &Path, strict: bool) -> VideoMap {
    let mut video_map = VideoMap::new();

    if !base_dir.is_dir() {
        log::warn!("Video directory does not exist: {}", base_dir.display());
        return video_map;
    }

    for entry in list_dir(base_dir) {
        let path = entry.as_path();

        if path.is_file() {
            if let Some(single) = single_entry(path) {
                video_map.insert(single.name.clone(), single);
            }
        } else if path.is_dir() {
            if let Some(multi) = multi_entry(path) {
                video_map.insert(multi.name.clone(), multi);
            }

            if !strict {
                for sub_path in list_dir(path) {
                    if sub_path.is_dir() {
                        if let Some(multi) = multi_entry(&sub_path) {
                            video_map.insert(multi.name.clone(), multi);
                        }
                    } else if let Some(single) = single_entry(&sub_path) {
                        video_map.insert(single.name.clone(), single);
                    }
                }
            }
        }
    }

    log::info!("Scanned {}: {} video sources", base_dir.display(), video_map.len());
    video_map
}

/// Direct children of a directory, sorted by file name
fn list_dir(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .collect()
}

fn single_entry(path: &Path) -> Option<VideoEntry> {
    if !path.is_file() || !is_video_file(path) {
        return None;
    }
    let name = path.file_stem()?.to_string_lossy().to_string();
    let file_name = path.file_name()?.to_string_lossy().to_string();

    Some(VideoEntry {
        name,
        kind: VideoKind::Single,
        path: path.to_path_buf(),
        files: vec![file_name],
    })
}

fn multi_entry(dir: &Path) -> Option<VideoEntry> {
    let files: Vec<String> = list_dir(dir)
        .iter()
        .filter(|p| p.is_file() && is_video_file(p))
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
        .collect();

    if files.is_empty() {
        return None;
    }

    Some(VideoEntry {
        name: dir.file_name()?.to_string_lossy().to_string(),
        kind: VideoKind::Multi,
        path: dir.to_path_buf(),
        files,
    })
}
