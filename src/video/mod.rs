// Video locator module
// Maps a logical video name (+ optional perspective) to a playable file.

pub mod discover;

use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;
use serde::Serialize;

pub use discover::{is_video_file, scan_video_directory, VideoEntry, VideoKind, VideoMap};

/// Result of a successful lookup
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedVideo {
    pub path: PathBuf,
    /// The requested perspective was missing and the first file was used instead
    pub fell_back: bool,
}

/// Listing row for the video browser
#[derive(Debug, Clone, Serialize)]
pub struct VideoSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: VideoKind,
    pub path: String,
    pub files: Vec<String>,
    pub perspectives: Vec<String>,
}

/// Directory-scan backed video lookup.
/// The scan runs lazily on first use and is kept until the base directory or
/// layout mode changes, or `rescan` is called.
#[derive(Debug)]
pub struct VideoLocator {
    base_dir: PathBuf,
    strict: bool,
    cache: OnceLock<VideoMap>,
}

impl VideoLocator {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            strict: true,
            cache: OnceLock::new(),
        }
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Point at a new base directory; the cached scan is dropped
    pub fn set_base_dir(&mut self, dir: impl Into<PathBuf>) {
        self.base_dir = dir.into();
        self.cache = OnceLock::new();
        log::info!("Video directory set to {}", self.base_dir.display());
    }

    pub fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
        self.cache = OnceLock::new();
    }

    /// Force a fresh scan
    pub fn rescan(&mut self) -> &VideoMap {
        self.cache = OnceLock::new();
        self.entries()
    }

    pub fn entries(&self) -> &VideoMap {
        self.cache
            .get_or_init(|| scan_video_directory(&self.base_dir, self.strict))
    }

    pub fn entry(&self, name: &str) -> Option<&VideoEntry> {
        self.entries().get(name)
    }

    /// Find the file for a video name and perspective.
    /// Single entries ignore the perspective. Multi entries need one; a missing
    /// perspective file falls back to the first file of the folder.
    pub fn resolve(&self, name: &str, perspective: Option<&str>) -> Option<ResolvedVideo> {
        let entry = match self.entry(name) {
            Some(e) => e,
            None => {
                log::warn!("Video not found: {}", name);
                return None;
            }
        };

        match entry.kind {
            VideoKind::Single => Some(ResolvedVideo {
                path: entry.path.clone(),
                fell_back: false,
            }),
            VideoKind::Multi => {
                let perspective = match perspective.filter(|p| !p.is_empty()) {
                    Some(p) => p,
                    None => {
                        log::warn!("Multi-perspective video '{}' needs a perspective", name);
                        return None;
                    }
                };

                let candidate = entry.path.join(perspective);
                if candidate.is_file() {
                    return Some(ResolvedVideo {
                        path: candidate,
                        fell_back: false,
                    });
                }

                let first = entry.files.first()?;
                let fallback = entry.path.join(first);
                log::warn!(
                    "Perspective '{}' missing for '{}', using {}",
                    perspective,
                    name,
                    fallback.display()
                );
                Some(ResolvedVideo {
                    path: fallback,
                    fell_back: true,
                })
            }
        }
    }

    /// Browser-facing path for a video, relative to the working directory
    pub fn web_path(&self, name: &str, perspective: Option<&str>) -> Option<String> {
        let resolved = self.resolve(name, perspective)?;
        Some(to_web_path(&resolved.path))
    }

    /// Perspective file names of a video, skipping blank and "null" names
    pub fn available_perspectives(&self, name: &str) -> Vec<String> {
        self.entry(name)
            .map(|e| {
                e.files
                    .iter()
                    .filter(|f| !f.trim().is_empty() && f.as_str() != "null")
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn list_all(&self) -> Vec<VideoSummary> {
        self.entries()
            .values()
            .map(|e| VideoSummary {
                name: e.name.clone(),
                kind: e.kind,
                path: e.path.to_string_lossy().to_string(),
                files: e.files.clone(),
                perspectives: match e.kind {
                    VideoKind::Multi => e.files.clone(),
                    VideoKind::Single => Vec::new(),
                },
            })
            .collect()
    }
}

/// Rewrite a path relative to the process working directory, with forward
/// slashes and a leading slash. Falls back to the path unchanged when no
/// relative form exists.
pub fn to_web_path(path: &Path) -> String {
    match std::env::current_dir() {
        Ok(cwd) => web_path_relative_to(path, &cwd),
        Err(_) => path.to_string_lossy().to_string(),
    }
}

pub fn web_path_relative_to(path: &Path, root: &Path) -> String {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };

    let relative = match relative_path(&normalize(&absolute), &normalize(root)) {
        Some(r) => r,
        None => return path.to_string_lossy().to_string(),
    };

    let mut web = relative.replace('\\', "/");
    if !web.starts_with('/') {
        web.insert(0, '/');
    }
    web
}

/// Lexically resolve `.` and `..` components
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn relative_path(path: &Path, base: &Path) -> Option<String> {
    let path_parts: Vec<Component> = path.components().collect();
    let base_parts: Vec<Component> = base.components().collect();

    // Different roots (e.g. another drive) have no relative form
    if let (Some(Component::Prefix(a)), Some(Component::Prefix(b))) = (path_parts.first(), base_parts.first()) {
        if a != b {
            return None;
        }
    }

    let common = path_parts
        .iter()
        .zip(base_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<String> = Vec::new();
    for _ in common..base_parts.len() {
        parts.push("..".to_string());
    }
    for component in &path_parts[common..] {
        parts.push(component.as_os_str().to_string_lossy().to_string());
    }

    if parts.is_empty() {
        return Some(".".to_string());
    }
    Some(parts.join("/"))
}
