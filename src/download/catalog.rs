// Source dataset classification for video names

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use regex::Regex;
use serde::Deserialize;
use crate::constants::{ARCHIVE_EXTENSION, SINGLE_FILE_EXTENSION};
use crate::error::Result;

/// EgoExo4D takes published in the source repository. They follow no naming
/// pattern, so they ship as a bundled catalog.
const BUNDLED_CATALOG: &str = include_str!("default_catalog.json");

/// Dataset a video comes from. Determines the remote path and payload type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceKind {
    EgoExo4d,
    HdEpic,
    Youtube,
    ActivityNet,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::EgoExo4d => "egoexo4d",
            SourceKind::HdEpic => "hd-epic",
            SourceKind::Youtube => "youtube",
            SourceKind::ActivityNet => "activitynet",
        }
    }

    /// Archive payloads are extracted; the rest are single video files
    pub fn is_archive(&self) -> bool {
        matches!(self, SourceKind::EgoExo4d | SourceKind::HdEpic)
    }

    pub fn extension(&self) -> &'static str {
        if self.is_archive() {
            ARCHIVE_EXTENSION
        } else {
            SINGLE_FILE_EXTENSION
        }
    }
}

/// Catalog file shape: `{"egoexo4d": [...], "youtube": [...], "hd-epic": [...]}`
#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    egoexo4d: Vec<String>,
    #[serde(default)]
    youtube: Vec<String>,
    #[serde(default, rename = "hd-epic")]
    hd_epic: Vec<String>,
}

#[derive(Debug)]
pub struct VideoCatalog {
    listed: HashMap<String, SourceKind>,
    patterns: Vec<(Regex, SourceKind)>,
}

impl Default for VideoCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoCatalog {
    /// Built-in catalog: the bundled name lists plus naming patterns
    pub fn new() -> Self {
        let patterns = [
            (r"^youtube_\d+$", SourceKind::Youtube),
            (r"^P\d{2}-\d{2}$", SourceKind::HdEpic),
        ]
        .into_iter()
        .filter_map(|(pattern, kind)| Regex::new(pattern).ok().map(|re| (re, kind)))
        .collect();

        let mut catalog = Self {
            listed: HashMap::new(),
            patterns,
        };
        match serde_json::from_str::<CatalogFile>(BUNDLED_CATALOG) {
            Ok(file) => catalog.apply(file),
            Err(e) => log::warn!("Bundled video catalog is unreadable: {}", e),
        }
        catalog
    }

    /// Load name lists from a JSON catalog on top of the built-in one.
    /// Names in the file win over bundled names and patterns.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let file: CatalogFile = serde_json::from_str(&text)?;

        let mut catalog = Self::new();
        catalog.apply(file);

        log::info!("Loaded video catalog {} ({} names)", path.display(), catalog.listed.len());
        Ok(catalog)
    }

    /// Merge a catalog file; within one file the first list naming a video wins
    fn apply(&mut self, file: CatalogFile) {
        let lists = [
            (SourceKind::EgoExo4d, file.egoexo4d),
            (SourceKind::Youtube, file.youtube),
            (SourceKind::HdEpic, file.hd_epic),
        ];
        let mut incoming: HashMap<String, SourceKind> = HashMap::new();
        for (kind, names) in lists {
            for name in names {
                incoming.entry(name).or_insert(kind);
            }
        }
        self.listed.extend(incoming);
    }

    /// Catalog from an optional path; an unreadable catalog falls back to patterns
    pub fn load_or_default(path: Option<&Path>) -> Self {
        match path {
            Some(p) => Self::from_file(p).unwrap_or_else(|e| {
                log::warn!("Failed to read video catalog {}: {}", p.display(), e);
                Self::new()
            }),
            None => Self::new(),
        }
    }

    pub fn insert(&mut self, name: &str, kind: SourceKind) {
        self.listed.insert(name.to_string(), kind);
    }

    pub fn classify(&self, name: &str) -> SourceKind {
        if let Some(kind) = self.listed.get(name) {
            return *kind;
        }
        self.patterns
            .iter()
            .find(|(re, _)| re.is_match(name))
            .map(|(_, kind)| *kind)
            .unwrap_or(SourceKind::ActivityNet)
    }

    /// Repository-relative path of a video's payload
    pub fn remote_path(&self, name: &str) -> String {
        let kind = self.classify(name);
        format!("videos/{}/{}.{}", kind.as_str(), name, kind.extension())
    }

    /// Per-kind counts, for the confirmation summary
    pub fn count_kinds<'a, I: IntoIterator<Item = &'a String>>(&self, names: I) -> Vec<(SourceKind, usize)> {
        let mut counts: HashMap<SourceKind, usize> = HashMap::new();
        let mut seen = HashSet::new();
        for name in names {
            if seen.insert(name) {
                *counts.entry(self.classify(name)).or_insert(0) += 1;
            }
        }
        let mut out: Vec<_> = counts.into_iter().collect();
        out.sort();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_pattern_classification() {
        let catalog = VideoCatalog::new();
        assert_eq!(catalog.classify("youtube_042"), SourceKind::Youtube);
        assert_eq!(catalog.classify("P03-11"), SourceKind::HdEpic);
        assert_eq!(catalog.classify("v_abc123"), SourceKind::ActivityNet);
        assert_eq!(catalog.classify("cmu_bike06_4"), SourceKind::EgoExo4d);
        assert_eq!(catalog.classify("cmu_bike99_1"), SourceKind::ActivityNet);
    }

    #[test]
    fn test_default_catalog_knows_egoexo4d_takes() {
        let catalog = VideoCatalog::load_or_default(None);
        assert_eq!(catalog.remote_path("cmu_bike06_4"), "videos/egoexo4d/cmu_bike06_4.zip");
        assert_eq!(catalog.classify("upenn_0707_Dance_1_3"), SourceKind::EgoExo4d);
        assert_eq!(catalog.classify("unc_soccer_09-22-23_01_22"), SourceKind::EgoExo4d);
        assert!(catalog.classify("nus_cpr_23_2").is_archive());
    }

    #[test]
    fn test_remote_paths() {
        let mut catalog = VideoCatalog::new();
        catalog.insert("take_x", SourceKind::EgoExo4d);
        assert_eq!(catalog.remote_path("take_x"), "videos/egoexo4d/take_x.zip");
        assert_eq!(catalog.remote_path("youtube_001"), "videos/youtube/youtube_001.mp4");
        assert_eq!(catalog.remote_path("P01-01"), "videos/hd-epic/P01-01.zip");
        assert_eq!(catalog.remote_path("clip"), "videos/activitynet/clip.mp4");
    }

    #[test]
    fn test_catalog_file_overrides_patterns() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("catalog.json");
        std::fs::write(
            &path,
            r#"{"egoexo4d": ["new_take_1"], "youtube": ["P09-01", "nus_cpr_23_2"]}"#,
        )
        .unwrap();

        let catalog = VideoCatalog::from_file(&path).unwrap();
        assert_eq!(catalog.classify("new_take_1"), SourceKind::EgoExo4d);
        assert_eq!(catalog.classify("P09-01"), SourceKind::Youtube);
        assert_eq!(catalog.classify("P09-02"), SourceKind::HdEpic);
        // the file overrides a bundled take
        assert_eq!(catalog.classify("nus_cpr_23_2"), SourceKind::Youtube);
        assert_eq!(catalog.classify("cmu_bike06_4"), SourceKind::EgoExo4d);

        let fallback = VideoCatalog::load_or_default(Some(&tmp.path().join("missing.json")));
        assert_eq!(fallback.classify("new_take_1"), SourceKind::ActivityNet);
        assert_eq!(fallback.classify("nus_cpr_23_2"), SourceKind::EgoExo4d);
    }

    #[test]
    fn test_count_kinds() {
        let catalog = VideoCatalog::new();
        let names: Vec<String> = ["youtube_1", "youtube_2", "P01-01", "youtube_1"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let counts = catalog.count_kinds(&names);
        assert_eq!(counts, vec![(SourceKind::HdEpic, 1), (SourceKind::Youtube, 2)]);
    }
}
