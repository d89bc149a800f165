// Download status ledger (CSV)
//
// Header: video_name,status,pick_now
// The file is meant to be edited by hand between runs (pick_now), so every
// in-place update re-reads it before writing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use crate::constants::*;
use crate::error::Result;
use crate::records::document::write_atomic;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerStatus {
    Unknown,
    Success,
    Error,
}

impl LedgerStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            LEDGER_SUCCESS => LedgerStatus::Success,
            LEDGER_ERROR | LEDGER_LEGACY_ERROR => LedgerStatus::Error,
            _ => LedgerStatus::Unknown,
        }
    }

    pub fn marker(&self) -> &'static str {
        match self {
            LedgerStatus::Unknown => "",
            LedgerStatus::Success => LEDGER_SUCCESS,
            LedgerStatus::Error => LEDGER_ERROR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRow {
    pub video_name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub pick_now: String,
}

impl LedgerRow {
    pub fn new(video_name: &str, status: LedgerStatus) -> Self {
        Self {
            video_name: video_name.to_string(),
            status: status.marker().to_string(),
            pick_now: String::new(),
        }
    }

    pub fn status(&self) -> LedgerStatus {
        LedgerStatus::parse(&self.status)
    }

    pub fn is_picked(&self) -> bool {
        let pick = self.pick_now.trim().to_lowercase();
        PICK_TOKENS.contains(&pick.as_str())
    }
}

#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    rows: Vec<LedgerRow>,
}

impl Ledger {
    /// Load the ledger; a missing file gives an empty ledger
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let rows = read_rows(&path)?;
        Ok(Self { path, rows })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows(&self) -> &[LedgerRow] {
        &self.rows
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn save(&self) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        writer.write_record(LEDGER_HEADER)?;
        for row in &self.rows {
            writer.serialize(row)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

        write_atomic(&self.path, &bytes)?;
        log::debug!("Ledger saved: {} rows", self.rows.len());
        Ok(())
    }

    /// Rebuild every row from a scan, in `names` order.
    /// Complete videos become success. A scan never demotes a row: earlier
    /// success and error marks are kept, everything else is blank. Picks are cleared.
    pub fn rewrite_from_scan(&mut self, names: &[String], complete: &HashMap<String, bool>) -> Result<()> {
        let previous: HashMap<String, LedgerStatus> = read_rows(&self.path)
            .unwrap_or_else(|e| {
                log::warn!("Could not read previous ledger {}: {}", self.path.display(), e);
                Vec::new()
            })
            .into_iter()
            .map(|r| {
                let status = r.status();
                (r.video_name, status)
            })
            .collect();

        self.rows = names
            .iter()
            .map(|name| {
                let status = if complete.get(name).copied().unwrap_or(false) {
                    LedgerStatus::Success
                } else {
                    previous.get(name).copied().unwrap_or(LedgerStatus::Unknown)
                };
                LedgerRow::new(name, status)
            })
            .collect();

        self.save()
    }

    /// Record one outcome right away. No-op when the ledger file does not exist.
    pub fn set_status(&mut self, name: &str, status: LedgerStatus) -> Result<()> {
        if !self.refresh()? {
            return Ok(());
        }
        for row in self.rows.iter_mut().filter(|r| r.video_name == name) {
            row.status = status.marker().to_string();
        }
        self.save()
    }

    /// Apply a finished batch and clear all picks
    pub fn apply_batch(&mut self, success: &[String], failed: &[String]) -> Result<()> {
        if !self.refresh()? {
            return Ok(());
        }
        for row in &mut self.rows {
            if success.contains(&row.video_name) {
                row.status = LedgerStatus::Success.marker().to_string();
            } else if failed.contains(&row.video_name) {
                row.status = LedgerStatus::Error.marker().to_string();
            }
            row.pick_now.clear();
        }
        self.save()
    }

    pub fn clear_picks(&mut self) -> Result<()> {
        if !self.refresh()? {
            return Ok(());
        }
        for row in &mut self.rows {
            row.pick_now.clear();
        }
        self.save()
    }

    pub fn selected(&self) -> Vec<String> {
        self.rows
            .iter()
            .filter(|r| r.is_picked())
            .map(|r| r.video_name.clone())
            .collect()
    }

    pub fn failed(&self) -> Vec<String> {
        self.rows
            .iter()
            .filter(|r| r.status() == LedgerStatus::Error)
            .map(|r| r.video_name.clone())
            .collect()
    }

    /// Re-read from disk; false when there is no file
    pub fn refresh(&mut self) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        self.rows = read_rows(&self.path)?;
        Ok(true)
    }
}

fn read_rows(path: &Path) -> Result<Vec<LedgerRow>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        let row: LedgerRow = row?;
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_status_markers() {
        assert_eq!(LedgerStatus::parse("✓"), LedgerStatus::Success);
        assert_eq!(LedgerStatus::parse("error"), LedgerStatus::Error);
        assert_eq!(LedgerStatus::parse("下载异常"), LedgerStatus::Error);
        assert_eq!(LedgerStatus::parse(""), LedgerStatus::Unknown);
        assert_eq!(LedgerStatus::parse("maybe"), LedgerStatus::Unknown);
    }

    #[test]
    fn test_rewrite_keeps_earlier_marks() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("status.csv");
        std::fs::write(&path, "video_name,status,pick_now\na,下载异常,\nb,✓,x\nc,,\n").unwrap();

        let mut ledger = Ledger::load(&path).unwrap();
        let mut complete = HashMap::new();
        complete.insert("c".to_string(), true);

        ledger.rewrite_from_scan(&names(&["a", "b", "c", "d"]), &complete).unwrap();

        let reloaded = Ledger::load(&path).unwrap();
        let statuses: Vec<LedgerStatus> = reloaded.rows().iter().map(|r| r.status()).collect();
        assert_eq!(
            statuses,
            vec![LedgerStatus::Error, LedgerStatus::Success, LedgerStatus::Success, LedgerStatus::Unknown]
        );
        assert!(reloaded.selected().is_empty());
        assert_eq!(reloaded.failed(), names(&["a"]));
    }

    #[test]
    fn test_selection_tokens() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("status.csv");
        std::fs::write(&path, "video_name,status,pick_now\na,,X\nb,,yes\nc,,no\nd,,✓\ne,,\n").unwrap();

        let ledger = Ledger::load(&path).unwrap();
        assert_eq!(ledger.selected(), names(&["a", "b", "d"]));
    }

    #[test]
    fn test_set_status_and_apply_batch() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("status.csv");
        std::fs::write(&path, "video_name,status,pick_now\na,,x\nb,,x\nc,error,\n").unwrap();

        let mut ledger = Ledger::load(&path).unwrap();
        ledger.set_status("a", LedgerStatus::Success).unwrap();
        assert_eq!(Ledger::load(&path).unwrap().rows()[0].status(), LedgerStatus::Success);
        // picks survive a single status update
        assert_eq!(Ledger::load(&path).unwrap().selected().len(), 2);

        ledger.apply_batch(&names(&["c"]), &names(&["b"])).unwrap();
        let reloaded = Ledger::load(&path).unwrap();
        assert_eq!(reloaded.rows()[1].status(), LedgerStatus::Error);
        assert_eq!(reloaded.rows()[2].status(), LedgerStatus::Success);
        assert!(reloaded.selected().is_empty());
    }

    #[test]
    fn test_updates_without_file_are_noops() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("missing.csv");

        let mut ledger = Ledger::load(&path).unwrap();
        ledger.set_status("a", LedgerStatus::Error).unwrap();
        ledger.clear_picks().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_save_writes_header_for_empty_ledger() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("status.csv");
        let mut ledger = Ledger::load(&path).unwrap();
        ledger.rewrite_from_scan(&[], &HashMap::new()).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "video_name,status,pick_now\n");
    }
}
