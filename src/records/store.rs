// Record store: one active QA document with CRUD and persistence

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use serde::Serialize;
use serde_json::{Map, Value};
use crate::constants::*;
use crate::error::{AnnotatorError, Result};
use crate::video::{VideoKind, VideoLocator};
use super::document::{Document, Layout};
use super::id::QaId;
use super::model::QaRecord;

#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Layout used when the file is missing, empty or unreadable
    pub default_layout: Layout,
    /// Persist after every mutation
    pub autosave: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            default_layout: Layout::Videos,
            autosave: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupSummary {
    pub name: String,
    pub record_count: usize,
    pub video_name: Option<String>,
    pub state: Option<String>,
    pub last_modify: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStatistics {
    pub total_groups: usize,
    pub total_records: usize,
    pub question_types: BTreeMap<String, usize>,
    pub v2_records: usize,
    pub answered: usize,
    pub usable: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct VideoInfo {
    pub video_name: String,
    pub kind: Option<VideoKind>,
    pub available_perspectives: Vec<String>,
    pub current_perspective: Option<String>,
    pub video_path: Option<String>,
}

#[derive(Debug)]
pub struct RecordStore {
    path: PathBuf,
    doc: Document,
    autosave: bool,
}

impl RecordStore {
    /// Load a store from disk. Never fails: unreadable input gives an empty store.
    pub fn open(path: impl Into<PathBuf>, options: StoreOptions) -> Self {
        let path = path.into();
        let doc = match Document::read(&path, &options.default_layout) {
            Ok(doc) => {
                log::info!(
                    "Loaded {} ({} layout): {} groups, {} records",
                    path.display(),
                    doc.layout().name(),
                    doc.groups().len(),
                    doc.record_count()
                );
                doc
            }
            Err(e) => {
                log::warn!("Failed to load {}: {}; starting empty", path.display(), e);
                Document::empty(options.default_layout.clone())
            }
        };

        Self {
            path,
            doc,
            autosave: options.autosave,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn layout(&self) -> &Layout {
        self.doc.layout()
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn set_autosave(&mut self, enabled: bool) {
        self.autosave = enabled;
        log::info!("Autosave {}", if enabled { "enabled" } else { "disabled" });
    }

    /// Write the whole document back to its file
    pub fn persist(&self) -> Result<()> {
        self.doc.write(&self.path)?;
        log::debug!("Saved {} records to {}", self.doc.record_count(), self.path.display());
        Ok(())
    }

    fn after_mutation(&mut self, gi: usize) -> Result<()> {
        self.doc.touch_group(gi);
        if self.autosave {
            self.persist()?;
        }
        Ok(())
    }

    pub fn list_groups(&self) -> Vec<GroupSummary> {
        let mut groups: Vec<GroupSummary> = self
            .doc
            .groups()
            .iter()
            .map(|g| GroupSummary {
                name: g.name.clone(),
                record_count: g.records.len(),
                video_name: g.meta_str(FIELD_VIDEO_NAME).map(|s| s.to_string()),
                state: g.meta_str(SEGMENT_STATE).map(|s| s.to_string()),
                last_modify: g.meta_str(SEGMENT_LAST_MODIFY).map(|s| s.to_string()),
            })
            .collect();

        if *self.doc.layout() == Layout::Videos {
            groups.sort_by(|a, b| a.name.cmp(&b.name));
        }
        groups
    }

    /// Records of a group, annotated for display.
    /// Unknown groups give an empty list.
    pub fn list_records(&self, group: &str, locator: &VideoLocator) -> Vec<QaRecord> {
        let group = match self.doc.group(group) {
            Some(g) => g,
            None => return Vec::new(),
        };

        group
            .records
            .iter()
            .enumerate()
            .map(|(i, record)| {
                let mut shown = record.with_display_times();
                if shown.qa_id().is_none() {
                    shown.set_qa_id(&QaId::new(group.name.as_str(), i).to_string());
                }
                let web_path = self
                    .doc
                    .video_reference(group, record)
                    .and_then(|name| locator.web_path(&name, record.primary_perspective().as_deref()));
                shown.set(FIELD_VIDEO_PATH, web_path.map(Value::String).unwrap_or(Value::Null));
                shown
            })
            .collect()
    }

    pub fn get_record(&self, id: &str) -> Result<QaRecord> {
        let id = self.doc.locate(id)?;
        self.doc
            .record(&id)
            .cloned()
            .ok_or_else(|| AnnotatorError::RecordNotFound(id.to_string()))
    }

    /// Add a record at the end of a group and return its id.
    /// Segment documents require the group to exist; the other layouts create it.
    pub fn create_record(&mut self, group: &str, fields: &Map<String, Value>) -> Result<QaId> {
        let gi = match self.doc.layout() {
            Layout::Segments => self
                .doc
                .group_index(group)
                .ok_or_else(|| AnnotatorError::GroupNotFound(group.to_string()))?,
            _ => self.doc.ensure_group(group),
        };

        let index = self.doc.group_at(gi).records.len();
        let id = QaId::new(group, index);

        let mut record = match self.doc.layout() {
            Layout::Videos => video_record_template(group, fields, self.doc.group_at(gi).records.first()),
            layout => {
                let mut record = QaRecord::from_map(fields.clone());
                record.strip_derived();
                record.set(layout.group_field().to_string(), Value::String(group.to_string()));
                record
            }
        };
        record.set_qa_id(&id.to_string());

        self.doc.push_record(gi, record);
        self.doc.renumber(gi);
        log::info!("Created record {}", id);

        self.after_mutation(gi)?;
        Ok(id)
    }

    /// Partial update. Derived fields, the owning group field and the id are
    /// never written; the video layout also protects `version`.
    pub fn update_record(&mut self, id: &str, fields: &Map<String, Value>) -> Result<()> {
        let id = self.doc.locate(id)?;
        let gi = self.group_index(&id)?;

        let mut protected = vec![self.doc.layout().group_field().to_string(), FIELD_QA_ID.to_string()];
        if *self.doc.layout() == Layout::Videos {
            protected.extend(VIDEO_LAYOUT_IMMUTABLE_FIELDS.iter().map(|s| s.to_string()));
        }
        let protected: Vec<&str> = protected.iter().map(|s| s.as_str()).collect();

        let changed = {
            let record = &mut self.doc.group_at_mut(gi).records[id.index];
            record.merge(fields, &protected)
        };
        log::info!("Updated record {} ({})", id, changed.join(", "));

        self.after_mutation(gi)
    }

    /// Remove a record; later siblings shift down one index
    pub fn delete_record(&mut self, id: &str) -> Result<QaRecord> {
        let id = self.doc.locate(id)?;
        let gi = self.group_index(&id)?;

        let removed = self.doc.remove_record(gi, id.index);
        self.doc.renumber(gi);
        log::info!("Deleted record {}", id);

        self.after_mutation(gi)?;
        Ok(removed)
    }

    /// Copy a record to the end of its group, tagged as an edited version
    pub fn duplicate_record(&mut self, id: &str) -> Result<QaId> {
        let source = self.doc.locate(id)?;
        let gi = self.group_index(&source)?;

        let mut copy = self.doc.group_at(gi).records[source.index].clone();
        copy.set(FIELD_VERSION, Value::String(EDITED_VERSION.to_string()));

        let index = self.doc.push_record(gi, copy);
        self.doc.renumber(gi);
        let new_id = QaId::new(source.group.as_str(), index);
        log::info!("Duplicated record {} -> {}", source, new_id);

        self.after_mutation(gi)?;
        Ok(new_id)
    }

    pub fn set_group_state(&mut self, group: &str, state: &str) -> Result<()> {
        if *self.doc.layout() != Layout::Segments {
            return Err(AnnotatorError::InvalidValue(format!(
                "{} documents have no group state",
                self.doc.layout().name()
            )));
        }
        let gi = self
            .doc
            .group_index(group)
            .ok_or_else(|| AnnotatorError::GroupNotFound(group.to_string()))?;

        self.doc
            .group_at_mut(gi)
            .meta
            .insert(SEGMENT_STATE.to_string(), Value::String(state.to_string()));
        log::info!("Group {} state -> {}", group, state);

        self.after_mutation(gi)
    }

    pub fn set_human_answer(&mut self, id: &str, answer: &str) -> Result<()> {
        let mut fields = Map::new();
        fields.insert(FIELD_HUMAN_ANSWER.to_string(), Value::String(answer.to_string()));
        self.update_record(id, &fields)
    }

    /// Flip the usable flag and return the new value.
    /// Marking unusable stores the reason when given; restoring clears it.
    pub fn toggle_usable(&mut self, id: &str, reason: Option<&str>) -> Result<bool> {
        let usable = !self.get_record(id)?.is_usable();

        let mut fields = Map::new();
        fields.insert(FIELD_USABLE.to_string(), Value::Bool(usable));
        if usable {
            fields.insert(FIELD_USELESS_REASON.to_string(), Value::Null);
        } else if let Some(reason) = reason.filter(|r| !r.is_empty()) {
            fields.insert(FIELD_USELESS_REASON.to_string(), Value::String(reason.to_string()));
        }

        self.update_record(id, &fields)?;
        Ok(usable)
    }

    pub fn set_difficulty(&mut self, id: &str, level: &str) -> Result<()> {
        if !DIFFICULTY_LEVELS.contains(&level) {
            return Err(AnnotatorError::InvalidValue(format!(
                "difficulty must be one of {}",
                DIFFICULTY_LEVELS.join(", ")
            )));
        }
        let mut fields = Map::new();
        fields.insert(FIELD_DIFFICULTY.to_string(), Value::String(level.to_string()));
        self.update_record(id, &fields)
    }

    pub fn statistics(&self) -> StoreStatistics {
        let mut stats = StoreStatistics {
            total_groups: self.doc.groups().len(),
            ..Default::default()
        };

        for (_, record) in self.doc.records() {
            stats.total_records += 1;
            *stats
                .question_types
                .entry(record.question_type().to_string())
                .or_insert(0) += 1;
            if record.version() == Some(EDITED_VERSION) {
                stats.v2_records += 1;
            }
            if record.is_answered() {
                stats.answered += 1;
            }
            if record.is_usable() {
                stats.usable += 1;
            }
        }
        stats
    }

    /// Playback details for a group, taken from its first record
    pub fn video_info(&self, group: &str, locator: &VideoLocator) -> Option<VideoInfo> {
        let group = self.doc.group(group)?;
        let first = group.records.first();

        let video_name = match first {
            Some(record) => self.doc.video_reference(group, record)?,
            None => match self.doc.layout() {
                Layout::Videos => group.name.clone(),
                _ => group.meta_str(FIELD_VIDEO_NAME)?.to_string(),
            },
        };
        let current_perspective = first.and_then(|r| r.primary_perspective());
        let entry = locator.entry(&video_name);

        Some(VideoInfo {
            kind: entry.map(|e| e.kind),
            available_perspectives: locator.available_perspectives(&video_name),
            video_path: entry.and_then(|_| locator.web_path(&video_name, current_perspective.as_deref())),
            current_perspective,
            video_name,
        })
    }

    fn group_index(&self, id: &QaId) -> Result<usize> {
        self.doc
            .group_index(&id.group)
            .ok_or_else(|| AnnotatorError::GroupNotFound(id.group.clone()))
    }
}

/// Build a video-layout record from submitted fields and the group's first record
fn video_record_template(video: &str, fields: &Map<String, Value>, first: Option<&QaRecord>) -> QaRecord {
    let field = |key: &str, default: Value| fields.get(key).cloned().unwrap_or(default);
    let inherited_time = |key: &str| {
        first
            .and_then(|r| r.get(key).cloned())
            .unwrap_or_else(|| Value::String(DEFAULT_TIME.to_string()))
    };

    let mut record = QaRecord::new();
    record.set(FIELD_QA_ID, Value::String(String::new()));
    record.set(FIELD_VIDEO_NAME, Value::String(video.to_string()));
    record.set(FIELD_MAIN_PERSPECTIVES, field(FIELD_MAIN_PERSPECTIVES, Value::Array(Vec::new())));
    record.set(FIELD_ASK_PERSPECTIVES, field(FIELD_ASK_PERSPECTIVES, Value::Array(Vec::new())));
    record.set(FIELD_ASK_PERSPECTIVES_TIME, field(FIELD_ASK_PERSPECTIVES_TIME, Value::Null));
    record.set(FIELD_QUESTION, field(FIELD_QUESTION, Value::String(String::new())));
    record.set(FIELD_OPTIONS, field(FIELD_OPTIONS, Value::Array(Vec::new())));
    record.set(FIELD_GROUND_TRUTH, field(FIELD_GROUND_TRUTH, Value::String(String::new())));
    record.set(FIELD_QUESTION_TYPE, field(FIELD_QUESTION_TYPE, Value::String(String::new())));
    record.set(FIELD_TEMPORAL_DIRECTION, field(FIELD_TEMPORAL_DIRECTION, Value::String(String::new())));
    record.set(FIELD_START_TIME, field(FIELD_START_TIME, inherited_time(FIELD_START_TIME)));
    record.set(FIELD_END_TIME, field(FIELD_END_TIME, inherited_time(FIELD_END_TIME)));
    record.set(FIELD_CUT_POINT, field(FIELD_CUT_POINT, Value::String(String::new())));
    record.set(FIELD_USABLE, field(FIELD_USABLE, Value::Bool(false)));
    record.set(FIELD_USELESS_REASON, field(FIELD_USELESS_REASON, Value::String(String::new())));
    record.set(FIELD_VERSION, Value::String(EDITED_VERSION.to_string()));
    record
}
