// QA document layouts
//
// Three on-disk shapes are supported:
//   Flat      [ {record}, ... ]                       grouped by segment_id or video_name
//   Segments  { segment_id: { qas: [...], state, ... } }
//   Videos    { video_name: [ {record}, ... ] }
// The shape is detected once and every operation works on the normalized groups.

use std::fs;
use std::io::Write;
use std::path::Path;
use chrono::{Local, Utc};
use serde_json::{Map, Value};
use crate::constants::*;
use crate::error::{AnnotatorError, Result};
use super::id::QaId;
use super::model::QaRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layout {
    /// Plain array; `group_key` is the record field naming the owning group
    Flat { group_key: String },
    Segments,
    Videos,
}

impl Layout {
    pub fn flat_by_video() -> Self {
        Layout::Flat {
            group_key: FIELD_VIDEO_NAME.to_string(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Layout::Flat { .. } => "flat",
            Layout::Segments => "segments",
            Layout::Videos => "videos",
        }
    }

    /// Record field that names the owning group
    pub fn group_field(&self) -> &str {
        match self {
            Layout::Flat { group_key } => group_key,
            Layout::Segments => FIELD_SEGMENT_ID,
            Layout::Videos => FIELD_VIDEO_NAME,
        }
    }
}

/// A segment or video together with its ordered records
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub name: String,
    pub records: Vec<QaRecord>,
    /// Segment object fields in document order, records key included (as a placeholder)
    pub meta: Map<String, Value>,
    pub records_key: String,
}

impl Group {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            records: Vec::new(),
            meta: Map::new(),
            records_key: SEGMENT_RECORDS_KEY.to_string(),
        }
    }

    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.meta.get(key).and_then(|v| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    layout: Layout,
    groups: Vec<Group>,
    /// Flat layout only: owning group index of each array slot, in file order
    slots: Vec<usize>,
}

impl Document {
    pub fn empty(layout: Layout) -> Self {
        Self {
            layout,
            groups: Vec::new(),
            slots: Vec::new(),
        }
    }

    /// Read and parse a document file.
    /// A missing file or an empty object yields an empty document in `default_layout`.
    pub fn read(path: &Path, default_layout: &Layout) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::empty(default_layout.clone()));
        }
        let text = fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&text)?;
        Self::from_value(value, default_layout)
    }

    /// Detect the layout of a parsed document and normalize it
    pub fn from_value(value: Value, default_layout: &Layout) -> Result<Self> {
        match value {
            Value::Array(items) => Self::from_flat(items),
            Value::Object(map) if map.is_empty() => Ok(Self::empty(default_layout.clone())),
            Value::Object(map) => {
                if map.values().all(|v| v.is_array()) {
                    Self::from_videos(map)
                } else if map.values().all(|v| v.is_object()) {
                    Self::from_segments(map)
                } else {
                    Err(AnnotatorError::InvalidValue(
                        "document mixes array and object groups".to_string(),
                    ))
                }
            }
            other => Err(AnnotatorError::InvalidValue(format!(
                "unsupported document root: {}",
                json_type_name(&other)
            ))),
        }
    }

    fn from_flat(items: Vec<Value>) -> Result<Self> {
        let records = items
            .into_iter()
            .map(|v| QaRecord::from_value(v).ok_or_else(|| AnnotatorError::InvalidValue("flat entry is not an object".to_string())))
            .collect::<Result<Vec<_>>>()?;

        let group_key = if records.iter().any(|r| r.segment_id().is_some()) {
            FIELD_SEGMENT_ID
        } else {
            FIELD_VIDEO_NAME
        };

        let mut doc = Self::empty(Layout::Flat {
            group_key: group_key.to_string(),
        });
        for record in records {
            let name = record.get_str(group_key).unwrap_or("").to_string();
            let gi = doc.ensure_group(&name);
            doc.groups[gi].records.push(record);
            doc.slots.push(gi);
        }
        Ok(doc)
    }

    fn from_videos(map: Map<String, Value>) -> Result<Self> {
        let mut doc = Self::empty(Layout::Videos);
        for (name, value) in map {
            let mut group = Group::new(&name);
            group.records = records_from_array(value, &name)?;
            doc.groups.push(group);
        }
        Ok(doc)
    }

    fn from_segments(map: Map<String, Value>) -> Result<Self> {
        let mut doc = Self::empty(Layout::Segments);
        for (name, value) in map {
            let mut group = Group::new(&name);
            let mut meta = match value {
                Value::Object(m) => m,
                _ => Map::new(),
            };

            let key = if meta.contains_key(SEGMENT_RECORDS_KEY) {
                SEGMENT_RECORDS_KEY
            } else if meta.contains_key(SEGMENT_LEGACY_RECORDS_KEY) {
                SEGMENT_LEGACY_RECORDS_KEY
            } else {
                SEGMENT_RECORDS_KEY
            };
            group.records_key = key.to_string();

            if let Some(slot) = meta.get_mut(key) {
                let records = std::mem::replace(slot, Value::Null);
                group.records = records_from_array(records, &name)?;
            }
            group.meta = meta;
            doc.groups.push(group);
        }
        Ok(doc)
    }

    /// Serialize back to the shape the document was loaded in
    pub fn to_value(&self) -> Value {
        match &self.layout {
            Layout::Flat { .. } => {
                let mut cursors = vec![0usize; self.groups.len()];
                let mut items = Vec::with_capacity(self.slots.len());
                for &gi in &self.slots {
                    if let Some(record) = self.groups[gi].records.get(cursors[gi]) {
                        items.push(record.clone().into_value());
                    }
                    cursors[gi] += 1;
                }
                Value::Array(items)
            }
            Layout::Videos => {
                let mut map = Map::new();
                for group in &self.groups {
                    map.insert(group.name.clone(), records_to_array(&group.records));
                }
                Value::Object(map)
            }
            Layout::Segments => {
                let mut map = Map::new();
                for group in &self.groups {
                    let mut meta = group.meta.clone();
                    if meta.contains_key(&group.records_key) || !group.records.is_empty() {
                        meta.insert(group.records_key.clone(), records_to_array(&group.records));
                    }
                    map.insert(group.name.clone(), Value::Object(meta));
                }
                Value::Object(map)
            }
        }
    }

    /// Pretty JSON, two-space indent, non-ASCII written verbatim
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_value())?)
    }

    /// Write the document through a temp sibling file and rename it into place
    pub fn write(&self, path: &Path) -> Result<()> {
        let text = self.to_json_string()?;
        write_atomic(path, text.as_bytes())
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn group_index(&self, name: &str) -> Option<usize> {
        self.groups.iter().position(|g| g.name == name)
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name == name)
    }

    pub fn group_at(&self, gi: usize) -> &Group {
        &self.groups[gi]
    }

    pub fn group_at_mut(&mut self, gi: usize) -> &mut Group {
        &mut self.groups[gi]
    }

    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|g| g.name.as_str())
    }

    pub fn record_count(&self) -> usize {
        self.groups.iter().map(|g| g.records.len()).sum()
    }

    pub fn records(&self) -> impl Iterator<Item = (&Group, &QaRecord)> {
        self.groups
            .iter()
            .flat_map(|g| g.records.iter().map(move |r| (g, r)))
    }

    /// Index of the named group, creating it at the end when absent
    pub fn ensure_group(&mut self, name: &str) -> usize {
        if let Some(gi) = self.group_index(name) {
            return gi;
        }
        self.groups.push(Group::new(name));
        self.groups.len() - 1
    }

    /// Append a record to a group; returns its index within the group
    pub fn push_record(&mut self, gi: usize, record: QaRecord) -> usize {
        self.groups[gi].records.push(record);
        if matches!(self.layout, Layout::Flat { .. }) {
            self.slots.push(gi);
        }
        self.groups[gi].records.len() - 1
    }

    pub fn remove_record(&mut self, gi: usize, index: usize) -> QaRecord {
        if matches!(self.layout, Layout::Flat { .. }) {
            let slot = self
                .slots
                .iter()
                .enumerate()
                .filter(|(_, g)| **g == gi)
                .nth(index)
                .map(|(pos, _)| pos);
            if let Some(pos) = slot {
                self.slots.remove(pos);
            }
        }
        self.groups[gi].records.remove(index)
    }

    /// Rewrite every id in the group as `{group}_qa_{i}`
    pub fn renumber(&mut self, gi: usize) {
        let group = &mut self.groups[gi];
        for (i, record) in group.records.iter_mut().enumerate() {
            record.set_qa_id(&QaId::new(group.name.as_str(), i).to_string());
        }
    }

    /// Stamp a segment after one of its records changed
    pub fn touch_group(&mut self, gi: usize) {
        if self.layout != Layout::Segments {
            return;
        }
        let group = &mut self.groups[gi];
        let now = Local::now().format(LAST_MODIFY_FORMAT).to_string();
        group.meta.insert(SEGMENT_LAST_MODIFY.to_string(), Value::String(now));

        let sync = format!("{}Z", Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f"));
        group.meta.insert(SEGMENT_SYNC_TIME.to_string(), Value::String(sync));
        if group.records_key == SEGMENT_RECORDS_KEY {
            group
                .meta
                .insert(SEGMENT_TOTAL_QAS.to_string(), Value::from(group.records.len()));
        }
    }

    /// Find a record by its textual id.
    /// An exact `qa_id` match wins; otherwise the id is read positionally.
    pub fn locate(&self, text: &str) -> Result<QaId> {
        for group in &self.groups {
            if let Some(index) = group.records.iter().position(|r| r.qa_id() == Some(text)) {
                return Ok(QaId::new(group.name.as_str(), index));
            }
        }

        if !text.contains(QA_ID_SEPARATOR) {
            return Err(AnnotatorError::MalformedId(text.to_string()));
        }
        let id = match QaId::resolve(text, self.group_names()) {
            Some(id) => id,
            None => {
                let parsed: QaId = text.parse()?;
                return Err(AnnotatorError::GroupNotFound(parsed.group));
            }
        };

        let len = self.group(&id.group).map(|g| g.records.len()).unwrap_or(0);
        if id.index >= len {
            return Err(AnnotatorError::IndexOutOfRange {
                group: id.group,
                index: id.index,
            });
        }
        Ok(id)
    }

    pub fn record(&self, id: &QaId) -> Option<&QaRecord> {
        self.group(&id.group)?.records.get(id.index)
    }

    /// Name of the video a record plays from
    pub fn video_reference(&self, group: &Group, record: &QaRecord) -> Option<String> {
        let from_record = || {
            record
                .video_name()
                .map(|s| s.to_string())
                .or_else(|| record.video_source_stem())
        };
        match self.layout {
            Layout::Segments => group
                .meta_str(FIELD_VIDEO_NAME)
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .or_else(from_record),
            Layout::Videos => from_record().or_else(|| Some(group.name.clone())),
            Layout::Flat { .. } => from_record(),
        }
    }

    /// Unique video names referenced by any record, first-seen order
    pub fn referenced_videos(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for (group, record) in self.records() {
            if let Some(name) = self.video_reference(group, record) {
                if !seen.contains(&name) {
                    seen.push(name);
                }
            }
        }
        seen
    }

    /// Apply `f` to every record, in group order
    pub fn for_each_record_mut<F: FnMut(&mut QaRecord)>(&mut self, mut f: F) {
        for group in &mut self.groups {
            for record in &mut group.records {
                f(record);
            }
        }
    }
}

fn records_from_array(value: Value, group: &str) -> Result<Vec<QaRecord>> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|v| {
                QaRecord::from_value(v)
                    .ok_or_else(|| AnnotatorError::InvalidValue(format!("non-object record in group {}", group)))
            })
            .collect(),
        Value::Null => Ok(Vec::new()),
        other => Err(AnnotatorError::InvalidValue(format!(
            "records of group {} are a {}",
            group,
            json_type_name(&other)
        ))),
    }
}

fn records_to_array(records: &[QaRecord]) -> Value {
    Value::Array(records.iter().map(|r| r.clone().into_value()).collect())
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Write bytes to a temp file next to `path`, then rename over it
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => std::path::PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;

    let temp_path = parent.join(format!("{}{}", TEMP_FILE_PREFIX, uuid::Uuid::new_v4()));
    let result = (|| -> Result<()> {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&temp_path, path)?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}
