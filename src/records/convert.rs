// Document conversions between workflows, and review merges

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use serde_json::Value;
use crate::constants::*;
use crate::error::{AnnotatorError, Result};
use super::document::{Document, Layout};
use super::id::QaId;
use super::model::QaRecord;

/// Candidate segments -> flat quiz list.
/// The answer seeds `options` and becomes `ground_truth`; `human_answer` starts empty.
pub fn segments_to_flat(doc: &Document) -> Result<Document> {
    if *doc.layout() != Layout::Segments {
        return Err(AnnotatorError::InvalidValue(format!(
            "expected a segments document, got {}",
            doc.layout().name()
        )));
    }

    let mut items = Vec::new();
    for group in doc.groups() {
        let video_name = group.meta_str(FIELD_VIDEO_NAME).unwrap_or("");
        for record in &group.records {
            let answer = record.get(FIELD_ANSWER).cloned().unwrap_or(Value::String(String::new()));
            let options = match &answer {
                Value::String(s) if s.is_empty() => Vec::new(),
                Value::Null => Vec::new(),
                other => vec![other.clone()],
            };
            let time = |key: &str| record.get(key).cloned().unwrap_or(Value::String(DEFAULT_TIME.to_string()));
            let text = |key: &str| record.get(key).cloned().unwrap_or(Value::String(String::new()));

            let mut out = QaRecord::new();
            out.set(FIELD_QA_ID, text(FIELD_QA_ID));
            out.set(FIELD_VIDEO_NAME, Value::String(video_name.to_string()));
            out.set(FIELD_PERSPECTIVES, record.get(FIELD_PERSPECTIVES).cloned().unwrap_or(Value::Array(Vec::new())));
            out.set(FIELD_QUESTION, text(FIELD_QUESTION));
            out.set(FIELD_OPTIONS, Value::Array(options));
            out.set(FIELD_GROUND_TRUTH, answer);
            out.set(FIELD_HUMAN_ANSWER, Value::Null);
            out.set(FIELD_QUESTION_TYPE, text(FIELD_QUESTION_TYPE));
            out.set(FIELD_TEMPORAL_DIRECTION, text(FIELD_TEMPORAL_DIRECTION));
            out.set(FIELD_START_TIME, time(FIELD_START_TIME));
            out.set(FIELD_END_TIME, time(FIELD_END_TIME));
            out.set(FIELD_CUT_POINT, time(FIELD_CUT_POINT));
            out.set(FIELD_SEGMENT_ID, Value::String(group.name.clone()));
            out.set(FIELD_USABLE, record.get(FIELD_USABLE).cloned().unwrap_or(Value::Bool(true)));
            items.push(out.into_value());
        }
    }

    log::info!("Converted {} segments into {} flat records", doc.groups().len(), items.len());
    Document::from_value(Value::Array(items), &Layout::flat_by_video())
}

/// Flat list -> video-grouped mapping.
/// `segment_id` is dropped and ids are renumbered per video.
pub fn flat_to_videos(doc: &Document) -> Result<Document> {
    if !matches!(doc.layout(), Layout::Flat { .. }) {
        return Err(AnnotatorError::InvalidValue(format!(
            "expected a flat document, got {}",
            doc.layout().name()
        )));
    }

    let mut out = Document::empty(Layout::Videos);
    for value in flat_values(doc) {
        let mut record = match QaRecord::from_value(value) {
            Some(r) => r,
            None => continue,
        };
        let video = match record.video_name() {
            Some(v) => v.to_string(),
            None => {
                log::warn!("Record {} has no video_name, skipped", record.qa_id().unwrap_or("?"));
                continue;
            }
        };
        record.remove(FIELD_SEGMENT_ID);

        let gi = out.ensure_group(&video);
        let index = out.group_at(gi).records.len();
        if record.contains(FIELD_QA_ID) {
            record.set_qa_id(&QaId::new(video.as_str(), index).to_string());
        }
        out.push_record(gi, record);
    }

    log::info!("Converted {} records into {} videos", out.record_count(), out.groups().len());
    Ok(out)
}

/// Records of a flat document in file order
fn flat_values(doc: &Document) -> Vec<Value> {
    match doc.to_value() {
        Value::Array(items) => items,
        _ => Vec::new(),
    }
}

/// Outcome of a review pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReviewCounts {
    /// Records carrying a `qa_id`
    pub processed: usize,
    /// Records whose id was selected
    pub reviewed: usize,
}

/// Set `reviewed` on every record with an id: true when the id is selected
pub fn mark_reviewed(doc: &mut Document, selected: &HashSet<String>) -> ReviewCounts {
    let mut counts = ReviewCounts::default();
    doc.for_each_record_mut(|record| {
        let reviewed = match record.qa_id() {
            Some(id) => selected.contains(id),
            None => return,
        };
        record.set(FIELD_REVIEWED, Value::Bool(reviewed));
        counts.processed += 1;
        if reviewed {
            counts.reviewed += 1;
        }
    });
    counts
}

/// Copy of `doc` holding only the selected records, each flagged `reviewed`.
/// Every group is kept, including groups with nothing selected.
pub fn reviewed_only(doc: &Document, selected: &HashSet<String>) -> Result<(Document, usize)> {
    let pick = |record: &QaRecord| -> Option<QaRecord> {
        let id = record.qa_id()?;
        if !selected.contains(id) {
            return None;
        }
        let mut copy = record.clone();
        copy.set(FIELD_REVIEWED, Value::Bool(true));
        Some(copy)
    };

    if let Layout::Flat { .. } = doc.layout() {
        let items: Vec<Value> = flat_values(doc)
            .into_iter()
            .filter_map(QaRecord::from_value)
            .filter_map(|record| pick(&record))
            .map(QaRecord::into_value)
            .collect();
        let count = items.len();
        return Ok((Document::from_value(Value::Array(items), doc.layout())?, count));
    }

    let segments = *doc.layout() == Layout::Segments;
    let mut out = doc.clone();
    let mut count = 0;
    for gi in 0..out.groups().len() {
        let group = out.group_at_mut(gi);
        group.records = group.records.iter().filter_map(|r| pick(r)).collect();
        count += group.records.len();

        // segments always carry their records key, even when emptied
        let key = group.records_key.clone();
        if segments && !group.meta.contains_key(&key) {
            group.meta.insert(key, Value::Null);
        }
    }

    log::info!("Kept {} reviewed records in {} groups", count, out.groups().len());
    Ok((out, count))
}

/// Replace records by their reviewed copies (matched on `qa_id`). Returns the replaced count.
pub fn merge_reviewed(doc: &mut Document, reviewed: &Document) -> usize {
    let mut by_id: HashMap<String, QaRecord> = HashMap::new();
    for (_, record) in reviewed.records() {
        if let Some(id) = record.qa_id() {
            by_id.insert(id.to_string(), record.clone());
        }
    }

    let mut replaced = 0;
    doc.for_each_record_mut(|record| {
        let id = match record.qa_id() {
            Some(id) => id.to_string(),
            None => return,
        };
        if let Some(new_record) = by_id.get(&id) {
            let mut merged = new_record.clone();
            merged.set_qa_id(&id);
            merged.set(FIELD_REVIEWED, Value::Bool(true));
            *record = merged;
            replaced += 1;
        }
    });
    replaced
}

/// Read selected ids from `["id", ...]` or `{"selectedQAs": ["id", ...]}`
pub fn load_selection(path: &Path) -> Result<HashSet<String>> {
    let text = fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&text)?;

    let list = match &value {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("selectedQAs") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(AnnotatorError::InvalidValue(
                    "selection has no selectedQAs list".to_string(),
                ))
            }
        },
        _ => {
            return Err(AnnotatorError::InvalidValue(
                "selection must be a list or an object".to_string(),
            ))
        }
    };

    Ok(list
        .iter()
        .filter_map(|v| v.as_str())
        .map(|s| s.to_string())
        .collect())
}
