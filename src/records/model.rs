// QA record model

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use crate::constants::*;

/// One QA record.
/// Kept as the raw JSON object so fields this tool does not know about survive
/// a load/save cycle untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QaRecord(Map<String, Value>);

impl QaRecord {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Accepts only JSON objects
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_str())
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.shift_remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn qa_id(&self) -> Option<&str> {
        self.get_str(FIELD_QA_ID)
    }

    pub fn set_qa_id(&mut self, id: &str) {
        self.set(FIELD_QA_ID, Value::String(id.to_string()));
    }

    pub fn video_name(&self) -> Option<&str> {
        self.get_str(FIELD_VIDEO_NAME).filter(|s| !s.is_empty())
    }

    pub fn segment_id(&self) -> Option<&str> {
        self.get_str(FIELD_SEGMENT_ID).filter(|s| !s.is_empty())
    }

    pub fn question_type(&self) -> &str {
        self.get_str(FIELD_QUESTION_TYPE)
            .or_else(|| self.get_str(FIELD_LEGACY_QUESTION_TYPE))
            .unwrap_or("Unknown")
    }

    pub fn version(&self) -> Option<&str> {
        self.get_str(FIELD_VERSION)
    }

    /// Records without a flag count as usable
    pub fn is_usable(&self) -> bool {
        self.0.get(FIELD_USABLE).and_then(|v| v.as_bool()).unwrap_or(true)
    }

    pub fn is_answered(&self) -> bool {
        matches!(self.0.get(FIELD_HUMAN_ANSWER), Some(v) if !v.is_null())
    }

    /// Legacy segment records name their file via `video_source`
    pub fn video_source_stem(&self) -> Option<String> {
        let source = self.get_str(FIELD_VIDEO_SOURCE).filter(|s| !s.is_empty())?;
        let stem = std::path::Path::new(source).file_stem()?;
        Some(stem.to_string_lossy().to_string())
    }

    /// Perspective used for playback: first of `视角`, else first of `主视角`
    pub fn primary_perspective(&self) -> Option<String> {
        first_string(self.0.get(FIELD_PERSPECTIVES))
            .or_else(|| first_string(self.0.get(FIELD_MAIN_PERSPECTIVES)))
    }

    /// Drop display-only fields before a record is stored
    pub fn strip_derived(&mut self) {
        for key in DERIVED_FIELDS {
            self.0.shift_remove(key);
        }
    }

    /// Merge `fields` over this record, skipping derived fields and `protected`
    pub fn merge(&mut self, fields: &Map<String, Value>, protected: &[&str]) -> Vec<String> {
        let mut changed = Vec::new();
        for (key, value) in fields {
            if DERIVED_FIELDS.contains(&key.as_str()) || protected.contains(&key.as_str()) {
                continue;
            }
            self.0.insert(key.clone(), value.clone());
            changed.push(key.clone());
        }
        changed
    }

    /// Copy with `start_time`/`end_time`/`cut_point` rewritten as `MM:SS`
    pub fn with_display_times(&self) -> Self {
        let mut out = self.clone();
        for key in [FIELD_START_TIME, FIELD_END_TIME, FIELD_CUT_POINT] {
            if let Some(value) = self.0.get(key) {
                out.set(key, Value::String(format_time_mm_ss(value)));
            }
        }
        out
    }
}

fn first_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str())
            .find(|s| !s.is_empty())
            .map(|s| s.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Normalize a time value for display.
///
/// Empty or null becomes `00:00`, `MM:SS` is kept, `MM:SS.ff` loses its
/// fraction, plain seconds (number or numeric string) are floored to `MM:SS`.
/// Anything else is returned as written.
pub fn format_time_mm_ss(value: &Value) -> String {
    match value {
        Value::Null => "00:00".to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(secs) if secs >= 0.0 => seconds_to_mm_ss(secs),
            _ => n.to_string(),
        },
        Value::String(s) => format_time_str(s),
        other => other.to_string(),
    }
}

fn format_time_str(raw: &str) -> String {
    let s = raw.trim();
    if s.is_empty() {
        return "00:00".to_string();
    }

    if let Some((minutes, rest)) = s.split_once(':') {
        let seconds = rest.split('.').next().unwrap_or(rest);
        if is_digits(minutes) && is_digits(seconds) {
            return format!("{}:{}", minutes, seconds);
        }
        return s.to_string();
    }

    match s.parse::<f64>() {
        Ok(secs) if secs.is_finite() && secs >= 0.0 => seconds_to_mm_ss(secs),
        _ => s.to_string(),
    }
}

fn seconds_to_mm_ss(secs: f64) -> String {
    let total = secs.floor() as u64;
    format!("{:02}:{:02}", total / 60, total % 60)
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_time_formatting() {
        assert_eq!(format_time_mm_ss(&json!("")), "00:00");
        assert_eq!(format_time_mm_ss(&Value::Null), "00:00");
        assert_eq!(format_time_mm_ss(&json!("01:23")), "01:23");
        assert_eq!(format_time_mm_ss(&json!("01:23.45")), "01:23");
        assert_eq!(format_time_mm_ss(&json!("83")), "01:23");
        assert_eq!(format_time_mm_ss(&json!("83.9")), "01:23");
        assert_eq!(format_time_mm_ss(&json!(125)), "02:05");
        assert_eq!(format_time_mm_ss(&json!("soon")), "soon");
    }

    #[test]
    fn test_perspective_lookup() {
        let rec = QaRecord::from_value(json!({"视角": ["cam2.mp4"], "主视角": ["cam1.mp4"]})).unwrap();
        assert_eq!(rec.primary_perspective().as_deref(), Some("cam2.mp4"));

        let rec = QaRecord::from_value(json!({"视角": [], "主视角": ["cam1.mp4"]})).unwrap();
        assert_eq!(rec.primary_perspective().as_deref(), Some("cam1.mp4"));

        let rec = QaRecord::from_value(json!({"question": "q"})).unwrap();
        assert!(rec.primary_perspective().is_none());
    }

    #[test]
    fn test_merge_skips_protected_and_derived() {
        let mut rec = QaRecord::from_value(json!({"qa_id": "v_qa_0", "video_name": "v", "question": "old"})).unwrap();
        let patch = json!({"qa_id": "x_qa_9", "video_name": "x", "video_path": "/p", "question": "new"});
        let changed = rec.merge(patch.as_object().unwrap(), &[FIELD_QA_ID, FIELD_VIDEO_NAME]);

        assert_eq!(changed, vec!["question".to_string()]);
        assert_eq!(rec.qa_id(), Some("v_qa_0"));
        assert_eq!(rec.video_name(), Some("v"));
        assert!(!rec.contains(FIELD_VIDEO_PATH));
    }

    #[test]
    fn test_flags_default() {
        let rec = QaRecord::from_value(json!({"human_answer": null})).unwrap();
        assert!(rec.is_usable());
        assert!(!rec.is_answered());
        assert_eq!(rec.question_type(), "Unknown");

        let rec = QaRecord::from_value(json!({"usable": false, "human_answer": "A", "Question Type": "Order"})).unwrap();
        assert!(!rec.is_usable());
        assert!(rec.is_answered());
        assert_eq!(rec.question_type(), "Order");
    }
}
