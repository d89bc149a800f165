// --- Record store scenario tests ---

use super::*;
use crate::error::AnnotatorError;
use crate::video::VideoLocator;
use serde_json::{json, Map, Value};
use std::path::Path;
use tempfile::TempDir;

fn write_doc(dir: &Path, name: &str, value: &Value) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    path
}

fn fields(value: Value) -> Map<String, Value> {
    value.as_object().unwrap().clone()
}

fn ids(store: &RecordStore, group: &str) -> Vec<String> {
    store
        .document()
        .group(group)
        .unwrap()
        .records
        .iter()
        .map(|r| r.qa_id().unwrap_or("").to_string())
        .collect()
}

fn assert_contiguous(store: &RecordStore, group: &str) {
    let expected: Vec<String> = (0..ids(store, group).len())
        .map(|i| format!("{}_qa_{}", group, i))
        .collect();
    assert_eq!(ids(store, group), expected);
}

fn segments_fixture() -> Value {
    json!({
        "seg_01": {
            "video_name": "alpha",
            "sync_time": "2024-01-01T00:00:00Z",
            "qas": [
                {"qa_id": "seg_01_qa_0", "question": "first", "answer": "A", "question_type": "Direction"},
                {"qa_id": "seg_01_qa_1", "question": "second", "answer": "B", "question_type": "Order"},
                {"qa_id": "seg_01_qa_2", "question": "third", "answer": "C", "question_type": "Direction"}
            ],
            "total_qas": 3,
            "state": "unavailable"
        },
        "seg_02": {
            "video_name": "beta",
            "qas": []
        }
    })
}

// ---------------------------------------------------------------
// Identifier contiguity
// ---------------------------------------------------------------

#[test]
fn test_ids_stay_contiguous_across_mutations() {
    let tmp = TempDir::new().unwrap();
    let path = write_doc(tmp.path(), "cand.json", &segments_fixture());
    let mut store = RecordStore::open(&path, StoreOptions::default());

    store.delete_record("seg_01_qa_1").unwrap();
    assert_contiguous(&store, "seg_01");

    store.duplicate_record("seg_01_qa_0").unwrap();
    store.create_record("seg_01", &fields(json!({"question": "new"}))).unwrap();
    assert_contiguous(&store, "seg_01");
    assert_eq!(ids(&store, "seg_01").len(), 4);

    store.delete_record("seg_01_qa_0").unwrap();
    store.delete_record("seg_01_qa_2").unwrap();
    assert_contiguous(&store, "seg_01");
    assert_eq!(ids(&store, "seg_01").len(), 2);
}

#[test]
fn test_delete_then_add_reuses_freed_id() {
    let tmp = TempDir::new().unwrap();
    let path = write_doc(tmp.path(), "cand.json", &segments_fixture());
    let mut store = RecordStore::open(&path, StoreOptions::default());

    store.delete_record("seg_01_qa_2").unwrap();
    let id = store.create_record("seg_01", &fields(json!({"question": "again"}))).unwrap();
    assert_eq!(id.to_string(), "seg_01_qa_2");
}

#[test]
fn test_duplicate_gets_next_index_and_v2() {
    let tmp = TempDir::new().unwrap();
    let path = write_doc(tmp.path(), "cand.json", &segments_fixture());
    let mut store = RecordStore::open(&path, StoreOptions::default());

    let id = store.duplicate_record("seg_01_qa_0").unwrap();
    assert_eq!(id.to_string(), "seg_01_qa_3");

    let copy = store.get_record("seg_01_qa_3").unwrap();
    assert_eq!(copy.get_str("question"), Some("first"));
    assert_eq!(copy.version(), Some("v2"));
}

// ---------------------------------------------------------------
// Update guards
// ---------------------------------------------------------------

#[test]
fn test_update_never_changes_group_or_id() {
    let tmp = TempDir::new().unwrap();
    let path = write_doc(tmp.path(), "cand.json", &segments_fixture());
    let mut store = RecordStore::open(&path, StoreOptions::default());

    store
        .update_record(
            "seg_01_qa_1",
            &fields(json!({
                "qa_id": "seg_02_qa_9",
                "segment_id": "seg_02",
                "video_path": "/static/videos/x.mp4",
                "question": "edited"
            })),
        )
        .unwrap();

    let rec = store.get_record("seg_01_qa_1").unwrap();
    assert_eq!(rec.qa_id(), Some("seg_01_qa_1"));
    assert_eq!(rec.get_str("question"), Some("edited"));
    assert!(!rec.contains("segment_id"));
    assert!(!rec.contains("video_path"));
    assert!(store.document().group("seg_02").unwrap().records.is_empty());
}

#[test]
fn test_video_layout_protects_version() {
    let tmp = TempDir::new().unwrap();
    let path = write_doc(
        tmp.path(),
        "constructor.json",
        &json!({"alpha": [{"qa_id": "alpha_qa_0", "video_name": "alpha", "version": "v1", "question": "q"}]}),
    );
    let mut store = RecordStore::open(&path, StoreOptions::default());

    store
        .update_record("alpha_qa_0", &fields(json!({"version": "v9", "video_name": "beta", "question": "q2"})))
        .unwrap();
    let rec = store.get_record("alpha_qa_0").unwrap();
    assert_eq!(rec.version(), Some("v1"));
    assert_eq!(rec.video_name(), Some("alpha"));
    assert_eq!(rec.get_str("question"), Some("q2"));
}

#[test]
fn test_id_errors_are_results() {
    let tmp = TempDir::new().unwrap();
    let path = write_doc(tmp.path(), "cand.json", &segments_fixture());
    let mut store = RecordStore::open(&path, StoreOptions::default());
    let patch = fields(json!({"question": "x"}));

    assert!(matches!(store.update_record("garbage", &patch), Err(AnnotatorError::MalformedId(_))));
    assert!(matches!(store.update_record("nope_qa_0", &patch), Err(AnnotatorError::GroupNotFound(_))));
    assert!(matches!(
        store.update_record("seg_01_qa_7", &patch),
        Err(AnnotatorError::IndexOutOfRange { .. })
    ));
    assert!(matches!(
        store.create_record("seg_99", &patch),
        Err(AnnotatorError::GroupNotFound(_))
    ));
}

#[test]
fn test_group_name_containing_separator() {
    let tmp = TempDir::new().unwrap();
    let path = write_doc(
        tmp.path(),
        "cand.json",
        &json!({"take_qa_1": {"qas": [{"question": "a"}, {"question": "b"}]}}),
    );
    let mut store = RecordStore::open(&path, StoreOptions::default());

    store.delete_record("take_qa_1_qa_0").unwrap();
    assert_eq!(ids(&store, "take_qa_1"), vec!["take_qa_1_qa_0".to_string()]);
    assert_eq!(store.get_record("take_qa_1_qa_0").unwrap().get_str("question"), Some("b"));
}

// ---------------------------------------------------------------
// Segment bookkeeping
// ---------------------------------------------------------------

#[test]
fn test_segment_metadata_follows_mutations() {
    let tmp = TempDir::new().unwrap();
    let path = write_doc(tmp.path(), "cand.json", &segments_fixture());
    let mut store = RecordStore::open(&path, StoreOptions::default());

    store.delete_record("seg_01_qa_0").unwrap();
    let group = store.document().group("seg_01").unwrap();
    assert_eq!(group.meta.get("total_qas"), Some(&json!(2)));
    assert_ne!(group.meta_str("sync_time"), Some("2024-01-01T00:00:00Z"));
    assert!(group.meta_str("last_modify").is_some());

    store.set_group_state("seg_01", "done").unwrap();
    assert_eq!(store.list_groups()[0].state.as_deref(), Some("done"));
}

#[test]
fn test_created_segment_record_carries_segment_id() {
    let tmp = TempDir::new().unwrap();
    let path = write_doc(tmp.path(), "cand.json", &segments_fixture());
    let mut store = RecordStore::open(&path, StoreOptions::default());

    let id = store
        .create_record("seg_02", &fields(json!({"question": "q", "video_path": "/x.mp4"})))
        .unwrap();
    assert_eq!(id.to_string(), "seg_02_qa_0");

    let rec = store.get_record("seg_02_qa_0").unwrap();
    assert_eq!(rec.segment_id(), Some("seg_02"));
    assert!(!rec.contains("video_path"));
}

// ---------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------

#[test]
fn test_round_trip_is_stable_for_every_layout() {
    let tmp = TempDir::new().unwrap();
    let docs = [
        ("cand.json", segments_fixture()),
        (
            "quiz.json",
            json!([
                {"qa_id": "seg_01_qa_0", "segment_id": "seg_01", "video_name": "alpha", "human_answer": null},
                {"qa_id": "seg_02_qa_0", "segment_id": "seg_02", "video_name": "beta", "视角": ["cam1.mp4"]},
                {"qa_id": "seg_01_qa_1", "segment_id": "seg_01", "video_name": "alpha", "start_time": 12.5}
            ]),
        ),
        (
            "constructor.json",
            json!({"zeta": [{"qa_id": "zeta_qa_0", "主视角": ["c.mp4"]}], "alpha": []}),
        ),
    ];

    for (name, value) in docs.iter() {
        let path = write_doc(tmp.path(), name, value);
        let before = std::fs::read_to_string(&path).unwrap();

        let store = RecordStore::open(&path, StoreOptions::default());
        store.persist().unwrap();

        let after = std::fs::read_to_string(&path).unwrap();
        assert_eq!(before, after, "{} changed on round trip", name);
    }
}

#[test]
fn test_load_fails_soft() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("broken.json");
    std::fs::write(&path, "{ not json").unwrap();

    let store = RecordStore::open(&path, StoreOptions::default());
    assert!(store.list_groups().is_empty());
    assert_eq!(store.layout(), &Layout::Videos);

    let missing = RecordStore::open(tmp.path().join("missing.json"), StoreOptions::default());
    assert_eq!(missing.document().record_count(), 0);
}

#[test]
fn test_autosave_off_needs_explicit_persist() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("out/new.json");
    let mut store = RecordStore::open(
        &path,
        StoreOptions {
            autosave: false,
            ..Default::default()
        },
    );

    store.create_record("alpha", &fields(json!({"question": "q"}))).unwrap();
    assert!(!path.exists());

    store.persist().unwrap();
    let saved: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(saved["alpha"][0]["qa_id"], json!("alpha_qa_0"));
}

#[test]
fn test_persist_reports_failure() {
    let tmp = TempDir::new().unwrap();
    // A directory where the file should go makes the rename fail
    let path = tmp.path().join("taken");
    std::fs::create_dir_all(path.join("inner")).unwrap();

    let store = RecordStore::open(&path, StoreOptions::default());
    assert!(store.persist().is_err());
}

// ---------------------------------------------------------------
// Video layout template and listing
// ---------------------------------------------------------------

#[test]
fn test_video_layout_create_uses_template() {
    let tmp = TempDir::new().unwrap();
    let path = write_doc(
        tmp.path(),
        "constructor.json",
        &json!({"alpha": [{"qa_id": "alpha_qa_0", "start_time": "00:05.00", "end_time": "00:09.00"}]}),
    );
    let mut store = RecordStore::open(&path, StoreOptions::default());

    let id = store
        .create_record("alpha", &fields(json!({"question": "where?", "extra": 1})))
        .unwrap();
    let rec = store.get_record(&id.to_string()).unwrap();
    assert_eq!(rec.get_str("start_time"), Some("00:05.00"));
    assert_eq!(rec.get_str("end_time"), Some("00:09.00"));
    assert_eq!(rec.get("usable"), Some(&json!(false)));
    assert_eq!(rec.version(), Some("v2"));
    assert!(!rec.contains("extra"));

    let id = store.create_record("gamma", &fields(json!({}))).unwrap();
    assert_eq!(id.to_string(), "gamma_qa_0");
    let rec = store.get_record("gamma_qa_0").unwrap();
    assert_eq!(rec.get_str("start_time"), Some("00:00.00"));
}

#[test]
fn test_list_records_annotates_paths_and_times() {
    let tmp = TempDir::new().unwrap();
    let videos = tmp.path().join("videos");
    std::fs::create_dir_all(videos.join("beta")).unwrap();
    std::fs::write(videos.join("alpha.mp4"), b"v").unwrap();
    std::fs::write(videos.join("beta/cam1.mp4"), b"v").unwrap();
    let locator = VideoLocator::new(&videos);

    let path = write_doc(
        tmp.path(),
        "quiz.json",
        &json!([
            {"video_name": "alpha", "start_time": "75", "end_time": "01:20.50"},
            {"video_name": "beta", "视角": ["cam1.mp4"], "cut_point": ""}
        ]),
    );
    let store = RecordStore::open(&path, StoreOptions::default());

    let alpha = store.list_records("alpha", &locator);
    assert_eq!(alpha.len(), 1);
    assert_eq!(alpha[0].qa_id(), Some("alpha_qa_0"));
    assert_eq!(alpha[0].get_str("start_time"), Some("01:15"));
    assert_eq!(alpha[0].get_str("end_time"), Some("01:20"));
    assert!(alpha[0].get_str("video_path").unwrap().ends_with("alpha.mp4"));

    let beta = store.list_records("beta", &locator);
    assert!(beta[0].get_str("video_path").unwrap().ends_with("beta/cam1.mp4"));
    assert_eq!(beta[0].get_str("cut_point"), Some("00:00"));

    assert!(store.list_records("unknown", &locator).is_empty());
}

// ---------------------------------------------------------------
// Quiz helpers and statistics
// ---------------------------------------------------------------

#[test]
fn test_quiz_helpers() {
    let tmp = TempDir::new().unwrap();
    let path = write_doc(
        tmp.path(),
        "quiz.json",
        &json!([
            {"qa_id": "s_qa_0", "segment_id": "s", "question_type": "Direction", "human_answer": null},
            {"qa_id": "s_qa_1", "segment_id": "s", "question_type": "Order", "version": "v2"}
        ]),
    );
    let mut store = RecordStore::open(&path, StoreOptions::default());

    store.set_human_answer("s_qa_0", "B").unwrap();
    assert!(!store.toggle_usable("s_qa_1", Some("blurry")).unwrap());
    assert_eq!(store.get_record("s_qa_1").unwrap().get_str("useless_reason"), Some("blurry"));
    assert!(store.toggle_usable("s_qa_1", None).unwrap());
    assert_eq!(store.get_record("s_qa_1").unwrap().get("useless_reason"), Some(&Value::Null));

    store.set_difficulty("s_qa_0", "Medium").unwrap();
    assert!(matches!(
        store.set_difficulty("s_qa_0", "Hard"),
        Err(AnnotatorError::InvalidValue(_))
    ));

    let stats = store.statistics();
    assert_eq!(stats.total_groups, 1);
    assert_eq!(stats.total_records, 2);
    assert_eq!(stats.question_types.get("Direction"), Some(&1));
    assert_eq!(stats.v2_records, 1);
    assert_eq!(stats.answered, 1);
    assert_eq!(stats.usable, 2);

    let saved: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(saved[0]["human_answer"], json!("B"));
    assert_eq!(saved[0]["difficulty"], json!("Medium"));
}

#[test]
fn test_video_info_for_group() {
    let tmp = TempDir::new().unwrap();
    let videos = tmp.path().join("videos");
    std::fs::create_dir_all(videos.join("alpha")).unwrap();
    std::fs::write(videos.join("alpha/cam1.mp4"), b"v").unwrap();
    std::fs::write(videos.join("alpha/cam2.mp4"), b"v").unwrap();
    let locator = VideoLocator::new(&videos);

    let path = write_doc(tmp.path(), "cand.json", &json!({"seg": {"video_name": "alpha", "qas": [{"视角": ["cam2.mp4"]}]}}));
    let store = RecordStore::open(&path, StoreOptions::default());

    let info = store.video_info("seg", &locator).unwrap();
    assert_eq!(info.video_name, "alpha");
    assert_eq!(info.kind, Some(crate::video::VideoKind::Multi));
    assert_eq!(info.available_perspectives.len(), 2);
    assert_eq!(info.current_perspective.as_deref(), Some("cam2.mp4"));
    assert!(info.video_path.unwrap().ends_with("alpha/cam2.mp4"));

    assert!(store.video_info("missing", &locator).is_none());
}

#[test]
fn test_video_groups_listed_by_name() {
    let tmp = TempDir::new().unwrap();
    let path = write_doc(tmp.path(), "c.json", &json!({"zeta": [{}], "alpha": [{}, {}]}));
    let store = RecordStore::open(&path, StoreOptions::default());

    let groups = store.list_groups();
    assert_eq!(groups[0].name, "alpha");
    assert_eq!(groups[0].record_count, 2);
    assert_eq!(groups[1].name, "zeta");
}
