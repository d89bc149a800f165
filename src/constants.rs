// SpatialBench Constants
// Fixed values shared by the record store, video locator and downloader.

// ----- Record identifiers -----

/// Separator between the owning group and the record index: `{group}_qa_{index}`
pub const QA_ID_SEPARATOR: &str = "_qa_";

// ----- Record field names -----

pub const FIELD_QA_ID: &str = "qa_id";
pub const FIELD_SEGMENT_ID: &str = "segment_id";
pub const FIELD_VIDEO_NAME: &str = "video_name";
pub const FIELD_VIDEO_SOURCE: &str = "video_source";
pub const FIELD_VIDEO_PATH: &str = "video_path";
pub const FIELD_QUESTION: &str = "question";
pub const FIELD_QUESTION_TYPE: &str = "question_type";
pub const FIELD_LEGACY_QUESTION_TYPE: &str = "Question Type";
pub const FIELD_OPTIONS: &str = "options";
pub const FIELD_ANSWER: &str = "answer";
pub const FIELD_GROUND_TRUTH: &str = "ground_truth";
pub const FIELD_HUMAN_ANSWER: &str = "human_answer";
pub const FIELD_TEMPORAL_DIRECTION: &str = "temporal_direction";
pub const FIELD_START_TIME: &str = "start_time";
pub const FIELD_END_TIME: &str = "end_time";
pub const FIELD_CUT_POINT: &str = "cut_point";
pub const FIELD_PERSPECTIVES: &str = "视角";
pub const FIELD_MAIN_PERSPECTIVES: &str = "主视角";
pub const FIELD_ASK_PERSPECTIVES: &str = "提问视角";
pub const FIELD_ASK_PERSPECTIVES_TIME: &str = "提问视角_time";
pub const FIELD_USABLE: &str = "usable";
pub const FIELD_USELESS_REASON: &str = "useless_reason";
pub const FIELD_DIFFICULTY: &str = "difficulty";
pub const FIELD_VERSION: &str = "version";
pub const FIELD_REVIEWED: &str = "reviewed";

/// Fields computed for display and never written back to disk
pub const DERIVED_FIELDS: [&str; 1] = [FIELD_VIDEO_PATH];

/// Fields the video-grouped workflow never lets an update touch
pub const VIDEO_LAYOUT_IMMUTABLE_FIELDS: [&str; 3] = [FIELD_VIDEO_NAME, FIELD_QA_ID, FIELD_VERSION];

// ----- Segment (group) field names -----

pub const SEGMENT_RECORDS_KEY: &str = "qas";
pub const SEGMENT_LEGACY_RECORDS_KEY: &str = "QAs";
pub const SEGMENT_STATE: &str = "state";
pub const SEGMENT_LAST_MODIFY: &str = "last_modify";
pub const SEGMENT_SYNC_TIME: &str = "sync_time";
pub const SEGMENT_TOTAL_QAS: &str = "total_qas";

pub const LAST_MODIFY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ----- Versions and levels -----

/// Version tag given to records created or duplicated by an annotator
pub const EDITED_VERSION: &str = "v2";
pub const DEFAULT_TIME: &str = "00:00.00";
pub const DIFFICULTY_LEVELS: [&str; 3] = ["Simple", "Medium", "Difficulty"];

// ----- Video files -----

/// Recognized video extensions (lowercase, no dot)
pub const VIDEO_EXTENSIONS: [&str; 7] = ["mp4", "avi", "mov", "mkv", "wmv", "flv", "webm"];

// ----- Downloader -----

pub const STAGING_DIR_NAME: &str = ".temp_download";
pub const SINGLE_FILE_EXTENSION: &str = "mp4";
pub const ARCHIVE_EXTENSION: &str = "zip";

/// Entries removed from a target directory after a download
pub const CACHE_ARTIFACT_NAMES: [&str; 5] = [".cache", ".git", "__pycache__", ".DS_Store", "Thumbs.db"];
/// Entry names that never count towards a complete archive download
pub const IGNORED_ENTRY_NAMES: [&str; 2] = ["__pycache__", "Thumbs.db"];
pub const TEMP_SUFFIXES: [&str; 3] = [".tmp", ".temp", ".lock"];
/// Hidden entries with these suffixes survive cleanup
pub const KEEP_HIDDEN_SUFFIXES: [&str; 4] = [".mp4", ".avi", ".mov", ".mkv"];

pub const DOWNLOAD_CHUNK_SIZE: usize = 1_048_576; // 1MB

// ----- Download ledger -----

pub const LEDGER_HEADER: [&str; 3] = ["video_name", "status", "pick_now"];
pub const LEDGER_SUCCESS: &str = "✓";
pub const LEDGER_ERROR: &str = "error";
/// Error marker written by earlier versions of the downloader
pub const LEDGER_LEGACY_ERROR: &str = "下载异常";
pub const PICK_TOKENS: [&str; 5] = ["x", "1", "true", "yes", "✓"];

// ----- Temp files -----

pub const TEMP_FILE_PREFIX: &str = ".sbtmp_";
