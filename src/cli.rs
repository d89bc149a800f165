// SpatialBench CLI binary

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;

use spatialbench_lib::config::AppConfig;
use spatialbench_lib::download::{scan_qa_files, BatchDownloader, BatchOutcome, HubFetcher, Ledger, VideoCatalog};
use spatialbench_lib::error::AnnotatorError;
use spatialbench_lib::records::convert::{
    flat_to_videos, load_selection, mark_reviewed, merge_reviewed, reviewed_only, segments_to_flat,
};
use spatialbench_lib::records::{Document, Layout, RecordStore, StoreOptions};
use spatialbench_lib::video::VideoLocator;

#[derive(Parser)]
#[command(name = "spatialbench")]
#[command(about = "SpatialBench - QA annotation and video download tool", long_about = None)]
#[command(version)]
struct Cli {
    /// QA document to operate on
    #[arg(long, global = true, env = "QA_FILE_PATH")]
    file: Option<PathBuf>,

    /// Base directory of local videos
    #[arg(long, global = true, env = "VIDEO_DIR")]
    video_dir: Option<PathBuf>,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, global = true, env = "LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List groups (segments or videos) in the document
    Groups,

    /// List the records of one group
    Records {
        /// Group name
        group: String,
    },

    /// Show one record
    Show {
        /// Record id ({group}_qa_{index})
        id: String,
    },

    /// Create a record in a group
    Add {
        /// Group name
        group: String,
        /// Record fields as a JSON object
        #[arg(long)]
        json: String,
    },

    /// Merge fields into a record
    Update {
        /// Record id
        id: String,
        /// Fields as a JSON object
        #[arg(long)]
        json: String,
    },

    /// Delete a record (later records in the group are renumbered)
    Delete {
        /// Record id
        id: String,
    },

    /// Append a copy of a record to its group
    Duplicate {
        /// Record id
        id: String,
    },

    /// Set a segment's review state
    State {
        /// Segment name
        group: String,
        /// New state
        state: String,
    },

    /// Record an annotator's answer
    Answer {
        /// Record id
        id: String,
        /// Answer text
        answer: String,
    },

    /// Flip a record's usable flag
    Usable {
        /// Record id
        id: String,
        /// Reason stored when marking the record unusable
        #[arg(long)]
        reason: Option<String>,
    },

    /// Set a record's difficulty (Simple, Medium, Difficulty)
    Difficulty {
        /// Record id
        id: String,
        /// Difficulty level
        level: String,
    },

    /// Show document statistics
    Stats,

    /// Show the video behind a group
    VideoInfo {
        /// Group name
        group: String,
    },

    /// List local videos
    Videos,

    /// Resolve a video name to a local file
    Resolve {
        /// Video name
        name: String,
        /// Perspective (camera) for multi-perspective videos
        perspective: Option<String>,
    },

    /// Convert a document between layouts
    Convert {
        #[command(subcommand)]
        target: ConvertTarget,
    },

    /// Mark records reviewed from a selection file
    MergeReviewed {
        /// Selection file (array of ids or {"selectedQAs": [...]})
        selection: PathBuf,
        /// Input document
        input: PathBuf,
        /// Output document
        output: PathBuf,
        /// Also write a document holding only the selected records
        reviewed_only: Option<PathBuf>,
    },

    /// Replace records with their reviewed copies
    MergeFull {
        /// Reviewed document
        reviewed: PathBuf,
        /// Input document
        input: PathBuf,
        /// Output document
        output: PathBuf,
    },

    /// Download referenced source videos
    Fetch {
        #[command(subcommand)]
        action: FetchAction,
        /// Skip the confirmation prompt
        #[arg(long, global = true)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum ConvertTarget {
    /// Candidate segments to a flat quiz list
    ToFlat {
        input: PathBuf,
        output: Option<PathBuf>,
    },
    /// Flat quiz list to a video-grouped mapping
    ToVideos {
        input: PathBuf,
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum FetchAction {
    /// Scan local videos and rewrite the ledger
    Status,
    /// Download the rows picked in the ledger
    Selected,
    /// Download every referenced video not present locally
    Missing,
    /// Retry the rows marked as failed
    Failed,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::from_env();
    if let Some(file) = cli.file {
        config.qa_file_path = file;
    }
    if let Some(dir) = cli.video_dir {
        config.video_dir = dir;
    }
    if let Some(level) = cli.log_level {
        config.log_level = level.to_lowercase();
    }
    init_logging(&config.log_level);

    match cli.command {
        Commands::Groups => cmd_groups(&config),
        Commands::Records { group } => cmd_records(&config, &group),
        Commands::Show { id } => cmd_show(&config, &id),
        Commands::Add { group, json } => cmd_add(&config, &group, &json),
        Commands::Update { id, json } => cmd_update(&config, &id, &json),
        Commands::Delete { id } => cmd_delete(&config, &id),
        Commands::Duplicate { id } => cmd_duplicate(&config, &id),
        Commands::State { group, state } => cmd_state(&config, &group, &state),
        Commands::Answer { id, answer } => cmd_answer(&config, &id, &answer),
        Commands::Usable { id, reason } => cmd_usable(&config, &id, reason.as_deref()),
        Commands::Difficulty { id, level } => cmd_difficulty(&config, &id, &level),
        Commands::Stats => cmd_stats(&config),
        Commands::VideoInfo { group } => cmd_video_info(&config, &group),
        Commands::Videos => cmd_videos(&config),
        Commands::Resolve { name, perspective } => cmd_resolve(&config, &name, perspective.as_deref()),
        Commands::Convert { target } => cmd_convert(target),
        Commands::MergeReviewed { selection, input, output, reviewed_only: only } => {
            cmd_merge_reviewed(&selection, &input, &output, only.as_deref())
        }
        Commands::MergeFull { reviewed, input, output } => cmd_merge_full(&reviewed, &input, &output),
        Commands::Fetch { action, yes } => cmd_fetch(&config, action, yes),
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn open_store(config: &AppConfig) -> RecordStore {
    RecordStore::open(&config.qa_file_path, StoreOptions::default())
}

fn locator(config: &AppConfig) -> VideoLocator {
    VideoLocator::new(&config.video_dir).with_strict(config.strict_video_layout)
}

fn parse_fields(json: &str) -> Result<Map<String, Value>> {
    serde_json::from_str(json).context("--json must be a JSON object")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_groups(config: &AppConfig) -> Result<()> {
    let store = open_store(config);
    let groups = store.list_groups();

    println!("{} ({} layout, {} groups)", store.path().display(), store.layout().name(), groups.len());
    println!();

    if groups.is_empty() {
        println!("No groups found.");
        return Ok(());
    }

    println!("{:>7}  {:<12}  {:<20}  {}", "Records", "State", "Last modified", "Name");
    println!("{}", "-".repeat(70));
    for group in &groups {
        println!(
            "{:>7}  {:<12}  {:<20}  {}",
            group.record_count,
            group.state.as_deref().unwrap_or("-"),
            group.last_modify.as_deref().unwrap_or("-"),
            group.name
        );
    }

    Ok(())
}

fn cmd_records(config: &AppConfig, group: &str) -> Result<()> {
    let store = open_store(config);
    if store.document().group(group).is_none() {
        anyhow::bail!("Group not found: {}", group);
    }
    let records = store.list_records(group, &locator(config));
    print_json(&records)
}

fn cmd_show(config: &AppConfig, id: &str) -> Result<()> {
    let store = open_store(config);
    let record = store.get_record(id)?;
    print_json(&record)
}

fn cmd_add(config: &AppConfig, group: &str, json: &str) -> Result<()> {
    let fields = parse_fields(json)?;
    let mut store = open_store(config);
    let id = store.create_record(group, &fields)?;
    println!("Created {}", id);
    Ok(())
}

fn cmd_update(config: &AppConfig, id: &str, json: &str) -> Result<()> {
    let fields = parse_fields(json)?;
    let mut store = open_store(config);
    store.update_record(id, &fields)?;
    println!("Updated {}", id);
    Ok(())
}

fn cmd_delete(config: &AppConfig, id: &str) -> Result<()> {
    let mut store = open_store(config);
    store.delete_record(id)?;
    println!("Deleted {}", id);
    Ok(())
}

fn cmd_duplicate(config: &AppConfig, id: &str) -> Result<()> {
    let mut store = open_store(config);
    let new_id = store.duplicate_record(id)?;
    println!("Duplicated {} as {}", id, new_id);
    Ok(())
}

fn cmd_state(config: &AppConfig, group: &str, state: &str) -> Result<()> {
    let mut store = open_store(config);
    store.set_group_state(group, state)?;
    println!("{} is now '{}'", group, state);
    Ok(())
}

fn cmd_answer(config: &AppConfig, id: &str, answer: &str) -> Result<()> {
    let mut store = open_store(config);
    store.set_human_answer(id, answer)?;
    println!("Answer saved for {}", id);
    Ok(())
}

fn cmd_usable(config: &AppConfig, id: &str, reason: Option<&str>) -> Result<()> {
    let mut store = open_store(config);
    let usable = store.toggle_usable(id, reason)?;
    println!("{} marked {}", id, if usable { "usable" } else { "unusable" });
    Ok(())
}

fn cmd_difficulty(config: &AppConfig, id: &str, level: &str) -> Result<()> {
    let mut store = open_store(config);
    store.set_difficulty(id, level)?;
    println!("{} difficulty set to {}", id, level);
    Ok(())
}

fn cmd_stats(config: &AppConfig) -> Result<()> {
    let store = open_store(config);
    let stats = store.statistics();

    println!("Document: {}", store.path().display());
    println!("  Groups:    {}", stats.total_groups);
    println!("  Records:   {}", stats.total_records);
    println!("  Edited:    {}", stats.v2_records);
    println!("  Answered:  {}", stats.answered);
    println!("  Usable:    {}", stats.usable);

    if !stats.question_types.is_empty() {
        println!();
        println!("Question types:");
        for (kind, count) in &stats.question_types {
            println!("  {:>5}  {}", count, kind);
        }
    }

    Ok(())
}

fn cmd_video_info(config: &AppConfig, group: &str) -> Result<()> {
    let store = open_store(config);
    let info = store
        .video_info(group, &locator(config))
        .ok_or_else(|| anyhow::anyhow!("No video referenced by group {}", group))?;
    print_json(&info)
}

fn cmd_videos(config: &AppConfig) -> Result<()> {
    let locator = locator(config);
    let videos = locator.list_all();

    println!("Videos in {} ({} found)", locator.base_dir().display(), videos.len());
    println!();

    if videos.is_empty() {
        return Ok(());
    }

    println!("{:<8}  {:>5}  {:<40}  {}", "Type", "Files", "Name", "Perspectives");
    println!("{}", "-".repeat(80));
    for video in &videos {
        println!(
            "{:<8}  {:>5}  {:<40}  {}",
            video.kind.as_str(),
            video.files.len(),
            video.name,
            video.perspectives.join(", ")
        );
    }

    Ok(())
}

fn cmd_resolve(config: &AppConfig, name: &str, perspective: Option<&str>) -> Result<()> {
    let locator = locator(config);
    let resolved = locator
        .resolve(name, perspective)
        .ok_or_else(|| anyhow::anyhow!("Video not found: {}", name))?;

    println!("Path:     {}", resolved.path.display());
    if let Some(web) = locator.web_path(name, perspective) {
        println!("Web path: {}", web);
    }
    if resolved.fell_back {
        println!("Note: perspective not found, using the first available file");
    }
    Ok(())
}

fn default_output(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{}_{}.json", stem, suffix))
}

fn cmd_convert(target: ConvertTarget) -> Result<()> {
    let (input, output, converted) = match target {
        ConvertTarget::ToFlat { input, output } => {
            let doc = Document::read(&input, &Layout::Segments)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let output = output.unwrap_or_else(|| default_output(&input, "quiz"));
            (input, output, segments_to_flat(&doc)?)
        }
        ConvertTarget::ToVideos { input, output } => {
            let doc = Document::read(&input, &Layout::flat_by_video())
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let output = output.unwrap_or_else(|| default_output(&input, "video_format"));
            (input, output, flat_to_videos(&doc)?)
        }
    };

    converted.write(&output)?;
    println!(
        "Converted {} -> {} ({} groups, {} records)",
        input.display(),
        output.display(),
        converted.groups().len(),
        converted.record_count()
    );
    Ok(())
}

fn cmd_merge_reviewed(selection: &Path, input: &Path, output: &Path, only_output: Option<&Path>) -> Result<()> {
    let selected = load_selection(selection)
        .with_context(|| format!("Failed to read selection {}", selection.display()))?;
    let mut doc = Document::read(input, &Layout::flat_by_video())?;

    if let Some(path) = only_output {
        let (only, count) = reviewed_only(&doc, &selected)?;
        only.write(path)?;
        println!("Exported {} reviewed records -> {}", count, path.display());
    }

    let counts = mark_reviewed(&mut doc, &selected);
    doc.write(output)?;

    println!(
        "Marked {} of {} records reviewed -> {}",
        counts.reviewed,
        counts.processed,
        output.display()
    );
    Ok(())
}

fn cmd_merge_full(reviewed: &Path, input: &Path, output: &Path) -> Result<()> {
    let reviewed_doc = Document::read(reviewed, &Layout::flat_by_video())?;
    let mut doc = Document::read(input, &Layout::flat_by_video())?;

    let count = merge_reviewed(&mut doc, &reviewed_doc);
    doc.write(output)?;

    println!("Replaced {} records with reviewed copies -> {}", count, output.display());
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let answer = line.trim().to_lowercase();
    Ok(answer == "y" || answer == "yes")
}

fn cmd_fetch(config: &AppConfig, action: FetchAction, yes: bool) -> Result<()> {
    let names = scan_qa_files(&config.data_dir, &config.qa_file_pattern)
        .with_context(|| format!("Failed to scan {}", config.data_dir.display()))?;
    let catalog = VideoCatalog::load_or_default(config.catalog_path.as_deref());
    let fetcher = HubFetcher::new(config.hub.clone())?;
    let ledger = Ledger::load(&config.ledger_path)?;
    let ledger_missing = !ledger.exists();

    let mut downloader = BatchDownloader::new(&config.video_dir, catalog, fetcher, ledger);

    // Batch runs only record outcomes into an existing ledger
    if ledger_missing || matches!(action, FetchAction::Status) {
        let stats = downloader.statistics(&names)?;
        println!("Referenced videos: {}", stats.total);
        println!("  Present:  {}", stats.present);
        println!("  Missing:  {}", stats.missing);
        println!("  Failed:   {}", stats.failed);
        println!("  Presence: {:.1}%", stats.presence_rate);
        println!("Ledger written to {}", config.ledger_path.display());
    }

    let targets = match action {
        FetchAction::Status => return Ok(()),
        FetchAction::Selected => downloader.ledger().selected(),
        FetchAction::Missing => downloader.missing(&names),
        FetchAction::Failed => downloader.ledger().failed(),
    };

    if targets.is_empty() {
        println!("Nothing to download.");
        return Ok(());
    }

    println!();
    println!("About to download {} videos:", targets.len());
    for (kind, count) in downloader.catalog().count_kinds(&targets) {
        println!("  {:<12} {}", kind.as_str(), count);
    }
    if !yes && !confirm("Continue?")? {
        println!("Cancelled.");
        return Ok(());
    }

    // Installed only now so Ctrl-C at the prompt still exits normally
    let cancel = downloader.arm_cancel();
    ctrlc::set_handler(move || {
        log::warn!("Interrupt received, stopping after the current chunk");
        cancel.store(true, Ordering::SeqCst);
    })?;

    let result = match action {
        FetchAction::Selected => downloader.download_selected(),
        FetchAction::Missing => downloader.download_missing(&names),
        FetchAction::Failed => downloader.download_failed(),
        FetchAction::Status => return Ok(()),
    };

    match result {
        Ok(outcome) => {
            print_outcome(&outcome);
            Ok(())
        }
        Err(AnnotatorError::Interrupted) => {
            anyhow::bail!("Download interrupted; progress so far is in {}", config.ledger_path.display())
        }
        Err(e) => Err(e.into()),
    }
}

fn print_outcome(outcome: &BatchOutcome) {
    println!();
    println!("Download complete:");
    println!("  Succeeded:       {}", outcome.success.len());
    println!("  Already present: {}", outcome.skipped.len());
    println!("  Failed:          {}", outcome.failed.len());

    if !outcome.failed.is_empty() {
        println!();
        println!("Failed videos:");
        for name in &outcome.failed {
            println!("  {}", name);
        }
    }
}
