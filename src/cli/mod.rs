//! # CLI Module
//!
//! Command-line front-end over the grouping engine.
//!
//! ## Usage
//! ```bash
//! # Load precomputed features (JSON array or one record per line)
//! photo-dedup import features.jsonl
//!
//! # Group and persist, or just preview
//! photo-dedup group
//! photo-dedup group --dry-run --preset accurate
//!
//! # Promote strictly matching duplicates
//! photo-dedup escalate
//!
//! # Query the index
//! photo-dedup search --file 42
//! photo-dedup search --hash ff00ff00ff00ff00 --kind phash --max-distance 10
//!
//! # Manual originals
//! photo-dedup override set 3 17 --reason "sharper"
//! photo-dedup override clear 3
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use photo_dedup_engine::config::{DedupConfig, PerformancePreset};
use photo_dedup_engine::core::escalation::{EscalationStats, SafeDuplicateEscalation};
use photo_dedup_engine::core::grouping::{DuplicateGroup, GroupSummary, GroupingEngine};
use photo_dedup_engine::core::index::{HashKind, NearDuplicateMatch, NearDuplicateSearchIndex};
use photo_dedup_engine::core::overrides::{ManualOverride, OverrideStore};
use photo_dedup_engine::core::records::{FileFormat, FileRecord};
use photo_dedup_engine::core::store::{FeatureStore, GroupStore, SqliteStore};
use photo_dedup_engine::error::{DedupError, Result, StoreError};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Photo Dedup - group duplicate photos from precomputed fingerprints
#[derive(Parser, Debug)]
#[command(name = "photo-dedup")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Database path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Performance preset (ultra-lite, balanced, accurate)
    #[arg(long, global = true)]
    preset: Option<String>,

    /// Output format
    #[arg(short, long, global = true, default_value = "pretty")]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load file records into the database
    Import {
        /// JSON array or JSON-lines file of records
        file: PathBuf,
    },

    /// Build duplicate groups
    Group {
        /// Show the groups without replacing the stored ones
        #[arg(long)]
        dry_run: bool,

        /// List every group, not just the summary
        #[arg(short, long)]
        verbose: bool,
    },

    /// Promote duplicates that match their original on size, time and camera
    Escalate,

    /// Find near duplicates of a stored file or a raw hash
    Search {
        /// Stored file id
        #[arg(long, conflicts_with = "hash")]
        file: Option<i64>,

        /// Hex hash value
        #[arg(long, requires = "kind")]
        hash: Option<String>,

        /// Hash kind for --hash
        #[arg(long)]
        kind: Option<Kind>,

        /// Maximum Hamming distance (defaults to the preset's)
        #[arg(long)]
        max_distance: Option<u32>,
    },

    /// Manage manual original choices
    Override {
        #[command(subcommand)]
        action: OverrideAction,
    },

    /// Show stored groups and role counts
    Status,
}

#[derive(Subcommand, Debug)]
enum OverrideAction {
    /// Make FILE the original of GROUP
    Set {
        group: i64,
        file: i64,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Drop the override for GROUP
    Clear { group: i64 },
    /// List active overrides
    List,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Kind {
    Phash,
    Dhash,
    Whash,
}

impl From<Kind> for HashKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Phash => HashKind::Perceptual,
            Kind::Dhash => HashKind::Difference,
            Kind::Whash => HashKind::Wavelet,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable output with colors
    Pretty,
    /// JSON output for scripting
    Json,
    /// Minimal output (duplicate paths or ids only)
    Minimal,
}

/// Everything a command needs
struct Context {
    store: Arc<SqliteStore>,
    config: DedupConfig,
    output: OutputFormat,
    term: Term,
}

/// Run the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => DedupConfig::load(path)?,
        None => DedupConfig::default(),
    };
    if let Some(preset) = &cli.preset {
        if PerformancePreset::from_name(preset).is_none() {
            warn!(preset = %preset, "Unknown performance preset, using Balanced");
        }
        config = config.with_preset(PerformancePreset::resolve(preset));
    }

    let db_path = cli.db.clone().unwrap_or_else(default_db_path);
    let context = Context {
        store: Arc::new(SqliteStore::open(&db_path)?),
        config,
        output: cli.output,
        term: Term::stderr(),
    };

    match cli.command {
        Commands::Import { file } => run_import(&context, &file),
        Commands::Group { dry_run, verbose } => run_group(&context, dry_run, verbose),
        Commands::Escalate => run_escalate(&context),
        Commands::Search {
            file,
            hash,
            kind,
            max_distance,
        } => run_search(&context, file, hash, kind, max_distance),
        Commands::Override { action } => run_override(&context, action),
        Commands::Status => run_status(&context),
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::cache_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("photo-dedup")
        .join("photos.db")
}

fn run_import(context: &Context, file: &Path) -> Result<()> {
    let contents = std::fs::read_to_string(file)
        .map_err(|e| DedupError::Import(format!("{}: {}", file.display(), e)))?;
    let mut records = parse_records(&contents)
        .map_err(|reason| DedupError::Import(format!("{}: {}", file.display(), reason)))?;

    for record in &mut records {
        if record.format == FileFormat::Other {
            if let Some(extension) = Path::new(&record.path).extension() {
                record.format = FileFormat::from_extension(&extension.to_string_lossy());
            }
        }
    }

    context.store.upsert_records(&records)?;

    match context.output {
        OutputFormat::Pretty => {
            context
                .term
                .write_line(&format!(
                    "{} Imported {} records into {}",
                    style("✓").green().bold(),
                    style(records.len()).cyan(),
                    style(context.store.path().display()).dim()
                ))
                .ok();
        }
        OutputFormat::Json => print_json(&serde_json::json!({ "imported": records.len() }))?,
        OutputFormat::Minimal => println!("{}", records.len()),
    }
    Ok(())
}

/// Accepts a JSON array or newline-delimited records
fn parse_records(contents: &str) -> std::result::Result<Vec<FileRecord>, String> {
    if contents.trim_start().starts_with('[') {
        return serde_json::from_str(contents).map_err(|e| e.to_string());
    }

    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| serde_json::from_str(line).map_err(|e| format!("line {}: {}", n + 1, e)))
        .collect()
}

fn run_group(context: &Context, dry_run: bool, verbose: bool) -> Result<()> {
    let engine = GroupingEngine::new(context.config.clone(), context.store.clone());
    let spinner = spinner(context, "Grouping files...");

    let (groups, stats) = engine.process_all_files()?;
    if !dry_run {
        if let Some(pb) = &spinner {
            pb.set_message("Storing groups...");
        }
        engine.store_groups(&groups)?;
    }
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    let summary = engine.get_group_summary(&groups);
    match context.output {
        OutputFormat::Pretty => {
            let paths = path_lookup(context)?;
            let term = &context.term;
            term.write_line(&format!(
                "{} Grouping complete ({} preset{})",
                style("✓").green().bold(),
                context.config.preset(),
                if dry_run { ", dry run" } else { "" }
            ))
            .ok();
            term.write_line(&format!(
                "  {} files in {:.1}s",
                style(stats.files_processed).cyan(),
                stats.processing_time_ms as f64 / 1000.0
            ))
            .ok();
            print_summary(term, &summary);
            if stats.override_conflicts > 0 {
                term.write_line(&format!(
                    "  {} overrides no longer matched their group and were removed",
                    style(stats.override_conflicts).yellow()
                ))
                .ok();
            }
            if verbose {
                term.write_line("").ok();
                for group in &groups {
                    print_group(term, group, &paths);
                }
            }
        }
        OutputFormat::Json => print_json(&serde_json::json!({
            "dry_run": dry_run,
            "stats": stats,
            "summary": summary,
            "groups": groups,
        }))?,
        OutputFormat::Minimal => {
            let paths = path_lookup(context)?;
            for group in &groups {
                for id in &group.duplicate_ids {
                    println!("{}", display_file(*id, &paths));
                }
            }
        }
    }
    Ok(())
}

fn run_escalate(context: &Context) -> Result<()> {
    let escalation =
        SafeDuplicateEscalation::new(context.config.escalation.clone(), context.store.clone());
    let spinner = spinner(context, "Checking duplicates...");
    let (results, stats) = escalation.process_all_groups()?;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    match context.output {
        OutputFormat::Pretty => print_escalation(&context.term, &stats),
        OutputFormat::Json => print_json(&serde_json::json!({
            "stats": stats,
            "results": results,
        }))?,
        OutputFormat::Minimal => {
            for result in results.iter().filter(|r| r.escalated) {
                println!("{}\t{}", result.group_id, result.duplicate_id);
            }
        }
    }
    Ok(())
}

fn run_search(
    context: &Context,
    file: Option<i64>,
    hash: Option<String>,
    kind: Option<Kind>,
    max_distance: Option<u32>,
) -> Result<()> {
    let mut index = NearDuplicateSearchIndex::new(&context.config);
    index.build_index(context.store.as_ref())?;

    let matches: Vec<NearDuplicateMatch> = match (file, hash, kind) {
        (Some(file_id), _, _) => index.find_near_duplicates(file_id, max_distance),
        (None, Some(hash), Some(kind)) => {
            index.find_similar_by_hash(&hash, kind.into(), max_distance)
        }
        _ => {
            context
                .term
                .write_line(&format!(
                    "{} Pass --file ID or --hash HEX --kind KIND",
                    style("!").yellow().bold()
                ))
                .ok();
            return Ok(());
        }
    };

    match context.output {
        OutputFormat::Pretty => {
            let term = &context.term;
            term.write_line(&format!("{}", style(index.stats()).dim())).ok();
            if matches.is_empty() {
                term.write_line("  No similar files found").ok();
            }
            for m in &matches {
                let kinds: Vec<String> = m
                    .distances
                    .iter()
                    .map(|(kind, distance)| format!("{} {}", kind, distance))
                    .collect();
                term.write_line(&format!(
                    "  {} {} ({}, {:.0}% similar)",
                    style(format!("#{}", m.file_id)).bold(),
                    m.file_path,
                    kinds.join(", "),
                    m.similarity_score * 100.0
                ))
                .ok();
            }
        }
        OutputFormat::Json => print_json(&matches)?,
        OutputFormat::Minimal => {
            for m in &matches {
                println!("{}", m.file_path);
            }
        }
    }
    Ok(())
}

fn run_override(context: &Context, action: OverrideAction) -> Result<()> {
    let store = &context.store;
    match action {
        OverrideAction::Set {
            group,
            file,
            reason,
        } => {
            let stored = store
                .load_groups()?
                .into_iter()
                .find(|g| g.id == group)
                .ok_or(StoreError::GroupNotFound { group_id: group })?;
            if !stored.contains(file) {
                return Err(StoreError::MemberNotFound {
                    group_id: group,
                    file_id: file,
                }
                .into());
            }

            let mut manual = ManualOverride::new(group, file, Some(stored.original_id));
            if let Some(reason) = reason {
                manual = manual.with_reason(reason);
            }
            let id = store.record_override(&manual)?;

            match context.output {
                OutputFormat::Json => print_json(&serde_json::json!({ "override_id": id }))?,
                _ => {
                    context
                        .term
                        .write_line(&format!(
                            "{} File {} will be the original of group {} on the next grouping pass",
                            style("✓").green().bold(),
                            file,
                            group
                        ))
                        .ok();
                }
            }
        }
        OverrideAction::Clear { group } => {
            let removed = store.remove_override(group)?;
            match context.output {
                OutputFormat::Json => print_json(&serde_json::json!({ "removed": removed }))?,
                _ => {
                    let message = if removed {
                        format!("Override for group {} removed", group)
                    } else {
                        format!("Group {} had no active override", group)
                    };
                    context.term.write_line(&message).ok();
                }
            }
        }
        OverrideAction::List => {
            let overrides = store.list_active_overrides()?;
            match context.output {
                OutputFormat::Json => print_json(&overrides)?,
                _ => {
                    for o in &overrides {
                        println!(
                            "group {}\tfile {}\t{}\t{}",
                            o.group_id,
                            o.original_file_id,
                            o.created_at.format("%Y-%m-%d %H:%M"),
                            o.reason.as_deref().unwrap_or("")
                        );
                    }
                }
            }
        }
    }
    Ok(())
}

fn run_status(context: &Context) -> Result<()> {
    let groups = context.store.load_groups()?;
    let engine = GroupingEngine::new(context.config.clone(), context.store.clone());
    let summary = engine.get_group_summary(&groups);
    let escalation =
        SafeDuplicateEscalation::new(context.config.escalation.clone(), context.store.clone());
    let roles = escalation.get_safe_duplicate_status()?;
    let overrides = context.store.list_active_overrides()?.len();

    match context.output {
        OutputFormat::Json => print_json(&serde_json::json!({
            "database": context.store.path(),
            "summary": summary,
            "roles": roles,
            "active_overrides": overrides,
        }))?,
        _ => {
            let term = &context.term;
            term.write_line(&format!(
                "{} {}",
                style("Database").bold(),
                style(context.store.path().display()).dim()
            ))
            .ok();
            print_summary(term, &summary);
            term.write_line(&format!(
                "  {} safe duplicates ({:.1}% of duplicates), {} active overrides",
                style(roles.safe_duplicates).green(),
                roles.safe_percentage,
                overrides
            ))
            .ok();
        }
    }
    Ok(())
}

fn spinner(context: &Context, message: &'static str) -> Option<ProgressBar> {
    if !matches!(context.output, OutputFormat::Pretty) {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}

fn path_lookup(context: &Context) -> Result<HashMap<i64, String>> {
    Ok(context
        .store
        .load_records()?
        .into_iter()
        .map(|r| (r.id, r.path))
        .collect())
}

fn display_file(id: i64, paths: &HashMap<i64, String>) -> String {
    let Some(path) = paths.get(&id) else {
        return format!("#{}", id);
    };
    match dirs::home_dir() {
        Some(home) => match Path::new(path).strip_prefix(&home) {
            Ok(relative) => format!("~/{}", relative.display()),
            Err(_) => path.clone(),
        },
        None => path.clone(),
    }
}

fn print_summary(term: &Term, summary: &GroupSummary) {
    term.write_line(&format!(
        "  {} groups ({} exact, {} near), {} duplicates",
        style(summary.total_groups).cyan(),
        summary.exact_groups,
        summary.near_groups,
        style(summary.total_duplicates).cyan()
    ))
    .ok();
    term.write_line(&format!(
        "  confidence: {} high, {} medium, {} low",
        summary.high_confidence, summary.medium_confidence, summary.low_confidence
    ))
    .ok();
    term.write_line(&format!(
        "  {} potential space savings",
        style(format_bytes(summary.reclaimable_bytes)).yellow()
    ))
    .ok();
}

fn print_group(term: &Term, group: &DuplicateGroup, paths: &HashMap<i64, String>) {
    term.write_line(&format!(
        "  {} {} ({:.0}% confidence, {})",
        style(format!("Group {}:", group.id)).bold(),
        style(group.tier).yellow(),
        group.confidence * 100.0,
        format_bytes(group.metadata.reclaimable_bytes)
    ))
    .ok();
    term.write_line(&format!(
        "    {} {}{}",
        style("★").green(),
        display_file(group.original_id, paths),
        if group.metadata.override_applied {
            style(" (manual)").dim().to_string()
        } else {
            String::new()
        }
    ))
    .ok();
    for id in &group.duplicate_ids {
        term.write_line(&format!("    {} {}", style("○").dim(), display_file(*id, paths)))
            .ok();
    }
    if let Some(conflict) = &group.metadata.override_conflict {
        term.write_line(&format!("    {} {}", style("!").yellow(), style(conflict).dim()))
            .ok();
    }
    term.write_line("").ok();
}

fn print_escalation(term: &Term, stats: &EscalationStats) {
    term.write_line(&format!(
        "{} Escalation complete",
        style("✓").green().bold()
    ))
    .ok();
    term.write_line(&format!(
        "  {} pairs checked across {} groups",
        style(stats.pairs_evaluated).cyan(),
        stats.groups_processed
    ))
    .ok();
    term.write_line(&format!(
        "  {} newly safe, {} already safe, {} not eligible",
        style(stats.escalated).green(),
        stats.already_safe,
        stats.criteria_not_met
    ))
    .ok();
    if stats.skipped > 0 {
        term.write_line(&format!(
            "  {} members skipped (record missing)",
            style(stats.skipped).yellow()
        ))
        .ok();
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let rendered =
        serde_json::to_string_pretty(value).map_err(|e| DedupError::Output(e.to_string()))?;
    println!("{}", rendered);
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_array_and_lines() {
        let array = r#"[{"id": 1, "path": "/a.jpg", "size": 1, "fast_hash": "x"}]"#;
        assert_eq!(parse_records(array).unwrap().len(), 1);

        let lines = concat!(
            r#"{"id": 1, "path": "/a.jpg", "size": 1, "fast_hash": "x"}"#,
            "\n\n",
            r#"{"id": 2, "path": "/b.jpg", "size": 1, "fast_hash": "x"}"#,
            "\n",
        );
        let records = parse_records(lines).unwrap();
        assert_eq!(records[1].id, 2);
    }

    #[test]
    fn bad_line_is_reported_by_number() {
        let lines = concat!(
            r#"{"id": 1, "path": "/a.jpg", "size": 1, "fast_hash": "x"}"#,
            "\nnot json\n",
        );
        let error = parse_records(lines).unwrap_err();
        assert!(error.starts_with("line 2"));
    }

    #[test]
    fn formats_bytes() {
        assert_eq!(format_bytes(512), "512 bytes");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn unknown_file_displays_id() {
        assert_eq!(display_file(9, &HashMap::new()), "#9");
    }
}
