use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use midilens::analyzer::features::FileMetadata;
use midilens::db::models::StoredFeatures;
use midilens::db::Database;
use midilens::scanner::filename;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "midilens", version, about = "Symbolic feature extraction for MIDI loop libraries")]
struct Cli {
    /// Path to the SQLite database
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan directories for MIDI files and add them to the library
    Scan {
        /// Directories to scan (defaults to config file midi_dirs)
        paths: Vec<PathBuf>,

        /// Force re-scan even if files haven't changed
        #[arg(long)]
        force: bool,
    },

    /// Extract features from registered MIDI files
    Analyze {
        /// Number of parallel workers (0 = auto-detect from config)
        #[arg(short = 'j', long, default_value = "0")]
        jobs: usize,

        /// Re-analyze files that already have features or were unreadable
        #[arg(long)]
        force: bool,

        /// Only analyze files whose path contains this pattern
        #[arg(long)]
        filter: Option<String>,
    },

    /// Analyze a single file and print its features as JSON (no database)
    Inspect {
        /// MIDI file to analyze
        file: PathBuf,

        /// Key label such as C_major (defaults to the parent-of-parent folder)
        #[arg(long)]
        key: Option<String>,
    },

    /// Show stored features for files whose path contains a pattern
    Show {
        /// Substring of the file path
        pattern: String,
    },

    /// Show library statistics
    Stats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let config = midilens::config::AppConfig::load();

    let db_path = cli.db_path;

    match cli.command {
        Commands::Scan { paths, force } => {
            let db = open_database(db_path, &config)?;
            // Resolve scan paths: CLI args > config midi_dirs
            let scan_paths = if !paths.is_empty() {
                paths
            } else if !config.midi_dirs.is_empty() {
                config.midi_dirs.clone()
            } else {
                anyhow::bail!(
                    "No directories to scan. Pass paths as arguments or set midi_dirs in config."
                );
            };

            let result =
                midilens::scanner::scan(&db, &scan_paths, force).context("Scan failed")?;
            println!(
                "Scan complete: {} scanned, {} new, {} updated, {} skipped, {} errors",
                result.scanned, result.new, result.updated, result.skipped, result.errors
            );
        }

        Commands::Analyze { jobs, force, filter } => {
            let db = open_database(db_path, &config)?;
            let workers = if jobs > 0 { jobs } else { config.resolve_workers() };
            let result = midilens::analyzer::analyze_files(
                &db,
                force,
                workers,
                filter.as_deref(),
                &config.analysis,
            )
            .context("Analysis failed")?;
            println!(
                "Analysis complete: {} analyzed, {} unreadable, {} failed",
                result.analyzed, result.unreadable, result.failed
            );
        }

        Commands::Inspect { file, key } => {
            // No database: analyse in place and print
            inspect(&file, key, &config.analysis)?;
        }

        Commands::Show { pattern } => {
            let db = open_database(db_path, &config)?;
            let rows = db
                .query_features(&pattern)
                .context("Failed to query features")?;
            if rows.is_empty() {
                println!("No analyzed files match '{}'", pattern);
                return Ok(());
            }
            for row in &rows {
                print_features(row);
            }
        }

        Commands::Stats => {
            let db = open_database(db_path, &config)?;
            let stats = db.stats().context("Failed to get stats")?;
            println!("Library Statistics");
            println!("==================");
            println!("Total files:      {}", stats.total_files);
            println!("Analyzed files:   {}", stats.analyzed_files);
            println!("Unreadable files: {}", stats.unreadable_files);
            println!("Total duration:   {:.1} minutes", stats.total_duration_mins);
            println!();

            if !stats.roles.is_empty() {
                println!("Roles:");
                for (role, count) in &stats.roles {
                    println!("  {:<20} {}", role, count);
                }
                println!();
            }

            if !stats.contours.is_empty() {
                println!("Contours:");
                for (contour, count) in &stats.contours {
                    println!("  {:<20} {}", contour, count);
                }
            }
        }
    }

    Ok(())
}

/// Open the library database. Path precedence: CLI > config > XDG default.
fn open_database(
    cli_path: Option<PathBuf>,
    config: &midilens::config::AppConfig,
) -> Result<Database> {
    let db_path = cli_path
        .or(config.db_path.clone())
        .unwrap_or_else(midilens::config::default_db_path);
    log::info!("Database: {}", db_path.display());
    Database::open(&db_path).context("Failed to open database")
}

/// Analyze one file outside the library and print the record as JSON.
fn inspect(
    file: &std::path::Path,
    key: Option<String>,
    analysis: &midilens::config::AnalysisConfig,
) -> Result<()> {
    let file_name = file
        .file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_default();

    // Key and role come from a <key>/<role>/<file> layout unless --key is given
    let layout = file
        .parent()
        .and_then(|p| p.parent())
        .and_then(|p| p.parent())
        .map(|root| filename::parse_path(root, file))
        .unwrap_or_default();
    let (chord, mode) = filename::parse_chord_mode(&file_name).unzip();

    let meta = FileMetadata {
        key_signature: key.or(layout.key_signature),
        instrument_role: layout.instrument_role,
        filename_tempo: filename::parse_tempo(&file_name),
        filename_chord: chord,
        filename_mode: mode,
        file_name,
    };

    let record = midilens::analyzer::analyze_path(file, &meta, analysis)
        .with_context(|| format!("Failed to analyze {}", file.display()))?;
    println!(
        "{}",
        serde_json::to_string_pretty(&record).context("Failed to encode features")?
    );
    Ok(())
}

/// Print one stored feature row as an aligned name/value list.
fn print_features(row: &StoredFeatures) {
    println!("{}", row.file_path);
    println!("  analyzed at {}", row.analyzed_at);
    for (name, value) in &row.features {
        if value.is_null() {
            continue;
        }
        println!("  {:<22} {}", name, value);
    }
    println!();
}
