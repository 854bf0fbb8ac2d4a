use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use confcloud_core::{AppConfig, PaperDataset};
use confcloud_science::{Checkpoint, CheckpointStore, CoverageReport, EnrichmentOrchestrator};

// ─── CLI Definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "confcloud",
    about = "Fill in paper abstracts for conference datasets from OpenReview, OpenAlex, Semantic Scholar and proceedings pages",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format (for scripts).
    /// Also enabled by setting CONFCLOUD_JSON=1.
    #[arg(long, global = true)]
    json: bool,

    /// Debug logging.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only warnings and errors.
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Enrich a dataset file with abstracts.
    Enrich {
        /// Dataset JSON (`{metadata, papers}` or a bare array of papers).
        input: PathBuf,

        /// Where to write the enriched dataset. Defaults to
        /// `<input stem>.enriched.json` next to the input.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Checkpoint key. Defaults to the dataset's conference, then the
        /// file stem.
        #[arg(long)]
        conference: Option<String>,

        /// Ignore any existing checkpoint.
        #[arg(long)]
        fresh: bool,

        /// Keep the checkpoint after a successful run.
        #[arg(long)]
        keep_checkpoint: bool,
    },

    /// Report abstract coverage of one or more dataset files.
    Coverage {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Config management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

// ─── Config Actions ──────────────────────────────────────────────────────────

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the config file path.
    Path,
    /// Show the effective config.
    Show,
    /// Write the default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

// ─── Main ────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let start = Instant::now();
    let cli = Cli::parse();

    let json_output = cli.json || std::env::var("CONFCLOUD_JSON").as_deref() == Ok("1");
    init_logging(cli.verbose, cli.quiet);

    let config = AppConfig::load()
        .with_context(|| format!("loading {}", AppConfig::config_path().display()))?;

    match cli.command {
        // ── Enrich ─────────────────────────────────────────────────────────

        Commands::Enrich {
            input,
            output,
            conference,
            fresh,
            keep_checkpoint,
        } => {
            let dataset = PaperDataset::load(&input)
                .with_context(|| format!("reading dataset {}", input.display()))?;
            let conference = conference
                .or_else(|| Some(dataset.metadata.conference.clone()).filter(|c| !c.is_empty()))
                .unwrap_or_else(|| file_stem(&input));
            let output = output.unwrap_or_else(|| default_output(&input));

            let store = CheckpointStore::new(config.checkpoint_path(&conference));
            let checkpoint = if fresh {
                Checkpoint::new(&conference)
            } else {
                store.load(&conference).with_context(|| {
                    format!("reading checkpoint {}", store.path().display())
                })?
            };
            if !checkpoint.is_empty() {
                info!(
                    "checkpoint {} holds {} abstracts",
                    store.path().display(),
                    checkpoint.resolved_count()
                );
            }

            let orchestrator =
                EnrichmentOrchestrator::from_config(&config)?.with_checkpoint_store(store.clone());

            info!(
                "enriching {} papers of {conference} from {}",
                dataset.papers.len(),
                input.display()
            );
            let PaperDataset { metadata, papers } = dataset;
            let run = tokio::select! {
                run = orchestrator.run(papers, checkpoint) => run?,
                _ = tokio::signal::ctrl_c() => {
                    warn!(
                        "interrupted; completed tiers are saved in {}",
                        store.path().display()
                    );
                    std::process::exit(130);
                }
            };

            let enriched = PaperDataset {
                metadata,
                papers: run.papers,
            };
            enriched
                .save(&output)
                .with_context(|| format!("writing {}", output.display()))?;
            if !keep_checkpoint {
                store.discard()?;
            }

            let dur = start.elapsed().as_millis();
            if json_output {
                print_json(&serde_json::json!({
                    "status": "ok",
                    "data": {"output": output, "conference": conference, "coverage": run.coverage},
                    "meta": {"duration_ms": dur}
                }))?;
            } else {
                println!("{}", run.coverage);
                println!();
                println!("Wrote {}", output.display());
            }
        }

        // ── Coverage ───────────────────────────────────────────────────────

        Commands::Coverage { files } => {
            let mut total = CoverageReport::default();
            let mut per_file = Vec::new();
            for path in &files {
                let dataset = PaperDataset::load(path)
                    .with_context(|| format!("reading dataset {}", path.display()))?;
                let report = CoverageReport::summarize(&dataset.papers);
                total.merge(report.clone());
                per_file.push((path, dataset.metadata.conference, report));
            }

            let dur = start.elapsed().as_millis();
            if json_output {
                let items = per_file
                    .iter()
                    .map(|(path, conference, report)| {
                        serde_json::json!({"file": path, "conference": conference, "coverage": report})
                    })
                    .collect::<Vec<_>>();
                print_json(&serde_json::json!({
                    "status": "ok",
                    "data": {"files": items, "total": total},
                    "meta": {"duration_ms": dur}
                }))?;
            } else {
                for (path, conference, report) in &per_file {
                    let name = if conference.is_empty() {
                        path.display().to_string()
                    } else {
                        conference.clone()
                    };
                    println!("── {name} ──");
                    println!("{report}");
                    println!();
                }
                if per_file.len() > 1 {
                    println!("── all files ──");
                    println!("{total}");
                }
            }
        }

        // ── Config ─────────────────────────────────────────────────────────

        Commands::Config { action } => match action {
            ConfigAction::Path => {
                let path = AppConfig::config_path();
                if json_output {
                    print_json(&serde_json::json!({"status": "ok", "data": {"path": path}}))?;
                } else {
                    println!("{}", path.display());
                }
            }
            ConfigAction::Show => {
                if json_output {
                    print_json(&serde_json::json!({"status": "ok", "data": config}))?;
                } else {
                    print!("{}", toml::to_string_pretty(&config)?);
                }
            }
            ConfigAction::Init { force } => {
                let path = AppConfig::config_path();
                if path.exists() && !force {
                    bail!("{} already exists (use --force to overwrite)", path.display());
                }
                AppConfig::default().save_to(&path)?;
                if json_output {
                    print_json(&serde_json::json!({"status": "ok", "data": {"path": path}}))?;
                } else {
                    println!("Wrote {}", path.display());
                }
            }
        },
    }

    Ok(())
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Logs go to stderr so `--json` output stays clean. `RUST_LOG` wins over
/// the flags.
fn init_logging(verbose: bool, quiet: bool) {
    let level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "confcloud_cli={level},confcloud_science={level},confcloud_core={level},warn"
        ))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn print_json(val: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(val)?);
    Ok(())
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "default".to_string())
}

fn default_output(input: &Path) -> PathBuf {
    input.with_file_name(format!("{}.enriched.json", file_stem(input)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn enrich_flags_parse() {
        let cli = Cli::try_parse_from([
            "confcloud",
            "enrich",
            "data/raw/iclr_papers.json",
            "-o",
            "out.json",
            "--fresh",
            "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Enrich { input, output, fresh, keep_checkpoint, .. } => {
                assert_eq!(input, PathBuf::from("data/raw/iclr_papers.json"));
                assert_eq!(output, Some(PathBuf::from("out.json")));
                assert!(fresh);
                assert!(!keep_checkpoint);
            }
            _ => panic!("expected enrich"),
        }
    }

    #[test]
    fn default_output_sits_next_to_input() {
        assert_eq!(
            default_output(Path::new("data/raw/kdd_papers.json")),
            PathBuf::from("data/raw/kdd_papers.enriched.json")
        );
    }
}
