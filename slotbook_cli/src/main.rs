use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use slotbook_core::{render_report, render_summary, ArchiveReader, LookupTable, OutcomeCorpus};
use slotbook_shared::PublishConfig;

mod pipeline;

use pipeline::Settings;

#[derive(Parser)]
#[command(name = "slotbook", about = "Build, archive and verify slot lookup tables")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// JSON publish config; defaults apply when omitted
    #[arg(long, global = true, env = "SLOTBOOK_CONFIG")]
    config: Option<PathBuf>,
    /// Library root that mode paths in the config are relative to
    #[arg(long, global = true, env = "SLOTBOOK_LIBRARY", default_value = ".")]
    library: PathBuf,
    /// Override the total probability mass
    #[arg(long, global = true)]
    total_mass: Option<u64>,
    /// Override the target RTP (fraction, e.g. 0.962)
    #[arg(long, global = true)]
    target_rtp: Option<f64>,
    /// Override the zstd compression level
    #[arg(long, global = true)]
    compression_level: Option<i32>,
    /// Spread the division remainder over the leading rows instead of dropping it
    #[arg(long, global = true)]
    distribute_remainder: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a lookup table from a books JSON array
    BuildTable { books: PathBuf, out: PathBuf },
    /// Compress a books JSON array into a JSON-lines zstd archive
    Archive { books: PathBuf, out: PathBuf },
    /// Verify RTP of lookup tables (configured modes when none are given)
    Verify {
        tables: Vec<PathBuf>,
        /// Exit non-zero when any table needs adjustment
        #[arg(long)]
        strict: bool,
    },
    /// Check that an archive matches a lookup table row for row
    Crosscheck { table: PathBuf, archive: PathBuf },
    /// Build, archive and verify every configured mode, then write a manifest
    Publish {
        /// Restrict to these modes
        #[arg(long = "mode")]
        modes: Vec<String>,
    },
}

fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let mut config = match &cli.config {
        Some(path) => PublishConfig::from_path(path)?,
        None => PublishConfig::default(),
    };
    if let Some(total_mass) = cli.total_mass {
        config.total_mass = total_mass;
    }
    if let Some(target_rtp) = cli.target_rtp {
        config.target_rtp = target_rtp;
    }
    if let Some(level) = cli.compression_level {
        config.compression_level = level;
    }
    if cli.distribute_remainder {
        config.remainder_policy = slotbook_shared::RemainderPolicy::Distribute;
    }
    config.validate()?;
    Settings::new(config, cli.library.clone())
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let settings = load_settings(&cli)?;

    match cli.command {
        Commands::BuildTable { books, out } => {
            let corpus = OutcomeCorpus::load(&books)?;
            let table = settings.builder().build(&corpus)?;
            table.write_to_path(&out)?;
            println!(
                "Generated lookup table with {} rows ({} per book, {} lost to truncation)",
                table.len(),
                settings.config.total_mass / table.len() as u64,
                table.truncation_loss(settings.config.total_mass)
            );
        }
        Commands::Archive { books, out } => {
            let corpus = OutcomeCorpus::load(&books)?;
            let summary = settings.archiver().archive_to_path(&corpus, &out)?;
            println!("Compressed {} books into {}", summary.records, out.display());
        }
        Commands::Verify { tables, strict } => {
            let targets: Vec<(String, PathBuf)> = if tables.is_empty() {
                settings
                    .modes()
                    .into_iter()
                    .map(|m| (m.name, m.table))
                    .collect()
            } else {
                tables
                    .into_iter()
                    .map(|path| (pipeline::mode_name(&path), path))
                    .collect()
            };
            let mut reports = Vec::new();
            let mut failures = 0usize;
            for (mode, path) in targets {
                // one bad mode does not stop the others
                match pipeline::verify_table(&settings, &path) {
                    Ok(report) => {
                        println!("\n{}", render_report(&mode, &report));
                        reports.push((mode, report));
                    }
                    Err(err) => {
                        eprintln!("{mode}: {err:#}");
                        failures += 1;
                    }
                }
            }
            if !reports.is_empty() {
                println!("{}", render_summary(&reports, settings.config.target_rtp));
            }
            let off_target = reports
                .iter()
                .filter(|(_, r)| !r.classification.is_within())
                .count();
            if failures > 0 || (strict && off_target > 0) {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Crosscheck { table, archive } => {
            let lookup = LookupTable::load(&table)?;
            let records = ArchiveReader::open(&archive)?;
            let compared = slotbook_core::crosscheck(&lookup, records)
                .with_context(|| format!("{} vs {}", table.display(), archive.display()))?;
            println!("{compared} rows match between table and archive");
        }
        Commands::Publish { modes } => {
            let published = pipeline::publish(&settings, &modes)?;
            for (mode, report) in &published.reports {
                println!("\n{}", render_report(mode, report));
            }
            for mode in &published.manifest.modes {
                info!(mode = %mode.name, table_sha256 = %mode.table_sha256, "published");
            }
            println!(
                "{}",
                render_summary(&published.reports, settings.config.target_rtp)
            );
            println!("Manifest written to {}", settings.manifest_path().display());
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
