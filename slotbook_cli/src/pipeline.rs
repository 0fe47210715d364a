use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::Utc;
use tracing::info;

use slotbook_core::{
    sha256_file_hex, verify, CorpusArchiver, LookupTable, LookupTableBuilder, OutcomeCorpus,
    RtpReport, ToleranceBands,
};
use slotbook_shared::{ModeConfig, ModeManifest, PublishConfig, PublishManifest};

/// Validated config plus the core components it configures.
pub struct Settings {
    pub config: PublishConfig,
    pub library: PathBuf,
    bands: ToleranceBands,
    archiver: CorpusArchiver,
}

impl Settings {
    pub fn new(config: PublishConfig, library: PathBuf) -> anyhow::Result<Self> {
        let bands = config.tolerance_bands.to_tolerance_bands();
        let archiver = CorpusArchiver::new(config.compression_level)?;
        Ok(Self {
            config,
            library,
            bands,
            archiver,
        })
    }

    pub fn builder(&self) -> LookupTableBuilder {
        LookupTableBuilder::new(self.config.total_mass)
            .remainder_policy(self.config.remainder_policy)
    }

    pub fn archiver(&self) -> CorpusArchiver {
        self.archiver
    }

    pub fn bands(&self) -> &ToleranceBands {
        &self.bands
    }

    /// Configured modes with paths resolved against the library root.
    pub fn modes(&self) -> Vec<ModeConfig> {
        self.config
            .modes
            .iter()
            .map(|m| m.resolve(&self.library))
            .collect()
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.library.join(&self.config.manifest)
    }
}

/// Mode label for an explicitly named table file: `lookUpTable_base_0.csv` -> `base`.
pub fn mode_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    stem.strip_prefix("lookUpTable_")
        .and_then(|rest| rest.rsplit_once('_').map(|(mode, _)| mode.to_string()))
        .unwrap_or(stem)
}

pub fn verify_table(settings: &Settings, path: &Path) -> anyhow::Result<RtpReport> {
    let table = LookupTable::load(path)?;
    let report = verify(&table, settings.config.target_rtp, settings.bands())?;
    Ok(report)
}

#[derive(Debug)]
pub struct Published {
    pub manifest: PublishManifest,
    pub reports: Vec<(String, RtpReport)>,
}

fn ensure_parent(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    Ok(())
}

fn publish_mode(settings: &Settings, mode: &ModeConfig) -> anyhow::Result<(ModeManifest, RtpReport)> {
    let corpus = OutcomeCorpus::load(&mode.books)
        .with_context(|| format!("loading books for mode `{}`", mode.name))?;

    let table = settings.builder().build(&corpus)?;
    ensure_parent(&mode.table)?;
    table.write_to_path(&mode.table)?;

    ensure_parent(&mode.archive)?;
    settings
        .archiver()
        .archive_to_path(&corpus, &mode.archive)
        .with_context(|| format!("archiving mode `{}`", mode.name))?;
    drop(corpus);

    // verify what was actually written, not the in-memory table
    let report = verify_table(settings, &mode.table)?;
    let manifest = ModeManifest {
        name: mode.name.clone(),
        rows: report.rows,
        total_weight: report.total_weight,
        table: mode.table.display().to_string(),
        table_sha256: sha256_file_hex(&mode.table)?,
        archive: mode.archive.display().to_string(),
        archive_sha256: sha256_file_hex(&mode.archive)?,
        rtp: report.rtp,
        classification: report.classification.label().to_string(),
    };
    Ok((manifest, report))
}

/// Build, archive and verify each selected mode, then write the manifest.
pub fn publish(settings: &Settings, only: &[String]) -> anyhow::Result<Published> {
    let modes: Vec<ModeConfig> = settings
        .modes()
        .into_iter()
        .filter(|m| only.is_empty() || only.contains(&m.name))
        .collect();
    if let Some(unknown) = only
        .iter()
        .find(|name| settings.config.mode(name.as_str()).is_none())
    {
        bail!("mode `{unknown}` is not configured");
    }

    let mut manifest = PublishManifest {
        generated_at: Utc::now(),
        total_mass: settings.config.total_mass,
        target_rtp: settings.config.target_rtp,
        compression_level: settings.config.compression_level,
        remainder_policy: settings.config.remainder_policy,
        modes: Vec::with_capacity(modes.len()),
    };
    let mut reports = Vec::with_capacity(modes.len());
    for mode in &modes {
        info!(mode = %mode.name, books = %mode.books.display(), "publishing mode");
        let (entry, report) = publish_mode(settings, mode)?;
        manifest.modes.push(entry);
        reports.push((mode.name.clone(), report));
    }

    let path = settings.manifest_path();
    ensure_parent(&path)?;
    let json = serde_json::to_string_pretty(&manifest)?;
    fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(Published { manifest, reports })
}
