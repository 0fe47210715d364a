use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub use slotbook_core::{RemainderPolicy, DEFAULT_COMPRESSION_LEVEL, DEFAULT_TOTAL_MASS};
use slotbook_core::ToleranceBands;

pub const DEFAULT_TARGET_RTP: f64 = 0.962;

#[derive(Debug, Clone, PartialEq)]
pub struct BandConfig {
    pub label: String,
    pub threshold: f64,
}

/// Tolerance bands, written in config as an ordered `{ "label": threshold }` object.
#[derive(Debug, Clone, PartialEq)]
pub struct BandsConfig(pub Vec<BandConfig>);

impl Default for BandsConfig {
    fn default() -> Self {
        Self::from(&ToleranceBands::default())
    }
}

impl From<&ToleranceBands> for BandsConfig {
    fn from(bands: &ToleranceBands) -> Self {
        Self(
            bands
                .bands()
                .iter()
                .map(|b| BandConfig {
                    label: b.label.clone(),
                    threshold: b.threshold,
                })
                .collect(),
        )
    }
}

impl BandsConfig {
    pub fn to_tolerance_bands(&self) -> ToleranceBands {
        ToleranceBands::new(self.0.iter().map(|b| (b.label.clone(), b.threshold)))
    }
}

impl Serialize for BandsConfig {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for band in &self.0 {
            map.serialize_entry(&band.label, &band.threshold)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for BandsConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct BandsVisitor;

        impl<'de> Visitor<'de> for BandsVisitor {
            type Value = BandsConfig;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of band label to threshold")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<BandsConfig, A::Error> {
                let mut bands = Vec::new();
                while let Some((label, threshold)) = access.next_entry::<String, f64>()? {
                    bands.push(BandConfig { label, threshold });
                }
                Ok(BandsConfig(bands))
            }
        }

        deserializer.deserialize_map(BandsVisitor)
    }
}

/// Source and output locations for one game mode, relative to the library root.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ModeConfig {
    pub name: String,
    pub books: PathBuf,
    pub table: PathBuf,
    pub archive: PathBuf,
}

impl ModeConfig {
    /// `books/books_{mode}.json` in, `publish_files/{lookUpTable_{mode}_0.csv, books_{mode}.jsonl.zst}` out.
    pub fn conventional(name: &str) -> Self {
        Self {
            name: name.to_string(),
            books: PathBuf::from(format!("books/books_{name}.json")),
            table: PathBuf::from(format!("publish_files/lookUpTable_{name}_0.csv")),
            archive: PathBuf::from(format!("publish_files/books_{name}.jsonl.zst")),
        }
    }

    pub fn resolve(&self, root: &Path) -> Self {
        Self {
            name: self.name.clone(),
            books: root.join(&self.books),
            table: root.join(&self.table),
            archive: root.join(&self.archive),
        }
    }
}

fn default_total_mass() -> u64 {
    DEFAULT_TOTAL_MASS
}

fn default_target_rtp() -> f64 {
    DEFAULT_TARGET_RTP
}

fn default_compression_level() -> i32 {
    DEFAULT_COMPRESSION_LEVEL
}

fn default_modes() -> Vec<ModeConfig> {
    vec![ModeConfig::conventional("base"), ModeConfig::conventional("bonus")]
}

fn default_manifest() -> PathBuf {
    PathBuf::from("publish_files/manifest.json")
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PublishConfig {
    #[serde(default = "default_total_mass")]
    pub total_mass: u64,
    #[serde(default = "default_target_rtp")]
    pub target_rtp: f64,
    #[serde(default)]
    pub tolerance_bands: BandsConfig,
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,
    #[serde(default)]
    pub remainder_policy: RemainderPolicy,
    #[serde(default = "default_modes")]
    pub modes: Vec<ModeConfig>,
    #[serde(default = "default_manifest")]
    pub manifest: PathBuf,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            total_mass: DEFAULT_TOTAL_MASS,
            target_rtp: DEFAULT_TARGET_RTP,
            tolerance_bands: BandsConfig::default(),
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            remainder_policy: RemainderPolicy::default(),
            modes: default_modes(),
            manifest: default_manifest(),
        }
    }
}

impl PublishConfig {
    pub fn from_json_str(s: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.total_mass == 0 {
            return Err(ConfigError::Invalid("total_mass must be positive".into()));
        }
        if !self.target_rtp.is_finite() || self.target_rtp < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "target_rtp must be a non-negative number, found {}",
                self.target_rtp
            )));
        }
        for band in &self.tolerance_bands.0 {
            if !band.threshold.is_finite() || band.threshold < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "tolerance band `{}` has invalid threshold {}",
                    band.label, band.threshold
                )));
            }
        }
        if self.modes.is_empty() {
            return Err(ConfigError::Invalid("at least one mode is required".into()));
        }
        let mut seen = HashSet::new();
        for mode in &self.modes {
            if mode.name.is_empty() {
                return Err(ConfigError::Invalid("mode name must not be empty".into()));
            }
            if !seen.insert(mode.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "mode `{}` is listed more than once",
                    mode.name
                )));
            }
        }
        Ok(())
    }

    pub fn mode(&self, name: &str) -> Option<&ModeConfig> {
        self.modes.iter().find(|m| m.name == name)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ModeManifest {
    pub name: String,
    pub rows: usize,
    pub total_weight: u128,
    pub table: String,
    pub table_sha256: String,
    pub archive: String,
    pub archive_sha256: String,
    pub rtp: f64,
    pub classification: String,
}

/// Record of one publish run, written next to the artifacts.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PublishManifest {
    pub generated_at: DateTime<Utc>,
    pub total_mass: u64,
    pub target_rtp: f64,
    pub compression_level: i32,
    pub remainder_policy: RemainderPolicy,
    pub modes: Vec<ModeManifest>,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
