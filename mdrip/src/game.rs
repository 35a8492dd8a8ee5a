//! Locating the game's bundles on disk.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::bundle::Bundle;
use crate::catalog::{Catalog, TableSource};
use crate::correlate::CorrelationWarning;
use crate::error::{Error, Result};
use crate::locale::Language;
use crate::source::{AudioSource, CoverSource};
use crate::track::CoverKey;

/// Bundle directory relative to the game folder.
pub const DATA_DIR: [&str; 4] = ["MuseDash_Data", "StreamingAssets", "aa", "StandaloneWindows64"];

/// The usual Steam install location on this platform.
pub fn default_game_dir() -> PathBuf {
    if cfg!(windows) {
        return PathBuf::from(r"C:\Program Files (x86)\Steam\steamapps\common\Muse Dash");
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Steam")
        .join("steamapps")
        .join("common")
        .join("Muse Dash")
}

/// An installed game: its bundle directory and the bundle file names in it.
#[derive(Debug, Clone)]
pub struct GameLayout {
    data_dir: PathBuf,
    bundles: Vec<String>,
}

impl GameLayout {
    pub fn open(game_dir: &Path) -> Result<Self> {
        let data_dir: PathBuf = DATA_DIR.iter().fold(game_dir.to_path_buf(), |p, seg| p.join(seg));
        if !data_dir.is_dir() {
            return Err(Error::Config(format!(
                "{} does not look like a Muse Dash install (no {})",
                game_dir.display(),
                DATA_DIR.join("/")
            )));
        }
        let mut bundles = Vec::new();
        for entry in fs::read_dir(&data_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                bundles.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        bundles.sort();
        tracing::info!("Found {} bundles in {}", bundles.len(), data_dir.display());
        Ok(Self { data_dir, bundles })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn bundle_names(&self) -> &[String] {
        &self.bundles
    }

    /// The single bundle whose file name starts with `prefix`.
    pub fn find(&self, prefix: &str) -> Result<PathBuf> {
        let mut matches = self.bundles.iter().filter(|name| name.starts_with(prefix));
        match (matches.next(), matches.next()) {
            (Some(name), None) => Ok(self.data_dir.join(name)),
            (None, _) => Err(Error::MissingResource(format!("bundle {prefix}*"))),
            (Some(_), Some(_)) => Err(Error::MissingResource(format!("unique bundle {prefix}*"))),
        }
    }

    /// One deferred audio source per catalog row that has a music bundle,
    /// in catalog order. Rows without exactly one bundle come back as
    /// warnings.
    pub fn audio_sources(&self, catalog: &Catalog) -> (Vec<AudioSource>, Vec<CorrelationWarning>) {
        let mut sources = Vec::new();
        let mut warnings = Vec::new();
        for row in catalog.rows() {
            let music = row.index.as_str();
            match self.find(&format!("music_assets_{music}_")) {
                Ok(path) => sources.push(AudioSource::deferred(path, music)),
                Err(e) => {
                    let warning = CorrelationWarning::MissingAudio {
                        index: row.index.clone(),
                        reason: e.to_string(),
                    };
                    tracing::warn!("{warning}");
                    warnings.push(warning);
                }
            }
        }
        (sources, warnings)
    }

    /// Deferred cover sources for every cover the catalog names.
    pub fn cover_sources(&self, catalog: &Catalog) -> HashMap<CoverKey, CoverSource> {
        let mut covers = HashMap::new();
        for row in catalog.rows() {
            if covers.contains_key(&row.cover) {
                continue;
            }
            match self.find(&format!("song_{}_assets_all_", row.cover.asset)) {
                Ok(bundle) => {
                    let source = CoverSource::Deferred {
                        bundle,
                        texture: row.cover.texture.clone(),
                    };
                    covers.insert(row.cover.clone(), source);
                }
                Err(e) => tracing::debug!("No cover for {}: {e}", row.cover),
            }
        }
        covers
    }
}

impl TableSource for GameLayout {
    fn table(&self, name: &str, language: Language) -> Result<String> {
        let lower = name.to_lowercase();
        let (prefix, asset) = match language.table_suffix() {
            None => (format!("config_others_assets_{lower}_"), name.to_string()),
            Some(suffix) => {
                let lang = suffix.to_lowercase();
                (format!("config_{lang}_assets_{lower}_{lang}_"), format!("{name}_{suffix}"))
            }
        };
        let path = self.find(&prefix)?;
        let text = Bundle::open(&path)
            .and_then(|b| b.text_asset(&asset))
            .map_err(Error::loading(&path))?;
        tracing::debug!("Read table {asset} from {}", path.display());
        Ok(String::from_utf8_lossy(&text.script).into_owned())
    }
}
