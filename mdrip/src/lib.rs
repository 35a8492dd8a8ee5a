pub mod bank;
pub mod bundle;
pub mod catalog;
pub mod container;
pub mod correlate;
pub mod error;
pub mod export;
pub mod game;
pub mod locale;
pub mod source;
mod tag;
pub mod track;

pub use bank::{AudioStream, Codec, JoinKey, SampleBank};
pub use bundle::Bundle;
pub use catalog::{Catalog, TableSource};
pub use container::{OutputFormat, VorbisSetupLibrary};
pub use correlate::{Correlation, CorrelationWarning, Track, correlate};
pub use error::{Error, Result};
pub use export::{ExportEvent, ExportOptions, ExportSummary, ExportWarning, Exporter};
pub use game::{GameLayout, default_game_dir};
pub use locale::{Language, LocalizedString};
pub use source::{AudioSource, CoverSource};
pub use tag::{TagWriter, TrackTags};
pub use track::{CoverKey, TrackIndex, TrackMetadata};

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

/// Where the Vorbis setup headers are looked up when none are given.
pub fn default_vorbis_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("mdrip").join("vorbis"))
}

/// Everything [`rip`] needs besides callbacks.
#[derive(Debug, Clone)]
pub struct RipConfig {
    pub game_dir: PathBuf,
    pub output_dir: PathBuf,
    pub options: ExportOptions,
    /// Directory of Vorbis setup headers. Falls back to [`default_vorbis_dir`].
    /// Headers found there take precedence over the built-in ones.
    pub vorbis_headers: Option<PathBuf>,
}

fn load_setups(dir: Option<&Path>) -> Result<VorbisSetupLibrary> {
    let explicit = dir.is_some();
    let Some(dir) = dir.map(Path::to_path_buf).or_else(default_vorbis_dir) else {
        return Ok(VorbisSetupLibrary::new());
    };
    if !explicit && !dir.is_dir() {
        tracing::debug!("No Vorbis setup headers at {}", dir.display());
        return Ok(VorbisSetupLibrary::new());
    }
    VorbisSetupLibrary::load_dir(&dir)
}

/// Export the whole soundtrack of the game at `config.game_dir`.
///
/// Configuration and catalog problems are returned as errors. Problems
/// with single tracks end up in [`ExportSummary::failures`].
pub fn rip(
    config: &RipConfig,
    on_event: Option<&dyn Fn(&ExportEvent<'_>)>,
    cancel: Option<&AtomicBool>,
) -> Result<ExportSummary> {
    config.options.validate()?;
    if config.output_dir.is_file() {
        return Err(Error::Config(format!(
            "output path {} is a file",
            config.output_dir.display()
        )));
    }
    tracing::info!("Ripping {} into {}", config.game_dir.display(), config.output_dir.display());

    let layout = GameLayout::open(&config.game_dir)?;
    let setups = load_setups(config.vorbis_headers.as_deref())?;
    if setups.is_empty() {
        tracing::debug!("Using the built-in Vorbis setup headers only");
    }

    let catalog = Catalog::load(&layout, &[config.options.language])?;
    let (streams, missing_audio) = layout.audio_sources(&catalog);
    let covers = layout.cover_sources(&catalog);
    let mut correlation = correlate(&catalog, &covers, &streams);
    correlation.warnings.extend(missing_audio);

    let mut exporter = Exporter::new(config.options.clone(), &setups)?;
    if let Some(callback) = on_event {
        exporter = exporter.on_event(callback);
    }
    if let Some(flag) = cancel {
        exporter = exporter.cancel_flag(flag);
    }
    exporter.export(&correlation, &config.output_dir)
}
