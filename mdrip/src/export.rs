//! Writing correlated tracks to an output directory.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::container::{OutputFormat, VorbisSetupLibrary};
use crate::correlate::{Correlation, CorrelationWarning, Track};
use crate::error::{Error, Result};
use crate::locale::Language;
use crate::tag::{TagWriter, TrackTags};
use crate::track::TrackIndex;

const COVERS_DIR: &str = "covers";
const TABLE_FILE: &str = "songs.csv";
const ILLEGAL_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8", "COM9", "LPT1",
    "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    pub language: Language,
    /// Place files under a folder per album.
    pub group_by_album: bool,
    /// Also save each cover as a PNG under `covers/`.
    pub export_covers: bool,
    /// Also write `songs.csv`.
    pub export_table: bool,
    /// Prepended to the album tag and folder name.
    pub album_prefix: Option<String>,
    pub genre: Option<String>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            language: Language::English,
            group_by_album: true,
            export_covers: false,
            export_table: false,
            album_prefix: Some("Muse Dash - ".into()),
            genre: Some("Video Games".into()),
        }
    }
}

impl ExportOptions {
    pub fn validate(&self) -> Result<()> {
        if self.genre.as_deref().is_some_and(|g| g.trim().is_empty()) {
            return Err(Error::Config("genre must not be blank".into()));
        }
        if let Some(prefix) = &self.album_prefix {
            if prefix.contains(ILLEGAL_CHARS) || prefix.chars().any(char::is_control) {
                return Err(Error::Config(format!(
                    "album prefix {prefix:?} contains characters not allowed in folder names"
                )));
            }
        }
        Ok(())
    }
}

/// A problem that did not stop a track from being written, or one that
/// dropped a song before export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportWarning {
    Correlation(CorrelationWarning),
    /// The cover texture could not be decoded. The track has no picture.
    CoverUnreadable { index: TrackIndex, reason: String },
    /// The cover PNG side file could not be written. The tag still has it.
    CoverNotSaved { index: TrackIndex, reason: String },
}

impl fmt::Display for ExportWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Correlation(warning) => fmt::Display::fmt(warning, f),
            Self::CoverUnreadable { index, reason } => write!(f, "cover for {index} unusable: {reason}"),
            Self::CoverNotSaved { index, reason } => write!(f, "could not save cover for {index}: {reason}"),
        }
    }
}

/// Progress notifications emitted during an export.
#[derive(Debug)]
pub enum ExportEvent<'a> {
    Started { tracks: usize },
    Warning(&'a ExportWarning),
    TrackWritten { position: usize, total: usize, path: &'a Path },
    TrackFailed { position: usize, total: usize, index: &'a TrackIndex, error: &'a Error },
    Finished(&'a ExportSummary),
}

pub type EventCallback<'a> = &'a dyn Fn(&ExportEvent<'_>);

#[derive(Debug, Default)]
pub struct ExportSummary {
    pub exported: usize,
    /// Streams dropped during correlation plus tracks not reached after a cancel.
    pub skipped: usize,
    pub failures: Vec<(TrackIndex, Error)>,
    pub warnings: Vec<ExportWarning>,
    /// Set when `songs.csv` was requested but could not be written.
    pub table_error: Option<Error>,
    pub cancelled: bool,
}

/// One row of `songs.csv`.
#[derive(Debug, Clone)]
struct TableRow {
    title: String,
    artist: String,
    album: String,
    album_number: u32,
    track_number: u32,
    track_total: Option<u32>,
    asset: String,
    index: TrackIndex,
    cover: String,
}

pub struct Exporter<'a> {
    options: ExportOptions,
    writer: TagWriter<'a>,
    on_event: Option<EventCallback<'a>>,
    cancel: Option<&'a AtomicBool>,
}

impl<'a> Exporter<'a> {
    pub fn new(options: ExportOptions, setups: &'a VorbisSetupLibrary) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options,
            writer: TagWriter::new(setups),
            on_event: None,
            cancel: None,
        })
    }

    #[must_use]
    pub fn on_event(mut self, callback: EventCallback<'a>) -> Self {
        self.on_event = Some(callback);
        self
    }

    /// Stop before the next track once `flag` is set.
    #[must_use]
    pub fn cancel_flag(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    fn emit(&self, event: &ExportEvent<'_>) {
        if let Some(callback) = self.on_event {
            callback(event);
        }
    }

    fn warn(&self, warnings: &mut Vec<ExportWarning>, warning: ExportWarning) {
        tracing::warn!("{warning}");
        self.emit(&ExportEvent::Warning(&warning));
        warnings.push(warning);
    }

    /// Write every correlated track below `output_dir`.
    ///
    /// A failing track is recorded in the summary and the run moves on, as
    /// does a table that cannot be written. Only failing to create
    /// `output_dir` aborts.
    pub fn export(&self, correlation: &Correlation<'_>, output_dir: &Path) -> Result<ExportSummary> {
        fs::create_dir_all(output_dir)?;
        let total = correlation.tracks.len();
        self.emit(&ExportEvent::Started { tracks: total });

        let mut summary = ExportSummary {
            skipped: correlation
                .warnings
                .iter()
                .filter(|w| !matches!(w, CorrelationWarning::MissingCover { .. }))
                .count(),
            ..ExportSummary::default()
        };
        for warning in &correlation.warnings {
            let warning = ExportWarning::Correlation(warning.clone());
            self.emit(&ExportEvent::Warning(&warning));
            summary.warnings.push(warning);
        }

        let mut claimed = HashSet::new();
        let mut rows = Vec::new();
        for (i, track) in correlation.tracks.iter().enumerate() {
            if self.cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                tracing::info!("Export cancelled; {} tracks left", total - i);
                summary.cancelled = true;
                summary.skipped += total - i;
                break;
            }
            let position = i + 1;
            match self.export_track(track, output_dir, &mut claimed, &mut summary.warnings) {
                Ok((path, row)) => {
                    tracing::info!("[{position}/{total}] {}", path.display());
                    self.emit(&ExportEvent::TrackWritten {
                        position,
                        total,
                        path: &path,
                    });
                    summary.exported += 1;
                    rows.push(row);
                }
                Err(error) => {
                    tracing::error!("[{position}/{total}] {} failed: {error}", track.index());
                    self.emit(&ExportEvent::TrackFailed {
                        position,
                        total,
                        index: track.index(),
                        error: &error,
                    });
                    summary.failures.push((track.index().clone(), error));
                }
            }
        }

        if self.options.export_table {
            let path = output_dir.join(TABLE_FILE);
            if let Err(error) = write_table(&path, &rows) {
                tracing::error!("Could not write {}: {error}", path.display());
                summary.table_error = Some(error);
            }
        }
        tracing::info!(
            "Exported {}, skipped {}, failed {}",
            summary.exported,
            summary.skipped,
            summary.failures.len()
        );
        self.emit(&ExportEvent::Finished(&summary));
        Ok(summary)
    }

    fn export_track(
        &self,
        track: &Track<'_>,
        output_dir: &Path,
        claimed: &mut HashSet<String>,
        warnings: &mut Vec<ExportWarning>,
    ) -> Result<(PathBuf, TableRow)> {
        let language = self.options.language;
        let meta = track.metadata;
        let stream = track.audio.load()?;
        let format = OutputFormat::for_codec(stream.format.codec)?;

        let title = meta.song.resolve(language);
        let album = meta.album.resolve(language);
        let tags = TrackTags {
            title: title.to_string(),
            artist: meta.artist.resolve(language).to_string(),
            album: format!("{}{album}", self.options.album_prefix.as_deref().unwrap_or_default()),
            track_number: Some(track.track_number()),
            track_total: meta.track_total,
            genre: self.options.genre.clone(),
        };

        let folder = self.options.group_by_album.then(|| sanitize(&tags.album));
        let dir = folder.as_ref().map_or_else(|| output_dir.to_path_buf(), |f| output_dir.join(f));
        fs::create_dir_all(&dir)?;
        let stem = claim_stem(&dir, &sanitize(title), claimed);
        let path = dir.join(format!("{stem}.{}", format.extension()));

        let cover_png = track.cover.and_then(|cover| match cover.to_png() {
            Ok(png) => Some(png),
            Err(e) => {
                let warning = ExportWarning::CoverUnreadable {
                    index: track.index().clone(),
                    reason: e.to_string(),
                };
                self.warn(warnings, warning);
                None
            }
        });

        self.writer.write(&stream, &tags, cover_png.as_deref(), &path)?;

        if let (true, Some(png)) = (self.options.export_covers, &cover_png) {
            let mut cover_dir = output_dir.join(COVERS_DIR);
            if let Some(folder) = &folder {
                cover_dir.push(folder);
            }
            let saved = fs::create_dir_all(&cover_dir).and_then(|()| fs::write(cover_dir.join(format!("{stem}.png")), png));
            if let Err(e) = saved {
                let warning = ExportWarning::CoverNotSaved {
                    index: track.index().clone(),
                    reason: e.to_string(),
                };
                self.warn(warnings, warning);
            }
        }

        let row = TableRow {
            title: tags.title,
            artist: tags.artist,
            album: album.to_string(),
            album_number: meta.album_number,
            track_number: track.track_number(),
            track_total: meta.track_total,
            asset: meta.cover.asset.clone(),
            index: track.index().clone(),
            cover: meta.cover.texture.clone(),
        };
        Ok((path, row))
    }
}

/// Make `name` safe as a single path segment on common filesystems.
pub fn sanitize(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if ILLEGAL_CHARS.contains(&c) || c.is_control() { '_' } else { c })
        .collect();
    let trimmed = replaced.trim_end_matches(['.', ' ']);
    if trimmed.is_empty() {
        return "_".into();
    }
    // Windows reserves the device names with any extension
    let (base, extension) = trimmed.split_at(trimmed.find('.').unwrap_or(trimmed.len()));
    if RESERVED_NAMES.iter().any(|r| r.eq_ignore_ascii_case(base.trim_end())) {
        return format!("{base}_{extension}");
    }
    trimmed.to_string()
}

/// First free `stem`, `stem (2)`, ... in `dir` for this run. Names are
/// compared case-insensitively.
fn claim_stem(dir: &Path, stem: &str, claimed: &mut HashSet<String>) -> String {
    let mut candidate = stem.to_string();
    let mut n = 1;
    while !claimed.insert(dir.join(&candidate).to_string_lossy().to_lowercase()) {
        n += 1;
        candidate = format!("{stem} ({n})");
    }
    candidate
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn write_table(path: &Path, rows: &[TableRow]) -> Result<()> {
    let mut out = String::from("\u{feff}");
    out.push_str("title,artist,album_number,album_name,track_number,track_total,asset_name,music_name,cover_name\r\n");
    for row in rows {
        let fields = [
            csv_field(&row.title),
            csv_field(&row.artist),
            row.album_number.to_string(),
            csv_field(&row.album),
            row.track_number.to_string(),
            row.track_total.map(|t| t.to_string()).unwrap_or_default(),
            csv_field(&row.asset),
            csv_field(row.index.as_str()),
            csv_field(&row.cover),
        ];
        out.push_str(&fields.join(","));
        out.push_str("\r\n");
    }
    let mut file = fs::File::create(path)?;
    file.write_all(out.as_bytes())?;
    tracing::info!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}
