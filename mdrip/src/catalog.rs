//! Song catalog built from the game's album and song tables.

use std::collections::HashSet;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::locale::{Language, LocalizedString};
use crate::track::{CoverKey, TrackIndex, TrackMetadata};

const ALBUM_INDEX: &str = "albums";

/// Supplies the raw text of the game's tables.
pub trait TableSource {
    /// Table `name` (`albums`, `ALBUM1`, ...) in its `language` variant.
    /// `Language::Default` selects the base table.
    fn table(&self, name: &str, language: Language) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct AlbumEntry {
    #[serde(rename = "jsonName", default)]
    json_name: Option<String>,
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
struct SongEntry {
    #[serde(default)]
    name: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    music: String,
    #[serde(default)]
    cover: String,
}

/// A localized table row; every field may be missing.
#[derive(Debug, Default, Deserialize)]
struct OverlayEntry {
    title: Option<String>,
    name: Option<String>,
    author: Option<String>,
}

/// All songs of the game, sorted by album then track number.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    rows: Vec<TrackMetadata>,
}

impl Catalog {
    /// Read the album index, every album's song table and the overlays for
    /// `languages`. Base tables are required; a missing or mismatched
    /// overlay only leaves that language's slots empty.
    pub fn load(source: &impl TableSource, languages: &[Language]) -> Result<Self> {
        let albums: Vec<AlbumEntry> = parse_table(&source.table(ALBUM_INDEX, Language::Default)?)?;
        let mut album_titles: Vec<LocalizedString> =
            albums.iter().map(|a| LocalizedString::new(&a.title)).collect();
        for &language in languages {
            if let Some(overlay) = load_overlay(source, ALBUM_INDEX, language, albums.len()) {
                for (title, entry) in album_titles.iter_mut().zip(overlay) {
                    if let Some(text) = entry.title {
                        title.set(language, text);
                    }
                }
            }
        }

        let mut rows = Vec::new();
        for (album, album_title) in albums.iter().zip(album_titles) {
            let Some(json_name) = album.json_name.as_deref().filter(|n| !n.is_empty()) else {
                tracing::debug!("Skipping album {:?} without a song table", album.title);
                continue;
            };
            let album_number = json_name
                .strip_prefix("ALBUM")
                .and_then(|n| n.parse::<u32>().ok())
                .ok_or_else(|| Error::corrupt("album index", format!("album table name {json_name:?}")))?;

            let songs: Vec<SongEntry> = parse_table(&source.table(json_name, Language::Default)?)?;
            let total = songs.len() as u32;
            let mut album_rows: Vec<TrackMetadata> = songs
                .into_iter()
                .zip(1..)
                .map(|(song, track)| TrackMetadata {
                    index: TrackIndex::from(song.music.as_str()),
                    song: LocalizedString::new(song.name),
                    artist: LocalizedString::new(song.author),
                    album: album_title.clone(),
                    album_id: json_name.to_string(),
                    album_number,
                    track_number: Some(track),
                    track_total: Some(total),
                    cover: cover_key(&song.cover),
                })
                .collect();

            for &language in languages {
                if let Some(overlay) = load_overlay(source, json_name, language, album_rows.len()) {
                    for (row, entry) in album_rows.iter_mut().zip(overlay) {
                        if let Some(name) = entry.name {
                            row.song.set(language, name);
                        }
                        if let Some(author) = entry.author {
                            row.artist.set(language, author);
                        }
                    }
                }
            }
            tracing::debug!("Album {json_name}: {} songs", album_rows.len());
            rows.extend(album_rows);
        }

        for row in &mut rows {
            apply_fixups(row);
        }
        let catalog = Self::from_rows(rows);
        tracing::info!("Catalog holds {} songs", catalog.rows.len());
        Ok(catalog)
    }

    /// Build a catalog from prepared rows. Later rows repeating a track
    /// index are dropped.
    pub fn from_rows(rows: impl IntoIterator<Item = TrackMetadata>) -> Self {
        let mut seen = HashSet::new();
        let mut rows: Vec<_> = rows
            .into_iter()
            .filter(|row| {
                let fresh = seen.insert(row.index.clone());
                if !fresh {
                    tracing::warn!("Duplicate song key {}; keeping the first entry", row.index);
                }
                fresh
            })
            .collect();
        rows.sort_by_key(|row| (row.album_number, row.track_number));
        Self { rows }
    }

    pub fn rows(&self) -> &[TrackMetadata] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn cover_key(cover: &str) -> CoverKey {
    let asset = cover.strip_suffix("_cover").unwrap_or(cover);
    CoverKey::new(asset, cover)
}

fn load_overlay(
    source: &impl TableSource,
    table: &str,
    language: Language,
    expected: usize,
) -> Option<Vec<OverlayEntry>> {
    language.table_suffix()?;
    let overlay = source
        .table(table, language)
        .and_then(|text| parse_table::<OverlayEntry>(&text));
    match overlay {
        Ok(entries) if entries.len() == expected => Some(entries),
        Ok(entries) => {
            tracing::warn!(
                "{language} table {table} has {} entries, expected {expected}; ignoring it",
                entries.len()
            );
            None
        }
        Err(e) => {
            tracing::warn!("No {language} table {table}: {e}");
            None
        }
    }
}

/// Corrections for known inconsistencies in the game's data.
fn apply_fixups(row: &mut TrackMetadata) {
    // chaos_glitch's asset and cover names are mangled
    if row.cover.texture == "chaos_glitch_cover" {
        row.cover.texture = "chaos_cover".into();
    }
    if row.cover.asset == "chaos_glitch" {
        row.cover.asset = "chaos".into();
    }
    row.album.map_all(|title| title.replace("Everyting", "Everything"));
    row.cover.asset = row.cover.asset.replace("_music", "");
    if row.cover.asset == "fm_17314_sugar_radio" {
        row.cover = CoverKey::new("qu_jianhai_de_rizi", "qu_jianhai_de_rizi_cover");
    }
}

fn parse_table<T: DeserializeOwned>(text: &str) -> Result<Vec<T>> {
    Ok(serde_json::from_str(&relax_json(text))?)
}

/// Drop a leading BOM and the trailing commas the game's tables contain.
pub(crate) fn relax_json(text: &str) -> String {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    // a comma and the whitespace following it, until the next token decides
    let mut held: Option<String> = None;
    for c in text.chars() {
        if in_string {
            out.push(c);
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        if let Some(mut pending) = held.take() {
            if c.is_whitespace() {
                pending.push(c);
                held = Some(pending);
                continue;
            }
            out.push_str(if matches!(c, ']' | '}') { &pending[1..] } else { &pending });
        }
        match c {
            ',' => {
                held = Some(String::from(","));
                continue;
            }
            '"' => in_string = true,
            _ => {}
        }
        out.push(c);
    }
    if let Some(pending) = held {
        out.push_str(&pending);
    }
    out
}
