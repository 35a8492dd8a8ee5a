//! Joining catalog rows, covers and audio streams into tracks.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::catalog::Catalog;
use crate::source::{AudioSource, CoverSource};
use crate::track::{CoverKey, TrackIndex, TrackMetadata};

/// One song ready to be written.
#[derive(Debug, Clone, Copy)]
pub struct Track<'a> {
    pub metadata: &'a TrackMetadata,
    pub cover: Option<&'a CoverSource>,
    pub audio: &'a AudioSource,
    /// 1-based position in stream order.
    pub position: usize,
}

impl Track<'_> {
    pub fn index(&self) -> &TrackIndex {
        self.audio.index()
    }

    /// The table's track number, or the stream position when it has none.
    pub fn track_number(&self) -> u32 {
        self.metadata
            .track_number
            .unwrap_or(self.position as u32)
    }
}

/// A recoverable mismatch between the inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorrelationWarning {
    /// A stream no catalog row refers to. The stream is skipped.
    UnknownStream { index: TrackIndex, position: usize },
    /// A stream whose key an earlier stream already used. Skipped.
    DuplicateStream { index: TrackIndex, position: usize },
    /// The row's cover was not found. The track is kept without a picture.
    MissingCover { index: TrackIndex, cover: CoverKey },
    /// No music bundle could be picked for the row. The song is skipped.
    MissingAudio { index: TrackIndex, reason: String },
}

impl fmt::Display for CorrelationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownStream { index, position } => {
                write!(f, "stream {position} ({index}) has no song entry")
            }
            Self::DuplicateStream { index, position } => {
                write!(f, "stream {position} repeats key {index}")
            }
            Self::MissingCover { index, cover } => write!(f, "cover {cover} for {index} not found"),
            Self::MissingAudio { index, reason } => write!(f, "no audio for {index}: {reason}"),
        }
    }
}

#[derive(Debug, Default)]
pub struct Correlation<'a> {
    pub tracks: Vec<Track<'a>>,
    pub warnings: Vec<CorrelationWarning>,
}

/// Pair every stream with its catalog row and cover, in stream order.
///
/// Rows without a stream are dropped silently.
pub fn correlate<'a>(
    catalog: &'a Catalog,
    covers: &'a HashMap<CoverKey, CoverSource>,
    streams: &'a [AudioSource],
) -> Correlation<'a> {
    let rows: HashMap<&TrackIndex, &TrackMetadata> =
        catalog.rows().iter().map(|row| (&row.index, row)).collect();

    let mut result = Correlation::default();
    let mut used = HashSet::new();
    for (i, audio) in streams.iter().enumerate() {
        let index = audio.index();
        let position = i + 1;
        let Some(&metadata) = rows.get(index) else {
            result.warnings.push(CorrelationWarning::UnknownStream {
                index: index.clone(),
                position,
            });
            continue;
        };
        if !used.insert(index) {
            result.warnings.push(CorrelationWarning::DuplicateStream {
                index: index.clone(),
                position,
            });
            continue;
        }
        let cover = covers.get(&metadata.cover);
        if cover.is_none() {
            result.warnings.push(CorrelationWarning::MissingCover {
                index: index.clone(),
                cover: metadata.cover.clone(),
            });
        }
        result.tracks.push(Track {
            metadata,
            cover,
            audio,
            position,
        });
    }

    for warning in &result.warnings {
        tracing::warn!("{warning}");
    }
    tracing::info!(
        "Correlated {} tracks from {} streams and {} songs",
        result.tracks.len(),
        streams.len(),
        catalog.len()
    );
    result
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::collections::HashMap;

    use crate::bank::testutil::FsbBuilder;
    use crate::bank::{Codec, SampleBank};
    use crate::bundle::{Texture2D, TextureFormat};
    use crate::catalog::Catalog;
    use crate::locale::LocalizedString;
    use crate::source::{AudioSource, CoverSource};
    use crate::track::{CoverKey, TrackIndex, TrackMetadata};

    pub fn row(key: &str, title: &str, track: u32) -> TrackMetadata {
        TrackMetadata {
            index: TrackIndex::from(key),
            song: LocalizedString::new(title),
            artist: LocalizedString::new("Artist"),
            album: LocalizedString::new("Album"),
            album_id: "ALBUM1".into(),
            album_number: 1,
            track_number: Some(track),
            track_total: None,
            cover: CoverKey::new(key, format!("{key}_cover")),
        }
    }

    pub fn cover(key: &str) -> (CoverKey, CoverSource) {
        let texture = Texture2D {
            name: format!("{key}_cover"),
            width: 1,
            height: 1,
            format: TextureFormat::Rgba32,
            data: vec![255, 0, 0, 255],
        };
        (CoverKey::new(key, format!("{key}_cover")), CoverSource::Resident(texture))
    }

    /// One PCM16 stream per key, in order, each with its own payload.
    pub fn streams(codec: Codec, keys: &[&str]) -> Vec<AudioSource> {
        let mut builder = FsbBuilder::new(codec);
        for (i, key) in keys.iter().enumerate() {
            builder = builder.sample(key, &[i as u8 + 1; 16], 4);
        }
        SampleBank::parse(builder.build())
            .unwrap()
            .audio_streams()
            .into_iter()
            .map(AudioSource::Resident)
            .collect()
    }

    pub fn catalog(keys: &[&str]) -> Catalog {
        Catalog::from_rows(
            keys.iter()
                .zip(1..)
                .map(|(key, track)| row(key, &format!("Song {key}"), track)),
        )
    }

    pub fn covers(keys: &[&str]) -> HashMap<CoverKey, CoverSource> {
        keys.iter().map(|key| cover(key)).collect()
    }
}
