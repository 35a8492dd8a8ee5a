use std::fmt;

use serde::Serialize;

use crate::locale::LocalizedString;

/// Key joining a song's table row to its audio stream.
///
/// Either the song's music asset name or, for banks that declare no
/// names, the stream's position in the bank.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TrackIndex(String);

impl TrackIndex {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TrackIndex {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<usize> for TrackIndex {
    fn from(position: usize) -> Self {
        Self(position.to_string())
    }
}

impl fmt::Display for TrackIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Locates a cover texture: the song asset whose bundle holds it and the
/// texture's name inside that bundle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CoverKey {
    pub asset: String,
    pub texture: String,
}

impl CoverKey {
    pub fn new(asset: impl Into<String>, texture: impl Into<String>) -> Self {
        Self {
            asset: asset.into(),
            texture: texture.into(),
        }
    }
}

impl fmt::Display for CoverKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.asset, self.texture)
    }
}

/// Descriptive data for one song, as read from the game's tables.
#[derive(Debug, Clone)]
pub struct TrackMetadata {
    pub index: TrackIndex,
    pub song: LocalizedString,
    pub artist: LocalizedString,
    pub album: LocalizedString,
    /// Table name of the album, e.g. `ALBUM1`.
    pub album_id: String,
    pub album_number: u32,
    pub track_number: Option<u32>,
    pub track_total: Option<u32>,
    pub cover: CoverKey,
}
