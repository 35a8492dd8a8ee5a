//! Audio and cover inputs, either already in memory or loaded per track.

use std::borrow::Cow;
use std::path::PathBuf;

use crate::bank::{AudioStream, SampleBank};
use crate::bundle::{Bundle, Texture2D};
use crate::error::{Error, Result};
use crate::track::TrackIndex;

/// Where a track's compressed audio comes from.
#[derive(Debug, Clone)]
pub enum AudioSource {
    Resident(AudioStream),
    /// An audio clip inside a bundle that is opened when the track is written.
    Deferred {
        index: TrackIndex,
        bundle: PathBuf,
        clip: String,
    },
}

impl AudioSource {
    /// A clip in `bundle`, keyed by the clip's name.
    pub fn deferred(bundle: impl Into<PathBuf>, clip: &str) -> Self {
        Self::Deferred {
            index: TrackIndex::from(clip),
            bundle: bundle.into(),
            clip: clip.to_string(),
        }
    }

    pub fn index(&self) -> &TrackIndex {
        match self {
            Self::Resident(stream) => &stream.index,
            Self::Deferred { index, .. } => index,
        }
    }

    pub fn load(&self) -> Result<Cow<'_, AudioStream>> {
        match self {
            Self::Resident(stream) => Ok(Cow::Borrowed(stream)),
            Self::Deferred { bundle, clip, .. } => {
                let stream = Bundle::open(bundle)
                    .and_then(|b| b.audio_clip(clip))
                    .and_then(|c| SampleBank::parse(c.data)?.clip_stream(&c.name))
                    .map_err(Error::loading(bundle))?;
                tracing::debug!("Loaded {} ({}) from {}", clip, stream.format.codec, bundle.display());
                Ok(Cow::Owned(stream))
            }
        }
    }
}

/// Where a track's cover texture comes from.
#[derive(Debug, Clone)]
pub enum CoverSource {
    Resident(Texture2D),
    Deferred { bundle: PathBuf, texture: String },
}

impl CoverSource {
    pub fn load(&self) -> Result<Cow<'_, Texture2D>> {
        match self {
            Self::Resident(texture) => Ok(Cow::Borrowed(texture)),
            Self::Deferred { bundle, texture } => Bundle::open(bundle)
                .and_then(|b| b.texture(texture))
                .map(Cow::Owned)
                .map_err(Error::loading(bundle)),
        }
    }

    /// The cover encoded as PNG.
    pub fn to_png(&self) -> Result<Vec<u8>> {
        self.load()?.to_png()
    }
}
