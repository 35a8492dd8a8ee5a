use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt {container}: {reason}")]
    CorruptContainer {
        container: &'static str,
        reason: String,
    },
    #[error("unsupported {container} version {version}")]
    UnsupportedVersion {
        container: &'static str,
        version: String,
    },
    #[error("unsupported block compression type {0}")]
    UnsupportedCompression(u32),
    #[error("decompression failed: {0}")]
    Decompression(String),
    #[error("sample bank truncated: stream {stream} ends at {end} but the bank holds {len} bytes")]
    TruncatedBank { stream: usize, end: u64, len: u64 },
    #[error("missing resource: {0}")]
    MissingResource(String),
    #[error("unsupported codec: {0}")]
    UnsupportedCodec(String),
    #[error("cannot rebuild Vorbis stream with setup CRC {crc:08x}: {reason}")]
    VorbisRebuild { crc: u32, reason: String },
    #[error("WAVE encoding failed: {0}")]
    Wav(#[from] hound::Error),
    #[error("texture error: {0}")]
    Texture(String),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("tagging error: {0}")]
    Tag(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to load {}: {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub(crate) fn corrupt(container: &'static str, reason: impl Into<String>) -> Self {
        Self::CorruptContainer {
            container,
            reason: reason.into(),
        }
    }

    /// Attach the path of the input that failed to load.
    pub(crate) fn loading(path: impl Into<PathBuf>) -> impl FnOnce(Self) -> Self {
        let path = path.into();
        move |source| match source {
            already @ Self::Load { .. } => already,
            source => Self::Load {
                path,
                source: Box::new(source),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
