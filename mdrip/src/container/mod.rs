//! Output containers built around untouched bank payloads.

mod ogg;
mod vorbis;
mod wav;

use std::io::{Seek, Write};

pub use vorbis::VorbisSetupLibrary;

use crate::bank::{AudioStream, Codec};
use crate::error::{Error, Result};

#[cfg(test)]
pub(crate) use ogg::read_packets;
#[cfg(test)]
pub(crate) use vorbis::testutil::setup_header;
#[cfg(test)]
pub(crate) use wav::data_chunk;

/// Audio file type written for a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Ogg,
    Mp3,
    Wav,
}

impl OutputFormat {
    pub fn for_codec(codec: Codec) -> Result<Self> {
        match codec {
            Codec::Vorbis => Ok(Self::Ogg),
            Codec::Mpeg => Ok(Self::Mp3),
            Codec::Pcm8 | Codec::Pcm16 | Codec::Pcm24 | Codec::Pcm32 | Codec::PcmFloat => Ok(Self::Wav),
            other => Err(Error::UnsupportedCodec(other.to_string())),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Ogg => "ogg",
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
        }
    }
}

/// Write `stream` in the container matching its codec.
pub fn write_container<W: Write + Seek>(
    stream: &AudioStream,
    setups: &VorbisSetupLibrary,
    mut out: W,
) -> Result<OutputFormat> {
    let format = OutputFormat::for_codec(stream.format.codec)?;
    match format {
        OutputFormat::Ogg => vorbis::write_ogg(stream, setups, out)?,
        // MPEG streams are already a sequence of frames
        OutputFormat::Mp3 => out.write_all(stream.payload())?,
        OutputFormat::Wav => wav::write_wav(stream, out)?,
    }
    Ok(format)
}
