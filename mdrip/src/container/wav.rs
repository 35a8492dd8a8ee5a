use std::io::{Seek, Write};

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::bank::{AudioStream, Codec};
use crate::error::{Error, Result};

fn spec_for(codec: Codec, channels: u16, sample_rate: u32) -> Result<WavSpec> {
    let (bits_per_sample, sample_format) = match codec {
        Codec::Pcm8 => (8, SampleFormat::Int),
        Codec::Pcm16 => (16, SampleFormat::Int),
        Codec::Pcm24 => (24, SampleFormat::Int),
        Codec::Pcm32 => (32, SampleFormat::Int),
        Codec::PcmFloat => (32, SampleFormat::Float),
        other => return Err(Error::UnsupportedCodec(format!("{other} in a WAVE container"))),
    };
    Ok(WavSpec {
        channels,
        sample_rate,
        bits_per_sample,
        sample_format,
    })
}

/// Wrap a PCM stream in a RIFF WAVE container.
///
/// Bank samples are little-endian and signed. A trailing partial frame is
/// dropped since WAVE data must hold whole frames.
pub(crate) fn write_wav<W: Write + Seek>(stream: &AudioStream, out: W) -> Result<()> {
    let format = &stream.format;
    if format.channels == 0 {
        return Err(Error::corrupt("sample bank", "PCM stream without channels"));
    }
    let spec = spec_for(format.codec, format.channels, format.frequency)?;
    let width = usize::from(spec.bits_per_sample / 8);
    let frame = width * usize::from(format.channels);
    let payload = stream.payload();
    let whole = payload.len() - payload.len() % frame;
    if whole != payload.len() {
        tracing::warn!(
            "{}: dropping {} bytes of a partial PCM frame",
            stream.index,
            payload.len() - whole
        );
    }

    let mut writer = WavWriter::new(out, spec)?;
    let mut samples = payload[..whole].chunks_exact(width);
    match format.codec {
        Codec::Pcm8 => samples.try_for_each(|s| writer.write_sample(i8::from_le_bytes([s[0]])))?,
        Codec::Pcm16 => samples.try_for_each(|s| writer.write_sample(i16::from_le_bytes([s[0], s[1]])))?,
        // shift into the top bytes and back to sign-extend
        Codec::Pcm24 => samples.try_for_each(|s| writer.write_sample(i32::from_le_bytes([0, s[0], s[1], s[2]]) >> 8))?,
        Codec::Pcm32 => samples.try_for_each(|s| writer.write_sample(i32::from_le_bytes([s[0], s[1], s[2], s[3]])))?,
        _ => samples.try_for_each(|s| writer.write_sample(f32::from_le_bytes([s[0], s[1], s[2], s[3]])))?,
    }
    writer.finalize()?;
    Ok(())
}

/// Find the `data` chunk of a RIFF WAVE file.
#[cfg(test)]
pub(crate) fn data_chunk(bytes: &[u8]) -> Option<&[u8]> {
    let mut pos = 12;
    while pos + 8 <= bytes.len() {
        let id = &bytes[pos..pos + 4];
        let len = u32::from_le_bytes(bytes[pos + 4..pos + 8].try_into().ok()?) as usize;
        let body = bytes.get(pos + 8..pos + 8 + len)?;
        if id == b"data" {
            return Some(body);
        }
        pos += 8 + len + len % 2;
    }
    None
}
