//! Demuxer for FMOD `FSB5` sample banks.
//!
//! A bank is a fixed header, one packed sample header per stream (with
//! optional extra chunks), an optional name table and the concatenated
//! stream payloads. Payloads are handed out as ranges over the shared bank
//! buffer and are never modified.

#[cfg(test)]
pub(crate) mod testutil;

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use crate::bundle::{ByteReader, Endian};
use crate::error::{Error, Result};
use crate::track::TrackIndex;

const MAGIC: &[u8; 4] = b"FSB5";
const CONTAINER: &str = "sample bank";

const CHUNK_CHANNELS: u32 = 1;
const CHUNK_FREQUENCY: u32 = 2;
const CHUNK_LOOP: u32 = 3;
const CHUNK_VORBIS_DATA: u32 = 11;

/// Stream codecs as numbered by the bank header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Pcm8,
    Pcm16,
    Pcm24,
    Pcm32,
    PcmFloat,
    GcAdpcm,
    ImaAdpcm,
    Vag,
    HeVag,
    Xma,
    Mpeg,
    Celt,
    At9,
    XWma,
    Vorbis,
    FAdpcm,
    Opus,
    Other(u32),
}

impl From<u32> for Codec {
    fn from(mode: u32) -> Self {
        match mode {
            1 => Self::Pcm8,
            2 => Self::Pcm16,
            3 => Self::Pcm24,
            4 => Self::Pcm32,
            5 => Self::PcmFloat,
            6 => Self::GcAdpcm,
            7 => Self::ImaAdpcm,
            8 => Self::Vag,
            9 => Self::HeVag,
            10 => Self::Xma,
            11 => Self::Mpeg,
            12 => Self::Celt,
            13 => Self::At9,
            14 => Self::XWma,
            15 => Self::Vorbis,
            16 => Self::FAdpcm,
            17 => Self::Opus,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(mode) => write!(f, "codec {mode}"),
            known => write!(f, "{known:?}"),
        }
    }
}

/// Declared format of one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFormat {
    pub codec: Codec,
    pub channels: u16,
    pub frequency: u32,
    /// Length in sample frames.
    pub samples: u64,
    /// CRC32 of the Vorbis setup header the stream was encoded with.
    pub vorbis_crc: Option<u32>,
    pub loop_range: Option<(u32, u32)>,
}

/// One stream as listed by the bank.
#[derive(Debug, Clone)]
pub struct BankStream {
    pub name: Option<String>,
    pub format: StreamFormat,
    range: Range<usize>,
}

impl BankStream {
    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

/// Where a bank's stream keys come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKey {
    /// The bank's name table.
    Declared,
    /// The 0-based stream position; used when the bank declares no names.
    Position,
}

/// A compressed stream ready for correlation and writing.
#[derive(Debug, Clone)]
pub struct AudioStream {
    pub index: TrackIndex,
    pub format: StreamFormat,
    bank: Arc<[u8]>,
    position: usize,
    range: Range<usize>,
}

impl AudioStream {
    /// The whole bank the stream was cut from.
    pub(crate) fn bank_bytes(&self) -> &[u8] {
        &self.bank
    }

    /// 0-based position of the stream in its bank.
    pub fn position(&self) -> usize {
        self.position
    }

    /// The stream bytes, exactly as stored in the bank.
    pub fn payload(&self) -> &[u8] {
        &self.bank[self.range.clone()]
    }

    /// Split the FSB Vorbis payload into packets.
    ///
    /// Packets are stored as a little-endian `u16` length and the packet
    /// bytes; a zero length or the end of the payload ends the stream.
    pub fn vorbis_packets(&self) -> Result<Vec<&[u8]>> {
        split_vorbis_packets(self.payload())
    }
}

pub(crate) fn split_vorbis_packets(payload: &[u8]) -> Result<Vec<&[u8]>> {
    let mut r = ByteReader::new(payload, Endian::Little, CONTAINER);
    let mut packets = Vec::new();
    while r.remaining() >= 2 {
        let len = usize::from(r.read_u16()?);
        if len == 0 {
            break;
        }
        packets.push(r.read_bytes(len)?);
    }
    Ok(packets)
}

/// A parsed sample bank.
#[derive(Debug, Clone)]
pub struct SampleBank {
    pub version: u32,
    pub codec: Codec,
    bytes: Arc<[u8]>,
    streams: Vec<BankStream>,
    join_key: JoinKey,
}

impl SampleBank {
    pub fn parse(bytes: impl Into<Arc<[u8]>>) -> Result<Self> {
        let bytes: Arc<[u8]> = bytes.into();
        let mut r = ByteReader::new(&bytes, Endian::Little, CONTAINER);

        let magic = r.read_array::<4>()?;
        if &magic != MAGIC {
            return Err(Error::corrupt(CONTAINER, format!("magic {magic:02x?}, expected FSB5")));
        }
        let version = r.read_u32()?;
        let header_len = match version {
            0 => 0x40,
            1 => 0x3C,
            other => {
                return Err(Error::UnsupportedVersion {
                    container: CONTAINER,
                    version: other.to_string(),
                });
            }
        };
        let count = r.read_u32()? as usize;
        let sample_headers_len = r.read_u32()? as usize;
        let name_table_len = r.read_u32()? as usize;
        let data_len = r.read_u32()? as usize;
        let codec = Codec::from(r.read_u32()?);
        r.seek(header_len)?;

        let mut headers = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            headers.push(read_sample_header(&mut r, codec)?);
        }

        let names_at = header_len + sample_headers_len;
        let names = if name_table_len > 0 {
            r.seek(names_at)?;
            let offsets = (0..count).map(|_| r.read_u32()).collect::<Result<Vec<_>>>()?;
            offsets
                .into_iter()
                .map(|offset| {
                    r.seek(names_at + offset as usize)?;
                    r.read_cstring().map(Some)
                })
                .collect::<Result<Vec<_>>>()?
        } else {
            vec![None; count]
        };

        let data_start = names_at + name_table_len;
        let mut streams = Vec::with_capacity(count);
        for (i, ((format, offset), name)) in headers.iter().cloned().zip(names).enumerate() {
            let next = headers.get(i + 1).map_or(data_len, |(_, next)| *next);
            if next < offset {
                return Err(Error::corrupt(
                    CONTAINER,
                    format!("stream {i} data offset {next} precedes {offset}"),
                ));
            }
            let range = data_start + offset..data_start + next;
            if range.end > bytes.len() {
                return Err(Error::TruncatedBank {
                    stream: i,
                    end: range.end as u64,
                    len: bytes.len() as u64,
                });
            }
            streams.push(BankStream { name, format, range });
        }

        let join_key = if name_table_len > 0 {
            JoinKey::Declared
        } else {
            JoinKey::Position
        };
        tracing::debug!(
            "Parsed FSB5 v{version}: {} streams, codec {codec}, keyed by {join_key:?}",
            streams.len()
        );
        Ok(Self {
            version,
            codec,
            bytes,
            streams,
            join_key,
        })
    }

    pub fn streams(&self) -> &[BankStream] {
        &self.streams
    }

    pub fn join_key(&self) -> JoinKey {
        self.join_key
    }

    pub fn payload(&self, stream: &BankStream) -> &[u8] {
        &self.bytes[stream.range.clone()]
    }

    /// Every stream in bank order, keyed by [`Self::join_key`].
    pub fn audio_streams(&self) -> Vec<AudioStream> {
        self.streams
            .iter()
            .enumerate()
            .map(|(position, stream)| {
                let index = match (self.join_key, &stream.name) {
                    (JoinKey::Declared, Some(name)) => TrackIndex::from(name.as_str()),
                    _ => TrackIndex::from(position),
                };
                self.stream(position, stream, index)
            })
            .collect()
    }

    /// The single stream of a bank wrapped by one audio clip, keyed by
    /// the clip's name.
    pub fn clip_stream(&self, clip_name: &str) -> Result<AudioStream> {
        let first = self
            .streams
            .first()
            .ok_or_else(|| Error::MissingResource(format!("stream in sample bank of clip '{clip_name}'")))?;
        if self.streams.len() > 1 {
            tracing::warn!(
                "Clip {clip_name} holds {} streams; using the first",
                self.streams.len()
            );
        }
        Ok(self.stream(0, first, TrackIndex::from(clip_name)))
    }

    fn stream(&self, position: usize, stream: &BankStream, index: TrackIndex) -> AudioStream {
        AudioStream {
            index,
            format: stream.format.clone(),
            bank: Arc::clone(&self.bytes),
            position,
            range: stream.range.clone(),
        }
    }
}

fn bits(value: u64, offset: u32, count: u32) -> u64 {
    (value >> offset) & ((1 << count) - 1)
}

fn frequency_from_index(index: u64) -> Option<u32> {
    Some(match index {
        1 => 8000,
        2 => 11000,
        3 => 11025,
        4 => 16000,
        5 => 22050,
        6 => 24000,
        7 => 32000,
        8 => 44100,
        9 => 48000,
        _ => return None,
    })
}

/// Read one packed sample header and its chunks. Returns the format and
/// the stream's offset in the data region.
fn read_sample_header(r: &mut ByteReader<'_>, codec: Codec) -> Result<(StreamFormat, usize)> {
    let raw = r.read_u64()?;
    let mut more_chunks = bits(raw, 0, 1) == 1;
    let mut frequency = frequency_from_index(bits(raw, 1, 4));
    let mut channels = bits(raw, 5, 1) as u16 + 1;
    let offset = bits(raw, 6, 28) as usize * 16;
    let samples = bits(raw, 34, 30);

    let mut vorbis_crc = None;
    let mut loop_range = None;
    while more_chunks {
        let chunk = r.read_u32()?;
        more_chunks = chunk & 1 == 1;
        let size = (chunk >> 1) & 0x00FF_FFFF;
        let kind = chunk >> 25;
        let body = r.read_bytes(size as usize)?;
        let mut c = ByteReader::new(body, Endian::Little, CONTAINER);
        match kind {
            CHUNK_CHANNELS => channels = u16::from(c.read_u8()?),
            CHUNK_FREQUENCY => frequency = Some(c.read_u32()?),
            CHUNK_LOOP => loop_range = Some((c.read_u32()?, c.read_u32()?)),
            CHUNK_VORBIS_DATA => vorbis_crc = Some(c.read_u32()?),
            other => tracing::debug!("Skipping FSB5 chunk type {other} ({size} bytes)"),
        }
    }

    let frequency = frequency
        .ok_or_else(|| Error::corrupt(CONTAINER, format!("unknown frequency index {}", bits(raw, 1, 4))))?;
    Ok((
        StreamFormat {
            codec,
            channels,
            frequency,
            samples,
            vorbis_crc,
            loop_range,
        },
        offset,
    ))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::testutil::FsbBuilder;
    use super::*;

    #[test]
    fn test_streams_in_bank_order() {
        let bytes = FsbBuilder::new(Codec::Pcm16)
            .sample("b_music", &[1; 32], 8)
            .sample("a_music", &[2; 16], 4)
            .build();
        let bank = SampleBank::parse(bytes).unwrap();
        assert_eq!(bank.join_key(), JoinKey::Declared);
        let names: Vec<_> = bank.streams().iter().map(|s| s.name.clone().unwrap()).collect();
        assert_eq!(names, ["b_music", "a_music"]);

        let streams = bank.audio_streams();
        assert_eq!(streams[0].index, TrackIndex::from("b_music"));
        assert_eq!(streams[0].payload(), &[1; 32]);
        assert_eq!(streams[1].payload(), &[2; 16]);
        assert_eq!(streams[1].format.samples, 4);
        assert_eq!(streams[1].format.frequency, 44100);
        assert_eq!(streams[1].format.channels, 2);
    }

    #[test]
    fn test_positional_keys_without_name_table() {
        let bytes = FsbBuilder::new(Codec::Pcm16)
            .without_names()
            .sample("ignored", &[1; 16], 4)
            .sample("ignored", &[2; 16], 4)
            .build();
        let bank = SampleBank::parse(bytes).unwrap();
        assert_eq!(bank.join_key(), JoinKey::Position);
        let keys: Vec<_> = bank.audio_streams().into_iter().map(|s| s.index).collect();
        assert_eq!(keys, [TrackIndex::from(0), TrackIndex::from(1)]);
    }

    #[test]
    fn test_version_zero_header() {
        let bytes = FsbBuilder::new(Codec::Mpeg).version(0).sample("x", &[9; 16], 1152).build();
        let bank = SampleBank::parse(bytes).unwrap();
        assert_eq!(bank.version, 0);
        assert_eq!(bank.payload(&bank.streams()[0]), &[9; 16]);
    }

    #[test]
    fn test_chunks() {
        let bytes = FsbBuilder::new(Codec::Vorbis)
            .vorbis_sample("v", &[&b"abc"[..], &b"de"[..]], 1000, 0xDEAD_BEEF)
            .channels(6)
            .frequency(96000)
            .build();
        let bank = SampleBank::parse(bytes).unwrap();
        let format = &bank.streams()[0].format;
        assert_eq!(format.vorbis_crc, Some(0xDEAD_BEEF));
        assert_eq!(format.channels, 6);
        assert_eq!(format.frequency, 96000);

        let stream = bank.clip_stream("v_music").unwrap();
        assert_eq!(stream.index, TrackIndex::from("v_music"));
        assert_eq!(stream.vorbis_packets().unwrap(), [&b"abc"[..], &b"de"[..]]);
    }

    #[test]
    fn test_truncated_bank() {
        let mut bytes = FsbBuilder::new(Codec::Pcm16)
            .sample("a", &[1; 16], 4)
            .sample("b", &[2; 32], 8)
            .build();
        bytes.truncate(bytes.len() - 8);
        let err = SampleBank::parse(bytes).unwrap_err();
        assert!(matches!(err, Error::TruncatedBank { stream: 1, .. }), "{err}");
    }

    #[test]
    fn test_bad_magic_and_version() {
        let mut bytes = FsbBuilder::new(Codec::Pcm16).sample("a", &[1; 16], 4).build();
        bytes[3] = b'4';
        assert!(matches!(
            SampleBank::parse(bytes.clone()).unwrap_err(),
            Error::CorruptContainer { .. }
        ));
        bytes[3] = b'5';
        bytes[4] = 7;
        assert!(matches!(
            SampleBank::parse(bytes).unwrap_err(),
            Error::UnsupportedVersion { .. }
        ));
    }

    #[test]
    fn test_packets_stop_at_zero_length() {
        let payload = [2, 0, b'h', b'i', 0, 0, 5, 0, 1, 2, 3, 4, 5];
        assert_eq!(split_vorbis_packets(&payload).unwrap(), [&b"hi"[..]]);
    }

    #[test]
    fn test_packet_overrun_is_corrupt() {
        let payload = [9, 0, 1, 2];
        assert!(matches!(
            split_vorbis_packets(&payload).unwrap_err(),
            Error::CorruptContainer { .. }
        ));
    }

    #[test]
    fn test_empty_clip_bank() {
        let bank = SampleBank::parse(FsbBuilder::new(Codec::Vorbis).build()).unwrap();
        assert!(matches!(bank.clip_stream("x").unwrap_err(), Error::MissingResource(_)));
    }
}
