//! Rebuilding Ogg Vorbis files from FSB5 Vorbis streams.
//!
//! FSB5 drops the three Vorbis header packets. The identification header
//! is regenerated from the declared format, the comment header is left
//! empty for the tagger, and the setup header is looked up by the CRC32 the
//! bank records for the stream.
//!
//! A [`VorbisSetupLibrary`] loaded from disk takes precedence. Streams whose
//! CRC it does not hold are rebuilt by `fsbex`, which ships the setup
//! headers of the FMOD encoder.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use super::ogg::PageWriter;
use crate::bank::AudioStream;
use crate::error::{Error, Result};

const CONTAINER: &str = "Vorbis setup header";
const SIGNATURE: &[u8; 6] = b"vorbis";
const SETUP_TYPE: u8 = 5;
const VENDOR: &str = "mdrip";

/// Block sizes FMOD encodes with, as log2.
const BLOCKSIZE_SHORT_LOG2: u8 = 8;
const BLOCKSIZE_LONG_LOG2: u8 = 11;

/// Setup header packets keyed by the CRC32 FSB5 stores for them.
#[derive(Debug, Clone, Default)]
pub struct VorbisSetupLibrary {
    headers: HashMap<u32, Vec<u8>>,
}

impl VorbisSetupLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every `*.bin` and `*.fvs_<crc>` file in `dir`.
    ///
    /// A file is keyed by the hex CRC in its name (`3c6a1a2f.bin`,
    /// `setup.fvs_3c6a1a2f`); otherwise by the CRC32 of its contents.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut library = Self::new();
        let entries = fs::read_dir(dir).map_err(|e| Error::loading(dir)(e.into()))?;
        for entry in entries {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let declared = if let Some((_, hex)) = name.rsplit_once(".fvs_") {
                u32::from_str_radix(hex, 16).ok()
            } else if let Some(stem) = name.strip_suffix(".bin") {
                u32::from_str_radix(stem, 16).ok()
            } else {
                continue;
            };
            let header = fs::read(&path).map_err(|e| Error::loading(&path)(e.into()))?;
            let crc = declared.unwrap_or_else(|| crc32fast::hash(&header));
            library.insert(crc, header);
        }
        tracing::info!("Loaded {} Vorbis setup headers from {}", library.len(), dir.display());
        Ok(library)
    }

    /// Register a setup header. The packet prefix (`0x05 "vorbis"`) is
    /// added when missing.
    pub fn insert(&mut self, crc: u32, header: Vec<u8>) {
        let packet = if header.get(1..7) == Some(SIGNATURE) && header.first() == Some(&SETUP_TYPE) {
            header
        } else {
            let mut packet = Vec::with_capacity(header.len() + 7);
            packet.push(SETUP_TYPE);
            packet.extend_from_slice(SIGNATURE);
            packet.extend_from_slice(&header);
            packet
        };
        self.headers.insert(crc, packet);
    }

    pub fn get(&self, crc: u32) -> Option<&[u8]> {
        self.headers.get(&crc).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

/// Reads bits of an LSB-first packed stream from the end towards the start.
struct BackwardBits<'a> {
    data: &'a [u8],
    /// Number of unread bits; the next bit read is `pos - 1`.
    pos: usize,
}

impl<'a> BackwardBits<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: data.len() * 8,
        }
    }

    fn bit(&mut self) -> Option<u32> {
        self.pos = self.pos.checked_sub(1)?;
        Some(u32::from(self.data[self.pos / 8] >> (self.pos % 8)) & 1)
    }

    /// A field of `n` bits written forward; reading backwards meets the
    /// most significant bit first.
    fn read(&mut self, n: u32) -> Option<u32> {
        let mut v = 0;
        for _ in 0..n {
            v = (v << 1) | self.bit()?;
        }
        Some(v)
    }

    fn peek(&self, n: u32) -> Option<u32> {
        let mut copy = BackwardBits {
            data: self.data,
            pos: self.pos,
        };
        copy.read(n)
    }
}

/// Recover each mode's block flag from the tail of a setup header.
///
/// The mode table is the last thing in the packet before the framing bit:
/// a 6-bit count, then per mode a block flag, window type, transform type
/// and mapping. Modes are parsed from the end; every point where the
/// preceding 6 bits match the number of modes read so far is a candidate
/// and the longest one wins.
pub(crate) fn mode_blockflags(setup: &[u8]) -> Result<Vec<bool>> {
    let mut bits = BackwardBits::new(setup);
    // padding after the framing bit
    loop {
        match bits.bit() {
            Some(1) => break,
            Some(_) => {}
            None => return Err(Error::corrupt(CONTAINER, "no framing bit")),
        }
    }

    let mut modes = Vec::new();
    let mut found = None;
    while modes.len() < 64 {
        let Some(mapping) = bits.read(8) else { break };
        if mapping > 63 || bits.read(16) != Some(0) || bits.read(16) != Some(0) {
            break;
        }
        let Some(blockflag) = bits.read(1) else { break };
        modes.push(blockflag == 1);
        if bits.peek(6).is_some_and(|count| count as usize + 1 == modes.len()) {
            found = Some(modes.clone());
        }
    }

    let mut flags = found.ok_or_else(|| Error::corrupt(CONTAINER, "mode table not found"))?;
    flags.reverse();
    Ok(flags)
}

/// Number of bits needed to store `v`.
fn ilog(v: usize) -> u32 {
    usize::BITS - v.leading_zeros()
}

fn identification_header(channels: u16, frequency: u32) -> Result<Vec<u8>> {
    let channels = u8::try_from(channels)
        .ok()
        .filter(|&c| c > 0)
        .ok_or_else(|| Error::UnsupportedCodec(format!("Vorbis with {channels} channels")))?;
    let mut header = Vec::with_capacity(30);
    header.push(1);
    header.extend_from_slice(SIGNATURE);
    header.extend_from_slice(&0u32.to_le_bytes());
    header.push(channels);
    header.extend_from_slice(&frequency.to_le_bytes());
    // maximum, nominal and minimum bitrate unset
    header.extend_from_slice(&[0; 12]);
    header.push(BLOCKSIZE_LONG_LOG2 << 4 | BLOCKSIZE_SHORT_LOG2);
    header.push(1);
    Ok(header)
}

fn comment_header() -> Vec<u8> {
    let mut header = Vec::with_capacity(16 + VENDOR.len());
    header.push(3);
    header.extend_from_slice(SIGNATURE);
    header.extend_from_slice(&(VENDOR.len() as u32).to_le_bytes());
    header.extend_from_slice(VENDOR.as_bytes());
    header.extend_from_slice(&0u32.to_le_bytes());
    header.push(1);
    header
}

/// Write `stream` as an Ogg Vorbis file.
pub(crate) fn write_ogg<W: Write>(stream: &AudioStream, setups: &VorbisSetupLibrary, out: W) -> Result<()> {
    let crc = stream
        .format
        .vorbis_crc
        .ok_or_else(|| Error::corrupt("sample bank", "Vorbis stream without setup CRC"))?;
    match setups.get(crc) {
        Some(setup) => write_with_setup(stream, setup, out),
        None => write_with_builtin(stream, crc, out),
    }
}

fn write_with_builtin<W: Write>(stream: &AudioStream, crc: u32, mut out: W) -> Result<()> {
    let failed = |reason: String| Error::VorbisRebuild { crc, reason };
    let bank = fsbex::Bank::new(stream.bank_bytes()).map_err(|e| failed(e.to_string()))?;
    let source = bank
        .into_iter()
        .nth(stream.position())
        .ok_or_else(|| failed(format!("bank has no stream {}", stream.position())))?;
    source.write(&mut out).map_err(|e| failed(e.to_string()))?;
    tracing::debug!("Rebuilt {} with the built-in setup header {crc:08x}", stream.index);
    Ok(())
}

/// Audio packets are copied unchanged.
fn write_with_setup<W: Write>(stream: &AudioStream, setup: &[u8], out: W) -> Result<()> {
    let format = &stream.format;
    let blockflags = mode_blockflags(setup)?;
    let mode_bits = ilog(blockflags.len() - 1);
    let blocksize = |long: bool| -> u64 {
        1 << if long { BLOCKSIZE_LONG_LOG2 } else { BLOCKSIZE_SHORT_LOG2 }
    };

    let packets = stream.vorbis_packets()?;
    let mut w = PageWriter::new(out, crc32fast::hash(stream.index.as_str().as_bytes()));
    w.write_packet(&identification_header(format.channels, format.frequency)?, 0, false)?;
    w.flush()?;
    w.write_packet(&comment_header(), 0, false)?;
    w.write_packet(setup, 0, packets.is_empty())?;
    w.flush()?;

    let mut granule = 0u64;
    let mut previous = None;
    for (i, packet) in packets.iter().enumerate() {
        let first = packet.first().copied().unwrap_or(0);
        if first & 1 != 0 {
            return Err(Error::corrupt("sample bank", format!("packet {i} is not an audio packet")));
        }
        let mode = (usize::from(first) >> 1) & ((1 << mode_bits) - 1);
        let long = *blockflags
            .get(mode)
            .ok_or_else(|| Error::corrupt("sample bank", format!("packet {i} uses undefined mode {mode}")))?;
        let size = blocksize(long);
        if let Some(prev) = previous {
            granule += (prev + size) / 4;
        }
        previous = Some(size);

        let last = i + 1 == packets.len();
        if last && format.samples > 0 {
            granule = granule.min(format.samples);
        }
        w.write_packet(packet, granule, last)?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testutil {
    /// LSB-first bit packer matching the Vorbis bitstream.
    #[derive(Default)]
    pub struct BitWriter {
        bytes: Vec<u8>,
        bits: usize,
    }

    impl BitWriter {
        pub fn write(&mut self, value: u32, n: u32) -> &mut Self {
            for i in 0..n {
                if self.bits % 8 == 0 {
                    self.bytes.push(0);
                }
                let bit = ((value >> i) & 1) as u8;
                let last = self.bytes.len() - 1;
                self.bytes[last] |= bit << (self.bits % 8);
                self.bits += 1;
            }
            self
        }

        pub fn finish(&mut self) -> Vec<u8> {
            std::mem::take(&mut self.bytes)
        }
    }

    /// A setup packet whose mode table declares `blockflags`. The part
    /// before the modes is filler that never parses as a mode.
    pub fn setup_header(blockflags: &[bool]) -> Vec<u8> {
        let mut w = BitWriter::default();
        for _ in 0..24 {
            w.write(0xFF, 8);
        }
        w.write(blockflags.len() as u32 - 1, 6);
        for (mapping, &flag) in blockflags.iter().enumerate() {
            w.write(u32::from(flag), 1).write(0, 16).write(0, 16).write(mapping as u32, 8);
        }
        w.write(1, 1);
        let mut packet = vec![5];
        packet.extend_from_slice(b"vorbis");
        packet.extend_from_slice(&w.finish());
        packet
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::testutil::setup_header;
    use super::*;
    use crate::bank::testutil::FsbBuilder;
    use crate::bank::{Codec, SampleBank};
    use crate::container::ogg::read_packets;

    const CRC: u32 = 0x1234_5678;

    fn library(blockflags: &[bool]) -> VorbisSetupLibrary {
        let mut library = VorbisSetupLibrary::new();
        library.insert(CRC, setup_header(blockflags));
        library
    }

    #[test]
    fn test_mode_blockflags() {
        for flags in [vec![false, true], vec![true], vec![false, false, true, true]] {
            assert_eq!(mode_blockflags(&setup_header(&flags)).unwrap(), flags);
        }
    }

    #[test]
    fn test_no_framing_bit() {
        assert!(mode_blockflags(&[0, 0, 0]).is_err());
    }

    #[test]
    fn test_ilog() {
        assert_eq!(ilog(0), 0);
        assert_eq!(ilog(1), 1);
        assert_eq!(ilog(3), 2);
        assert_eq!(ilog(4), 3);
    }

    #[test]
    fn test_rebuild_keeps_packets() {
        // mode 0 short, mode 1 long
        let audio: [&[u8]; 4] = [&[0x00, 1, 2], &[0x02, 3], &[0x02, 4, 5, 6], &[0x00, 7]];
        let bytes = FsbBuilder::new(Codec::Vorbis)
            .vorbis_sample("song_music", &audio, 5000, CRC)
            .build();
        let stream = SampleBank::parse(bytes).unwrap().clip_stream("song_music").unwrap();

        let mut ogg = Vec::new();
        write_ogg(&stream, &library(&[false, true]), &mut ogg).unwrap();
        let (packets, granule) = read_packets(&ogg);
        assert_eq!(packets.len(), 3 + audio.len());
        assert!(packets[0].starts_with(b"\x01vorbis"));
        assert!(packets[1].starts_with(b"\x03vorbis"));
        assert_eq!(packets[2], setup_header(&[false, true]));
        for (written, original) in packets[3..].iter().zip(audio) {
            assert_eq!(written.as_slice(), original);
        }
        // 0, (256+2048)/4, (2048+2048)/4, (2048+256)/4
        assert_eq!(granule, 576 + 1024 + 576);
    }

    #[test]
    fn test_final_granule_clamped() {
        let audio: [&[u8]; 3] = [&[0x02], &[0x02], &[0x02]];
        let bytes = FsbBuilder::new(Codec::Vorbis)
            .vorbis_sample("x", &audio, 1500, CRC)
            .build();
        let stream = SampleBank::parse(bytes).unwrap().clip_stream("x").unwrap();
        let mut ogg = Vec::new();
        write_ogg(&stream, &library(&[false, true]), &mut ogg).unwrap();
        assert_eq!(read_packets(&ogg).1, 1500);
    }

    #[test]
    fn test_unknown_crc_uses_builtin_headers() {
        // no FMOD encoder setup header hashes to this CRC
        let bytes = FsbBuilder::new(Codec::Vorbis)
            .vorbis_sample("x", &[&[0u8][..]], 10, 0xABCD)
            .build();
        let stream = SampleBank::parse(bytes).unwrap().clip_stream("x").unwrap();
        let mut out = Vec::new();
        let err = write_ogg(&stream, &VorbisSetupLibrary::new(), &mut out).unwrap_err();
        assert!(matches!(err, Error::VorbisRebuild { crc: 0xABCD, .. }));
        assert!(err.to_string().contains("0000abcd"));
    }

    #[test]
    fn test_library_overrides_builtin_headers() {
        let audio: [&[u8]; 1] = [&[0x00, 1]];
        let bytes = FsbBuilder::new(Codec::Vorbis).vorbis_sample("x", &audio, 10, CRC).build();
        let stream = SampleBank::parse(bytes).unwrap().clip_stream("x").unwrap();
        let mut ogg = Vec::new();
        write_ogg(&stream, &library(&[true]), &mut ogg).unwrap();
        // the test setup header is not one fsbex knows, so it came from the library
        assert_eq!(read_packets(&ogg).0[2], setup_header(&[true]));
    }

    #[test]
    fn test_load_dir() {
        let dir = tempfile::tempdir().unwrap();
        let named = setup_header(&[true]);
        fs::write(dir.path().join("00c0ffee.bin"), &named).unwrap();
        fs::write(dir.path().join("stream.fvs_0000beef"), b"raw").unwrap();
        fs::write(dir.path().join("other.bin"), b"hashed").unwrap();
        fs::write(dir.path().join("readme.txt"), b"ignored").unwrap();

        let library = VorbisSetupLibrary::load_dir(dir.path()).unwrap();
        assert_eq!(library.len(), 3);
        assert_eq!(library.get(0x00C0_FFEE), Some(named.as_slice()));
        assert_eq!(library.get(0xBEEF), Some(&b"\x05vorbisraw"[..]));
        assert_eq!(library.get(crc32fast::hash(b"hashed")), Some(&b"\x05vorbishashed"[..]));
    }
}
