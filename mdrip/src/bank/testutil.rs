//! Builder for synthetic FSB5 banks used by the unit tests.

use super::Codec;

struct Sample {
    name: String,
    data: Vec<u8>,
    samples: u64,
    channels: u16,
    frequency: u32,
    vorbis_crc: Option<u32>,
}

pub(crate) struct FsbBuilder {
    version: u32,
    mode: u32,
    names: bool,
    samples: Vec<Sample>,
}

fn codec_mode(codec: Codec) -> u32 {
    (1..=17).find(|&mode| Codec::from(mode) == codec).unwrap_or(0)
}

fn frequency_index(hz: u32) -> Option<u64> {
    [8000, 11000, 11025, 16000, 22050, 24000, 32000, 44100, 48000]
        .iter()
        .position(|&f| f == hz)
        .map(|i| i as u64 + 1)
}

impl FsbBuilder {
    pub fn new(codec: Codec) -> Self {
        Self {
            version: 1,
            mode: codec_mode(codec),
            names: true,
            samples: Vec::new(),
        }
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn without_names(mut self) -> Self {
        self.names = false;
        self
    }

    /// Stereo 44.1 kHz stream. Payloads are padded to 16 bytes in the bank.
    pub fn sample(mut self, name: &str, data: &[u8], samples: u64) -> Self {
        self.samples.push(Sample {
            name: name.to_string(),
            data: data.to_vec(),
            samples,
            channels: 2,
            frequency: 44100,
            vorbis_crc: None,
        });
        self
    }

    /// Vorbis stream framed the way FSB5 stores its packets.
    pub fn vorbis_sample(mut self, name: &str, packets: &[&[u8]], samples: u64, crc: u32) -> Self {
        let mut data = Vec::new();
        for packet in packets {
            data.extend_from_slice(&(packet.len() as u16).to_le_bytes());
            data.extend_from_slice(packet);
        }
        self = self.sample(name, &data, samples);
        if let Some(last) = self.samples.last_mut() {
            last.vorbis_crc = Some(crc);
        }
        self
    }

    /// Channel count of the most recently added stream.
    pub fn channels(mut self, channels: u16) -> Self {
        if let Some(last) = self.samples.last_mut() {
            last.channels = channels;
        }
        self
    }

    /// Sample rate of the most recently added stream.
    pub fn frequency(mut self, hz: u32) -> Self {
        if let Some(last) = self.samples.last_mut() {
            last.frequency = hz;
        }
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut headers = Vec::new();
        let mut data = Vec::new();
        for sample in &self.samples {
            let mut chunks: Vec<(u32, Vec<u8>)> = Vec::new();
            if sample.channels > 2 {
                chunks.push((1, vec![sample.channels as u8]));
            }
            let index = frequency_index(sample.frequency);
            if index.is_none() {
                chunks.push((2, sample.frequency.to_le_bytes().to_vec()));
            }
            if let Some(crc) = sample.vorbis_crc {
                let mut body = crc.to_le_bytes().to_vec();
                // empty seek table
                body.extend_from_slice(&0u32.to_le_bytes());
                chunks.push((11, body));
            }

            let stereo = u64::from(sample.channels == 2);
            let raw = u64::from(!chunks.is_empty())
                | index.unwrap_or(0) << 1
                | stereo << 5
                | (data.len() as u64 / 16) << 6
                | sample.samples << 34;
            headers.extend_from_slice(&raw.to_le_bytes());
            let last = chunks.len().saturating_sub(1);
            for (i, (kind, body)) in chunks.iter().enumerate() {
                let word = u32::from(i != last) | (body.len() as u32) << 1 | kind << 25;
                headers.extend_from_slice(&word.to_le_bytes());
                headers.extend_from_slice(body);
            }

            data.extend_from_slice(&sample.data);
            data.resize(data.len().next_multiple_of(16), 0);
        }

        let mut names = Vec::new();
        if self.names && !self.samples.is_empty() {
            let mut strings = Vec::new();
            let table_len = self.samples.len() * 4;
            for sample in &self.samples {
                names.extend_from_slice(&((table_len + strings.len()) as u32).to_le_bytes());
                strings.extend_from_slice(sample.name.as_bytes());
                strings.push(0);
            }
            names.extend_from_slice(&strings);
            names.resize(names.len().next_multiple_of(16), 0);
        }

        let header_len = if self.version == 0 { 0x40 } else { 0x3C };
        let mut out = Vec::new();
        out.extend_from_slice(b"FSB5");
        for field in [
            self.version,
            self.samples.len() as u32,
            headers.len() as u32,
            names.len() as u32,
            data.len() as u32,
            self.mode,
        ] {
            out.extend_from_slice(&field.to_le_bytes());
        }
        out.resize(header_len, 0);
        out.extend_from_slice(&headers);
        out.extend_from_slice(&names);
        out.extend_from_slice(&data);
        out
    }
}
