//! Ogg page writer.

use std::io::Write;

use crate::error::Result;

const CAPTURE: &[u8; 4] = b"OggS";
const MAX_SEGMENTS: usize = 255;
/// Pages are closed at the first packet boundary past this body size.
const PAGE_TARGET: usize = 4096;

const FLAG_CONTINUED: u8 = 0x01;
const FLAG_BOS: u8 = 0x02;
const FLAG_EOS: u8 = 0x04;

const CRC_TABLE: [u32; 256] = crc_table();

const fn crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut r = (i as u32) << 24;
        let mut bit = 0;
        while bit < 8 {
            r = if r & 0x8000_0000 != 0 {
                (r << 1) ^ 0x04C1_1DB7
            } else {
                r << 1
            };
            bit += 1;
        }
        table[i] = r;
        i += 1;
    }
    table
}

/// Ogg's CRC32: polynomial 0x04C11DB7, no reflection, zero init.
pub(crate) fn checksum(data: &[u8]) -> u32 {
    data.iter()
        .fold(0, |crc, &b| (crc << 8) ^ CRC_TABLE[usize::from((crc >> 24) as u8 ^ b)])
}

/// Writes packets of one logical stream as Ogg pages.
pub(crate) struct PageWriter<W: Write> {
    out: W,
    serial: u32,
    sequence: u32,
    segments: Vec<u8>,
    body: Vec<u8>,
    granule: u64,
    packet_ended: bool,
    continued: bool,
}

impl<W: Write> PageWriter<W> {
    pub fn new(out: W, serial: u32) -> Self {
        Self {
            out,
            serial,
            sequence: 0,
            segments: Vec::with_capacity(MAX_SEGMENTS),
            body: Vec::new(),
            granule: 0,
            packet_ended: false,
            continued: false,
        }
    }

    /// Queue a packet that ends at `granule`. With `last`, the page is
    /// written with the end-of-stream flag.
    pub fn write_packet(&mut self, packet: &[u8], granule: u64, last: bool) -> Result<()> {
        let laces = packet.len() / 255 + 1;
        for i in 0..laces {
            if self.segments.len() == MAX_SEGMENTS {
                self.write_page(false)?;
                self.continued = i > 0;
            }
            let chunk = &packet[(i * 255).min(packet.len())..((i + 1) * 255).min(packet.len())];
            self.segments.push(chunk.len() as u8);
            self.body.extend_from_slice(chunk);
        }
        self.granule = granule;
        self.packet_ended = true;

        if last {
            self.write_page(true)
        } else if self.body.len() >= PAGE_TARGET {
            self.write_page(false)
        } else {
            Ok(())
        }
    }

    /// Close the current page so the next packet starts a new one.
    pub fn flush(&mut self) -> Result<()> {
        if self.segments.is_empty() {
            return Ok(());
        }
        self.write_page(false)
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_page(&mut self, eos: bool) -> Result<()> {
        let mut flags = 0;
        if self.continued {
            flags |= FLAG_CONTINUED;
        }
        if self.sequence == 0 {
            flags |= FLAG_BOS;
        }
        if eos {
            flags |= FLAG_EOS;
        }
        // no packet finishes on this page
        let granule = if self.packet_ended { self.granule } else { u64::MAX };

        let mut page = Vec::with_capacity(27 + self.segments.len() + self.body.len());
        page.extend_from_slice(CAPTURE);
        page.push(0);
        page.push(flags);
        page.extend_from_slice(&granule.to_le_bytes());
        page.extend_from_slice(&self.serial.to_le_bytes());
        page.extend_from_slice(&self.sequence.to_le_bytes());
        page.extend_from_slice(&[0; 4]);
        page.push(self.segments.len() as u8);
        page.extend_from_slice(&self.segments);
        page.extend_from_slice(&self.body);
        let crc = checksum(&page);
        page[22..26].copy_from_slice(&crc.to_le_bytes());
        self.out.write_all(&page)?;

        self.sequence += 1;
        self.segments.clear();
        self.body.clear();
        self.packet_ended = false;
        self.continued = false;
        Ok(())
    }
}

/// Reassemble the packets of an Ogg file and the granule position of its
/// last page, checking every page CRC.
#[cfg(test)]
pub(crate) fn read_packets(bytes: &[u8]) -> (Vec<Vec<u8>>, u64) {
    let mut packets = Vec::new();
    let mut current = Vec::new();
    let mut granule = 0;
    let mut pos = 0;
    while pos < bytes.len() {
        assert_eq!(&bytes[pos..pos + 4], CAPTURE, "page capture at {pos}");
        let count = usize::from(bytes[pos + 26]);
        let table = &bytes[pos + 27..pos + 27 + count];
        let body_len: usize = table.iter().map(|&l| usize::from(l)).sum();
        let end = pos + 27 + count + body_len;

        let mut page = bytes[pos..end].to_vec();
        let stored = u32::from_le_bytes(page[22..26].try_into().unwrap());
        page[22..26].fill(0);
        assert_eq!(checksum(&page), stored, "page CRC at {pos}");

        granule = u64::from_le_bytes(bytes[pos + 6..pos + 14].try_into().unwrap());
        let mut body = pos + 27 + count;
        for &lace in table {
            current.extend_from_slice(&bytes[body..body + usize::from(lace)]);
            body += usize::from(lace);
            if lace < 255 {
                packets.push(std::mem::take(&mut current));
            }
        }
        pos = end;
    }
    (packets, granule)
}
