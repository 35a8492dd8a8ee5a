//! Reader for Unity `UnityFS` asset bundles.
//!
//! A bundle is a header, a (possibly compressed) block table and a list of
//! nodes that slice the concatenated, decompressed blocks. Nodes flagged as
//! serialized files hold the object tables; the others (`.resS`,
//! `.resource`) are raw streams referenced by textures and audio clips.
//!
//! Only the object classes this tool consumes are decoded; see [`object`].

mod object;
mod reader;
mod serialized;
mod texture;

#[cfg(test)]
pub(crate) mod testutil;

use std::fs;
use std::path::{Path, PathBuf};

pub use object::{AudioClip, ClassId, ObjectInfo, TextAsset, Texture2D};
pub(crate) use reader::{ByteReader, Endian};
pub use serialized::{SerializedFile, UnityVersion};
pub use texture::TextureFormat;

use crate::error::{Error, Result};

const SIGNATURE: &str = "UnityFS";
const CONTAINER: &str = "asset bundle";
const SUPPORTED_FORMATS: std::ops::RangeInclusive<u32> = 6..=8;

const FLAG_COMPRESSION_MASK: u32 = 0x3F;
const FLAG_BLOCKS_INFO_AT_END: u32 = 0x80;
const FLAG_PADDING_AT_START: u32 = 0x200;
const NODE_FLAG_SERIALIZED: u32 = 0x4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Compression {
    None,
    Lz4,
}

impl Compression {
    fn from_flags(flags: u32) -> Result<Self> {
        match flags & FLAG_COMPRESSION_MASK {
            0 => Ok(Self::None),
            // LZ4 and LZ4HC share the block format
            2 | 3 => Ok(Self::Lz4),
            other => Err(Error::UnsupportedCompression(other)),
        }
    }

    fn decompress(self, data: &[u8], size: usize) -> Result<Vec<u8>> {
        match self {
            Self::None => Ok(data.to_vec()),
            Self::Lz4 => lz4_flex::block::decompress(data, size)
                .map_err(|e| Error::Decompression(format!("LZ4 block: {e}"))),
        }
    }
}

#[derive(Debug, Clone)]
struct BlockInfo {
    uncompressed_size: u32,
    compressed_size: u32,
    flags: u16,
}

/// One entry of the bundle's directory.
#[derive(Debug, Clone)]
pub struct Node {
    pub path: String,
    offset: usize,
    size: usize,
    flags: u32,
}

impl Node {
    pub fn is_serialized_file(&self) -> bool {
        self.flags & NODE_FLAG_SERIALIZED != 0
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

/// A parsed asset bundle. Holds the decompressed data for its lifetime.
#[derive(Debug)]
pub struct Bundle {
    pub path: Option<PathBuf>,
    pub format_version: u32,
    pub engine_version: String,
    data: Vec<u8>,
    nodes: Vec<Node>,
    files: Vec<SerializedFile>,
}

impl Bundle {
    /// Read and parse a bundle from disk. Errors carry the bundle path.
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| Error::loading(path)(e.into()))?;
        let mut bundle = Self::parse(&bytes).map_err(Error::loading(path))?;
        bundle.path = Some(path.to_path_buf());
        Ok(bundle)
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(bytes, Endian::Big, CONTAINER);

        let signature = r.read_cstring()?;
        if signature != SIGNATURE {
            return Err(Error::corrupt(
                CONTAINER,
                format!("signature {signature:?}, expected {SIGNATURE:?}"),
            ));
        }
        let format_version = r.read_u32()?;
        if !SUPPORTED_FORMATS.contains(&format_version) {
            return Err(Error::UnsupportedVersion {
                container: CONTAINER,
                version: format_version.to_string(),
            });
        }
        let _player_version = r.read_cstring()?;
        let engine_version = r.read_cstring()?;
        let _total_size = r.read_i64()?;
        let compressed_info_size = r.read_u32()? as usize;
        let uncompressed_info_size = r.read_u32()? as usize;
        let flags = r.read_u32()?;

        if format_version >= 7 {
            r.align(16)?;
        }

        let info_bytes = if flags & FLAG_BLOCKS_INFO_AT_END != 0 {
            let start = bytes.len().checked_sub(compressed_info_size).ok_or_else(|| {
                Error::corrupt(CONTAINER, "block info larger than the file")
            })?;
            &bytes[start..]
        } else {
            r.read_bytes(compressed_info_size)?
        };
        let info = Compression::from_flags(flags)?.decompress(info_bytes, uncompressed_info_size)?;
        let (blocks, nodes) = read_blocks_info(&info)?;

        if flags & FLAG_PADDING_AT_START != 0 {
            r.align(16)?;
        }

        let data = read_blocks(&mut r, &blocks)?;
        for node in &nodes {
            if node.offset.checked_add(node.size).is_none_or(|end| end > data.len()) {
                return Err(Error::corrupt(
                    CONTAINER,
                    format!("node {} lies outside the block data", node.path),
                ));
            }
        }

        let mut bundle = Self {
            path: None,
            format_version,
            engine_version,
            data,
            nodes,
            files: Vec::new(),
        };
        bundle.files = bundle
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.is_serialized_file())
            .map(|(i, node)| SerializedFile::parse(&bundle.data[node.offset..node.offset + node.size], i))
            .collect::<Result<_>>()?;

        tracing::debug!(
            "Parsed bundle: {} nodes, {} serialized files, engine {}",
            bundle.nodes.len(),
            bundle.files.len(),
            bundle.engine_version
        );
        Ok(bundle)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Raw bytes of a node.
    pub fn node_data(&self, node: &Node) -> &[u8] {
        &self.data[node.offset..node.offset + node.size]
    }

    /// Find a stream node by a resource path such as
    /// `archive:/CAB-0123/CAB-0123.resS`. Matches on the final segment.
    pub fn find_node(&self, resource_path: &str) -> Option<&Node> {
        let name = resource_path.rsplit('/').next().unwrap_or(resource_path);
        self.nodes
            .iter()
            .find(|node| node.path.rsplit('/').next() == Some(name))
    }

    /// Every object of every serialized file, in file order.
    pub fn objects(&self) -> impl Iterator<Item = ObjectInfo> + '_ {
        self.files.iter().flat_map(move |file| {
            let data = self.node_data(&self.nodes[file.node]);
            file.objects.iter().map(move |entry| ObjectInfo::describe(file, entry, data))
        })
    }

    /// Find the first object of `class` named `name`.
    fn find(&self, class: ClassId, name: &str) -> Result<(&SerializedFile, &[u8])> {
        for file in &self.files {
            let data = self.node_data(&self.nodes[file.node]);
            for entry in file.objects.iter().filter(|o| o.class == class) {
                let bytes = file.object_bytes(entry, data)?;
                if object::read_name(file, bytes)? == name {
                    return Ok((file, bytes));
                }
            }
        }
        Err(Error::MissingResource(format!("{class} '{name}'")))
    }

    pub fn text_asset(&self, name: &str) -> Result<TextAsset> {
        let (file, bytes) = self.find(ClassId::TextAsset, name)?;
        TextAsset::read(file, bytes)
    }

    pub fn texture(&self, name: &str) -> Result<Texture2D> {
        let (file, bytes) = self.find(ClassId::Texture2D, name)?;
        Texture2D::read(file, bytes, self)
    }

    pub fn audio_clip(&self, name: &str) -> Result<AudioClip> {
        let (file, bytes) = self.find(ClassId::AudioClip, name)?;
        AudioClip::read(file, bytes, self)
    }

    /// Slice `size` bytes at `offset` out of the stream node named by
    /// `source`, as referenced by streamed textures and audio resources.
    pub(crate) fn stream_slice(&self, source: &str, offset: u64, size: u64) -> Result<&[u8]> {
        let node = self
            .find_node(source)
            .ok_or_else(|| Error::MissingResource(format!("stream node {source}")))?;
        let data = self.node_data(node);
        let start = usize::try_from(offset).ok();
        let end = start.zip(usize::try_from(size).ok()).and_then(|(s, n)| s.checked_add(n));
        match (start, end) {
            (Some(start), Some(end)) if end <= data.len() => Ok(&data[start..end]),
            _ => Err(Error::corrupt(
                CONTAINER,
                format!("resource range {offset}+{size} outside {source}"),
            )),
        }
    }
}

fn read_blocks_info(info: &[u8]) -> Result<(Vec<BlockInfo>, Vec<Node>)> {
    let mut r = ByteReader::new(info, Endian::Big, CONTAINER);
    r.skip(16)?; // uncompressed data hash

    let block_count = r.read_len()?;
    let mut blocks = Vec::with_capacity(block_count.min(4096));
    for _ in 0..block_count {
        blocks.push(BlockInfo {
            uncompressed_size: r.read_u32()?,
            compressed_size: r.read_u32()?,
            flags: r.read_u16()?,
        });
    }

    let node_count = r.read_len()?;
    let mut nodes = Vec::with_capacity(node_count.min(4096));
    for _ in 0..node_count {
        let offset = r.read_i64()?;
        let size = r.read_i64()?;
        let flags = r.read_u32()?;
        let path = r.read_cstring()?;
        let (Ok(offset), Ok(size)) = (usize::try_from(offset), usize::try_from(size)) else {
            return Err(Error::corrupt(CONTAINER, format!("node {path} has a negative range")));
        };
        nodes.push(Node {
            path,
            offset,
            size,
            flags,
        });
    }
    Ok((blocks, nodes))
}

fn read_blocks(r: &mut ByteReader<'_>, blocks: &[BlockInfo]) -> Result<Vec<u8>> {
    let total: usize = blocks.iter().map(|b| b.uncompressed_size as usize).sum();
    let mut data = Vec::with_capacity(total);
    for block in blocks {
        let raw = r.read_bytes(block.compressed_size as usize)?;
        let compression = Compression::from_flags(u32::from(block.flags))?;
        let chunk = compression.decompress(raw, block.uncompressed_size as usize)?;
        if chunk.len() != block.uncompressed_size as usize {
            return Err(Error::Decompression(format!(
                "block decompressed to {} bytes, expected {}",
                chunk.len(),
                block.uncompressed_size
            )));
        }
        data.extend_from_slice(&chunk);
    }
    Ok(data)
}
