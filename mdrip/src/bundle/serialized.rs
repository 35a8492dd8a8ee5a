use std::fmt;

use super::object::ClassId;
use super::{ByteReader, Endian};
use crate::error::{Error, Result};

const CONTAINER: &str = "serialized file";
const MIN_VERSION: u32 = 17;
const MAX_VERSION: u32 = 22;
const SCRIPT_CLASS: i32 = 114;

/// `major.minor` of the engine that wrote a serialized file. Object field
/// layouts are selected by this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct UnityVersion {
    pub major: u32,
    pub minor: u32,
}

impl UnityVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Parse strings such as `2019.4.32f1`. Stripped builds write
    /// `0.0.0`, which parses but selects the oldest layouts.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.split(|c: char| !c.is_ascii_digit());
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        Some(Self { major, minor })
    }
}

impl fmt::Display for UnityVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ObjectEntry {
    pub path_id: i64,
    pub class: ClassId,
    pub byte_start: u64,
    pub byte_size: u32,
}

/// Object table of one serialized file inside a bundle.
///
/// The type trees are skipped, not interpreted: the handful of classes this
/// crate reads have fixed layouts per engine version.
#[derive(Debug)]
pub struct SerializedFile {
    pub version: u32,
    pub unity: UnityVersion,
    pub(crate) endian: Endian,
    pub(crate) node: usize,
    pub(crate) objects: Vec<ObjectEntry>,
}

impl SerializedFile {
    /// Parse the header and metadata of the serialized file in `data`,
    /// which belongs to bundle node number `node`.
    pub(crate) fn parse(data: &[u8], node: usize) -> Result<Self> {
        let mut r = ByteReader::new(data, Endian::Big, CONTAINER);

        let _metadata_size = r.read_u32()?;
        let _file_size = r.read_u32()?;
        let version = r.read_u32()?;
        let mut data_offset = u64::from(r.read_u32()?);

        if !(MIN_VERSION..=MAX_VERSION).contains(&version) {
            return Err(Error::UnsupportedVersion {
                container: CONTAINER,
                version: version.to_string(),
            });
        }

        let endian = if r.read_u8()? == 0 {
            Endian::Little
        } else {
            Endian::Big
        };
        r.skip(3)?;

        if version >= 22 {
            let _metadata_size = r.read_u32()?;
            let _file_size = r.read_i64()?;
            data_offset = r.read_u64()?;
            let _unknown = r.read_i64()?;
        }

        r.set_endian(endian);
        let unity_string = r.read_cstring()?;
        let unity = UnityVersion::parse(&unity_string).unwrap_or(UnityVersion::new(0, 0));
        let _platform = r.read_i32()?;
        let type_trees = r.read_bool()?;

        let type_count = r.read_len()?;
        let mut classes = Vec::with_capacity(type_count.min(1024));
        for _ in 0..type_count {
            classes.push(read_type(&mut r, version, type_trees)?);
        }

        let object_count = r.read_len()?;
        let mut objects = Vec::with_capacity(object_count.min(65536));
        for _ in 0..object_count {
            r.align(4)?;
            let path_id = r.read_i64()?;
            let byte_start = if version >= 22 {
                r.read_u64()?
            } else {
                u64::from(r.read_u32()?)
            };
            let byte_size = r.read_u32()?;
            let type_index = r.read_i32()?;
            let class = usize::try_from(type_index)
                .ok()
                .and_then(|i| classes.get(i))
                .copied()
                .ok_or_else(|| {
                    Error::corrupt(CONTAINER, format!("object {path_id} has type index {type_index}"))
                })?;
            objects.push(ObjectEntry {
                path_id,
                class: ClassId::from(class),
                byte_start: byte_start + data_offset,
                byte_size,
            });
        }

        tracing::debug!(
            "Serialized file v{version} (engine {unity_string}): {} types, {} objects",
            classes.len(),
            objects.len()
        );

        Ok(Self {
            version,
            unity,
            endian,
            node,
            objects,
        })
    }

    /// The serialized bytes of one object.
    pub(crate) fn object_bytes<'d>(&self, entry: &ObjectEntry, data: &'d [u8]) -> Result<&'d [u8]> {
        let start = usize::try_from(entry.byte_start).ok();
        match start.and_then(|s| s.checked_add(entry.byte_size as usize).map(|e| (s, e))) {
            Some((start, end)) if end <= data.len() => Ok(&data[start..end]),
            _ => Err(Error::corrupt(
                CONTAINER,
                format!("object {} lies outside the file", entry.path_id),
            )),
        }
    }

    pub(crate) fn reader<'d>(&self, bytes: &'d [u8]) -> ByteReader<'d> {
        ByteReader::new(bytes, self.endian, "object")
    }
}

/// Read one entry of the type table and return its class id.
fn read_type(r: &mut ByteReader<'_>, version: u32, type_trees: bool) -> Result<i32> {
    let class_id = r.read_i32()?;
    let _stripped = r.read_bool()?;
    let _script_index = r.read_i16()?;
    if class_id == SCRIPT_CLASS {
        r.skip(16)?; // script id
    }
    r.skip(16)?; // old type hash

    if type_trees {
        skip_type_tree(r, version)?;
        if version >= 21 {
            let dependencies = r.read_len()?;
            r.skip(dependencies * 4)?;
        }
    }
    Ok(class_id)
}

/// Type trees are stored as a flat node array followed by a string buffer.
fn skip_type_tree(r: &mut ByteReader<'_>, version: u32) -> Result<()> {
    let node_count = r.read_len()?;
    let string_buffer = r.read_len()?;
    let node_size = if version >= 19 { 32 } else { 24 };
    r.skip(node_count * node_size + string_buffer)
}
