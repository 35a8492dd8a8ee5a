use std::fmt;

use super::serialized::{ObjectEntry, SerializedFile, UnityVersion};
use super::texture::TextureFormat;
use super::Bundle;
use crate::error::Result;

/// Object classes this crate decodes. Anything else is carried by id only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassId {
    Texture2D,
    TextAsset,
    AudioClip,
    Other(i32),
}

impl From<i32> for ClassId {
    fn from(id: i32) -> Self {
        match id {
            28 => Self::Texture2D,
            49 => Self::TextAsset,
            83 => Self::AudioClip,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Texture2D => f.write_str("Texture2D"),
            Self::TextAsset => f.write_str("TextAsset"),
            Self::AudioClip => f.write_str("AudioClip"),
            Self::Other(id) => write!(f, "class {id}"),
        }
    }
}

/// Summary of one object for listings.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    pub path_id: i64,
    pub class: ClassId,
    pub size: u32,
    /// Set for the decoded classes, which all start with their name.
    pub name: Option<String>,
}

impl ObjectInfo {
    pub(crate) fn describe(file: &SerializedFile, entry: &ObjectEntry, data: &[u8]) -> Self {
        let name = match entry.class {
            ClassId::Other(_) => None,
            _ => file
                .object_bytes(entry, data)
                .and_then(|bytes| read_name(file, bytes))
                .ok(),
        };
        Self {
            path_id: entry.path_id,
            class: entry.class,
            size: entry.byte_size,
            name,
        }
    }
}

pub(crate) fn read_name(file: &SerializedFile, bytes: &[u8]) -> Result<String> {
    file.reader(bytes).read_aligned_string()
}

#[derive(Debug, Clone)]
pub struct TextAsset {
    pub name: String,
    pub script: Vec<u8>,
}

impl TextAsset {
    pub(crate) fn read(file: &SerializedFile, bytes: &[u8]) -> Result<Self> {
        let mut r = file.reader(bytes);
        let name = r.read_aligned_string()?;
        let script = r.read_aligned_bytes()?.to_vec();
        Ok(Self { name, script })
    }

    /// Script contents as text, without a UTF-8 byte order mark.
    pub fn text(&self) -> String {
        let bytes = self.script.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(&self.script);
        String::from_utf8_lossy(bytes).into_owned()
    }
}

#[derive(Debug, Clone)]
pub struct Texture2D {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    /// Top mip level and any further mips, exactly as stored.
    pub data: Vec<u8>,
}

impl Texture2D {
    pub(crate) fn read(file: &SerializedFile, bytes: &[u8], bundle: &Bundle) -> Result<Self> {
        let v = file.unity;
        let mut r = file.reader(bytes);

        let name = r.read_aligned_string()?;
        if v >= UnityVersion::new(2017, 3) {
            let _forced_fallback_format = r.read_i32()?;
            let _downscale_fallback = r.read_bool()?;
            if v >= UnityVersion::new(2020, 2) {
                let _alpha_optional = r.read_bool()?;
            }
            r.align(4)?;
        }
        let width = r.read_i32()?;
        let height = r.read_i32()?;
        let _complete_image_size = r.read_i32()?;
        if v >= UnityVersion::new(2020, 1) {
            let _mips_stripped = r.read_i32()?;
        }
        let format = TextureFormat::from(r.read_i32()?);
        let _mip_count = r.read_i32()?;
        let _is_readable = r.read_bool()?;
        if v >= UnityVersion::new(2020, 1) {
            let _is_preprocessed = r.read_bool()?;
        }
        if v >= UnityVersion::new(2019, 3) {
            let _ignore_master_limit = r.read_bool()?;
        }
        if v < UnityVersion::new(5, 5) {
            let _read_allowed = r.read_bool()?;
        }
        if v >= UnityVersion::new(2018, 2) {
            let _streaming_mipmaps = r.read_bool()?;
        }
        r.align(4)?;
        if v >= UnityVersion::new(2018, 2) {
            let _streaming_priority = r.read_i32()?;
        }
        let _image_count = r.read_i32()?;
        let _dimension = r.read_i32()?;
        // filter mode, aniso, mip bias, then wrap U/V/W (a single wrap mode before 2017)
        let settings = if v.major >= 2017 { 6 } else { 4 };
        r.skip(settings * 4)?;
        let _lightmap_format = r.read_i32()?;
        let _color_space = r.read_i32()?;
        if v >= UnityVersion::new(2020, 2) {
            let _platform_blob = r.read_aligned_bytes()?;
        }

        let inline_size = r.read_len()?;
        let data = if inline_size > 0 {
            r.read_bytes(inline_size)?.to_vec()
        } else {
            let offset = if v >= UnityVersion::new(2020, 1) {
                r.read_u64()?
            } else {
                u64::from(r.read_u32()?)
            };
            let size = r.read_u32()?;
            let source = r.read_aligned_string()?;
            bundle.stream_slice(&source, offset, u64::from(size))?.to_vec()
        };

        let (Ok(width), Ok(height)) = (u32::try_from(width), u32::try_from(height)) else {
            return Err(crate::error::Error::Texture(format!(
                "texture {name} has invalid size {width}x{height}"
            )));
        };

        Ok(Self {
            name,
            width,
            height,
            format,
            data,
        })
    }
}

#[derive(Debug, Clone)]
pub struct AudioClip {
    pub name: String,
    pub channels: i32,
    pub frequency: i32,
    pub length: f32,
    /// Embedded sound bank, as referenced by the clip's resource.
    pub data: Vec<u8>,
}

impl AudioClip {
    pub(crate) fn read(file: &SerializedFile, bytes: &[u8], bundle: &Bundle) -> Result<Self> {
        let mut r = file.reader(bytes);
        let name = r.read_aligned_string()?;
        let _load_type = r.read_i32()?;
        let channels = r.read_i32()?;
        let frequency = r.read_i32()?;
        let _bits_per_sample = r.read_i32()?;
        let length = f32::from_bits(r.read_u32()?);
        let _is_tracker_format = r.read_bool()?;
        r.align(4)?;
        let _subsound_index = r.read_i32()?;
        let _preload = r.read_bool()?;
        let _load_in_background = r.read_bool()?;
        let _legacy_3d = r.read_bool()?;
        r.align(4)?;
        let source = r.read_aligned_string()?;
        let offset = r.read_u64()?;
        let size = r.read_u64()?;
        let _compression_format = r.read_i32()?;

        let data = bundle.stream_slice(&source, offset, size)?.to_vec();
        Ok(Self {
            name,
            channels,
            frequency,
            length,
            data,
        })
    }
}
