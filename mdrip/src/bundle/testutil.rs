//! Builders for synthetic bundles used by the unit tests.

use super::UnityVersion;

const TEXT_ASSET: i32 = 0;
const TEXTURE: i32 = 1;
const AUDIO_CLIP: i32 = 2;
const CLASSES: [i32; 4] = [49, 28, 83, 114];

#[derive(Default)]
struct Buf(Vec<u8>);

impl Buf {
    fn u8(&mut self, v: u8) -> &mut Self {
        self.0.push(v);
        self
    }
    fn i16(&mut self, v: i16) -> &mut Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }
    fn i32(&mut self, v: i32) -> &mut Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }
    fn u32(&mut self, v: u32) -> &mut Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }
    fn u64(&mut self, v: u64) -> &mut Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }
    fn bytes(&mut self, v: &[u8]) -> &mut Self {
        self.0.extend_from_slice(v);
        self
    }
    fn cstr(&mut self, s: &str) -> &mut Self {
        self.bytes(s.as_bytes()).u8(0)
    }
    fn align(&mut self, n: usize) -> &mut Self {
        while self.0.len() % n != 0 {
            self.0.push(0);
        }
        self
    }
    fn aligned_bytes(&mut self, v: &[u8]) -> &mut Self {
        self.i32(v.len() as i32).bytes(v).align(4)
    }
    fn aligned_str(&mut self, s: &str) -> &mut Self {
        self.aligned_bytes(s.as_bytes())
    }
}

/// Serialized file with objects laid out the way the engine version given
/// to [`SerializedBuilder::new`] would write them.
pub(crate) struct SerializedBuilder {
    engine: String,
    unity: UnityVersion,
    version: u32,
    objects: Vec<(i32, Vec<u8>)>,
}

impl SerializedBuilder {
    pub fn new(engine: &str) -> Self {
        Self {
            engine: engine.to_string(),
            unity: UnityVersion::parse(engine).unwrap_or(UnityVersion::new(0, 0)),
            version: 21,
            objects: Vec::new(),
        }
    }

    pub fn version(&mut self, version: u32) -> &mut Self {
        self.version = version;
        self
    }

    pub fn text_asset(&mut self, name: &str, script: &[u8]) -> &mut Self {
        let mut b = Buf::default();
        b.aligned_str(name).aligned_bytes(script);
        self.objects.push((TEXT_ASSET, b.0));
        self
    }

    pub fn inline_texture(&mut self, name: &str, w: i32, h: i32, format: i32, data: &[u8]) -> &mut Self {
        let mut b = self.texture_head(name, w, h, format);
        b.aligned_bytes(data);
        // empty stream data
        if self.unity >= UnityVersion::new(2020, 1) {
            b.u64(0);
        } else {
            b.u32(0);
        }
        b.u32(0).aligned_str("");
        self.objects.push((TEXTURE, b.0));
        self
    }

    #[allow(clippy::too_many_arguments)]
    pub fn streamed_texture(
        &mut self,
        name: &str,
        w: i32,
        h: i32,
        format: i32,
        source: &str,
        offset: u32,
        size: u32,
    ) -> &mut Self {
        let mut b = self.texture_head(name, w, h, format);
        b.i32(0);
        if self.unity >= UnityVersion::new(2020, 1) {
            b.u64(u64::from(offset));
        } else {
            b.u32(offset);
        }
        b.u32(size).aligned_str(&format!("archive:/CAB-x/{source}"));
        self.objects.push((TEXTURE, b.0));
        self
    }

    fn texture_head(&self, name: &str, w: i32, h: i32, format: i32) -> Buf {
        let v = self.unity;
        let mut b = Buf::default();
        b.aligned_str(name);
        if v >= UnityVersion::new(2017, 3) {
            b.i32(-1).u8(0);
            if v >= UnityVersion::new(2020, 2) {
                b.u8(0);
            }
            b.align(4);
        }
        b.i32(w).i32(h).i32(w * h * 4);
        if v >= UnityVersion::new(2020, 1) {
            b.i32(0);
        }
        b.i32(format).i32(1).u8(0);
        if v >= UnityVersion::new(2020, 1) {
            b.u8(0);
        }
        if v >= UnityVersion::new(2019, 3) {
            b.u8(0);
        }
        if v >= UnityVersion::new(2018, 2) {
            b.u8(0);
        }
        b.align(4);
        if v >= UnityVersion::new(2018, 2) {
            b.i32(0);
        }
        b.i32(1).i32(2);
        for _ in 0..if v.major >= 2017 { 6 } else { 4 } {
            b.i32(0);
        }
        b.i32(6).i32(1);
        if v >= UnityVersion::new(2020, 2) {
            b.aligned_bytes(&[]);
        }
        b
    }

    pub fn audio_clip(&mut self, name: &str, source: &str, offset: u64, size: u64) -> &mut Self {
        let mut b = Buf::default();
        b.aligned_str(name)
            .i32(1)
            .i32(2)
            .i32(44100)
            .i32(16)
            .u32(120.5f32.to_bits())
            .u8(0)
            .align(4)
            .i32(0)
            .u8(1)
            .u8(0)
            .u8(0)
            .align(4)
            .aligned_str(&format!("archive:/CAB-x/{source}"))
            .u64(offset)
            .u64(size)
            .i32(2);
        self.objects.push((AUDIO_CLIP, b.0));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let header_len = if self.version >= 22 { 48 } else { 20 };

        let mut meta = Buf::default();
        meta.cstr(&self.engine).i32(19).u8(1).i32(CLASSES.len() as i32);
        for class in CLASSES {
            meta.i32(class).u8(0).i16(-1);
            if class == 114 {
                meta.bytes(&[0; 16]);
            }
            meta.bytes(&[0; 16]);
            // one-node type tree with an empty string buffer
            let node_size = if self.version >= 19 { 32 } else { 24 };
            meta.i32(1).i32(0).bytes(&vec![0; node_size]);
            if self.version >= 21 {
                meta.i32(0);
            }
        }

        // object table; offsets resolved after the data layout is known
        let mut layout = Vec::new();
        let mut cursor = 0usize;
        for (_, data) in &self.objects {
            layout.push(cursor);
            cursor = (cursor + data.len()).next_multiple_of(8);
        }

        meta.i32(self.objects.len() as i32);
        for (i, (type_index, data)) in self.objects.iter().enumerate() {
            while (header_len + meta.0.len()) % 4 != 0 {
                meta.u8(0);
            }
            meta.u64(i as u64 + 1);
            if self.version >= 22 {
                meta.u64(layout[i] as u64);
            } else {
                meta.u32(layout[i] as u32);
            }
            meta.u32(data.len() as u32).i32(*type_index);
        }
        // script types, externals, ref types, user information
        meta.i32(0).i32(0).i32(0).cstr("");

        let data_offset = (header_len + meta.0.len()).next_multiple_of(16);
        let file_size = data_offset + cursor;

        let mut out = Vec::with_capacity(file_size);
        out.extend_from_slice(&(meta.0.len() as u32).to_be_bytes());
        out.extend_from_slice(&(file_size as u32).to_be_bytes());
        out.extend_from_slice(&self.version.to_be_bytes());
        out.extend_from_slice(&(data_offset as u32).to_be_bytes());
        out.extend_from_slice(&[0, 0, 0, 0]);
        if self.version >= 22 {
            out.extend_from_slice(&(meta.0.len() as u32).to_be_bytes());
            out.extend_from_slice(&(file_size as i64).to_be_bytes());
            out.extend_from_slice(&(data_offset as i64).to_be_bytes());
            out.extend_from_slice(&0i64.to_be_bytes());
        }
        out.extend_from_slice(&meta.0);
        out.resize(data_offset, 0);
        for (i, (_, data)) in self.objects.iter().enumerate() {
            out.resize(data_offset + layout[i], 0);
            out.extend_from_slice(data);
        }
        out.resize(file_size, 0);
        out
    }
}

/// `UnityFS` container around serialized files and stream nodes.
pub(crate) struct BundleBuilder {
    format_version: u32,
    compressed: bool,
    nodes: Vec<(String, Vec<u8>, u32)>,
}

impl BundleBuilder {
    pub fn new() -> Self {
        Self {
            format_version: 7,
            compressed: false,
            nodes: Vec::new(),
        }
    }

    pub fn format_version(mut self, version: u32) -> Self {
        self.format_version = version;
        self
    }

    pub fn compressed(mut self, compressed: bool) -> Self {
        self.compressed = compressed;
        self
    }

    pub fn serialized(mut self, name: &str, data: Vec<u8>) -> Self {
        self.nodes.push((name.to_string(), data, 4));
        self
    }

    pub fn stream(mut self, name: &str, data: Vec<u8>) -> Self {
        self.nodes.push((name.to_string(), data, 0));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut data = Vec::new();
        let mut entries = Vec::new();
        for (name, bytes, flags) in &self.nodes {
            entries.push((data.len() as i64, bytes.len() as i64, *flags, name.as_str()));
            data.extend_from_slice(bytes);
        }

        let (block, compression) = if self.compressed {
            (lz4_flex::block::compress(&data), 3u16)
        } else {
            (data.clone(), 0)
        };

        let mut info = vec![0u8; 16];
        info.extend_from_slice(&1i32.to_be_bytes());
        info.extend_from_slice(&(data.len() as u32).to_be_bytes());
        info.extend_from_slice(&(block.len() as u32).to_be_bytes());
        info.extend_from_slice(&compression.to_be_bytes());
        info.extend_from_slice(&(entries.len() as i32).to_be_bytes());
        for (offset, size, flags, name) in entries {
            info.extend_from_slice(&offset.to_be_bytes());
            info.extend_from_slice(&size.to_be_bytes());
            info.extend_from_slice(&flags.to_be_bytes());
            info.extend_from_slice(name.as_bytes());
            info.push(0);
        }
        let packed_info = if self.compressed {
            lz4_flex::block::compress(&info)
        } else {
            info.clone()
        };

        let mut out = Vec::new();
        out.extend_from_slice(b"UnityFS\0");
        out.extend_from_slice(&self.format_version.to_be_bytes());
        out.extend_from_slice(b"5.x.x\0");
        out.extend_from_slice(b"2019.4.32f1\0");
        let size_at = out.len();
        out.extend_from_slice(&0i64.to_be_bytes());
        out.extend_from_slice(&(packed_info.len() as u32).to_be_bytes());
        out.extend_from_slice(&(info.len() as u32).to_be_bytes());
        out.extend_from_slice(&(0x40 | u32::from(compression)).to_be_bytes());
        if self.format_version >= 7 {
            out.resize(out.len().next_multiple_of(16), 0);
        }
        out.extend_from_slice(&packed_info);
        out.extend_from_slice(&block);
        let total = out.len() as i64;
        out[size_at..size_at + 8].copy_from_slice(&total.to_be_bytes());
        out
    }
}
