//! Texture pixel formats and conversion of cover textures to PNG.

use image::{ImageBuffer, RgbaImage};

use super::Texture2D;
use crate::error::{Error, Result};

/// Engine texture formats. Only the variants named here can be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFormat {
    Alpha8,
    Argb4444,
    Rgb24,
    Rgba32,
    Argb32,
    Rgb565,
    Dxt1,
    Dxt5,
    Rgba4444,
    Bgra32,
    Bc7,
    Other(i32),
}

impl From<i32> for TextureFormat {
    fn from(id: i32) -> Self {
        match id {
            1 => Self::Alpha8,
            2 => Self::Argb4444,
            3 => Self::Rgb24,
            4 => Self::Rgba32,
            5 => Self::Argb32,
            7 => Self::Rgb565,
            10 => Self::Dxt1,
            12 => Self::Dxt5,
            13 => Self::Rgba4444,
            14 => Self::Bgra32,
            25 => Self::Bc7,
            other => Self::Other(other),
        }
    }
}

impl TextureFormat {
    pub fn id(self) -> i32 {
        match self {
            Self::Alpha8 => 1,
            Self::Argb4444 => 2,
            Self::Rgb24 => 3,
            Self::Rgba32 => 4,
            Self::Argb32 => 5,
            Self::Rgb565 => 7,
            Self::Dxt1 => 10,
            Self::Dxt5 => 12,
            Self::Rgba4444 => 13,
            Self::Bgra32 => 14,
            Self::Bc7 => 25,
            Self::Other(id) => id,
        }
    }

    /// Bytes needed for the top mip level.
    fn top_level_size(self, width: usize, height: usize) -> Option<usize> {
        let blocks = width.div_ceil(4) * height.div_ceil(4);
        Some(match self {
            Self::Alpha8 => width * height,
            Self::Argb4444 | Self::Rgba4444 | Self::Rgb565 => width * height * 2,
            Self::Rgb24 => width * height * 3,
            Self::Rgba32 | Self::Argb32 | Self::Bgra32 => width * height * 4,
            Self::Dxt1 => blocks * 8,
            Self::Dxt5 | Self::Bc7 => blocks * 16,
            Self::Other(_) => return None,
        })
    }
}

#[derive(Clone, Copy)]
enum BcFormat {
    Bc1,
    Bc3,
    Bc7,
}

impl BcFormat {
    const fn block_size(self) -> usize {
        match self {
            Self::Bc1 => 8,
            Self::Bc3 | Self::Bc7 => 16,
        }
    }
}

impl Texture2D {
    /// Decode the top mip level to top-down RGBA rows.
    pub fn to_rgba(&self) -> Result<RgbaImage> {
        let (w, h) = (self.width as usize, self.height as usize);
        let needed = self
            .format
            .top_level_size(w, h)
            .ok_or_else(|| Error::Texture(format!("unsupported texture format {}", self.format.id())))?;
        let data = self.data.get(..needed).ok_or_else(|| {
            Error::Texture(format!(
                "texture {} holds {} bytes, {needed} needed",
                self.name,
                self.data.len()
            ))
        })?;

        let rgba = match self.format {
            TextureFormat::Alpha8 => data.iter().flat_map(|&a| [255, 255, 255, a]).collect(),
            TextureFormat::Argb4444 => expand_4444(data, |[a, r, g, b]| [r, g, b, a]),
            TextureFormat::Rgba4444 => expand_4444(data, |[r, g, b, a]| [r, g, b, a]),
            TextureFormat::Rgb24 => data.chunks_exact(3).flat_map(|p| [p[0], p[1], p[2], 255]).collect(),
            TextureFormat::Rgba32 => data.to_vec(),
            TextureFormat::Argb32 => data.chunks_exact(4).flat_map(|p| [p[1], p[2], p[3], p[0]]).collect(),
            TextureFormat::Bgra32 => data.chunks_exact(4).flat_map(|p| [p[2], p[1], p[0], p[3]]).collect(),
            TextureFormat::Rgb565 => data
                .chunks_exact(2)
                .flat_map(|p| {
                    let v = u16::from_le_bytes([p[0], p[1]]);
                    [
                        scale((v >> 11) & 0x1F, 5),
                        scale((v >> 5) & 0x3F, 6),
                        scale(v & 0x1F, 5),
                        255,
                    ]
                })
                .collect(),
            TextureFormat::Dxt1 => decode_bc(data, w, h, BcFormat::Bc1)?,
            TextureFormat::Dxt5 => decode_bc(data, w, h, BcFormat::Bc3)?,
            TextureFormat::Bc7 => decode_bc(data, w, h, BcFormat::Bc7)?,
            TextureFormat::Other(id) => {
                return Err(Error::Texture(format!("unsupported texture format {id}")));
            }
        };

        let mut img: RgbaImage = ImageBuffer::from_raw(self.width, self.height, rgba)
            .ok_or_else(|| Error::Texture(format!("texture {} has inconsistent size", self.name)))?;
        // rows are stored bottom-up
        image::imageops::flip_vertical_in_place(&mut img);
        Ok(img)
    }

    /// Encode the texture as a PNG file.
    pub fn to_png(&self) -> Result<Vec<u8>> {
        let img = self.to_rgba()?;
        let mut png = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut png);
        img.write_with_encoder(encoder)
            .map_err(|e| Error::Texture(format!("failed to encode PNG: {e}")))?;
        Ok(png)
    }
}

fn scale(v: u16, bits: u32) -> u8 {
    let max = (1u16 << bits) - 1;
    (u32::from(v) * 255 / u32::from(max)) as u8
}

/// Expand 16-bit little-endian pixels of four 4-bit channels, stored from
/// the high nibble down, into RGBA8 with `order` mapping to RGBA.
fn expand_4444(data: &[u8], order: impl Fn([u8; 4]) -> [u8; 4]) -> Vec<u8> {
    data.chunks_exact(2)
        .flat_map(|p| {
            let v = u16::from_le_bytes([p[0], p[1]]);
            let nibbles = [(v >> 12) as u8, (v >> 8) as u8 & 0xF, (v >> 4) as u8 & 0xF, v as u8 & 0xF];
            order(nibbles.map(|n| n * 17))
        })
        .collect()
}

/// Decode block-compressed pixels into RGBA8 rows in storage order.
fn decode_bc(data: &[u8], width: usize, height: usize, format: BcFormat) -> Result<Vec<u8>> {
    let (across, down) = (width.div_ceil(4), height.div_ceil(4));
    let size = format.block_size();
    let needed = across * down * size;
    if data.len() < needed {
        return Err(Error::Texture(format!(
            "{across}x{down} blocks need {needed} bytes, only {} present",
            data.len()
        )));
    }

    let mut rgba = vec![0u8; width * height * 4];
    let mut texels = [0u8; 16 * 4];
    for (n, block) in data[..needed].chunks_exact(size).enumerate() {
        let (x0, y0) = ((n % across) * 4, (n / across) * 4);
        match format {
            BcFormat::Bc1 => bcdec_rs::bc1(block, &mut texels, 16),
            BcFormat::Bc3 => bcdec_rs::bc3(block, &mut texels, 16),
            BcFormat::Bc7 => bcdec_rs::bc7(block, &mut texels, 16),
        }
        // blocks on the right and bottom edges may overhang the image
        for row in 0..4.min(height - y0) {
            let cols = 4.min(width - x0);
            let dst = ((y0 + row) * width + x0) * 4;
            rgba[dst..dst + cols * 4].copy_from_slice(&texels[row * 16..row * 16 + cols * 4]);
        }
    }
    Ok(rgba)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texture(format: TextureFormat, width: u32, height: u32, data: Vec<u8>) -> Texture2D {
        Texture2D {
            name: "t".into(),
            width,
            height,
            format,
            data,
        }
    }

    #[test]
    fn test_rgba32_flipped() {
        // bottom row red, top row blue
        let data = vec![255, 0, 0, 255, 0, 0, 255, 255];
        let img = texture(TextureFormat::Rgba32, 1, 2, data).to_rgba().unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [0, 0, 255, 255]);
        assert_eq!(img.get_pixel(0, 1).0, [255, 0, 0, 255]);
    }

    #[test]
    fn test_argb32_and_rgb24() {
        let img = texture(TextureFormat::Argb32, 1, 1, vec![10, 1, 2, 3]).to_rgba().unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [1, 2, 3, 10]);
        let img = texture(TextureFormat::Rgb24, 1, 1, vec![7, 8, 9]).to_rgba().unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [7, 8, 9, 255]);
    }

    #[test]
    fn test_rgb565_white() {
        let img = texture(TextureFormat::Rgb565, 1, 1, vec![0xFF, 0xFF]).to_rgba().unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [255, 255, 255, 255]);
    }

    #[test]
    fn test_dxt1_partial_block() {
        // 2x2 texture still occupies one full block
        let img = texture(TextureFormat::Dxt1, 2, 2, vec![0; 8]).to_rgba().unwrap();
        assert_eq!(img.dimensions(), (2, 2));
    }

    #[test]
    fn test_truncated_blocks_rejected() {
        // a 5x5 BC1 image spans 2x2 blocks of 8 bytes
        let err = decode_bc(&[0; 24], 5, 5, BcFormat::Bc1).unwrap_err();
        assert!(matches!(err, Error::Texture(_)));
        assert_eq!(decode_bc(&[0; 32], 5, 5, BcFormat::Bc1).unwrap().len(), 5 * 5 * 4);
    }

    #[test]
    fn test_short_data_rejected() {
        let err = texture(TextureFormat::Rgba32, 2, 2, vec![0; 4]).to_rgba().unwrap_err();
        assert!(matches!(err, Error::Texture(_)));
    }

    #[test]
    fn test_unknown_format_rejected() {
        let err = texture(TextureFormat::from(34), 4, 4, vec![0; 64]).to_png().unwrap_err();
        assert!(matches!(err, Error::Texture(_)));
    }

    #[test]
    fn test_png_signature() {
        let png = texture(TextureFormat::Rgba32, 1, 1, vec![1, 2, 3, 4]).to_png().unwrap();
        assert!(png.starts_with(b"\x89PNG\r\n\x1a\n"));
    }
}
