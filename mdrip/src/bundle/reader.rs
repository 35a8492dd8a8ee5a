use std::io::Cursor;

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// Bounds-checked cursor over an in-memory container.
///
/// Running off the end of the buffer is reported as a corrupt container of
/// kind `container`, never as an I/O error.
pub struct ByteReader<'a> {
    cursor: Cursor<&'a [u8]>,
    endian: Endian,
    container: &'static str,
}

macro_rules! read_num {
    ($name:ident, $ty:ty, $method:ident) => {
        pub fn $name(&mut self) -> Result<$ty> {
            let value = match self.endian {
                Endian::Little => self.cursor.$method::<LittleEndian>(),
                Endian::Big => self.cursor.$method::<BigEndian>(),
            };
            value.map_err(|_| self.eof(std::mem::size_of::<$ty>()))
        }
    };
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8], endian: Endian, container: &'static str) -> Self {
        Self {
            cursor: Cursor::new(data),
            endian,
            container,
        }
    }

    pub fn set_endian(&mut self, endian: Endian) {
        self.endian = endian;
    }

    pub fn position(&self) -> usize {
        self.cursor.position() as usize
    }

    pub fn data_len(&self) -> usize {
        self.cursor.get_ref().len()
    }

    pub fn remaining(&self) -> usize {
        self.data_len().saturating_sub(self.position())
    }

    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data_len() {
            return Err(Error::corrupt(
                self.container,
                format!("seek to {pos} beyond end of {} bytes", self.data_len()),
            ));
        }
        self.cursor.set_position(pos as u64);
        Ok(())
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.seek(self.position() + n)
    }

    /// Advance to the next multiple of `n` bytes.
    pub fn align(&mut self, n: usize) -> Result<()> {
        let rem = self.position() % n;
        if rem != 0 {
            self.skip(n - rem)?;
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.cursor.read_u8().map_err(|_| self.eof(1))
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    read_num!(read_u16, u16, read_u16);
    read_num!(read_i16, i16, read_i16);
    read_num!(read_u32, u32, read_u32);
    read_num!(read_i32, i32, read_i32);
    read_num!(read_u64, u64, read_u64);
    read_num!(read_i64, i64, read_i64);

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        let start = self.position();
        let end = start
            .checked_add(n)
            .filter(|&end| end <= self.data_len())
            .ok_or_else(|| self.eof(n))?;
        let data: &'a [u8] = *self.cursor.get_ref();
        self.cursor.set_position(end as u64);
        Ok(&data[start..end])
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// Null-terminated UTF-8 string.
    pub fn read_cstring(&mut self) -> Result<String> {
        let data: &'a [u8] = *self.cursor.get_ref();
        let start = self.position();
        let len = data[start..]
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| Error::corrupt(self.container, "unterminated string"))?;
        self.cursor.set_position((start + len + 1) as u64);
        Ok(String::from_utf8_lossy(&data[start..start + len]).into_owned())
    }

    /// Length-prefixed byte array, padded to four bytes.
    pub fn read_aligned_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.read_len()?;
        let bytes = self.read_bytes(len)?;
        self.align(4)?;
        Ok(bytes)
    }

    pub fn read_aligned_string(&mut self) -> Result<String> {
        Ok(String::from_utf8_lossy(self.read_aligned_bytes()?).into_owned())
    }

    /// An `i32` element count or byte length, rejected when negative.
    pub fn read_len(&mut self) -> Result<usize> {
        let len = self.read_i32()?;
        usize::try_from(len)
            .map_err(|_| Error::corrupt(self.container, format!("negative length {len}")))
    }

    fn eof(&self, wanted: usize) -> Error {
        Error::corrupt(
            self.container,
            format!(
                "unexpected end of data reading {wanted} bytes at offset {}",
                self.position()
            ),
        )
    }
}
