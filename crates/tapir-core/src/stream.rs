// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Little-endian primitives and length-prefixed strings on top of `std::io`.
//!
//! The "varstring" encoding used by the engine's binary formats is a length
//! prefix followed by raw bytes (no terminator):
//!
//! ```text
//! u8 len            if len != 0xFF
//! 0xFF, u16 len     if len != 0xFFFF
//! 0xFF, 0xFFFF, u32 len
//! ```

use std::io::{self, Read, Write};

/// Extension methods for reading the engine's binary primitives.
pub trait ReadExt: Read {
    /// Reads one byte.
    fn read_u8(&mut self) -> io::Result<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    /// Reads a little-endian `u16`.
    fn read_u16_le(&mut self) -> io::Result<u16> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    /// Reads a little-endian `u32`.
    fn read_u32_le(&mut self) -> io::Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Reads a little-endian `i32`.
    fn read_i32_le(&mut self) -> io::Result<i32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(i32::from_le_bytes(buf))
    }

    /// Reads a length-prefixed byte string.
    fn read_varstring_bytes(&mut self) -> io::Result<Vec<u8>> {
        let length = match self.read_u8()? {
            0xFF => match self.read_u16_le()? {
                0xFFFF => self.read_u32_le()? as usize,
                word => word as usize,
            },
            byte => byte as usize,
        };
        self.read_bytes(length)
    }

    /// Reads exactly `length` bytes.
    ///
    /// Memory grows with the bytes actually read, so an absurd `length`
    /// from a corrupt stream fails with `UnexpectedEof` instead of
    /// allocating it up front.
    fn read_bytes(&mut self, length: usize) -> io::Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.take(length as u64).read_to_end(&mut bytes)?;
        if bytes.len() != length {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("stream truncated: expected {length} bytes, got {}", bytes.len()),
            ));
        }
        Ok(bytes)
    }

    /// Reads a length-prefixed string, replacing invalid UTF-8.
    fn read_varstring(&mut self) -> io::Result<String> {
        let bytes = self.read_varstring_bytes()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl<R: Read + ?Sized> ReadExt for R {}

/// Extension methods for writing the engine's binary primitives.
pub trait WriteExt: Write {
    /// Writes a little-endian `u16`.
    fn write_u16_le(&mut self, value: u16) -> io::Result<()> {
        self.write_all(&value.to_le_bytes())
    }

    /// Writes a little-endian `u32`.
    fn write_u32_le(&mut self, value: u32) -> io::Result<()> {
        self.write_all(&value.to_le_bytes())
    }

    /// Writes a little-endian `i32`.
    fn write_i32_le(&mut self, value: i32) -> io::Result<()> {
        self.write_all(&value.to_le_bytes())
    }

    /// Writes a length-prefixed byte string using the shortest prefix.
    fn write_varstring(&mut self, bytes: &[u8]) -> io::Result<()> {
        let length = bytes.len();
        if length < 0xFF {
            self.write_all(&[length as u8])?;
        } else if length < 0xFFFF {
            self.write_all(&[0xFF])?;
            self.write_u16_le(length as u16)?;
        } else {
            let length = u32::try_from(length).map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidInput, "varstring longer than u32::MAX")
            })?;
            self.write_all(&[0xFF])?;
            self.write_u16_le(0xFFFF)?;
            self.write_u32_le(length)?;
        }
        self.write_all(bytes)
    }
}

impl<W: Write + ?Sized> WriteExt for W {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_varstring() {
        let mut data: &[u8] = &[3, b'a', b'b', b'c', 9];
        assert_eq!(data.read_varstring().unwrap(), "abc");
        assert_eq!(data, &[9]);
    }

    #[test]
    fn word_and_dword_prefixes() {
        let mut data: &[u8] = &[0xFF, 0x02, 0x00, b'h', b'i'];
        assert_eq!(data.read_varstring().unwrap(), "hi");

        let mut data: &[u8] = &[0xFF, 0xFF, 0xFF, 0x01, 0x00, 0x00, 0x00, b'x'];
        assert_eq!(data.read_varstring().unwrap(), "x");
    }

    #[test]
    fn prefix_selection_matches_length() {
        let mut out = Vec::new();
        out.write_varstring(&[b'z'; 300]).unwrap();
        assert_eq!(&out[..3], &[0xFF, 0x2C, 0x01]);
        assert_eq!(out.len(), 303);

        let mut out = Vec::new();
        out.write_varstring(&[b'z'; 0xFFFF]).unwrap();
        assert_eq!(&out[..7], &[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x00]);
        let mut reader: &[u8] = &out;
        assert_eq!(reader.read_varstring_bytes().unwrap().len(), 0xFFFF);
    }

    #[test]
    fn truncated_varstring_is_an_error() {
        let mut data: &[u8] = &[5, b'a'];
        let err = data.read_varstring().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn little_endian_integers() {
        let mut out = Vec::new();
        out.write_u32_le(0xDEAD_BEEF).unwrap();
        out.write_i32_le(-2).unwrap();
        let mut reader: &[u8] = &out;
        assert_eq!(reader.read_u32_le().unwrap(), 0xDEAD_BEEF);
        assert_eq!(reader.read_i32_le().unwrap(), -2);
        assert!(reader.read_u8().is_err());
    }
}
