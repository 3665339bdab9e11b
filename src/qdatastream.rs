//! Qt QDataStream reader
//!
//! Telegram Desktop serializes its storage with Qt's QDataStream format.
//! Everything is Big Endian; byte arrays are length-prefixed with sentinel
//! markers for null and extended lengths.

use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Cursor, Read};

use crate::{Error, Result};

/// Marker for a null QByteArray
const NULL_MARKER: u32 = 0xFFFFFFFF;

/// Marker for an extended 64-bit length (Qt 6.7+)
const EXTENDED_LENGTH_MARKER: u32 = 0xFFFFFFFE;

/// Reader over a QDataStream-encoded byte slice
pub struct QDataStream<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> QDataStream<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(data),
        }
    }

    /// Current position in the stream
    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    /// Bytes left in the stream
    pub fn remaining(&self) -> usize {
        let pos = self.cursor.position() as usize;
        self.cursor.get_ref().len().saturating_sub(pos)
    }

    fn eof(&self) -> Error {
        Error::UnexpectedEof {
            offset: self.position(),
        }
    }

    /// Read an unsigned 32-bit integer (quint32)
    pub fn read_u32(&mut self) -> Result<u32> {
        self.cursor.read_u32::<BigEndian>().map_err(|_| self.eof())
    }

    /// Read a signed 32-bit integer (qint32)
    pub fn read_i32(&mut self) -> Result<i32> {
        self.cursor.read_i32::<BigEndian>().map_err(|_| self.eof())
    }

    /// Read an unsigned 64-bit integer (quint64)
    pub fn read_u64(&mut self) -> Result<u64> {
        self.cursor.read_u64::<BigEndian>().map_err(|_| self.eof())
    }

    /// Read a signed 64-bit integer (qint64)
    pub fn read_i64(&mut self) -> Result<i64> {
        self.cursor.read_i64::<BigEndian>().map_err(|_| self.eof())
    }

    /// Read raw bytes of the given length
    pub fn read_raw(&mut self, len: usize) -> Result<Vec<u8>> {
        if self.remaining() < len {
            return Err(self.eof());
        }

        let mut buf = vec![0u8; len];
        self.cursor.read_exact(&mut buf).map_err(|_| self.eof())?;
        Ok(buf)
    }

    /// Read a QByteArray
    ///
    /// Wire format: quint32 length, then that many raw bytes. A length of
    /// 0xFFFFFFFF means a null array; 0xFFFFFFFE is followed by a quint64
    /// carrying the real length.
    pub fn read_qbytearray(&mut self) -> Result<Vec<u8>> {
        let len = self.read_u32()?;

        match len {
            NULL_MARKER => Ok(Vec::new()),
            EXTENDED_LENGTH_MARKER => {
                let real_len = self.read_u64()? as usize;
                self.read_raw(real_len)
            }
            _ => self.read_raw(len as usize),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_u32_big_endian() {
        let data = [0x12, 0x34, 0x56, 0x78];
        let mut stream = QDataStream::new(&data);
        assert_eq!(stream.read_u32().unwrap(), 0x12345678);
    }

    #[test]
    fn read_i32_negative() {
        let data = [0xFF, 0xFF, 0xFF, 0xFE];
        let mut stream = QDataStream::new(&data);
        assert_eq!(stream.read_i32().unwrap(), -2);
    }

    #[test]
    fn read_qbytearray_with_length() {
        let data = [0x00, 0x00, 0x00, 0x04, 0x01, 0x02, 0x03, 0x04];
        let mut stream = QDataStream::new(&data);
        assert_eq!(
            stream.read_qbytearray().unwrap(),
            vec![0x01, 0x02, 0x03, 0x04]
        );
        assert_eq!(stream.remaining(), 0);
    }

    #[test]
    fn read_null_qbytearray() {
        let data = [0xFF, 0xFF, 0xFF, 0xFF];
        let mut stream = QDataStream::new(&data);
        assert!(stream.read_qbytearray().unwrap().is_empty());
    }

    #[test]
    fn truncated_read_reports_offset() {
        let data = [0x00, 0x00, 0x00, 0x08, 0x01];
        let mut stream = QDataStream::new(&data);
        match stream.read_qbytearray() {
            Err(Error::UnexpectedEof { offset }) => assert_eq!(offset, 4),
            other => panic!("expected UnexpectedEof, got {other:?}"),
        }
    }
}
