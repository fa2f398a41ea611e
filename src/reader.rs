//! Big-endian primitive reads over an in-memory byte cursor.
//!
//! Both the class file parser and the interpreter's instruction decoder read
//! through `ByteReader`, so operand decoding and structural decoding share the
//! same width and index conventions.
use std::io::{Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt};

use crate::error::StructuralError;

type Result<T> = std::result::Result<T, StructuralError>;

#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(bytes),
        }
    }

    /// Current offset from the start of the buffer.
    pub fn position(&self) -> usize {
        self.cursor.position() as usize
    }

    pub fn len(&self) -> usize {
        self.cursor.get_ref().len()
    }

    pub fn remaining(&self) -> usize {
        self.len().saturating_sub(self.position())
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn eof(&self, wanted: usize) -> StructuralError {
        StructuralError::UnexpectedEof {
            offset: self.position(),
            wanted,
        }
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.cursor.read_u8().map_err(|_| self.eof(1))
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        self.cursor.read_i8().map_err(|_| self.eof(1))
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let start = self.position();
        self.cursor.read_u16::<BigEndian>().map_err(|_| {
            self.cursor.set_position(start as u64);
            self.eof(2)
        })
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        let start = self.position();
        self.cursor.read_i16::<BigEndian>().map_err(|_| {
            self.cursor.set_position(start as u64);
            self.eof(2)
        })
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let start = self.position();
        self.cursor.read_u32::<BigEndian>().map_err(|_| {
            self.cursor.set_position(start as u64);
            self.eof(4)
        })
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let start = self.position();
        self.cursor.read_u64::<BigEndian>().map_err(|_| {
            self.cursor.set_position(start as u64);
            self.eof(8)
        })
    }

    /// Reads a 2-byte constant pool index and converts it from the on-disk
    /// 1-based form to a 0-based pool position. Index 0 is reserved.
    pub fn read_pool_index(&mut self) -> Result<usize> {
        self.read_optional_pool_index()?
            .ok_or(StructuralError::ReservedPoolIndex)
    }

    /// Like `read_pool_index`, but on-disk 0 reads as `None`. Only the
    /// superclass slot of the root class uses this form.
    pub fn read_optional_pool_index(&mut self) -> Result<Option<usize>> {
        let index = self.read_u16()?;
        Ok(index.checked_sub(1).map(usize::from))
    }

    /// Reads exactly `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        if self.remaining() < len {
            return Err(self.eof(len));
        }
        let mut buf = vec![0u8; len];
        self.cursor.read_exact(&mut buf).map_err(|_| self.eof(len))?;
        Ok(buf)
    }

    /// Reads bytes up to `delim`, consuming the delimiter but not returning it.
    pub fn read_until(&mut self, delim: u8) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            match self.read_u8()? {
                b if b == delim => return Ok(out),
                b => out.push(b),
            }
        }
    }
}
