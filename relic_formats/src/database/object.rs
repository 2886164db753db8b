use std::io::{Read, Seek, SeekFrom};

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use serde::Serialize;

use crate::error::{Result, format_err};

pub const CLASS_BYTE_VECTOR: u16 = 0x7FFF;
pub const CLASS_WORD_VECTOR: u16 = 0x7FFE;

/// Size of the flags/class/size header preceding every object's data.
pub const OBJECT_HEADER_BYTES: usize = 6;

/// Where an object's bytes live. Constant objects (and every v2 object) own
/// a copy; v3 variable objects are windows into the shared game state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectData {
    Owned(Vec<u8>),
    Window { offset: usize, len: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObjectKind {
    Structured { count1: u8, count2: u8 },
    ByteVector { len: u16 },
    WordVector { len: u16 },
}

/// Number of data bytes following the header, derived from the class word
/// and the size/count field.
pub fn data_size(class: u16, size_field: [u8; 2]) -> Result<usize> {
    match class {
        CLASS_BYTE_VECTOR => Ok(u16::from_le_bytes(size_field) as usize),
        CLASS_WORD_VECTOR => Ok(u16::from_le_bytes(size_field) as usize * 2),
        c if c < CLASS_WORD_VECTOR => Ok((size_field[0] as usize + size_field[1] as usize) * 2),
        other => Err(format_err!("object class {other:#06x} is out of range")),
    }
}

/// Read one v2 object record: a 4-byte class/size header then its data.
/// The record carries no flags word, so flags 1 (writable) is prepended.
pub(crate) fn read_v2_record<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let mut header = [0u8; 4];
    reader.read_exact(&mut header)?;
    let class = u16::from_le_bytes([header[0], header[1]]);
    let size = data_size(class, [header[2], header[3]])?;

    let mut data = Vec::with_capacity(OBJECT_HEADER_BYTES + size);
    data.extend_from_slice(&1u16.to_le_bytes());
    data.extend_from_slice(&header);
    data.resize(OBJECT_HEADER_BYTES + size, 0);
    reader.read_exact(&mut data[OBJECT_HEADER_BYTES..])?;
    Ok(data)
}

/// Read a v3 constant object including its flags word.
pub(crate) fn read_v3_record<R: Read + Seek>(reader: &mut R) -> Result<Vec<u8>> {
    let start = reader.stream_position()?;
    let _flags = reader.read_u16::<LittleEndian>()?;
    let class = reader.read_u16::<LittleEndian>()?;
    let mut size_field = [0u8; 2];
    reader.read_exact(&mut size_field)?;
    let size = data_size(class, size_field)?;

    reader.seek(SeekFrom::Start(start))?;
    let mut data = vec![0u8; OBJECT_HEADER_BYTES + size];
    reader.read_exact(&mut data)?;
    Ok(data)
}

/// Borrowed view over one object's header and data words.
#[derive(Debug, Clone, Copy)]
pub struct ObjectView<'a> {
    bytes: &'a [u8],
}

impl<'a> ObjectView<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    fn header_u16(&self, offset: usize) -> u16 {
        self.bytes
            .get(offset..offset + 2)
            .map(LittleEndian::read_u16)
            .unwrap_or(0)
    }

    pub fn flags(&self) -> u16 {
        self.header_u16(0)
    }

    pub fn class(&self) -> u16 {
        self.header_u16(2)
    }

    pub fn size(&self) -> u16 {
        self.header_u16(4)
    }

    pub fn count1(&self) -> u8 {
        self.bytes.get(4).copied().unwrap_or(0)
    }

    pub fn count2(&self) -> u8 {
        self.bytes.get(5).copied().unwrap_or(0)
    }

    pub fn is_object(&self) -> bool {
        self.class() < CLASS_WORD_VECTOR
    }

    pub fn kind(&self) -> ObjectKind {
        match self.class() {
            CLASS_BYTE_VECTOR => ObjectKind::ByteVector { len: self.size() },
            CLASS_WORD_VECTOR => ObjectKind::WordVector { len: self.size() },
            _ => ObjectKind::Structured {
                count1: self.count1(),
                count2: self.count2(),
            },
        }
    }

    pub fn data(&self) -> &'a [u8] {
        self.bytes.get(OBJECT_HEADER_BYTES..).unwrap_or(&[])
    }

    /// Data word `index`, or `None` past the end of the object.
    pub fn word(&self, index: usize) -> Option<u16> {
        let offset = OBJECT_HEADER_BYTES + index * 2;
        self.bytes
            .get(offset..offset + 2)
            .map(LittleEndian::read_u16)
    }
}

pub(crate) fn write_word(bytes: &mut [u8], index: usize, value: u16) -> bool {
    let offset = OBJECT_HEADER_BYTES + index * 2;
    match bytes.get_mut(offset..offset + 2) {
        Some(slot) => {
            LittleEndian::write_u16(slot, value);
            true
        }
        None => false,
    }
}
