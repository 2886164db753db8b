// Preferred Executable Format (classic Mac OS PowerPC) data segment loader.
//
// Only pattern-initialized sections are handled; those hold the static tables
// the engines read their resource lists from.

use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::Path;

use byteorder::{BigEndian, ReadBytesExt};
use log::debug;
use memmap2::Mmap;
use serde::Serialize;

use crate::error::{Error, Result};

const TAG_JOY: u32 = u32::from_be_bytes(*b"Joy!");
const TAG_PEFF: u32 = u32::from_be_bytes(*b"peff");
const TAG_PWPC: u32 = u32::from_be_bytes(*b"pwpc");
const FORMAT_VERSION: u32 = 1;

const SECTION_COUNT_OFFSET: u64 = 32;
const SECTION_TABLE_OFFSET: u64 = 40;
const SECTION_STRIDE: u64 = 28;

const KIND_PATTERN_INITIALIZED: u8 = 2;

/// One entry of the fixed-stride section descriptor table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SectionDescriptor {
    pub name_offset: i32,
    pub default_address: u32,
    pub total_size: u32,
    pub unpacked_size: u32,
    pub packed_size: u32,
    pub container_offset: u32,
    pub kind: u8,
}

/// Validate the four leading header fields and return the section count.
pub fn read_section_count<R: Read + Seek>(reader: &mut R) -> Result<u16> {
    reader.seek(SeekFrom::Start(0))?;
    let tags = [
        reader.read_u32::<BigEndian>()?,
        reader.read_u32::<BigEndian>()?,
        reader.read_u32::<BigEndian>()?,
        reader.read_u32::<BigEndian>()?,
    ];
    if tags != [TAG_JOY, TAG_PEFF, TAG_PWPC, FORMAT_VERSION] {
        return Err(Error::UnsupportedContainer);
    }
    reader.seek(SeekFrom::Start(SECTION_COUNT_OFFSET))?;
    Ok(reader.read_u16::<BigEndian>()?)
}

pub fn read_section_descriptor<R: Read + Seek>(
    reader: &mut R,
    index: usize,
) -> Result<SectionDescriptor> {
    let count = read_section_count(reader)? as usize;
    if index >= count {
        return Err(Error::SegmentIndexOutOfRange { index, count });
    }

    reader.seek(SeekFrom::Start(
        SECTION_TABLE_OFFSET + SECTION_STRIDE * index as u64,
    ))?;
    Ok(SectionDescriptor {
        name_offset: reader.read_i32::<BigEndian>()?,
        default_address: reader.read_u32::<BigEndian>()?,
        total_size: reader.read_u32::<BigEndian>()?,
        unpacked_size: reader.read_u32::<BigEndian>()?,
        packed_size: reader.read_u32::<BigEndian>()?,
        container_offset: reader.read_u32::<BigEndian>()?,
        kind: reader.read_u8()?,
    })
}

/// Unpack the pattern-initialized section `index` into a flat buffer of
/// exactly `unpacked_size` bytes.
pub fn decompress_segment<R: Read + Seek>(reader: &mut R, index: usize) -> Result<Vec<u8>> {
    let section = read_section_descriptor(reader, index)?;
    if section.kind != KIND_PATTERN_INITIALIZED {
        return Err(Error::UnsupportedSegmentKind(section.kind));
    }
    if section.unpacked_size > section.total_size || section.packed_size > section.unpacked_size {
        return Err(Error::CorruptSegment(format!(
            "section sizes out of order (total {}, unpacked {}, packed {})",
            section.total_size, section.unpacked_size, section.packed_size
        )));
    }

    debug!(
        "unpacking PEF section {index}: {} bytes (total {}, packed {}) at {:#x}",
        section.unpacked_size, section.total_size, section.packed_size, section.container_offset
    );

    reader.seek(SeekFrom::Start(section.container_offset as u64))?;
    let mut packed = vec![0u8; section.packed_size as usize];
    reader.read_exact(&mut packed).map_err(|err| match Error::from(err) {
        Error::UnexpectedEndOfStream => {
            Error::CorruptSegment("packed data extends beyond the container".into())
        }
        other => other,
    })?;

    unpack_pattern_data(&packed, section.unpacked_size as usize)
}

/// Memory-map an executable's data fork and unpack one section.
pub fn decompress_segment_from_file(path: impl AsRef<Path>, index: usize) -> anyhow::Result<Vec<u8>> {
    use anyhow::Context;

    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("opening executable {}", path.display()))?;
    let mmap = unsafe { Mmap::map(&file) }
        .with_context(|| format!("memory-mapping executable {}", path.display()))?;
    let data = decompress_segment(&mut Cursor::new(&mmap[..]), index)
        .with_context(|| format!("unpacking section {index} of {}", path.display()))?;
    Ok(data)
}

struct PackedStream<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PackedStream<'a> {
    fn byte(&mut self) -> Result<u8> {
        let value = *self
            .data
            .get(self.pos)
            .ok_or_else(|| Error::CorruptSegment("packed stream exhausted".into()))?;
        self.pos += 1;
        Ok(value)
    }

    fn bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(count)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                Error::CorruptSegment(format!(
                    "block of {count} bytes at {} overruns packed stream",
                    self.pos
                ))
            })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Variable-length argument: 7 bits per byte, high bit = more follows.
    /// The fifth byte only contributes 4 bits and may not continue.
    fn argument(&mut self) -> Result<u32> {
        let mut value: u32 = 0;
        for entry in 1..=5 {
            let input = self.byte()?;
            value = if entry == 5 { value << 4 } else { value << 7 };
            value = value.wrapping_add(u32::from(input & 0x7F));
            if input & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(Error::CorruptSegment("argument longer than five bytes".into()))
    }
}

struct Output {
    data: Vec<u8>,
    limit: usize,
}

impl Output {
    fn reserve(&self, count: usize) -> Result<()> {
        if self.data.len().saturating_add(count) > self.limit {
            return Err(Error::CorruptSegment(format!(
                "unpacked data exceeds declared size of {} bytes",
                self.limit
            )));
        }
        Ok(())
    }

    fn zeros(&mut self, count: usize) -> Result<()> {
        self.reserve(count)?;
        self.data.resize(self.data.len() + count, 0);
        Ok(())
    }

    fn copy(&mut self, bytes: &[u8]) -> Result<()> {
        self.reserve(bytes.len())?;
        self.data.extend_from_slice(bytes);
        Ok(())
    }
}

/// Run the five-opcode pattern stream. Every packed byte must be consumed and
/// exactly `unpacked_size` bytes produced.
pub fn unpack_pattern_data(packed: &[u8], unpacked_size: usize) -> Result<Vec<u8>> {
    let mut stream = PackedStream { data: packed, pos: 0 };
    let mut out = Output {
        data: Vec::with_capacity(unpacked_size),
        limit: unpacked_size,
    };

    while stream.pos < packed.len() {
        let control = stream.byte()?;
        let opcode = control >> 5;
        let mut count = u32::from(control & 0x1F);
        if count == 0 {
            count = stream.argument()?;
        }
        let count = count as usize;

        match opcode {
            // zero fill
            0 => out.zeros(count)?,
            // block copy
            1 => out.copy(stream.bytes(count)?)?,
            // repeated block
            2 => {
                let repeat = stream.argument()?;
                let block = stream.bytes(count)?;
                out.copy(block)?;
                for _ in 0..repeat {
                    out.copy(block)?;
                }
            }
            // interleave repeated block with block copy
            3 => {
                let custom_size = stream.argument()? as usize;
                let repeat = stream.argument()?;
                let common = stream.bytes(count)?;
                out.copy(common)?;
                for _ in 0..repeat {
                    out.copy(stream.bytes(custom_size)?)?;
                    out.copy(common)?;
                }
            }
            // interleave repeated zeros with block copy
            4 => {
                let custom_size = stream.argument()? as usize;
                let repeat = stream.argument()?;
                for _ in 0..repeat {
                    out.zeros(count)?;
                    out.copy(stream.bytes(custom_size)?)?;
                }
                out.zeros(count)?;
            }
            other => {
                return Err(Error::CorruptSegment(format!(
                    "unknown pattern opcode {other} at packed offset {}",
                    stream.pos - 1
                )));
            }
        }
    }

    if stream.pos != packed.len() {
        return Err(Error::CorruptSegment(format!(
            "parsed {} of {} packed bytes",
            stream.pos,
            packed.len()
        )));
    }
    if out.data.len() != unpacked_size {
        return Err(Error::CorruptSegment(format!(
            "unpacked {} of {} bytes",
            out.data.len(),
            unpacked_size
        )));
    }
    Ok(out.data)
}
