use std::fmt;
use std::io::{ErrorKind, Read, Seek, SeekFrom};

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};

use crate::error::{Error, Result, format_err};

/// Four-character chunk identifier, stored in file order.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag(pub [u8; 4]);

impl Tag {
    pub const fn new(bytes: &[u8; 4]) -> Self {
        Tag(*bytes)
    }

    pub fn as_u32(self) -> u32 {
        u32::from_be_bytes(self.0)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
            write!(f, "{}", String::from_utf8_lossy(&self.0))
        } else {
            write!(f, "{:08x}", self.as_u32())
        }
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({self})")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeOrder {
    Big,
    Little,
}

/// How chunk headers are framed inside a particular container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLayout {
    pub size_order: SizeOrder,
    /// Payloads with an odd size are followed by one pad byte.
    pub even_aligned: bool,
}

impl ChunkLayout {
    /// Big-endian tag, little-endian size, no padding (PMV movies).
    pub const PMV: ChunkLayout = ChunkLayout {
        size_order: SizeOrder::Little,
        even_aligned: false,
    };

    /// Classic IFF framing: big-endian size, payloads padded to even length.
    pub const IFF: ChunkLayout = ChunkLayout {
        size_order: SizeOrder::Big,
        even_aligned: true,
    };

    fn padding(&self, size: u32) -> u64 {
        if self.even_aligned && size & 1 != 0 { 1 } else { 0 }
    }
}

/// Header of one chunk; `offset` is the absolute position of the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub tag: Tag,
    pub size: u32,
    pub offset: u64,
}

impl ChunkHeader {
    /// Absolute position of the 8-byte header itself.
    pub fn start(&self) -> u64 {
        self.offset - 8
    }
}

/// Iterates tagged, length-prefixed chunks over a seekable stream.
pub struct ChunkReader<R> {
    reader: R,
    layout: ChunkLayout,
}

impl<R: Read + Seek> ChunkReader<R> {
    pub fn new(reader: R, layout: ChunkLayout) -> Self {
        Self { reader, layout }
    }

    pub fn layout(&self) -> ChunkLayout {
        self.layout
    }

    pub fn position(&mut self) -> Result<u64> {
        Ok(self.reader.stream_position()?)
    }

    pub fn seek_to(&mut self, pos: u64) -> Result<()> {
        self.reader.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Read the next chunk header. Returns `None` on a clean end of stream;
    /// a header cut short is `UnexpectedEndOfStream`.
    pub fn next_header(&mut self) -> Result<Option<ChunkHeader>> {
        let mut tag = [0u8; 4];
        let mut filled = 0;
        while filled < tag.len() {
            match self.reader.read(&mut tag[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
        if filled == 0 {
            return Ok(None);
        }
        if filled < tag.len() {
            return Err(Error::UnexpectedEndOfStream);
        }

        let size = match self.layout.size_order {
            SizeOrder::Big => self.reader.read_u32::<BigEndian>()?,
            SizeOrder::Little => self.reader.read_u32::<LittleEndian>()?,
        };
        let offset = self.reader.stream_position()?;
        Ok(Some(ChunkHeader {
            tag: Tag(tag),
            size,
            offset,
        }))
    }

    /// Read the next header and require it to carry `tag`.
    pub fn expect(&mut self, tag: Tag) -> Result<ChunkHeader> {
        match self.next_header() {
            Ok(Some(header)) if header.tag == tag => Ok(header),
            Ok(Some(header)) => Err(format_err!("expected '{tag}' chunk, found '{}'", header.tag)),
            Ok(None) | Err(Error::UnexpectedEndOfStream) => {
                Err(format_err!("expected '{tag}' chunk, found end of stream"))
            }
            Err(err) => Err(err),
        }
    }

    /// Read a chunk payload; the stream must sit at `header.offset`.
    pub fn read_payload(&mut self, header: &ChunkHeader) -> Result<Vec<u8>> {
        let mut payload = vec![0u8; header.size as usize];
        self.reader.read_exact(&mut payload)?;
        let pad = self.layout.padding(header.size);
        if pad != 0 {
            self.reader.seek(SeekFrom::Current(pad as i64))?;
        }
        Ok(payload)
    }

    pub fn skip_payload(&mut self, header: &ChunkHeader) -> Result<()> {
        let end = header.offset + header.size as u64 + self.layout.padding(header.size);
        self.reader.seek(SeekFrom::Start(end))?;
        Ok(())
    }
}

/// Resolve an offset recorded inside a chunk payload. `bias` is subtracted
/// first (PMV frames count offsets from the chunk header, 8 bytes earlier).
pub fn sub_slice(payload: &[u8], offset: usize, bias: usize) -> Result<&[u8]> {
    let start = offset
        .checked_sub(bias)
        .ok_or_else(|| format_err!("sub-chunk offset {offset} precedes payload start"))?;
    payload
        .get(start..)
        .ok_or_else(|| format_err!("sub-chunk offset {offset} beyond payload of {} bytes", payload.len()))
}

pub(crate) fn le_u16(data: &[u8], offset: usize) -> Result<u16> {
    data.get(offset..offset + 2)
        .map(LittleEndian::read_u16)
        .ok_or(Error::UnexpectedEndOfStream)
}

pub(crate) fn le_u32(data: &[u8], offset: usize) -> Result<u32> {
    data.get(offset..offset + 4)
        .map(LittleEndian::read_u32)
        .ok_or(Error::UnexpectedEndOfStream)
}
