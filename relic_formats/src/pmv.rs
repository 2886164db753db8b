use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use log::{debug, warn};
use serde::Serialize;

use crate::chunk::{ChunkLayout, ChunkReader, Tag, le_u16, le_u32, sub_slice};
use crate::error::{Error, Result, format_err};

const TAG_MOVE: Tag = Tag::new(b"MOVE");
const TAG_MHED: Tag = Tag::new(b"MHED");
const TAG_MFRM: Tag = Tag::new(b"MFRM");

pub const PALETTE_BYTES: usize = 768;

/// Offsets stored in a frame payload count from the chunk header.
const FRAME_OFFSET_BIAS: usize = 8;

/// Movie-level metadata from the `MHED` chunk and the first frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PmvHeader {
    pub frame_delay_ms: u16,
    pub frame_count: u16,
    /// Sample rate as stored in the file.
    pub raw_sound_frequency: u16,
    /// Sample rate handed to the mixer after correcting the odd stored rates.
    pub sound_frequency: u32,
    pub width: u16,
    pub height: u16,
}

impl PmvHeader {
    pub fn frame_rate(&self) -> u32 {
        1000 / u32::from(self.frame_delay_ms.max(1))
    }
}

/// Stored rates 11127 and 22254 play back at the common 11025/22050.
pub fn corrected_sample_rate(stored: u16) -> u32 {
    match stored {
        11127 => 11025,
        22254 => 22050,
        other => u32::from(other),
    }
}

/// Unsigned 8-bit mono PCM decoded from one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBuffer {
    pub sample_rate: u32,
    pub samples: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PmvFrame {
    pub index: u32,
    pub audio: Option<AudioBuffer>,
    pub palette_changed: bool,
    pub image_updated: bool,
}

/// 8-bit indexed frame buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Surface {
    pub width: u16,
    pub height: u16,
    pub pixels: Vec<u8>,
}

impl Surface {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize],
        }
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<u8> {
        if x >= self.width as usize || y >= self.height as usize {
            return None;
        }
        self.pixels.get(y * self.width as usize + x).copied()
    }

    fn put(&mut self, x: usize, y: usize, value: u8) {
        if x < self.width as usize && y < self.height as usize {
            self.pixels[y * self.width as usize + x] = value;
        }
    }
}

/// Image sub-chunk handed to the raster collaborator. Offsets are relative
/// to the start of `data`.
#[derive(Debug, Clone, Copy)]
pub struct ImagePacket<'a> {
    pub data: &'a [u8],
    pub width: u16,
    pub height: u16,
    pub cmd_offset: usize,
    pub pixel_offset: usize,
    pub mask_offset: usize,
    pub line_size: usize,
}

impl<'a> ImagePacket<'a> {
    fn parse(data: &'a [u8]) -> Result<Self> {
        let depth = le_u16(data, 6)?;
        if depth != 0 && depth != 8 {
            return Err(Error::UnsupportedPixelDepth(depth));
        }
        Ok(Self {
            data,
            width: le_u16(data, 8)?,
            height: le_u16(data, 10)?,
            cmd_offset: le_u16(data, 12)? as usize,
            pixel_offset: le_u16(data, 16)? as usize,
            mask_offset: le_u16(data, 20)? as usize,
            line_size: le_u16(data, 24)? as usize,
        })
    }
}

/// Pixel codec plugged into the demultiplexer.
pub trait RasterDecompressor {
    fn decompress(&mut self, image: &ImagePacket<'_>, surface: &mut Surface) -> Result<()>;
}

/// 4x4 block codec. Each block row has `line_size` bytes of 2-bit commands
/// (low bits first): 0 fill with one colour, 1 two colours chosen by a
/// 16-bit mask, 2 four colours chosen by a 32-bit mask of 2-bit indices,
/// 3 keep the previous frame's pixels.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlockRasterDecompressor;

struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    fn take(&mut self, count: usize) -> Result<&'a [u8]> {
        let slice = self
            .data
            .get(self.pos..self.pos + count)
            .ok_or(Error::UnexpectedEndOfStream)?;
        self.pos += count;
        Ok(slice)
    }
}

impl RasterDecompressor for BlockRasterDecompressor {
    fn decompress(&mut self, image: &ImagePacket<'_>, surface: &mut Surface) -> Result<()> {
        let blocks_x = (surface.width as usize).div_ceil(4);
        let blocks_y = (surface.height as usize).div_ceil(4);
        if blocks_x.div_ceil(4) > image.line_size {
            return Err(format_err!(
                "command line size {} too small for {} blocks",
                image.line_size,
                blocks_x
            ));
        }

        let mut pixels = ByteCursor {
            data: image.data,
            pos: image.pixel_offset,
        };
        let mut masks = ByteCursor {
            data: image.data,
            pos: image.mask_offset,
        };

        for by in 0..blocks_y {
            let row = image.cmd_offset + by * image.line_size;
            for bx in 0..blocks_x {
                let cmd_byte = *image
                    .data
                    .get(row + bx / 4)
                    .ok_or(Error::UnexpectedEndOfStream)?;
                let command = (cmd_byte >> ((bx % 4) * 2)) & 3;

                let mut block = [0u8; 16];
                match command {
                    0 => block = [pixels.take(1)?[0]; 16],
                    1 => {
                        let colours = pixels.take(2)?;
                        let mask = le_u16(masks.take(2)?, 0)?;
                        for (i, px) in block.iter_mut().enumerate() {
                            *px = colours[usize::from(mask >> i & 1)];
                        }
                    }
                    2 => {
                        let colours = pixels.take(4)?;
                        let mask = le_u32(masks.take(4)?, 0)?;
                        for (i, px) in block.iter_mut().enumerate() {
                            *px = colours[(mask >> (i * 2) & 3) as usize];
                        }
                    }
                    _ => continue,
                }

                for (i, value) in block.iter().enumerate() {
                    surface.put(bx * 4 + i % 4, by * 4 + i / 4, *value);
                }
            }
        }
        Ok(())
    }
}

/// Streaming PMV demultiplexer. Frames are decoded one at a time; the
/// palette and surface persist between frames.
pub struct PmvDecoder<R> {
    chunks: ChunkReader<R>,
    header: PmvHeader,
    palette: [u8; PALETTE_BYTES],
    dirty_palette: bool,
    surface: Surface,
    raster: Box<dyn RasterDecompressor>,
    current_frame: u32,
    finished: bool,
}

impl PmvDecoder<BufReader<File>> {
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::open(BufReader::new(file))
    }
}

impl<R: Read + Seek> PmvDecoder<R> {
    pub fn open(reader: R) -> Result<Self> {
        Self::with_raster(reader, Box::new(BlockRasterDecompressor))
    }

    pub fn with_raster(reader: R, raster: Box<dyn RasterDecompressor>) -> Result<Self> {
        let mut chunks = ChunkReader::new(reader, ChunkLayout::PMV);
        chunks.expect(TAG_MOVE)?;
        chunks.expect(TAG_MHED)?;

        let stream = chunks.get_mut();
        let frame_delay_ms = stream.read_u16::<LittleEndian>()?;
        skip(stream, 4)?;
        let frame_count = stream.read_u16::<LittleEndian>()?;
        skip(stream, 4)?;
        let raw_sound_frequency = stream.read_u16::<LittleEndian>()?;
        skip(stream, 22 * 2)?;
        let mut palette = [0u8; PALETTE_BYTES];
        stream.read_exact(&mut palette)?;

        let (width, height) = peek_dimensions(&mut chunks)?;
        let header = PmvHeader {
            frame_delay_ms,
            frame_count,
            raw_sound_frequency,
            sound_frequency: corrected_sample_rate(raw_sound_frequency),
            width,
            height,
        };
        debug!("PMV header: {header:?}");

        Ok(Self {
            chunks,
            header,
            palette,
            dirty_palette: true,
            surface: Surface::new(width, height),
            raster,
            current_frame: 0,
            finished: false,
        })
    }

    pub fn header(&self) -> &PmvHeader {
        &self.header
    }

    pub fn width(&self) -> u16 {
        self.header.width
    }

    pub fn height(&self) -> u16 {
        self.header.height
    }

    pub fn frame_rate(&self) -> u32 {
        self.header.frame_rate()
    }

    pub fn current_frame(&self) -> u32 {
        self.current_frame
    }

    pub fn palette(&self) -> &[u8; PALETTE_BYTES] {
        &self.palette
    }

    pub fn has_dirty_palette(&self) -> bool {
        self.dirty_palette
    }

    pub fn clear_dirty_palette(&mut self) {
        self.dirty_palette = false;
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn end_of_video(&self) -> bool {
        self.finished || self.current_frame >= u32::from(self.header.frame_count)
    }

    /// Decode the next frame into the surface. `Ok(None)` at end of stream;
    /// after an error the movie is finished.
    pub fn decode_next_frame(&mut self) -> Result<Option<PmvFrame>> {
        if self.end_of_video() {
            return Ok(None);
        }
        let result = self.decode_frame();
        match &result {
            Ok(None) | Err(_) => self.finished = true,
            Ok(Some(_)) => self.current_frame += 1,
        }
        result
    }

    fn decode_frame(&mut self) -> Result<Option<PmvFrame>> {
        let payload = loop {
            let Some(header) = self.chunks.next_header()? else {
                return Ok(None);
            };
            if header.tag != TAG_MFRM {
                warn!(
                    "skipping unexpected '{}' chunk at {:#x} in movie frame stream",
                    header.tag,
                    header.start()
                );
                self.chunks.skip_payload(&header)?;
                continue;
            }
            break self.chunks.read_payload(&header)?;
        };

        let sound_offset = le_u32(&payload, 8)? as usize;
        let image_offset = le_u32(&payload, 12)? as usize;
        let palette_offset = le_u32(&payload, 16)? as usize;

        let audio = if sound_offset != 0 {
            let packet = sub_slice(&payload, sound_offset, FRAME_OFFSET_BIAS)?;
            let chunk_size = le_u16(packet, 4)? as usize;
            let chunk_count = le_u16(packet, 6)? as usize;
            let data = packet.get(8..).ok_or(Error::UnexpectedEndOfStream)?;
            Some(AudioBuffer {
                sample_rate: self.header.sound_frequency,
                samples: decompress_sound(data, chunk_size, chunk_count)?,
            })
        } else {
            None
        };

        let palette_changed = palette_offset != 0;
        if palette_changed {
            let packet = sub_slice(&payload, palette_offset, FRAME_OFFSET_BIAS)?;
            let size = le_u32(packet, 4)? as usize;
            let data = packet
                .get(8..8usize.saturating_add(size))
                .ok_or(Error::UnexpectedEndOfStream)?;
            apply_palette_delta(&mut self.palette, data)?;
            self.dirty_palette = true;
        }

        let image_updated = image_offset != 0;
        if image_updated {
            let packet = sub_slice(&payload, image_offset, FRAME_OFFSET_BIAS)?;
            let image = ImagePacket::parse(packet)?;
            self.raster.decompress(&image, &mut self.surface)?;
        }

        Ok(Some(PmvFrame {
            index: self.current_frame,
            audio,
            palette_changed,
            image_updated,
        }))
    }
}

fn skip<R: Read>(reader: &mut R, count: u64) -> Result<()> {
    let copied = std::io::copy(&mut reader.by_ref().take(count), &mut std::io::sink())?;
    if copied != count {
        return Err(Error::UnexpectedEndOfStream);
    }
    Ok(())
}

/// Read the image sub-chunk dimensions of the first frame without
/// consuming it.
fn peek_dimensions<R: Read + Seek>(chunks: &mut ChunkReader<R>) -> Result<(u16, u16)> {
    let start = chunks.position()?;
    let header = match chunks.next_header()? {
        Some(header) if header.tag == TAG_MFRM => header,
        Some(header) => {
            return Err(format_err!("expected 'MFRM' chunk after header, found '{}'", header.tag));
        }
        None => return Err(format_err!("movie contains no frames")),
    };

    let payload = chunks.read_payload(&header)?;
    let image_offset = le_u32(&payload, 12)? as usize;
    let image = ImagePacket::parse(sub_slice(&payload, image_offset, FRAME_OFFSET_BIAS)?)?;
    chunks.seek_to(start)?;
    Ok((image.width, image.height))
}

/// Apply `(count, first)` runs of `count + 1` RGB triples; `(255, 255)`
/// ends the list early.
pub fn apply_palette_delta(palette: &mut [u8; PALETTE_BYTES], data: &[u8]) -> Result<()> {
    let mut pos = 0;
    while pos < data.len() {
        let (count, entry) = match data.get(pos..pos + 2) {
            Some(pair) => (pair[0] as usize, pair[1] as usize),
            None => return Err(Error::UnexpectedEndOfStream),
        };
        pos += 2;
        if count == 255 && entry == 255 {
            break;
        }

        let len = (count + 1) * 3;
        let start = entry * 3;
        if start + len > PALETTE_BYTES {
            return Err(format_err!(
                "palette run of {} entries from {entry} overflows the palette",
                count + 1
            ));
        }
        let run = data
            .get(pos..pos + len)
            .ok_or(Error::UnexpectedEndOfStream)?;
        palette[start..start + len].copy_from_slice(run);
        pos += len;
    }
    Ok(())
}

const SILENCE: u8 = 0x80;

/// Expand a packed audio packet of `chunk_count` chunks, each producing
/// `chunk_size` unsigned 8-bit samples.
///
/// Every chunk opens with a mode byte. The low nibble selects the body:
/// 0 silence, 1 repeat the previous sample, 2..=4 that many bits per sample
/// indexing a table of `1 << bits` values which precedes the MSB-first
/// indices, 5 raw bytes. A high nibble of 1 treats the values as signed
/// deltas accumulated from the previous sample.
pub fn decompress_sound(data: &[u8], chunk_size: usize, chunk_count: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(chunk_size * chunk_count);
    let mut input = ByteCursor { data, pos: 0 };
    let mut last = SILENCE;

    for chunk in 0..chunk_count {
        let mode = input.take(1)?[0];
        let delta = match mode >> 4 {
            0 => false,
            1 => true,
            other => {
                return Err(format_err!("audio chunk {chunk}: unknown coding {other}"));
            }
        };

        let values: Vec<u8> = match mode & 0x0F {
            0 => {
                last = SILENCE;
                out.resize(out.len() + chunk_size, SILENCE);
                continue;
            }
            1 => {
                out.resize(out.len() + chunk_size, last);
                continue;
            }
            bits @ 2..=4 => {
                let bits = bits as usize;
                let table = input.take(1 << bits)?;
                let packed = input.take((chunk_size * bits).div_ceil(8))?;
                (0..chunk_size)
                    .map(|i| {
                        let bit = i * bits;
                        let word = u16::from(packed[bit / 8]) << 8
                            | u16::from(packed.get(bit / 8 + 1).copied().unwrap_or(0));
                        let index = (word >> (16 - bits - bit % 8)) as usize & ((1 << bits) - 1);
                        table[index]
                    })
                    .collect()
            }
            5 => input.take(chunk_size)?.to_vec(),
            other => {
                return Err(format_err!("audio chunk {chunk}: unknown packing {other}"));
            }
        };

        for value in values {
            last = if delta {
                (i16::from(last) + i16::from(value as i8)).clamp(0, 255) as u8
            } else {
                value
            };
            out.push(last);
        }
    }
    Ok(out)
}
