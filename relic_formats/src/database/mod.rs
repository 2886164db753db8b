//! Versioned object database: a fixed game-state buffer plus an arena of
//! objects with single inheritance through their class word.

mod object;
mod property;
mod save;

use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::Path;

use anyhow::Context;
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use log::{debug, warn};
use memmap2::Mmap;
use serde::Serialize;

use crate::error::{Error, Result, format_err};

pub use object::{
    CLASS_BYTE_VECTOR, CLASS_WORD_VECTOR, OBJECT_HEADER_BYTES, ObjectData, ObjectKind, ObjectView,
    data_size,
};
pub use property::PropertyWrite;
pub use save::{SAVE_DESCRIPTION_BYTES, read_savegame_description};

const V2_HEADER_OFFSET: u64 = 0x1C;
const V3_HEADER_OFFSET: u64 = 0x1E;
const TEXT_KEY: u8 = 0x1E;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FormatVersion {
    V2,
    V3,
}

impl FormatVersion {
    pub fn number(self) -> u16 {
        match self {
            FormatVersion::V2 => 2,
            FormatVersion::V3 => 3,
        }
    }

    pub fn from_number(value: u16) -> Result<Self> {
        match value {
            2 => Ok(FormatVersion::V2),
            3 => Ok(FormatVersion::V3),
            other => Err(Error::UnsupportedFeature(format!(
                "object database version {other}"
            ))),
        }
    }
}

/// Summary of one object for reports.
#[derive(Debug, Clone, Serialize)]
pub struct ObjectInfo {
    pub index: u16,
    pub flags: u16,
    pub class: u16,
    pub kind: ObjectKind,
    pub window: Option<usize>,
}

#[derive(Debug, Clone)]
struct Snapshot {
    game_state: Vec<u8>,
    objects: Vec<ObjectData>,
}

#[derive(Debug, Clone)]
pub struct GameDatabase {
    version: FormatVersion,
    game_state: Vec<u8>,
    /// Size recorded in the database header; v2 buffers carry 2 spare bytes.
    game_state_size: usize,
    objects: Vec<ObjectData>,
    game_text: Vec<u8>,
    main_code_object_index: u16,
    initial: Snapshot,
}

impl GameDatabase {
    /// Map a database file and load it.
    pub fn open(path: impl AsRef<Path>, version: FormatVersion) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("opening object database {}", path.display()))?;
        let mmap = unsafe { Mmap::map(&file) }
            .with_context(|| format!("memory-mapping object database {}", path.display()))?;
        let db = Self::load(&mut Cursor::new(&mmap[..]), version)
            .with_context(|| format!("loading object database {}", path.display()))?;
        Ok(db)
    }

    pub fn load<R: Read + Seek>(reader: &mut R, version: FormatVersion) -> Result<Self> {
        match version {
            FormatVersion::V2 => Self::load_v2(reader),
            FormatVersion::V3 => Self::load_v3(reader),
        }
    }

    pub fn load_v2<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        reader.seek(SeekFrom::Start(V2_HEADER_OFFSET))?;
        let text_offset = reader.read_u16::<LittleEndian>()? as u64 * 512;
        let object_count = reader.read_u16::<LittleEndian>()?;
        let var_object_count = reader.read_u16::<LittleEndian>()?;
        let game_state_size = reader.read_u16::<LittleEndian>()? as usize * 2;
        let _unknown0 = reader.read_u16::<LittleEndian>()?;
        let objects_offset = reader.read_u16::<LittleEndian>()? as u64 * 512;
        let _unknown1 = reader.read_u16::<LittleEndian>()?;
        let main_code_object_index = reader.read_u16::<LittleEndian>()?;
        let _unknown2 = reader.read_u16::<LittleEndian>()?;
        let objects_size = reader.read_u32::<LittleEndian>()? as u64 * 2;
        let text_size = objects_offset.checked_sub(text_offset).ok_or_else(|| {
            format_err!("text at {text_offset:#x} starts after objects at {objects_offset:#x}")
        })?;

        debug!(
            "v2 database: text {text_offset:#x}+{text_size:#x}, {object_count} objects \
             ({var_object_count} variable), game state {game_state_size} bytes, \
             objects {objects_offset:#x}+{objects_size:#x}"
        );

        let mut game_state = vec![0u8; game_state_size + 2];
        if let Some(var1) = game_state.get_mut(2..4) {
            LittleEndian::write_u16(var1, object_count);
        }

        reader.seek(SeekFrom::Start(text_offset))?;
        let mut game_text = vec![0u8; text_size as usize];
        reader.read_exact(&mut game_text)?;
        for byte in &mut game_text {
            *byte = byte.wrapping_add(TEXT_KEY);
        }

        reader.seek(SeekFrom::Start(objects_offset))?;
        let mut objects = Vec::with_capacity(object_count as usize);
        for index in 0..object_count {
            let data = object::read_v2_record(reader)
                .map_err(|err| annotate(err, format!("v2 object {}", index + 1)))?;
            // records are 2-byte aligned
            if (data.len() - 2) % 2 != 0 {
                reader.seek(SeekFrom::Current(1))?;
            }
            objects.push(ObjectData::Owned(data));
        }

        Ok(Self::assemble(
            FormatVersion::V2,
            game_state,
            game_state_size,
            objects,
            game_text,
            main_code_object_index,
        ))
    }

    pub fn load_v3<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        reader.seek(SeekFrom::Start(V3_HEADER_OFFSET))?;
        let index_offset = reader.read_u32::<LittleEndian>()?;
        let object_count = reader.read_u16::<LittleEndian>()?;
        let game_state_offset = reader.read_u32::<LittleEndian>()?;
        let game_state_size = reader.read_u32::<LittleEndian>()? as usize;
        let objects_offset = reader.read_u32::<LittleEndian>()?;
        let objects_size = reader.read_u32::<LittleEndian>()?;
        let main_code_object_index = reader.read_u16::<LittleEndian>()?;

        debug!(
            "v3 database: index {index_offset:#x}, {object_count} objects, game state \
             {game_state_offset:#x}+{game_state_size}, objects {objects_offset:#x}+{objects_size:#x}"
        );

        let mut game_state = vec![0u8; game_state_size];
        reader.seek(SeekFrom::Start(game_state_offset as u64))?;
        reader.read_exact(&mut game_state)?;

        reader.seek(SeekFrom::Start(index_offset as u64))?;
        let mut offsets = Vec::with_capacity(object_count as usize);
        for _ in 0..object_count {
            offsets.push(reader.read_u32::<LittleEndian>()?);
        }

        let mut objects = Vec::with_capacity(offsets.len());
        for (i, offset) in offsets.into_iter().enumerate() {
            let index = i + 1;
            // LSB set: constant object in the object pool, stored offset + 1
            let data = if offset & 1 != 0 {
                reader.seek(SeekFrom::Start(objects_offset as u64 + offset as u64 - 1))?;
                let bytes = object::read_v3_record(reader)
                    .map_err(|err| annotate(err, format!("v3 constant object {index}")))?;
                ObjectData::Owned(bytes)
            } else {
                window_in_state(&game_state, offset as usize)
                    .map_err(|err| annotate(err, format!("v3 variable object {index}")))?
            };
            objects.push(data);
        }

        Ok(Self::assemble(
            FormatVersion::V3,
            game_state,
            game_state_size,
            objects,
            Vec::new(),
            main_code_object_index,
        ))
    }

    fn assemble(
        version: FormatVersion,
        game_state: Vec<u8>,
        game_state_size: usize,
        objects: Vec<ObjectData>,
        game_text: Vec<u8>,
        main_code_object_index: u16,
    ) -> Self {
        let initial = Snapshot {
            game_state: game_state.clone(),
            objects: objects.clone(),
        };
        Self {
            version,
            game_state,
            game_state_size,
            objects,
            game_text,
            main_code_object_index,
            initial,
        }
    }

    /// Restore the game state and every object to their loaded contents.
    pub fn reset_game_state(&mut self) {
        self.game_state.clone_from(&self.initial.game_state);
        self.objects.clone_from(&self.initial.objects);
    }

    pub fn version(&self) -> FormatVersion {
        self.version
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn main_code_object_index(&self) -> u16 {
        self.main_code_object_index
    }

    pub fn game_state(&self) -> &[u8] {
        &self.game_state
    }

    pub fn game_state_size(&self) -> usize {
        self.game_state_size
    }

    pub fn object_data(&self, index: u16) -> Option<&ObjectData> {
        index
            .checked_sub(1)
            .and_then(|slot| self.objects.get(slot as usize))
    }

    /// View of object `index` (1-based; 0 means "no object").
    pub fn object(&self, index: u16) -> Option<ObjectView<'_>> {
        let bytes = match self.object_data(index)? {
            ObjectData::Owned(bytes) => bytes.as_slice(),
            ObjectData::Window { offset, len } => self.game_state.get(*offset..*offset + *len)?,
        };
        Some(ObjectView::new(bytes))
    }

    fn object_bytes_mut(&mut self, index: u16) -> Option<&mut [u8]> {
        let slot = index.checked_sub(1)? as usize;
        match self.objects.get_mut(slot)? {
            ObjectData::Owned(bytes) => Some(bytes.as_mut_slice()),
            ObjectData::Window { offset, len } => {
                self.game_state.get_mut(*offset..*offset + *len)
            }
        }
    }

    pub fn object_info(&self, index: u16) -> Option<ObjectInfo> {
        let view = self.object(index)?;
        let window = match self.object_data(index)? {
            ObjectData::Owned(_) => None,
            ObjectData::Window { offset, .. } => Some(*offset),
        };
        Some(ObjectInfo {
            index,
            flags: view.flags(),
            class: view.class(),
            kind: view.kind(),
            window,
        })
    }

    pub fn get_var(&self, index: u16) -> i16 {
        let offset = index as usize * 2;
        match self.game_state.get(offset..offset + 2) {
            Some(word) => LittleEndian::read_i16(word),
            None => {
                warn!("game state variable {index} is out of range");
                0
            }
        }
    }

    pub fn set_var(&mut self, index: u16, value: i16) {
        let offset = index as usize * 2;
        match self.game_state.get_mut(offset..offset + 2) {
            Some(word) => LittleEndian::write_i16(word, value),
            None => warn!("game state variable {index} is out of range, write of {value} dropped"),
        }
    }

    /// Element count of a vector; structured objects report their word count.
    pub fn vector_size(&self, index: u16) -> i16 {
        match self.object(index).map(|view| view.kind()) {
            Some(ObjectKind::ByteVector { len }) | Some(ObjectKind::WordVector { len }) => len as i16,
            Some(ObjectKind::Structured { count1, count2 }) => count1 as i16 + count2 as i16,
            None => 0,
        }
    }

    pub fn vector_item(&self, index: u16, item: i16) -> i16 {
        let Some(view) = self.object(index) else {
            return 0;
        };
        let Ok(item) = usize::try_from(item) else {
            warn!("negative vector index {item} on object {index}");
            return 0;
        };
        let value = match view.kind() {
            ObjectKind::ByteVector { .. } => view.data().get(item).map(|b| i16::from(*b)),
            _ => view.word(item).map(|w| w as i16),
        };
        value.unwrap_or_else(|| {
            warn!("vector index {item} out of range on object {index}");
            0
        })
    }

    pub fn set_vector_item(&mut self, index: u16, item: i16, value: i16) {
        let Some(kind) = self.object(index).map(|view| view.kind()) else {
            return;
        };
        let Ok(item) = usize::try_from(item) else {
            warn!("negative vector index {item} on object {index}");
            return;
        };
        let Some(bytes) = self.object_bytes_mut(index) else {
            return;
        };
        let written = match kind {
            ObjectKind::ByteVector { .. } => match bytes.get_mut(OBJECT_HEADER_BYTES + item) {
                Some(slot) => {
                    *slot = value as u8;
                    true
                }
                None => false,
            },
            _ => object::write_word(bytes, item, value as u16),
        };
        if !written {
            warn!("vector index {item} out of range on object {index}");
        }
    }

    /// NUL-terminated string held in a byte vector.
    pub fn object_string(&self, index: u16) -> Option<String> {
        let view = self.object(index)?;
        if view.class() != CLASS_BYTE_VECTOR {
            return None;
        }
        Some(c_string(view.data()))
    }

    /// Copy `text` into a byte vector, truncated to its size and NUL padded.
    pub fn set_object_string(&mut self, index: u16, text: &str) {
        let Some(size) = self
            .object(index)
            .filter(|view| view.class() == CLASS_BYTE_VECTOR)
            .map(|view| view.size() as usize)
        else {
            return;
        };
        let Some(bytes) = self.object_bytes_mut(index) else {
            return;
        };
        let Some(dest) = bytes.get_mut(OBJECT_HEADER_BYTES..OBJECT_HEADER_BYTES + size) else {
            return;
        };
        let src = text.as_bytes();
        let copied = src.len().min(size);
        dest[..copied].copy_from_slice(&src[..copied]);
        dest[copied..].fill(0);
    }

    /// Decrypted game text string at `offset * 4`.
    pub fn game_string(&self, offset: u16) -> Option<String> {
        self.game_text
            .get(offset as usize * 4..)
            .map(c_string)
    }
}

fn window_in_state(game_state: &[u8], offset: usize) -> Result<ObjectData> {
    let header = game_state
        .get(offset..offset + OBJECT_HEADER_BYTES)
        .ok_or_else(|| format_err!("object header at {offset:#x} beyond game state"))?;
    let class = LittleEndian::read_u16(&header[2..4]);
    let len = OBJECT_HEADER_BYTES + data_size(class, [header[4], header[5]])?;
    if offset + len > game_state.len() {
        return Err(format_err!(
            "object at {offset:#x} ({len} bytes) overruns game state of {} bytes",
            game_state.len()
        ));
    }
    Ok(ObjectData::Window { offset, len })
}

fn annotate(err: Error, what: String) -> Error {
    match err {
        Error::Format(msg) => Error::Format(format!("{what}: {msg}")),
        other => other,
    }
}

pub(crate) fn c_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
