use std::io::{Read, Write};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use log::debug;

use super::object::read_v2_record;
use super::{FormatVersion, GameDatabase, ObjectData, c_string};
use crate::error::{Result, format_err};

const SAVE_MAGIC: u32 = u32::from_be_bytes(*b"SGAM");
pub const SAVE_DESCRIPTION_BYTES: usize = 64;

/// Validate a v3 save header and return its version and description,
/// leaving the reader at the game state.
fn read_v3_header<R: Read>(reader: &mut R) -> Result<(u16, String)> {
    let magic = reader.read_u32::<BigEndian>()?;
    if magic != SAVE_MAGIC {
        return Err(format_err!("save game magic {magic:08x} is not 'SGAM'"));
    }
    let _size = reader.read_u32::<LittleEndian>()?;
    let version = reader.read_u16::<LittleEndian>()?;
    let mut description = [0u8; SAVE_DESCRIPTION_BYTES];
    reader.read_exact(&mut description)?;
    Ok((version, c_string(&description)))
}

/// Description stored in a v3 save game.
pub fn read_savegame_description<R: Read>(reader: &mut R) -> Result<String> {
    Ok(read_v3_header(reader)?.1)
}

impl GameDatabase {
    /// Write the mutable state. v2: game state without variable 0, then
    /// every object record. v3: `SGAM` header then the whole game state.
    pub fn save_state<W: Write>(&self, writer: &mut W, description: &str, version: u16) -> Result<()> {
        match self.version {
            FormatVersion::V2 => {
                writer.write_all(self.game_state.get(2..self.game_state_size).unwrap_or(&[]))?;
                for object in &self.objects {
                    if let ObjectData::Owned(bytes) = object {
                        writer.write_all(&bytes[2..])?;
                    }
                }
            }
            FormatVersion::V3 => {
                let size = 4 + 4 + 2 + self.game_state_size as u32;
                writer.write_u32::<BigEndian>(SAVE_MAGIC)?;
                writer.write_u32::<LittleEndian>(size)?;
                writer.write_u16::<LittleEndian>(version)?;
                let mut desc = [0u8; SAVE_DESCRIPTION_BYTES];
                let text = description.as_bytes();
                let len = text.len().min(SAVE_DESCRIPTION_BYTES);
                desc[..len].copy_from_slice(&text[..len]);
                writer.write_all(&desc)?;
                writer.write_all(&self.game_state)?;
            }
        }
        Ok(())
    }

    /// Restore state written by [`GameDatabase::save_state`] for the same
    /// database. Nothing changes unless the whole save reads back cleanly.
    pub fn load_state<R: Read>(&mut self, reader: &mut R) -> Result<()> {
        match self.version {
            FormatVersion::V2 => {
                let end = self.game_state_size.max(2);
                let mut state = vec![0u8; end - 2];
                reader.read_exact(&mut state)?;

                let mut records = Vec::with_capacity(self.objects.len());
                for (i, object) in self.objects.iter().enumerate() {
                    let record = read_v2_record(reader)?;
                    let ObjectData::Owned(bytes) = object else {
                        return Err(format_err!("v2 object {} is not owned", i + 1));
                    };
                    if record.len() != bytes.len() {
                        return Err(format_err!(
                            "saved object {} has {} bytes, database has {}",
                            i + 1,
                            record.len(),
                            bytes.len()
                        ));
                    }
                    records.push(record);
                }

                self.game_state[2..end].copy_from_slice(&state);
                for (object, record) in self.objects.iter_mut().zip(records) {
                    if let ObjectData::Owned(bytes) = object {
                        *bytes = record;
                    }
                }
            }
            FormatVersion::V3 => {
                let (version, description) = read_v3_header(reader)?;
                debug!("restoring save version {version}: {description:?}");
                let mut state = vec![0u8; self.game_state.len()];
                reader.read_exact(&mut state)?;
                self.game_state.copy_from_slice(&state);
            }
        }
        Ok(())
    }
}
