use byteorder::{ByteOrder, LittleEndian};
use log::{debug, warn};

use super::object::write_word;
use super::{FormatVersion, GameDatabase};

/// Ancestor property stored once in the class rather than per instance.
const ID_CLASS_SHARED: u16 = 0x8000;
/// v3: the slot holds the index of a game-state word.
const ID_GAME_STATE: u16 = 0x4000;

/// Outcome of a property write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyWrite {
    Written(i16),
    /// The property lives in a constant object; nothing was written.
    RejectedConstant(i16),
    Missing,
}

impl PropertyWrite {
    /// Value reported back to scripts: the requested value when the
    /// property exists, 0 otherwise.
    pub fn value(self) -> i16 {
        match self {
            PropertyWrite::Written(value) | PropertyWrite::RejectedConstant(value) => value,
            PropertyWrite::Missing => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Object { object: u16, word: usize },
    GameState { word: usize },
}

#[derive(Debug, Clone, Copy)]
struct PropertySlot {
    slot: Slot,
    writable: bool,
}

impl GameDatabase {
    fn id_mask(&self) -> u16 {
        match self.version {
            FormatVersion::V2 => 0x7FFF,
            FormatVersion::V3 => 0x3FFF,
        }
    }

    fn resolve(&self, object: u16, word: usize, id: u16, flags: u16) -> Option<PropertySlot> {
        if self.version == FormatVersion::V3 && id & ID_GAME_STATE != 0 {
            let target = self.object(object)?.word(word)?;
            return Some(PropertySlot {
                slot: Slot::GameState {
                    word: target as usize,
                },
                writable: true,
            });
        }
        Some(PropertySlot {
            slot: Slot::Object { object, word },
            writable: flags & 1 != 0,
        })
    }

    /// Locate `property` on `object`: its own ids first, then each ancestor
    /// in turn. The first matching id wins.
    fn find_property(&self, object: u16, property: u16) -> Option<PropertySlot> {
        let mask = self.id_mask();
        let Some(own) = self.object(object) else {
            warn!("property {property:#06x} requested on missing object {object}");
            return None;
        };
        if !own.is_object() {
            debug!("object {object} is a vector, property {property:#06x} absent");
            return None;
        }

        let own_count1 = own.count1() as usize;
        let own_count2 = own.count2() as usize;
        for i in 0..own_count2 {
            let id = own.word(i)?;
            if id & mask == property {
                return self.resolve(object, own_count1 + i, id, own.flags());
            }
        }

        let mut parent = own.class();
        let mut depth = 0;
        while parent != 0 {
            depth += 1;
            if depth > self.objects.len() {
                warn!("class chain of object {object} does not terminate");
                return None;
            }
            let Some(class) = self.object(parent).filter(|view| view.is_object()) else {
                warn!("object {object} names missing class {parent}");
                return None;
            };

            let count1 = class.count1() as usize;
            let count2 = class.count2() as usize;
            // instance slots for this class follow the instance's own ids
            let mut instance_word = (own_count2 + count1) as isize - count2 as isize;
            for j in 0..count2 {
                let id = class.word(j)?;
                if id & ID_CLASS_SHARED == 0 {
                    if id & mask == property {
                        let Ok(word) = usize::try_from(instance_word) else {
                            warn!("class {parent} maps property {property:#06x} before object {object}'s data");
                            return None;
                        };
                        return self.resolve(object, word, id, class.flags());
                    }
                    instance_word += 1;
                } else if id & mask == property {
                    return self.resolve(parent, count1 + j, id, class.flags());
                }
            }
            parent = class.class();
        }

        None
    }

    fn read_slot(&self, slot: Slot) -> Option<i16> {
        match slot {
            Slot::Object { object, word } => self.object(object)?.word(word).map(|w| w as i16),
            Slot::GameState { word } => self
                .game_state
                .get(word * 2..word * 2 + 2)
                .map(LittleEndian::read_i16),
        }
    }

    fn write_slot(&mut self, slot: Slot, value: i16) -> bool {
        match slot {
            Slot::Object { object, word } => self
                .object_bytes_mut(object)
                .is_some_and(|bytes| write_word(bytes, word, value as u16)),
            Slot::GameState { word } => match self.game_state.get_mut(word * 2..word * 2 + 2) {
                Some(bytes) => {
                    LittleEndian::write_i16(bytes, value);
                    true
                }
                None => false,
            },
        }
    }

    /// Property value, or 0 when the object is 0 or the property is absent.
    pub fn get_property(&self, object: u16, property: u16) -> i16 {
        if object == 0 {
            return 0;
        }
        let Some(found) = self.find_property(object, property) else {
            return 0;
        };
        self.read_slot(found.slot).unwrap_or_else(|| {
            warn!("property {property:#06x} of object {object} points outside its storage");
            0
        })
    }

    pub fn set_property(&mut self, object: u16, property: u16, value: i16) -> PropertyWrite {
        if object == 0 {
            return PropertyWrite::Missing;
        }
        let Some(found) = self.find_property(object, property) else {
            return PropertyWrite::Missing;
        };
        if !found.writable {
            warn!(
                "set_property({object:#06x}, {property:#06x}, {value:#06x}): property is constant"
            );
            return PropertyWrite::RejectedConstant(value);
        }
        if !self.write_slot(found.slot, value) {
            warn!("property {property:#06x} of object {object} points outside its storage");
            return PropertyWrite::Missing;
        }
        PropertyWrite::Written(value)
    }
}
