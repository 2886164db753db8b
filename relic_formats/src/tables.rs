//! Resource tables embedded in the decompressed executable data segment:
//! ages, sound/movie names, help and URL strings, and per-node scripts.

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Seek, SeekFrom};

use byteorder::{BigEndian, ReadBytesExt};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result, format_err};

pub const AGE_COUNT: usize = 8;

/// Offsets of the fixed tables inside the data segment. They differ per
/// executable release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableLayout {
    pub age_table: u32,
    pub sound_table: u32,
    pub movie_table: u32,
    pub help_table: u32,
    pub url_table: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptOpcode {
    pub op: u8,
    pub args: Vec<i16>,
}

pub type Script = Vec<ScriptOpcode>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConditionalScript {
    pub condition: u16,
    pub script: Script,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rect {
    pub left: i16,
    pub top: i16,
    pub right: i16,
    pub bottom: i16,
}

/// Condition 0xFFFF marks a hotspot without rectangles or cursor.
pub const HOTSPOT_NO_AREA: u16 = 0xFFFF;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hotspot {
    pub condition: u16,
    pub rects: Vec<Rect>,
    pub cursor: u16,
    pub script: Script,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Node {
    pub main_scripts: Vec<ConditionalScript>,
    pub sound_scripts: Vec<ConditionalScript>,
    pub hotspots: Vec<Hotspot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Age {
    pub id: u16,
    pub disk: u16,
    pub age_data_offset: u32,
    pub age_name_offset: u32,
    pub unknown: [u32; 4],
    /// Empty for ages without a title (intro, credits).
    pub name: String,
    /// Two ASCII characters packed big-endian.
    pub prefix: u16,
    pub main_script_offset: u32,
    pub sound_script_offset: u32,
    pub nodes: BTreeMap<u16, Node>,
}

impl Age {
    pub fn prefix_string(&self) -> String {
        let [hi, lo] = self.prefix.to_be_bytes();
        [hi as char, lo as char].iter().collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceTables {
    pub ages: Vec<Age>,
    pub sound_names: BTreeMap<u16, String>,
    pub movie_names: BTreeMap<u16, String>,
    pub help_texts: BTreeMap<u16, String>,
    pub urls: BTreeMap<u16, String>,
}

type SegmentReader<'a> = Cursor<&'a [u8]>;

impl ResourceTables {
    /// Parse every table from a decompressed data segment.
    pub fn load(segment: &[u8], layout: &TableLayout) -> Result<Self> {
        let mut s = Cursor::new(segment);

        let mut ages = read_ages(&mut s, layout.age_table)?;
        let sound_names = read_name_table(&mut s, layout.sound_table, ".aif", "sound")?;
        let movie_names = read_name_table(&mut s, layout.movie_table, ".mov", "movie")?;
        let help_texts = read_string_table(&mut s, layout.help_table, "help")?;
        let urls = read_string_table(&mut s, layout.url_table, "url")?;
        for age in &mut ages {
            read_main_scripts(&mut s, age)?;
            read_sound_scripts(&mut s, age)?;
        }

        Ok(Self {
            ages,
            sound_names,
            movie_names,
            help_texts,
            urls,
        })
    }

    pub fn ages(&self) -> &[Age] {
        &self.ages
    }

    pub fn find_age(&self, id: u16) -> Result<&Age> {
        self.ages
            .iter()
            .find(|age| age.id == id)
            .ok_or(Error::MissingResource {
                kind: "age",
                id: id.into(),
            })
    }

    pub fn node(&self, age: u16, node: u16) -> Result<&Node> {
        self.find_age(age)?
            .nodes
            .get(&node)
            .ok_or(Error::MissingResource {
                kind: "node",
                id: node.into(),
            })
    }

    pub fn age_prefix(&self, age: u16) -> Result<String> {
        Ok(self.find_age(age)?.prefix_string())
    }

    pub fn sound_name(&self, id: u16) -> Result<&str> {
        lookup(&self.sound_names, "sound", id)
    }

    pub fn movie_name(&self, id: u16) -> Result<&str> {
        lookup(&self.movie_names, "movie", id)
    }

    pub fn help_text(&self, id: u16) -> Result<&str> {
        lookup(&self.help_texts, "help text", id)
    }

    pub fn url(&self, id: u16) -> Result<&str> {
        lookup(&self.urls, "url", id)
    }
}

fn lookup<'a>(table: &'a BTreeMap<u16, String>, kind: &'static str, id: u16) -> Result<&'a str> {
    table.get(&id).map(String::as_str).ok_or(Error::MissingResource {
        kind,
        id: id.into(),
    })
}

fn seek(s: &mut SegmentReader<'_>, offset: u32) -> Result<()> {
    if offset as usize > s.get_ref().len() {
        return Err(format_err!(
            "table offset {offset:#x} beyond data segment of {:#x} bytes",
            s.get_ref().len()
        ));
    }
    s.seek(SeekFrom::Start(offset.into()))?;
    Ok(())
}

fn c_string_at(s: &SegmentReader<'_>, offset: u32) -> Result<String> {
    let data = s.get_ref();
    let tail = data
        .get(offset as usize..)
        .ok_or(Error::UnexpectedEndOfStream)?;
    let end = tail
        .iter()
        .position(|b| *b == 0)
        .ok_or(Error::UnexpectedEndOfStream)?;
    Ok(String::from_utf8_lossy(&tail[..end]).into_owned())
}

fn read_ages(s: &mut SegmentReader<'_>, offset: u32) -> Result<Vec<Age>> {
    seek(s, offset)?;
    let mut ages = Vec::with_capacity(AGE_COUNT);
    for _ in 0..AGE_COUNT {
        let id = s.read_u16::<BigEndian>()?;
        let disk = s.read_u16::<BigEndian>()?;
        let u0 = s.read_u32::<BigEndian>()?;
        let age_data_offset = s.read_u32::<BigEndian>()?;
        let u1 = s.read_u32::<BigEndian>()?;
        let u2 = s.read_u32::<BigEndian>()?;
        let u3 = s.read_u32::<BigEndian>()?;
        let age_name_offset = s.read_u32::<BigEndian>()?;
        ages.push(Age {
            id,
            disk,
            age_data_offset,
            age_name_offset,
            unknown: [u0, u1, u2, u3],
            name: String::new(),
            prefix: 0,
            main_script_offset: 0,
            sound_script_offset: 0,
            nodes: BTreeMap::new(),
        });
    }

    for age in &mut ages {
        age.name = c_string_at(s, age.age_name_offset)?;

        seek(s, age.age_data_offset)?;
        let script_info = s.read_u32::<BigEndian>()?;
        // the first two bytes there are always 1
        seek(s, script_info.wrapping_add(2))?;
        age.prefix = s.read_u16::<BigEndian>()?;
        age.main_script_offset = s.read_u32::<BigEndian>()?;
        age.sound_script_offset = s.read_u32::<BigEndian>()?;

        debug!(
            "age {} (disk {}) '{}' prefix {}: main scripts {:#x}, sound scripts {:#x}",
            age.id,
            age.disk,
            age.name,
            age.prefix_string(),
            age.main_script_offset,
            age.sound_script_offset
        );
    }
    Ok(ages)
}

/// `id u16` (0 ends) followed by an 8-byte name.
fn read_name_table(
    s: &mut SegmentReader<'_>,
    offset: u32,
    suffix: &str,
    kind: &str,
) -> Result<BTreeMap<u16, String>> {
    seek(s, offset)?;
    let mut table = BTreeMap::new();
    loop {
        let id = s.read_u16::<BigEndian>()?;
        if id == 0 {
            break;
        }
        let mut raw = [0u8; 8];
        s.read_exact(&mut raw)?;
        let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
        let name = format!("{}{suffix}", String::from_utf8_lossy(&raw[..end]));
        debug!("{kind} {id} -> '{name}'");
        table.insert(id, name);
    }
    Ok(table)
}

/// `id u16` (0 ends), u16 padding, u32 offset of a C string.
fn read_string_table(s: &mut SegmentReader<'_>, offset: u32, kind: &str) -> Result<BTreeMap<u16, String>> {
    seek(s, offset)?;
    let mut table = BTreeMap::new();
    loop {
        let id = s.read_u16::<BigEndian>()?;
        if id == 0 {
            break;
        }
        let _pad = s.read_u16::<BigEndian>()?;
        let text_offset = s.read_u32::<BigEndian>()?;
        let text = c_string_at(s, text_offset)?;
        debug!("{kind} {id} -> '{text}'");
        table.insert(id, text);
    }
    Ok(table)
}

fn read_script(s: &mut SegmentReader<'_>) -> Result<Script> {
    let mut script = Vec::new();
    loop {
        let code = s.read_u16::<BigEndian>()?;
        if code == 0 {
            break;
        }
        let arg_count = code >> 8;
        let mut args = Vec::with_capacity(arg_count as usize);
        for _ in 0..arg_count {
            args.push(s.read_i16::<BigEndian>()?);
        }
        script.push(ScriptOpcode {
            op: (code & 0xFF) as u8,
            args,
        });
    }
    Ok(script)
}

fn read_conditional_scripts(s: &mut SegmentReader<'_>) -> Result<Vec<ConditionalScript>> {
    let mut list = Vec::new();
    loop {
        let condition = s.read_u16::<BigEndian>()?;
        if condition == 0 {
            break;
        }
        list.push(ConditionalScript {
            condition,
            script: read_script(s)?,
        });
    }
    Ok(list)
}

fn read_hotspots(s: &mut SegmentReader<'_>) -> Result<Vec<Hotspot>> {
    let mut list = Vec::new();
    loop {
        let condition = s.read_u16::<BigEndian>()?;
        if condition == 0 {
            break;
        }

        let mut rects = Vec::new();
        let mut cursor = 0;
        if condition != HOTSPOT_NO_AREA {
            loop {
                let mut rect = Rect {
                    left: s.read_i16::<BigEndian>()?,
                    top: s.read_i16::<BigEndian>()?,
                    right: s.read_i16::<BigEndian>()?,
                    bottom: s.read_i16::<BigEndian>()?,
                };
                // a negative top means another rectangle follows
                let more = rect.top < 0;
                if more {
                    rect.top = rect.top.wrapping_neg();
                }
                rects.push(rect);
                if !more {
                    break;
                }
            }
            cursor = s.read_u16::<BigEndian>()?;
        }

        list.push(Hotspot {
            condition,
            rects,
            cursor,
            script: read_script(s)?,
        });
    }
    Ok(list)
}

fn read_main_scripts(s: &mut SegmentReader<'_>, age: &mut Age) -> Result<()> {
    seek(s, age.main_script_offset)?;
    loop {
        let id = s.read_i16::<BigEndian>()?;
        let node_ids = match id {
            0 => break,
            id if id <= -10 => {
                return Err(Error::UnsupportedFeature(format!(
                    "node list command {id} in age {}",
                    age.id
                )));
            }
            id if id < 0 => {
                let mut ids = Vec::with_capacity(id.unsigned_abs() as usize);
                for _ in 0..id.unsigned_abs() {
                    ids.push(s.read_u16::<BigEndian>()?);
                }
                ids
            }
            id => vec![id as u16],
        };

        let scripts = read_conditional_scripts(s)?;
        let hotspots = read_hotspots(s)?;
        debug!(
            "age {} nodes {:?}: {} main scripts, {} hotspots",
            age.id,
            node_ids,
            scripts.len(),
            hotspots.len()
        );
        for node_id in node_ids {
            let node = age.nodes.entry(node_id).or_default();
            node.main_scripts = scripts.clone();
            node.hotspots = hotspots.clone();
        }
    }
    Ok(())
}

fn read_sound_scripts(s: &mut SegmentReader<'_>, age: &mut Age) -> Result<()> {
    if age.sound_script_offset == 0 {
        return Ok(());
    }
    seek(s, age.sound_script_offset)?;
    loop {
        let id = s.read_i16::<BigEndian>()?;
        let node_ids: Vec<u16> = match id {
            0 => break,
            id if id < -10 => {
                return Err(format_err!("invalid sound script id {id} in age {}", age.id));
            }
            -10 => {
                let mut ids = Vec::new();
                loop {
                    let entry = s.read_i16::<BigEndian>()?;
                    if entry == 0 {
                        break;
                    } else if entry < 0 {
                        let end = s.read_u16::<BigEndian>()?;
                        ids.extend(entry.unsigned_abs()..end);
                    } else {
                        ids.push(entry as u16);
                    }
                }
                ids
            }
            id if id < 0 => {
                let mut ids = Vec::with_capacity(id.unsigned_abs() as usize);
                for _ in 0..id.unsigned_abs() {
                    ids.push(s.read_u16::<BigEndian>()?);
                }
                ids
            }
            id => vec![id as u16],
        };

        let scripts = read_conditional_scripts(s)?;
        for node_id in node_ids {
            age.nodes.entry(node_id).or_default().sound_scripts = scripts.clone();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Append-only image of a data segment with absolute offsets.
    #[derive(Default)]
    struct SegmentBuilder {
        data: Vec<u8>,
    }

    impl SegmentBuilder {
        fn at(&self) -> u32 {
            self.data.len() as u32
        }

        fn u16s(&mut self, words: &[u16]) -> u32 {
            let at = self.at();
            for w in words {
                self.data.extend_from_slice(&w.to_be_bytes());
            }
            at
        }

        fn u32s(&mut self, words: &[u32]) -> u32 {
            let at = self.at();
            for w in words {
                self.data.extend_from_slice(&w.to_be_bytes());
            }
            at
        }

        fn bytes(&mut self, bytes: &[u8]) -> u32 {
            let at = self.at();
            self.data.extend_from_slice(bytes);
            at
        }
    }

    fn sample_segment() -> (Vec<u8>, TableLayout) {
        let mut b = SegmentBuilder::default();
        b.bytes(&[0; 4]);
        let name = b.bytes(b"Spire\0");
        let empty = b.bytes(b"\0\0");

        // age scripts: node list [3, 4] with two conditional scripts and a
        // hotspot of two rects, then single node 7
        let main = b.u16s(&[
            0xFFFE, 3, 4, // two node ids
            5, 0x0203, 10, 20, 0, // condition 5: op 3 (10, 20)
            6, 0x0067, 0x0160, 0xFFFF, 0, // condition 6: op 0x67 (), op 0x60 (-1)
            0, // end of conditional scripts
            9, 1, 0xFFFE, 3, 4, 5, 6, 7, 8, 42, 0x008C, 0, // hotspot with 2 rects
            HOTSPOT_NO_AREA, 0, // area-less hotspot
            0, // end of hotspots
            7, 1, 0, 0, 0, // node 7: condition 1 with empty script
            0,
        ]);
        let sound = b.u16s(&[
            0xFFF6, 0xFFF4, 14, 20, 0, // complex: 12..14, then 20
            1, 0x018C, 30, 0, 0,
            0,
        ]);
        let info = b.u16s(&[1, u16::from_be_bytes(*b"sp")]);
        b.u32s(&[main, sound]);
        let data_ptr = b.u32s(&[info]);

        let idle_main = b.u16s(&[0]);
        let idle_info = b.u16s(&[1, u16::from_be_bytes(*b"xx")]);
        b.u32s(&[idle_main, 0]);
        let idle_ptr = b.u32s(&[idle_info]);

        let age_table = b.at();
        for i in 0..AGE_COUNT as u16 {
            let (ptr, name_at) = if i == 0 { (data_ptr, name) } else { (idle_ptr, empty) };
            b.u16s(&[i + 1, 1]);
            b.u32s(&[0, ptr, 0, 0, 0, name_at]);
        }

        let sound_table = b.u16s(&[4]);
        b.bytes(b"SPIRE01\0");
        b.u16s(&[5]);
        b.bytes(b"AMBIENCE");
        b.u16s(&[0]);

        let movie_table = b.u16s(&[2]);
        b.bytes(b"intro\0\0\0");
        b.u16s(&[0]);

        let help = b.bytes(b"Click to climb\0");
        let url = b.bytes(b"http://example.invalid/\0");
        let help_table = b.u16s(&[11, 0]);
        b.u32s(&[help]);
        b.u16s(&[0]);
        let url_table = b.u16s(&[12, 0]);
        b.u32s(&[url]);
        b.u16s(&[0]);

        (
            b.data,
            TableLayout {
                age_table,
                sound_table,
                movie_table,
                help_table,
                url_table,
            },
        )
    }

    #[test]
    fn loads_names_and_strings() {
        let (segment, layout) = sample_segment();
        let tables = ResourceTables::load(&segment, &layout).unwrap();
        assert_eq!(tables.ages().len(), AGE_COUNT);
        assert_eq!(tables.find_age(1).unwrap().name, "Spire");
        assert_eq!(tables.find_age(2).unwrap().name, "");
        assert_eq!(tables.age_prefix(1).unwrap(), "sp");
        assert_eq!(tables.sound_name(4).unwrap(), "SPIRE01.aif");
        assert_eq!(tables.sound_name(5).unwrap(), "AMBIENCE.aif");
        assert_eq!(tables.movie_name(2).unwrap(), "intro.mov");
        assert_eq!(tables.help_text(11).unwrap(), "Click to climb");
        assert_eq!(tables.url(12).unwrap(), "http://example.invalid/");
        assert!(matches!(
            tables.movie_name(3),
            Err(Error::MissingResource { kind: "movie", id: 3 })
        ));
        assert!(matches!(
            tables.find_age(9),
            Err(Error::MissingResource { kind: "age", id: 9 })
        ));
    }

    #[test]
    fn node_lists_share_scripts_and_hotspots() {
        let (segment, layout) = sample_segment();
        let tables = ResourceTables::load(&segment, &layout).unwrap();
        let node3 = tables.node(1, 3).unwrap();
        let node4 = tables.node(1, 4).unwrap();
        assert_eq!(node3.main_scripts, node4.main_scripts);
        assert_eq!(node3.main_scripts.len(), 2);
        assert_eq!(
            node3.main_scripts[0].script,
            vec![ScriptOpcode {
                op: 3,
                args: vec![10, 20]
            }]
        );
        assert_eq!(node3.main_scripts[1].condition, 6);
        assert_eq!(node3.main_scripts[1].script[1].args, vec![-1]);

        assert_eq!(node3.hotspots.len(), 2);
        let spot = &node3.hotspots[0];
        assert_eq!(spot.condition, 9);
        assert_eq!(spot.cursor, 42);
        assert_eq!(
            spot.rects,
            vec![
                Rect { left: 1, top: 2, right: 3, bottom: 4 },
                Rect { left: 5, top: 6, right: 7, bottom: 8 },
            ]
        );
        assert_eq!(spot.script[0].op, 0x8C);
        assert!(node3.hotspots[1].rects.is_empty());

        let node7 = tables.node(1, 7).unwrap();
        assert_eq!(node7.main_scripts[0].script, Vec::new());
        assert!(node7.hotspots.is_empty());
        assert!(matches!(tables.node(1, 8), Err(Error::MissingResource { kind: "node", id: 8 })));
    }

    #[test]
    fn complex_sound_lists_expand_ranges() {
        let (segment, layout) = sample_segment();
        let tables = ResourceTables::load(&segment, &layout).unwrap();
        for node in [12, 13, 20] {
            let scripts = &tables.node(1, node).unwrap().sound_scripts;
            assert_eq!(scripts.len(), 1);
            assert_eq!(scripts[0].script[0].args, vec![30]);
        }
        assert!(tables.node(1, 14).is_err());
        assert!(tables.node(1, 3).unwrap().sound_scripts.is_empty());
    }

    #[test]
    fn unsupported_lists_fail() {
        let (mut segment, layout) = sample_segment();
        // first word of age 1's main scripts is the node list count
        let main = segment
            .windows(6)
            .position(|w| w == [0xFF, 0xFE, 0, 3, 0, 4])
            .unwrap();
        segment[main..main + 2].copy_from_slice(&(-10i16).to_be_bytes());
        assert!(matches!(
            ResourceTables::load(&segment, &layout),
            Err(Error::UnsupportedFeature(_))
        ));
    }
}
