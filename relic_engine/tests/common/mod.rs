#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result};
use serde_json::{json, Value};

pub type Op = (u8, Vec<i16>);

const AGE_ENTRY_BYTES: u32 = 28;

pub struct ConditionalFixture {
    pub condition: u16,
    pub ops: Vec<Op>,
}

pub fn when(condition: u16, ops: Vec<Op>) -> ConditionalFixture {
    ConditionalFixture { condition, ops }
}

pub fn op(code: u8, args: &[i16]) -> Op {
    (code, args.to_vec())
}

/// One main-script entry: the listed nodes share its scripts.
pub struct NodeFixture {
    pub nodes: Vec<u16>,
    pub main: Vec<ConditionalFixture>,
}

pub struct SoundFixture {
    pub node: u16,
    pub scripts: Vec<ConditionalFixture>,
}

#[derive(Default)]
pub struct AgeFixture {
    pub name: String,
    pub nodes: Vec<NodeFixture>,
    pub sounds: Vec<SoundFixture>,
}

#[derive(Default)]
pub struct GameFixture {
    /// Ages 1..=8 in order; missing ones get no nodes.
    pub ages: Vec<AgeFixture>,
    pub sounds: Vec<(u16, &'static str)>,
    pub movies: Vec<(u16, &'static str)>,
}

#[derive(Default)]
struct Segment {
    data: Vec<u8>,
}

impl Segment {
    fn at(&self) -> u32 {
        self.data.len() as u32
    }

    fn u16(&mut self, value: u16) {
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    fn i16(&mut self, value: i16) {
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    fn u32(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    fn patch_u32(&mut self, at: u32, value: u32) {
        let at = at as usize;
        self.data[at..at + 4].copy_from_slice(&value.to_be_bytes());
    }

    fn c_string(&mut self, text: &str) -> u32 {
        let at = self.at();
        self.data.extend_from_slice(text.as_bytes());
        self.data.push(0);
        at
    }

    fn name_table(&mut self, entries: &[(u16, &str)]) -> u32 {
        let at = self.at();
        for (id, name) in entries {
            self.u16(*id);
            let mut raw = [0u8; 8];
            raw[..name.len()].copy_from_slice(name.as_bytes());
            self.data.extend_from_slice(&raw);
        }
        self.u16(0);
        at
    }

    fn conditional_list(&mut self, list: &[ConditionalFixture]) {
        for entry in list {
            self.u16(entry.condition);
            for (code, args) in &entry.ops {
                self.u16((args.len() as u16) << 8 | u16::from(*code));
                for arg in args {
                    self.i16(*arg);
                }
            }
            self.u16(0);
        }
        self.u16(0);
    }
}

/// Segment image plus the matching profile table layout.
pub fn build_segment(game: &GameFixture) -> (Vec<u8>, Value) {
    let mut s = Segment::default();
    s.data.resize(16, 0);

    let age_table = s.at();
    s.data.resize(age_table as usize + 8 * AGE_ENTRY_BYTES as usize, 0);

    let sound_table = s.name_table(&game.sounds);
    let movie_table = s.name_table(&game.movies);
    let help_table = s.at();
    s.u16(1);
    s.u16(0);
    let help_string_slot = s.at();
    s.u32(0);
    s.u16(0);
    let url_table = s.at();
    s.u16(0);
    let help_string = s.c_string("Click to look around.");
    s.patch_u32(help_string_slot, help_string);

    for index in 0..8u16 {
        let age = game.ages.get(index as usize);
        let name = age.map(|a| a.name.clone()).unwrap_or_else(|| format!("age{}", index + 1));
        let name_offset = s.c_string(&name);

        let main_offset = s.at();
        if let Some(age) = age {
            for node in &age.nodes {
                if node.nodes.len() == 1 {
                    s.u16(node.nodes[0]);
                } else {
                    s.i16(-(node.nodes.len() as i16));
                    for id in &node.nodes {
                        s.u16(*id);
                    }
                }
                s.conditional_list(&node.main);
                // no hotspots
                s.u16(0);
            }
        }
        s.u16(0);

        let sound_offset = match age.filter(|a| !a.sounds.is_empty()) {
            Some(age) => {
                let at = s.at();
                for sound in &age.sounds {
                    s.u16(sound.node);
                    s.conditional_list(&sound.scripts);
                }
                s.u16(0);
                at
            }
            None => 0,
        };

        let script_info = s.at();
        s.u16(1);
        s.u16(u16::from_be_bytes(*b"m1") + index);
        s.u32(main_offset);
        s.u32(sound_offset);

        let age_data = s.at();
        s.u32(script_info);

        let entry = age_table + u32::from(index) * AGE_ENTRY_BYTES;
        let e = entry as usize;
        s.data[e..e + 2].copy_from_slice(&(index + 1).to_be_bytes());
        s.data[e + 2..e + 4].copy_from_slice(&1u16.to_be_bytes());
        s.patch_u32(entry + 8, age_data);
        s.patch_u32(entry + 24, name_offset);
    }

    let layout = json!({
        "age_table": age_table,
        "sound_table": sound_table,
        "movie_table": movie_table,
        "help_table": help_table,
        "url_table": url_table,
    });
    (s.data, layout)
}

/// Variable-length pattern argument, 7 bits per byte, high bit = more.
fn pattern_argument(mut value: u32, out: &mut Vec<u8>) {
    let mut groups = vec![(value & 0x7F) as u8];
    value >>= 7;
    while value != 0 {
        groups.push((value & 0x7F) as u8 | 0x80);
        value >>= 7;
    }
    groups.reverse();
    out.extend(groups);
}

/// PEF container with a code section 0 and the data as pattern-initialized
/// section 1 (one block copy followed by a zero fill of `zero_tail` bytes).
pub fn build_executable(segment: &[u8], zero_tail: u32) -> Vec<u8> {
    let mut packed = vec![0x20];
    pattern_argument(segment.len() as u32, &mut packed);
    packed.extend_from_slice(segment);
    if zero_tail > 0 {
        packed.push(0x00);
        pattern_argument(zero_tail, &mut packed);
    }
    let unpacked = segment.len() as u32 + zero_tail;

    let table_end = 40 + 2 * 28;
    let code = [0x4E, 0x80, 0x00, 0x20];
    let code_offset = table_end as u32;
    let data_offset = code_offset + code.len() as u32;

    let mut out = Vec::new();
    out.extend_from_slice(b"Joy!peffpwpc");
    out.extend_from_slice(&1u32.to_be_bytes());
    out.resize(32, 0);
    out.extend_from_slice(&2u16.to_be_bytes());
    out.resize(40, 0);

    fn section(out: &mut Vec<u8>, total: u32, unpacked: u32, packed: u32, offset: u32, kind: u8) {
        out.extend_from_slice(&(-1i32).to_be_bytes());
        out.extend_from_slice(&0u32.to_be_bytes());
        out.extend_from_slice(&total.to_be_bytes());
        out.extend_from_slice(&unpacked.to_be_bytes());
        out.extend_from_slice(&packed.to_be_bytes());
        out.extend_from_slice(&offset.to_be_bytes());
        out.extend_from_slice(&[kind, 1, 4, 0]);
    }
    section(&mut out, 4, 4, 4, code_offset, 0);
    section(
        &mut out,
        unpacked + 64,
        unpacked,
        packed.len() as u32,
        data_offset,
        2,
    );

    out.extend_from_slice(&code);
    out.extend_from_slice(&packed);
    out
}

pub struct GameDir {
    pub root: PathBuf,
    pub executable: PathBuf,
    pub profile: PathBuf,
    pub movies: PathBuf,
}

/// Write the executable, a JSON profile and an empty movie directory.
pub fn write_game(root: &Path, game: &GameFixture) -> Result<GameDir> {
    let (segment, layout) = build_segment(game);
    let executable = root.join("Game");
    fs::write(&executable, build_executable(&segment, 128)).context("writing executable")?;

    let profile = root.join("profile.json");
    let json = json!({
        "name": "fixture",
        "data_segment": 1,
        "tables": layout,
    });
    fs::write(&profile, serde_json::to_string_pretty(&json)?).context("writing profile")?;

    let movies = root.join("movies");
    fs::create_dir_all(&movies)?;

    Ok(GameDir {
        root: root.to_path_buf(),
        executable,
        profile,
        movies,
    })
}

fn chunk(tag: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = tag.to_vec();
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// 8x8 movie of `frames` frames, each a solid fill; the first frame carries
/// a palette delta and a raw audio chunk of `samples`.
pub fn build_movie(frames: u16, frame_delay: u16, samples: &[u8]) -> Vec<u8> {
    let mut header = Vec::new();
    header.extend_from_slice(&frame_delay.to_le_bytes());
    header.extend_from_slice(&[0; 4]);
    header.extend_from_slice(&frames.to_le_bytes());
    header.extend_from_slice(&[0; 4]);
    header.extend_from_slice(&11127u16.to_le_bytes());
    header.extend_from_slice(&[0; 44]);
    header.extend_from_slice(&[0; 768]);

    let mut image = vec![0u8; 28];
    image[6..8].copy_from_slice(&8u16.to_le_bytes());
    image[8..10].copy_from_slice(&8u16.to_le_bytes());
    image[10..12].copy_from_slice(&8u16.to_le_bytes());
    image[12..14].copy_from_slice(&28u16.to_le_bytes());
    image[16..18].copy_from_slice(&30u16.to_le_bytes());
    image[20..22].copy_from_slice(&34u16.to_le_bytes());
    image[24..26].copy_from_slice(&1u16.to_le_bytes());
    // two block rows of fill commands, then four block colours
    image.extend_from_slice(&[0, 0, 1, 2, 3, 4]);

    let mut audio = vec![0u8; 4];
    audio.extend_from_slice(&(samples.len() as u16).to_le_bytes());
    audio.extend_from_slice(&1u16.to_le_bytes());
    audio.push(0x05);
    audio.extend_from_slice(samples);

    let palette = [0u8, 0, 4, 5, 6, 255, 255];
    let mut palette_packet = vec![0u8; 4];
    palette_packet.extend_from_slice(&(palette.len() as u32).to_le_bytes());
    palette_packet.extend_from_slice(&palette);

    let mut data = chunk(b"MOVE", &[]);
    data.extend(chunk(b"MHED", &header));
    for index in 0..frames {
        let mut payload = vec![0u8; 20];
        if index == 0 {
            let sound_at = payload.len() as u32 + 8;
            payload[8..12].copy_from_slice(&sound_at.to_le_bytes());
            payload.extend_from_slice(&audio);
            let palette_at = payload.len() as u32 + 8;
            payload[16..20].copy_from_slice(&palette_at.to_le_bytes());
            payload.extend_from_slice(&palette_packet);
        }
        let image_at = payload.len() as u32 + 8;
        payload[12..16].copy_from_slice(&image_at.to_le_bytes());
        payload.extend_from_slice(&image);
        data.extend(chunk(b"MFRM", &payload));
    }
    data
}

pub fn run_engine(args: &[&str]) -> Result<Output> {
    Command::new(env!("CARGO_BIN_EXE_relic_engine"))
        .args(args)
        .output()
        .context("running relic_engine")
}

pub fn path_str(path: &Path) -> &str {
    path.to_str().expect("utf-8 path")
}

pub fn read_json(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(serde_json::from_str(&text)?)
}
