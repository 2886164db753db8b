use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use relic_formats::database::read_savegame_description;
use relic_formats::{FormatVersion, GameDatabase};
use tempfile::tempdir;

fn push_object(out: &mut Vec<u8>, flags: u16, class: u16, count1: u8, count2: u8, words: &[u16]) {
    out.extend_from_slice(&flags.to_le_bytes());
    out.extend_from_slice(&class.to_le_bytes());
    out.push(count1);
    out.push(count2);
    for word in words {
        out.extend_from_slice(&word.to_le_bytes());
    }
}

/// v3 image with a constant class (object 1, property 5 = 10) and a
/// variable instance of it (object 2, property 7 = 20) living in the game
/// state.
fn v3_image() -> Vec<u8> {
    let mut pool = Vec::new();
    push_object(&mut pool, 0, 0, 1, 1, &[0x8005, 10]);
    let mut state = vec![0u8; 4];
    push_object(&mut state, 1, 1, 1, 1, &[7, 20]);
    let index = [1u32, 4];

    let index_offset = 0x1E + 24;
    let state_offset = index_offset + index.len() * 4;
    let pool_offset = state_offset + state.len();

    let mut data = vec![0u8; 0x1E];
    data.extend_from_slice(&(index_offset as u32).to_le_bytes());
    data.extend_from_slice(&(index.len() as u16).to_le_bytes());
    data.extend_from_slice(&(state_offset as u32).to_le_bytes());
    data.extend_from_slice(&(state.len() as u32).to_le_bytes());
    data.extend_from_slice(&(pool_offset as u32).to_le_bytes());
    data.extend_from_slice(&(pool.len() as u32).to_le_bytes());
    data.extend_from_slice(&1u16.to_le_bytes());
    for entry in index {
        data.extend_from_slice(&entry.to_le_bytes());
    }
    data.extend_from_slice(&state);
    data.extend_from_slice(&pool);
    data
}

/// v2 image with four state words, a byte vector and a word vector.
fn v2_image() -> Vec<u8> {
    let mut data = vec![0u8; 0x1C];
    for word in [1u16, 2, 0, 4, 0, 2, 0, 1, 0] {
        data.extend_from_slice(&word.to_le_bytes());
    }
    data.extend_from_slice(&8u32.to_le_bytes());
    data.resize(0x200, 0);
    data.extend(b"INTRO\0".iter().map(|b| b.wrapping_sub(0x1E)));
    data.resize(0x400, 0);
    data.extend_from_slice(&0x7FFFu16.to_le_bytes());
    data.extend_from_slice(&4u16.to_le_bytes());
    data.extend_from_slice(b"abc\0");
    data.extend_from_slice(&0x7FFEu16.to_le_bytes());
    data.extend_from_slice(&2u16.to_le_bytes());
    data.extend_from_slice(&5u16.to_le_bytes());
    data.extend_from_slice(&6u16.to_le_bytes());
    data
}

fn write_file(path: &Path, bytes: &[u8]) {
    fs::write(path, bytes).expect("write fixture");
}

fn save_to(db: &GameDatabase, path: &Path, description: &str) {
    let mut writer = BufWriter::new(File::create(path).expect("create save"));
    db.save_state(&mut writer, description, 3).expect("save state");
    writer.flush().expect("flush save");
}

#[test]
fn v3_save_restores_into_fresh_database() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("game.dat");
    let save_path = dir.path().join("slot1.sav");
    write_file(&db_path, &v3_image());

    let mut db = GameDatabase::open(&db_path, FormatVersion::V3).unwrap();
    assert_eq!(db.get_property(2, 5), 10);
    db.set_property(2, 7, -300);
    db.set_var(1, 77);
    save_to(&db, &save_path, "Observatory");

    let description =
        read_savegame_description(&mut BufReader::new(File::open(&save_path).unwrap())).unwrap();
    assert_eq!(description, "Observatory");

    let mut restored = GameDatabase::open(&db_path, FormatVersion::V3).unwrap();
    assert_eq!(restored.get_property(2, 7), 20);
    restored
        .load_state(&mut BufReader::new(File::open(&save_path).unwrap()))
        .unwrap();
    assert_eq!(restored.get_property(2, 7), -300);
    assert_eq!(restored.get_var(1), 77);
    assert_eq!(restored.get_property(2, 5), 10);
    assert_eq!(restored.game_state(), db.game_state());
}

#[test]
fn v2_save_restores_objects_and_state() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("game.v2");
    let save_path = dir.path().join("slot.sav");
    write_file(&db_path, &v2_image());

    let mut db = GameDatabase::open(&db_path, FormatVersion::V2).unwrap();
    db.set_var(2, 41);
    db.set_vector_item(2, 1, -8);
    db.set_object_string(1, "xy");
    save_to(&db, &save_path, "ignored by v2");

    let mut restored = GameDatabase::open(&db_path, FormatVersion::V2).unwrap();
    assert_eq!(restored.vector_item(2, 1), 6);
    restored
        .load_state(&mut BufReader::new(File::open(&save_path).unwrap()))
        .unwrap();
    assert_eq!(restored.get_var(2), 41);
    assert_eq!(restored.vector_item(2, 0), 5);
    assert_eq!(restored.vector_item(2, 1), -8);
    assert_eq!(restored.object_string(1).as_deref(), Some("xy"));
    assert_eq!(restored.game_string(0).as_deref(), Some("INTRO"));
}

#[test]
fn restart_discards_progress() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("game.dat");
    write_file(&db_path, &v3_image());

    let mut db = GameDatabase::open(&db_path, FormatVersion::V3).unwrap();
    db.set_property(2, 7, 99);
    db.reset_game_state();
    assert_eq!(db.get_property(2, 7), 20);
}
