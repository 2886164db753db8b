use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use relic_formats::database::{FormatVersion, ObjectKind};
use relic_formats::GameDatabase;

/// Inspect an object database and list its objects.
#[derive(Parser)]
struct Args {
    /// Path to the database file
    path: PathBuf,

    /// Database layout version (2 or 3)
    #[arg(long, default_value_t = 3)]
    format: u16,

    /// Emit the object list as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let db = GameDatabase::open(&args.path, FormatVersion::from_number(args.format)?)?;

    let objects: Vec<_> = (1..=db.object_count() as u16)
        .filter_map(|index| db.object_info(index))
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&objects)?);
        return Ok(());
    }

    println!(
        "v{} database: {} objects, game state {} bytes, main code object {}",
        db.version().number(),
        db.object_count(),
        db.game_state_size(),
        db.main_code_object_index()
    );
    for info in &objects {
        let shape = match info.kind {
            ObjectKind::Structured { count1, count2 } => format!("object {count1}/{count2}"),
            ObjectKind::ByteVector { len } => format!("bytes[{len}]"),
            ObjectKind::WordVector { len } => format!("words[{len}]"),
        };
        let storage = match info.window {
            Some(offset) => format!("state@{offset:#x}"),
            None => "owned".to_string(),
        };
        println!(
            "{:>5}  flags {:04x}  class {:>5}  {:<16} {}",
            info.index, info.flags, info.class, shape, storage
        );
    }
    Ok(())
}
