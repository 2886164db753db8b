use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    about = "Headless host that boots games from their executable tables",
    version
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Unpack the executable's data segment, load its tables and enter a node
    Boot(BootArgs),
    /// Play a PMV movie without a display and summarise it
    Movie(MovieArgs),
    /// Inspect or edit an object database and its save games
    Db(DbArgs),
}

#[derive(clap::Args, Debug)]
pub struct BootArgs {
    /// Executable data fork holding the pattern-initialized data segment
    #[arg(long, value_name = "PATH")]
    pub executable: PathBuf,

    /// Built-in game profile naming the table offsets
    #[arg(long, default_value = "dvd")]
    pub profile: String,

    /// JSON game profile used instead of the built-in one
    #[arg(long, value_name = "PATH")]
    pub profile_json: Option<PathBuf>,

    /// Age to start in (default: the profile's start age)
    #[arg(long)]
    pub age: Option<u16>,

    /// Room to start in
    #[arg(long, default_value_t = 1)]
    pub room: u16,

    /// Node to start in (default: the profile's start node)
    #[arg(long)]
    pub node: Option<u16>,

    /// Directory holding the movies the scripts name
    #[arg(long, value_name = "DIR")]
    pub movie_root: Option<PathBuf>,

    /// Also dispatch the start node's sound scripts
    #[arg(long)]
    pub sound_scripts: bool,

    /// Treat this script condition as false (may repeat)
    #[arg(long = "false-condition", value_name = "ID")]
    pub false_conditions: Vec<u16>,

    /// Stop following script location changes after this many
    #[arg(long, default_value_t = crate::session::DEFAULT_TRANSITION_LIMIT)]
    pub max_location_changes: usize,

    /// Raise the quit flag after this many input polls
    #[arg(long, value_name = "POLLS")]
    pub quit_after_polls: Option<usize>,

    /// Sleep for real between movie frames instead of recording the delay
    #[arg(long)]
    pub realtime: bool,

    /// Path to write the host event log as JSON
    #[arg(long, value_name = "PATH")]
    pub event_log_json: Option<PathBuf>,

    /// Path to write the loaded resource tables as JSON
    #[arg(long, value_name = "PATH")]
    pub tables_json: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct MovieArgs {
    /// PMV movie to play
    pub path: PathBuf,

    /// Sleep for real between frames
    #[arg(long)]
    pub realtime: bool,

    /// Path to write the playback summary and event log as JSON
    #[arg(long, value_name = "PATH")]
    pub summary_json: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct DbArgs {
    /// Object database file
    pub path: PathBuf,

    /// Database layout version (2 or 3)
    #[arg(long, default_value_t = 3)]
    pub format: u16,

    /// Save game to restore before reading or writing anything
    #[arg(long, value_name = "PATH")]
    pub restore: Option<PathBuf>,

    /// Write OBJECT:PROPERTY=VALUE (may repeat)
    #[arg(long = "set", value_name = "OBJ:PROP=VALUE", value_parser = parse_property_write)]
    pub writes: Vec<PropertyAssignment>,

    /// Read OBJECT:PROPERTY after the writes (may repeat)
    #[arg(long = "get", value_name = "OBJ:PROP", value_parser = parse_property_ref)]
    pub reads: Vec<PropertyRef>,

    /// Read game state variable INDEX (may repeat)
    #[arg(long = "var", value_name = "INDEX")]
    pub vars: Vec<u16>,

    /// Write the resulting state as a save game
    #[arg(long, value_name = "PATH")]
    pub save: Option<PathBuf>,

    /// Description stored in v3 save games
    #[arg(long, default_value = "")]
    pub description: String,

    /// Version word stored in v3 save games
    #[arg(long, default_value_t = 1)]
    pub save_version: u16,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyRef {
    pub object: u16,
    pub property: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyAssignment {
    pub target: PropertyRef,
    pub value: i16,
}

fn parse_property_ref(text: &str) -> Result<PropertyRef, String> {
    let (object, property) = text
        .split_once(':')
        .ok_or_else(|| format!("expected OBJECT:PROPERTY, got '{text}'"))?;
    Ok(PropertyRef {
        object: parse_number(object)?,
        property: parse_number(property)?,
    })
}

fn parse_property_write(text: &str) -> Result<PropertyAssignment, String> {
    let (target, value) = text
        .split_once('=')
        .ok_or_else(|| format!("expected OBJECT:PROPERTY=VALUE, got '{text}'"))?;
    let value = value
        .trim()
        .parse::<i16>()
        .map_err(|err| format!("invalid value '{value}': {err}"))?;
    Ok(PropertyAssignment {
        target: parse_property_ref(target)?,
        value,
    })
}

/// Decimal or `0x` hexadecimal.
fn parse_number(text: &str) -> Result<u16, String> {
    let text = text.trim();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => text.parse::<u16>(),
    };
    parsed.map_err(|err| format!("invalid number '{text}': {err}"))
}

pub fn parse() -> Result<Command> {
    let args = Args::parse();
    Ok(args.command)
}
