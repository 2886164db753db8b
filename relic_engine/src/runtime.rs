use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::Path,
    rc::Rc,
};

use anyhow::{Context, Result};
use log::info;
use relic_formats::database::FormatVersion;
use relic_formats::pef::decompress_segment_from_file;
use relic_formats::{GameDatabase, Node, PmvDecoder, PropertyWrite, ResourceTables};
use serde::Serialize;

use crate::cli::{BootArgs, DbArgs, MovieArgs};
use crate::host::{
    Collaborators, DirectoryMovieLibrary, FrameClock, HostEvent, MovieLibrary, NoMovies,
    RecordingHost, ScriptedInput, ThreadClock,
};
use crate::player::{self, PlaybackSummary};
use crate::profile::GameProfile;
use crate::scheduler::{Location, LocationRequest};
use crate::session::Session;
use crate::state::{AlwaysTrue, ConditionEvaluator, FlagConditions};

#[derive(Serialize)]
struct BootEventLog<'a> {
    profile: &'a str,
    start: Location,
    final_location: Option<Location>,
    final_node: Option<NodeReport>,
    locations_entered: usize,
    locations: Vec<LocationRequest>,
    movies: Vec<PlaybackSummary>,
    events: Vec<HostEvent>,
}

#[derive(Serialize)]
struct NodeReport {
    main_scripts: usize,
    sound_scripts: usize,
    hotspots: usize,
}

impl NodeReport {
    fn from_node(node: &Node) -> Self {
        Self {
            main_scripts: node.main_scripts.len(),
            sound_scripts: node.sound_scripts.len(),
            hotspots: node.hotspots.len(),
        }
    }
}

#[derive(Serialize)]
struct MovieReport<'a> {
    summary: &'a PlaybackSummary,
    events: Vec<HostEvent>,
}

#[derive(Serialize)]
struct DbReport {
    version: u16,
    objects: usize,
    game_state_bytes: usize,
    writes: Vec<WriteReport>,
    reads: Vec<ReadReport>,
    vars: Vec<VarReport>,
}

#[derive(Serialize)]
struct WriteReport {
    object: u16,
    property: u16,
    value: i16,
    outcome: &'static str,
}

#[derive(Serialize)]
struct ReadReport {
    object: u16,
    property: u16,
    value: i16,
}

#[derive(Serialize)]
struct VarReport {
    index: u16,
    value: i16,
}

fn write_json<T: Serialize>(path: &Path, value: &T, what: &str) -> Result<()> {
    let json = serde_json::to_string_pretty(value).with_context(|| format!("serializing {what} to JSON"))?;
    fs::write(path, json).with_context(|| format!("writing {what} to {}", path.display()))?;
    println!("Saved {what} to {}", path.display());
    Ok(())
}

fn clock_for(realtime: bool, recorder: &RecordingHost) -> Rc<dyn FrameClock> {
    if realtime {
        Rc::new(ThreadClock)
    } else {
        Rc::new(recorder.clone())
    }
}

pub fn boot(args: BootArgs) -> Result<()> {
    let profile = GameProfile::resolve(&args.profile, args.profile_json.as_deref())?;
    info!("using game profile '{}'", profile.name);

    let segment = decompress_segment_from_file(&args.executable, profile.data_segment)?;
    let tables = ResourceTables::load(&segment, &profile.tables)
        .with_context(|| format!("loading resource tables of {}", args.executable.display()))?;
    println!(
        "Data segment {}: {} bytes, {} ages, {} sounds, {} movies",
        profile.data_segment,
        segment.len(),
        tables.ages().len(),
        tables.sound_names.len(),
        tables.movie_names.len()
    );
    if let Some(path) = args.tables_json.as_ref() {
        write_json(path, &tables, "resource tables")?;
    }

    let recorder = RecordingHost::new();
    let input = match args.quit_after_polls {
        Some(polls) => ScriptedInput::quit_after(polls),
        None => ScriptedInput::never_quit(),
    };
    let movies: Rc<dyn MovieLibrary> = match args.movie_root.as_ref() {
        Some(root) => Rc::new(DirectoryMovieLibrary::new(root)),
        None => Rc::new(NoMovies),
    };
    let mut host = Collaborators::recording(&recorder, Rc::new(input), movies);
    host.clock = clock_for(args.realtime, &recorder);

    let conditions: Box<dyn ConditionEvaluator> = if args.false_conditions.is_empty() {
        Box::new(AlwaysTrue)
    } else {
        Box::new(FlagConditions::all_true_except(args.false_conditions.iter().copied()))
    };
    let mut session = Session::new(tables, host, profile.rooms_per_age)
        .with_conditions(conditions)
        .with_transition_limit(args.max_location_changes);

    let start = Location::new(
        args.age.unwrap_or(profile.start.0),
        args.room,
        args.node.unwrap_or(profile.start.1),
    );
    session
        .change_to_node(start.age, start.room, start.node)
        .with_context(|| format!("entering age {} node {}", start.age, start.node))?;
    if args.sound_scripts {
        session.run_sound_scripts().context("running sound scripts")?;
    }

    match session.location() {
        Some(location) => println!(
            "Stopped in age {} room {} node {} after {} location changes",
            location.age,
            location.room,
            location.node,
            session.locations_entered().saturating_sub(1)
        ),
        None => println!("No node entered"),
    }
    for movie in session.movies() {
        println!(
            "  movie {:<16} {} frames ({:?})",
            movie.name, movie.frames_presented, movie.outcome
        );
    }
    let events = recorder.events();
    println!("{} host events recorded", events.len());

    if let Some(path) = args.event_log_json.as_ref() {
        let log = BootEventLog {
            profile: &profile.name,
            start,
            final_location: session.location(),
            final_node: session.current_node().map(NodeReport::from_node),
            locations_entered: session.locations_entered(),
            locations: session.take_history(),
            movies: session.take_movies(),
            events,
        };
        write_json(path, &log, "boot event log")?;
    }

    Ok(())
}

pub fn movie(args: MovieArgs) -> Result<()> {
    let mut decoder = PmvDecoder::open_path(&args.path)
        .with_context(|| format!("opening movie {}", args.path.display()))?;
    let recorder = RecordingHost::new();
    let mut host = Collaborators::recording(
        &recorder,
        Rc::new(ScriptedInput::never_quit()),
        Rc::new(NoMovies),
    );
    host.clock = clock_for(args.realtime, &recorder);

    let name = args
        .path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("movie")
        .to_string();
    let header = *decoder.header();
    let summary = player::play_movie(&name, &mut decoder, &host);

    println!(
        "{}: {}x{}, {} frames declared, {} presented, {} ms per frame",
        summary.name,
        summary.width,
        summary.height,
        header.frame_count,
        summary.frames_presented,
        summary.frame_delay_ms
    );
    println!(
        "Audio: {} packets, {} samples at {} Hz; palette updates: {}; outcome: {:?}",
        summary.audio_packets,
        summary.audio_samples,
        header.sound_frequency,
        summary.palette_updates,
        summary.outcome
    );

    if let Some(path) = args.summary_json.as_ref() {
        let report = MovieReport {
            summary: &summary,
            events: recorder.events(),
        };
        write_json(path, &report, "movie summary")?;
    }
    Ok(())
}

pub fn db(args: DbArgs) -> Result<()> {
    let version = FormatVersion::from_number(args.format)?;
    let mut db = GameDatabase::open(&args.path, version)?;

    if let Some(path) = args.restore.as_ref() {
        let file = File::open(path).with_context(|| format!("opening save game {}", path.display()))?;
        db.load_state(&mut BufReader::new(file))
            .with_context(|| format!("restoring save game {}", path.display()))?;
    }

    let writes = args
        .writes
        .iter()
        .map(|assignment| {
            let target = assignment.target;
            let outcome = match db.set_property(target.object, target.property, assignment.value) {
                PropertyWrite::Written(_) => "written",
                PropertyWrite::RejectedConstant(_) => "rejected_constant",
                PropertyWrite::Missing => "missing",
            };
            WriteReport {
                object: target.object,
                property: target.property,
                value: assignment.value,
                outcome,
            }
        })
        .collect();
    let reads = args
        .reads
        .iter()
        .map(|target| ReadReport {
            object: target.object,
            property: target.property,
            value: db.get_property(target.object, target.property),
        })
        .collect();
    let vars = args
        .vars
        .iter()
        .map(|index| VarReport {
            index: *index,
            value: db.get_var(*index),
        })
        .collect();

    let report = DbReport {
        version: db.version().number(),
        objects: db.object_count(),
        game_state_bytes: db.game_state_size(),
        writes,
        reads,
        vars,
    };

    if let Some(path) = args.save.as_ref() {
        let file = File::create(path).with_context(|| format!("creating save game {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        db.save_state(&mut writer, &args.description, args.save_version)
            .with_context(|| format!("writing save game {}", path.display()))?;
        writer.flush()?;
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "v{} database: {} objects, game state {} bytes",
        report.version, report.objects, report.game_state_bytes
    );
    for write in &report.writes {
        println!(
            "  set {}:{} = {} -> {}",
            write.object, write.property, write.value, write.outcome
        );
    }
    for read in &report.reads {
        println!("  get {}:{} = {}", read.object, read.property, read.value);
    }
    for var in &report.vars {
        println!("  var {} = {}", var.index, var.value);
    }
    if let Some(path) = args.save.as_ref() {
        println!("Saved game state to {}", path.display());
    }
    Ok(())
}
