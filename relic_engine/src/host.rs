//! Collaborators the engine drives but does not own: display, audio mixer,
//! input, wall clock and the movie files themselves. The recording variants
//! capture everything into a shared event log so headless runs can be
//! inspected as JSON.

use std::{
    cell::{Cell, RefCell},
    fmt,
    fs::File,
    io::{BufReader, Read, Seek},
    path::{Path, PathBuf},
    rc::Rc,
    thread,
    time::Duration,
};

use anyhow::{Context, Result};
use relic_formats::pmv::PALETTE_BYTES;
use relic_formats::{AudioBuffer, PmvDecoder, Surface};
use serde::Serialize;

pub const SCREEN_WIDTH: u16 = 544;
pub const SCREEN_HEIGHT: u16 = 332;

pub trait DisplayCallback {
    fn screen_size(&self) -> (u16, u16) {
        (SCREEN_WIDTH, SCREEN_HEIGHT)
    }
    fn draw_image(&self, _id: i16) {}
    fn set_palette(&self, _palette: &[u8; PALETTE_BYTES]) {}
    fn present_frame(&self, _x: i32, _y: i32, _surface: &Surface) {}
}

pub trait AudioCallback {
    fn play_sound(&self, _name: &str, _volume: i32) {}
    fn queue_samples(&self, _buffer: &AudioBuffer) {}
}

pub trait InputSource {
    /// Discard pending events; nothing is interactive during movies.
    fn drain_events(&self) {}
    fn should_quit(&self) -> bool {
        false
    }
}

pub trait FrameClock {
    fn sleep(&self, delay: Duration);
}

pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

pub type MovieStream = PmvDecoder<Box<dyn ReadSeek>>;

pub trait MovieLibrary {
    fn open_movie(&self, name: &str) -> Result<MovieStream>;
}

/// Everything a session or the movie player talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub display: Rc<dyn DisplayCallback>,
    pub audio: Rc<dyn AudioCallback>,
    pub input: Rc<dyn InputSource>,
    pub clock: Rc<dyn FrameClock>,
    pub movies: Rc<dyn MovieLibrary>,
}

impl Collaborators {
    /// Recording display, audio and clock sharing `recorder`'s log.
    pub fn recording(
        recorder: &RecordingHost,
        input: Rc<dyn InputSource>,
        movies: Rc<dyn MovieLibrary>,
    ) -> Self {
        Self {
            display: Rc::new(recorder.clone()),
            audio: Rc::new(recorder.clone()),
            input,
            clock: Rc::new(recorder.clone()),
            movies,
        }
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Collaborators")
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HostEvent {
    DrawImage {
        id: i16,
    },
    PlaySound {
        name: String,
        volume: i32,
    },
    QueueAudio {
        sample_rate: u32,
        samples: usize,
    },
    SetPalette {
        first: [u8; 3],
    },
    PresentFrame {
        x: i32,
        y: i32,
        width: u16,
        height: u16,
    },
    Sleep {
        millis: u64,
    },
}

#[derive(Clone, Default)]
pub struct RecordingHost {
    events: Rc<RefCell<Vec<HostEvent>>>,
    screen: Option<(u16, u16)>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_screen(width: u16, height: u16) -> Self {
        Self {
            screen: Some((width, height)),
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<HostEvent> {
        self.events.borrow().clone()
    }

    fn push(&self, event: HostEvent) {
        self.events.borrow_mut().push(event);
    }
}

impl DisplayCallback for RecordingHost {
    fn screen_size(&self) -> (u16, u16) {
        self.screen.unwrap_or((SCREEN_WIDTH, SCREEN_HEIGHT))
    }

    fn draw_image(&self, id: i16) {
        self.push(HostEvent::DrawImage { id });
    }

    fn set_palette(&self, palette: &[u8; PALETTE_BYTES]) {
        self.push(HostEvent::SetPalette {
            first: [palette[0], palette[1], palette[2]],
        });
    }

    fn present_frame(&self, x: i32, y: i32, surface: &Surface) {
        self.push(HostEvent::PresentFrame {
            x,
            y,
            width: surface.width,
            height: surface.height,
        });
    }
}

impl AudioCallback for RecordingHost {
    fn play_sound(&self, name: &str, volume: i32) {
        self.push(HostEvent::PlaySound {
            name: name.to_string(),
            volume,
        });
    }

    fn queue_samples(&self, buffer: &AudioBuffer) {
        self.push(HostEvent::QueueAudio {
            sample_rate: buffer.sample_rate,
            samples: buffer.samples.len(),
        });
    }
}

impl FrameClock for RecordingHost {
    fn sleep(&self, delay: Duration) {
        self.push(HostEvent::Sleep {
            millis: delay.as_millis() as u64,
        });
    }
}

/// Blocks the calling thread for each frame delay.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadClock;

impl FrameClock for ThreadClock {
    fn sleep(&self, delay: Duration) {
        thread::sleep(delay);
    }
}

/// Input that raises the quit flag after a fixed number of polls.
#[derive(Debug, Default)]
pub struct ScriptedInput {
    quit_after: Option<usize>,
    polls: Cell<usize>,
}

impl ScriptedInput {
    pub fn never_quit() -> Self {
        Self::default()
    }

    pub fn quit_after(polls: usize) -> Self {
        Self {
            quit_after: Some(polls),
            polls: Cell::new(0),
        }
    }

    pub fn polls(&self) -> usize {
        self.polls.get()
    }
}

impl InputSource for ScriptedInput {
    fn should_quit(&self) -> bool {
        let polls = self.polls.get();
        self.polls.set(polls + 1);
        self.quit_after.is_some_and(|limit| polls >= limit)
    }
}

/// Resolves movie names against a directory. The executable names movies
/// with a `.mov` suffix; a `.pmv` file with the same stem is accepted too.
#[derive(Debug, Clone)]
pub struct DirectoryMovieLibrary {
    root: PathBuf,
}

impl DirectoryMovieLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn locate(&self, name: &str) -> Option<PathBuf> {
        let direct = self.root.join(name);
        if direct.is_file() {
            return Some(direct);
        }
        let pmv = direct.with_extension("pmv");
        pmv.is_file().then_some(pmv)
    }
}

impl MovieLibrary for DirectoryMovieLibrary {
    fn open_movie(&self, name: &str) -> Result<MovieStream> {
        let path = self.locate(name).with_context(|| {
            format!("movie '{name}' not found under {}", self.root.display())
        })?;
        let file = File::open(&path).with_context(|| format!("opening {}", path.display()))?;
        let reader: Box<dyn ReadSeek> = Box::new(BufReader::new(file));
        let movie = PmvDecoder::open(reader)
            .with_context(|| format!("reading movie header of {}", path.display()))?;
        Ok(movie)
    }
}

/// Library for runs without movie files; every lookup fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMovies;

impl MovieLibrary for NoMovies {
    fn open_movie(&self, name: &str) -> Result<MovieStream> {
        anyhow::bail!("no movie directory configured (requested '{name}')")
    }
}
