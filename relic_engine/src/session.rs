use std::collections::VecDeque;

use log::{debug, info, warn};
use relic_formats::{ConditionalScript, Node, ResourceTables};
use thiserror::Error;

use crate::host::Collaborators;
use crate::interpreter::{self, ScriptHost};
use crate::player::{self, PlaybackSummary};
use crate::scheduler::{Location, LocationQueue, LocationRequest};
use crate::state::{AlwaysTrue, ConditionEvaluator};

pub const DEFAULT_TRANSITION_LIMIT: usize = 256;
/// Playback summaries kept until the next report.
pub const MOVIE_LOG_LIMIT: usize = 64;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("age {age} has {rooms} room(s); room {room} requested")]
    UnsupportedRoom { age: u16, room: u16, rooms: u16 },
    #[error(transparent)]
    Resource(#[from] relic_formats::Error),
    #[error("movie '{name}' could not be opened: {reason}")]
    Movie { name: String, reason: String },
}

/// Running game: tables, collaborators, the current location and the
/// location changes scripts asked for.
pub struct Session {
    tables: ResourceTables,
    host: Collaborators,
    conditions: Box<dyn ConditionEvaluator>,
    rooms_per_age: u16,
    location: Option<Location>,
    node: Option<Node>,
    pending: LocationQueue,
    transition_limit: usize,
    movies: VecDeque<PlaybackSummary>,
}

impl Session {
    pub fn new(tables: ResourceTables, host: Collaborators, rooms_per_age: u16) -> Self {
        Self {
            tables,
            host,
            conditions: Box::new(AlwaysTrue),
            rooms_per_age,
            location: None,
            node: None,
            pending: LocationQueue::new(),
            transition_limit: DEFAULT_TRANSITION_LIMIT,
            movies: VecDeque::new(),
        }
    }

    pub fn with_conditions(mut self, conditions: Box<dyn ConditionEvaluator>) -> Self {
        self.conditions = conditions;
        self
    }

    /// Cap on script-requested location changes drained by one call.
    pub fn with_transition_limit(mut self, limit: usize) -> Self {
        self.transition_limit = limit;
        self
    }

    pub fn location(&self) -> Option<Location> {
        self.location
    }

    pub fn current_node(&self) -> Option<&Node> {
        self.node.as_ref()
    }

    pub fn history(&self) -> impl ExactSizeIterator<Item = &LocationRequest> {
        self.pending.history()
    }

    /// Locations entered since the session started.
    pub fn locations_entered(&self) -> usize {
        self.pending.entered()
    }

    pub fn take_history(&mut self) -> Vec<LocationRequest> {
        self.pending.take_history()
    }

    pub fn movies(&self) -> impl ExactSizeIterator<Item = &PlaybackSummary> {
        self.movies.iter()
    }

    /// Hand over the playback summaries gathered since the last call.
    pub fn take_movies(&mut self) -> Vec<PlaybackSummary> {
        self.movies.drain(..).collect()
    }

    /// Enter `node` of `age` and run its main scripts, then follow the
    /// location changes those scripts request until none are left or the
    /// quit flag is raised.
    pub fn change_to_node(&mut self, age: u16, room: u16, node: u16) -> Result<(), SessionError> {
        let location = Location::new(age, room, node);
        self.pending.record(LocationRequest {
            location,
            requested_from: self.location,
        });
        self.enter(location)?;
        self.drain_pending()
    }

    pub fn change_to_age_node(&mut self, age: u16, node: u16) -> Result<(), SessionError> {
        self.change_to_node(age, 1, node)
    }

    /// Dispatch the current node's sound scripts the same way as its main
    /// scripts.
    pub fn run_sound_scripts(&mut self) -> Result<(), SessionError> {
        let Some(node) = self.node.clone() else {
            warn!("no current node; sound scripts skipped");
            return Ok(());
        };
        self.run_conditional(&node.sound_scripts)?;
        self.drain_pending()
    }

    fn enter(&mut self, location: Location) -> Result<(), SessionError> {
        let Location { age, room, node } = location;
        if room == 0 || room > self.rooms_per_age {
            return Err(SessionError::UnsupportedRoom {
                age,
                room,
                rooms: self.rooms_per_age,
            });
        }

        let data = self.tables.node(age, node)?.clone();
        info!(
            "entering age {age} room {room} node {node}: {} main scripts, {} hotspots",
            data.main_scripts.len(),
            data.hotspots.len()
        );
        self.location = Some(location);
        self.node = Some(data.clone());
        self.run_conditional(&data.main_scripts)
    }

    /// Run every script whose condition holds, in list order. A zero
    /// condition ends the list.
    fn run_conditional(&mut self, scripts: &[ConditionalScript]) -> Result<(), SessionError> {
        for entry in scripts {
            if entry.condition == 0 {
                break;
            }
            if !self.conditions.evaluate(entry.condition) {
                debug!("condition {:#06x} false; script skipped", entry.condition);
                continue;
            }
            interpreter::execute(&entry.script, self)?;
        }
        Ok(())
    }

    fn drain_pending(&mut self) -> Result<(), SessionError> {
        let mut transitions = 0usize;
        loop {
            if self.host.input.should_quit() {
                let dropped = self.pending.clear();
                debug!("quit requested; {dropped} location changes dropped");
                return Ok(());
            }
            if self.pending.is_empty() {
                return Ok(());
            }
            if transitions == self.transition_limit {
                let dropped = self.pending.clear();
                warn!(
                    "stopping after {transitions} location changes; {dropped} still pending"
                );
                return Ok(());
            }
            let Some(request) = self.pending.next() else {
                return Ok(());
            };
            transitions += 1;
            self.enter(request.location)?;
        }
    }
}

fn non_negative(value: i16, what: &str) -> Option<u16> {
    let converted = u16::try_from(value).ok();
    if converted.is_none() {
        warn!("negative {what} {value} in script; ignored");
    }
    converted
}

impl ScriptHost for Session {
    fn draw_image(&mut self, id: i16) -> Result<(), SessionError> {
        self.host.display.draw_image(id);
        Ok(())
    }

    fn play_movie(&mut self, id: i16) -> Result<(), SessionError> {
        let Some(id) = non_negative(id, "movie id") else {
            return Ok(());
        };
        let name = self.tables.movie_name(id)?.to_string();
        let mut movie = self
            .host
            .movies
            .open_movie(&name)
            .map_err(|err| SessionError::Movie {
                name: name.clone(),
                reason: format!("{err:#}"),
            })?;
        let summary = player::play_movie(&name, &mut movie, &self.host);
        if self.movies.len() == MOVIE_LOG_LIMIT {
            self.movies.pop_front();
        }
        self.movies.push_back(summary);
        Ok(())
    }

    fn change_location(&mut self, age: i16, room: i16, node: i16) -> Result<(), SessionError> {
        let (Some(age), Some(room), Some(node)) = (
            non_negative(age, "age"),
            non_negative(room, "room"),
            non_negative(node, "node"),
        ) else {
            return Ok(());
        };
        debug!("location change to {age}/{room}/{node} queued");
        self.pending.push(LocationRequest {
            location: Location::new(age, room, node),
            requested_from: self.location,
        });
        Ok(())
    }

    fn play_sound(&mut self, id: i16, volume: i32) -> Result<(), SessionError> {
        let Some(id) = non_negative(id, "sound id") else {
            return Ok(());
        };
        let name = self.tables.sound_name(id)?;
        self.host.audio.play_sound(name, volume);
        Ok(())
    }
}
