use std::collections::VecDeque;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Location {
    pub age: u16,
    pub room: u16,
    pub node: u16,
}

impl Location {
    pub fn new(age: u16, room: u16, node: u16) -> Self {
        Self { age, room, node }
    }
}

/// A location change asked for by a script (or the host, for the first
/// node), together with where the game was when it was asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LocationRequest {
    pub location: Location,
    pub requested_from: Option<Location>,
}

/// Entered requests kept for reports; older ones are forgotten.
pub const HISTORY_LIMIT: usize = 256;

/// Location changes waiting for the node-change loop, in request order.
/// Entered requests move to a bounded history.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LocationQueue {
    pending: VecDeque<LocationRequest>,
    history: VecDeque<LocationRequest>,
    entered: usize,
}

impl LocationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, request: LocationRequest) {
        self.pending.push_back(request);
    }

    pub fn next(&mut self) -> Option<LocationRequest> {
        let request = self.pending.pop_front()?;
        self.remember(request);
        Some(request)
    }

    /// Record a location entered directly by the host.
    pub fn record(&mut self, request: LocationRequest) {
        self.remember(request);
    }

    fn remember(&mut self, request: LocationRequest) {
        if self.history.len() == HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(request);
        self.entered += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Drop everything still pending; returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    /// The most recent entered requests, oldest first.
    pub fn history(&self) -> impl ExactSizeIterator<Item = &LocationRequest> {
        self.history.iter()
    }

    /// Hand the retained history to the caller and start a fresh one.
    pub fn take_history(&mut self) -> Vec<LocationRequest> {
        self.history.drain(..).collect()
    }

    /// Every request entered so far, including forgotten ones.
    pub fn entered(&self) -> usize {
        self.entered
    }
}
