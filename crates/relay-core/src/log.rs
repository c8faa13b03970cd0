//! Bounded, append-only event log.

use std::collections::{BTreeMap, VecDeque};

use chrono::Utc;

use crate::decisions::Decision;
use crate::events::{Event, NewEvent};

/// Default number of events retained.
pub const DEFAULT_CAPACITY: usize = 1000;

/// FIFO ring of the most recent events. Ids are assigned here and never
/// reused, including across [`EventLog::clear`].
pub struct EventLog {
    events: VecDeque<Event>,
    capacity: usize,
    last_id: u64,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            last_id: 0,
        }
    }

    /// Assign the next id, store the event, and evict the oldest entry once
    /// over capacity. Returns a copy of the stored event.
    pub fn append(&mut self, new: NewEvent) -> Event {
        self.last_id += 1;
        let event = Event::new(self.last_id, Utc::now(), new);
        self.events.push_back(event.clone());
        while self.events.len() > self.capacity {
            let _ = self.events.pop_front();
        }
        event
    }

    /// The last `limit` events in arrival order.
    pub fn recent(&self, limit: usize) -> Vec<Event> {
        let skip = self.events.len().saturating_sub(limit);
        self.events.iter().skip(skip).cloned().collect()
    }

    pub fn find(&self, id: u64) -> Option<&Event> {
        // Ids are contiguous within the ring, so index directly.
        let first = self.events.front()?.id;
        let idx = usize::try_from(id.checked_sub(first)?).ok()?;
        self.events.get(idx).filter(|e| e.id == id)
    }

    /// Record the decision for an event. Returns `false` if the event is gone
    /// or already decided.
    pub fn record_decision(&mut self, id: u64, decision: Decision) -> bool {
        let Some(first) = self.events.front().map(|e| e.id) else {
            return false;
        };
        let Some(idx) = id.checked_sub(first).and_then(|d| usize::try_from(d).ok()) else {
            return false;
        };
        match self.events.get_mut(idx) {
            Some(event) if event.id == id => event.settle(decision),
            _ => false,
        }
    }

    /// Drop every retained event. Returns how many were removed.
    pub fn clear(&mut self) -> usize {
        let n = self.events.len();
        self.events.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Count of retained events per hook name.
    pub fn kind_histogram(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for event in &self.events {
            *counts.entry(event.histogram_key().to_string()).or_insert(0) += 1;
        }
        counts
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
