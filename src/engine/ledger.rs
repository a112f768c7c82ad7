use std::collections::{BTreeMap, HashMap};

use crate::domain::{DomainConfig, StageConfig};
use crate::model::*;

/// One stage: its static config, its historical bookings, and the active index.
#[derive(Debug, Clone)]
pub struct StageBook {
    pub config: StageConfig,
    /// Every booking ever committed here, in commit order.
    bookings: Vec<Booking>,
    /// `(start, index into bookings)`, sorted by start.
    by_start: Vec<(Minutes, usize)>,
    /// Entities whose most recent booking (anywhere) is at this stage.
    active: BTreeMap<EntityId, Booking>,
}

impl StageBook {
    pub fn new(config: StageConfig) -> Self {
        Self {
            config,
            bookings: Vec::new(),
            by_start: Vec::new(),
            active: BTreeMap::new(),
        }
    }

    pub fn bookings(&self) -> &[Booking] {
        &self.bookings
    }

    fn append(&mut self, booking: Booking) {
        let pos = self
            .by_start
            .partition_point(|(start, _)| *start <= booking.start);
        self.by_start.insert(pos, (booking.start, self.bookings.len()));
        self.bookings.push(booking);
    }

    /// Bookings whose closed interval intersects `[start, end]`.
    /// Binary search skips everything starting after `end`.
    pub fn overlapping(&self, start: Minutes, end: Minutes) -> impl Iterator<Item = &Booking> {
        let right_bound = self.by_start.partition_point(|(s, _)| *s <= end);
        self.by_start[..right_bound]
            .iter()
            .map(|(_, idx)| &self.bookings[*idx])
            .filter(move |b| b.intersects(start, end))
    }

    pub fn active_for(&self, exclude: EntityId) -> impl Iterator<Item = &Booking> {
        self.active
            .iter()
            .filter(move |(id, _)| **id != exclude)
            .map(|(_, b)| b)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Bookings containing instant `t`.
    pub fn occupied_at(&self, t: Minutes) -> usize {
        self.overlapping(t, t).count()
    }
}

/// Per-stage booking books plus the entity → active stage index.
#[derive(Debug, Clone)]
pub struct BookingLedger {
    stages: BTreeMap<String, StageBook>,
    active_stage: HashMap<EntityId, String>,
}

impl BookingLedger {
    pub fn new(domain: &DomainConfig) -> Self {
        let stages = domain
            .stages
            .iter()
            .map(|s| (s.name.clone(), StageBook::new(s.clone())))
            .collect();
        Self {
            stages,
            active_stage: HashMap::new(),
        }
    }

    pub fn stage(&self, name: &str) -> Option<&StageBook> {
        self.stages.get(name)
    }

    pub fn stages(&self) -> impl Iterator<Item = &StageBook> {
        self.stages.values()
    }

    /// Append to the stage history and move the entity's active record here.
    /// Unknown stages are ignored; callers validate names first.
    pub fn commit(&mut self, booking: Booking) {
        let Some(book) = self.stages.get_mut(&booking.stage) else {
            return;
        };
        book.active.insert(booking.entity, booking.clone());
        book.append(booking.clone());

        let previous = self
            .active_stage
            .insert(booking.entity, booking.stage.clone());
        if let Some(prev) = previous
            && prev != booking.stage
            && let Some(prev_book) = self.stages.get_mut(&prev)
        {
            prev_book.active.remove(&booking.entity);
        }
    }

    pub fn overlapping(&self, stage: &str, start: Minutes, end: Minutes) -> Vec<&Booking> {
        self.stages
            .get(stage)
            .map(|b| b.overlapping(start, end).collect())
            .unwrap_or_default()
    }

    pub fn active_for(&self, stage: &str, exclude: EntityId) -> Vec<&Booking> {
        self.stages
            .get(stage)
            .map(|b| b.active_for(exclude).collect())
            .unwrap_or_default()
    }

    /// Stage currently holding the entity's active booking.
    pub fn active_stage_of(&self, entity: EntityId) -> Option<&str> {
        self.active_stage.get(&entity).map(|s| s.as_str())
    }

    pub fn total_bookings(&self) -> usize {
        self.stages.values().map(|b| b.bookings.len()).sum()
    }
}
