use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Simulation minutes since the epoch (2018-01-01 00:00, a Monday).
pub type Minutes = i64;

/// Entity (patient) identifier. Always positive once assigned.
pub type EntityId = u64;

pub const MINUTES_PER_HOUR: Minutes = 60;
pub const MINUTES_PER_DAY: Minutes = 24 * MINUTES_PER_HOUR;

/// Weekday of `t`, 0 = Monday.
pub fn weekday(t: Minutes) -> u8 {
    t.div_euclid(MINUTES_PER_DAY).rem_euclid(7) as u8
}

/// Hour of day of `t`, 0..24.
pub fn hour_of_day(t: Minutes) -> u8 {
    (t.rem_euclid(MINUTES_PER_DAY) / MINUTES_PER_HOUR) as u8
}

/// Monday–Friday, 08:00–17:00.
pub fn is_working_hour(t: Minutes) -> bool {
    weekday(t) < 5 && (8..17).contains(&hour_of_day(t))
}

/// Opaque request metadata. `patient_type` doubles as the domain priority tag carrier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub patient_type: String,
    pub extra: BTreeMap<String, String>,
}

impl Metadata {
    pub fn new(patient_type: impl Into<String>) -> Self {
        Self {
            patient_type: patient_type.into(),
            extra: BTreeMap::new(),
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.patient_type.contains(tag)
    }
}

/// A committed stage occupation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub entity: EntityId,
    pub stage: String,
    pub arrival: Minutes,
    pub start: Minutes,
    pub end: Minutes,
    pub duration: Minutes,
    pub metadata: Metadata,
}

impl Booking {
    pub fn new(
        entity: EntityId,
        stage: String,
        arrival: Minutes,
        start: Minutes,
        duration: Minutes,
        metadata: Metadata,
    ) -> Self {
        Self {
            entity,
            stage,
            arrival,
            start,
            end: start + duration,
            duration,
            metadata,
        }
    }

    /// Closed-interval intersection with `[start, end]`.
    pub fn intersects(&self, start: Minutes, end: Minutes) -> bool {
        self.start <= end && start <= self.end
    }
}

/// A stage request, in flight or parked in the waiting list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub request_id: Ulid,
    pub entity: EntityId,
    pub stage: String,
    pub arrival: Minutes,
    pub duration: Minutes,
    pub metadata: Metadata,
    pub callback: Option<String>,
}

impl Request {
    pub fn new(
        entity: EntityId,
        stage: impl Into<String>,
        arrival: Minutes,
        duration: Minutes,
        metadata: Metadata,
    ) -> Self {
        Self {
            request_id: Ulid::new(),
            entity,
            stage: stage.into(),
            arrival,
            duration,
            metadata,
            callback: None,
        }
    }
}

/// One ledger entry per commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerRecord {
    BookingCommitted {
        booking: Booking,
        /// True when this commit admitted a never-before-seen entity at the entry stage.
        new_entity: bool,
    },
}

/// Result payload handed back to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reply {
    Timing {
        id: EntityId,
        stage: String,
        arrival: Minutes,
        start: Minutes,
        end: Minutes,
        duration: Minutes,
        patient_type: String,
    },
    SendHome {
        send_home: bool,
        id: EntityId,
    },
}

impl Reply {
    pub fn timing(booking: &Booking) -> Self {
        Reply::Timing {
            id: booking.entity,
            stage: booking.stage.clone(),
            arrival: booking.arrival,
            start: booking.start,
            end: booking.end,
            duration: booking.duration,
            patient_type: booking.metadata.patient_type.clone(),
        }
    }

    pub fn entity(&self) -> EntityId {
        match self {
            Reply::Timing { id, .. } | Reply::SendHome { id, .. } => *id,
        }
    }
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusInfo {
    pub watermark: Option<Minutes>,
    pub waiting: usize,
    pub replanned: usize,
    pub seen: usize,
    pub bookings: usize,
}
