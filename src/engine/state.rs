use std::collections::HashSet;
use std::sync::Arc;

use ulid::Ulid;

use crate::domain::DomainConfig;
use crate::limits::*;
use crate::model::*;
use crate::send_home::{SendHomePolicy, StageLoad, TrafficSnapshot};

use super::admission::{Decision, DeferReason};
use super::capacity::capacity_at;
use super::ledger::BookingLedger;
use super::waiting::WaitingList;
use super::watermark::Watermark;
use super::EngineError;

/// A booking that was just committed, with its reply and delivery target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub request_id: Ulid,
    pub booking: Booking,
    pub new_entity: bool,
    pub reply: Reply,
    pub callback: Option<String>,
}

impl Commit {
    pub fn record(&self) -> LedgerRecord {
        LedgerRecord::BookingCommitted {
            booking: self.booking.clone(),
            new_entity: self.new_entity,
        }
    }
}

/// What happened to an inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Admitted(Commit),
    Deferred(DeferReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub outcome: Outcome,
    /// Other requests committed as a side effect; their callers get callbacks.
    pub side_commits: Vec<Commit>,
}

/// All mutable scheduling state. Owned by one lock; never split.
pub struct SchedulerState {
    pub(super) domain: DomainConfig,
    pub(super) ledger: BookingLedger,
    pub(super) watermark: Watermark,
    pub(super) waiting: WaitingList,
    seen: HashSet<EntityId>,
    next_entity: EntityId,
    pub(super) search_window: Minutes,
    pub(super) horizon: Minutes,
    send_home: Arc<dyn SendHomePolicy>,
}

impl SchedulerState {
    pub fn new(
        domain: DomainConfig,
        horizon: Minutes,
        search_window: Minutes,
        send_home: Arc<dyn SendHomePolicy>,
    ) -> Self {
        let ledger = BookingLedger::new(&domain);
        Self {
            domain,
            ledger,
            watermark: Watermark::new(),
            waiting: WaitingList::new(),
            seen: HashSet::new(),
            next_entity: 1,
            search_window,
            horizon,
            send_home,
        }
    }

    pub fn domain(&self) -> &DomainConfig {
        &self.domain
    }

    pub fn ledger(&self) -> &BookingLedger {
        &self.ledger
    }

    pub fn watermark(&self) -> Option<Minutes> {
        self.watermark.get()
    }

    pub fn waiting(&self) -> &WaitingList {
        &self.waiting
    }

    pub fn is_seen(&self, entity: EntityId) -> bool {
        self.seen.contains(&entity)
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    /// Use the caller's id if positive, else hand out a fresh one.
    pub fn assign_entity(&mut self, requested: Option<i64>) -> EntityId {
        match requested {
            Some(id) if id > 0 => {
                let id = id as EntityId;
                self.next_entity = self.next_entity.max(id + 1);
                id
            }
            _ => {
                let id = self.next_entity;
                self.next_entity += 1;
                id
            }
        }
    }

    /// Reject malformed or out-of-domain requests before anything is mutated.
    pub fn validate(&self, req: &Request) -> Result<(), EngineError> {
        if self.domain.stage(&req.stage).is_none() {
            return Err(EngineError::UnknownStage(req.stage.clone()));
        }
        if req.metadata.patient_type.len() > MAX_PATIENT_TYPE_LEN
            || !self.domain.is_known_patient_type(&req.metadata.patient_type)
        {
            return Err(EngineError::UnknownPatientType(
                req.metadata.patient_type.clone(),
            ));
        }
        if req.arrival > self.horizon {
            return Err(EngineError::BeyondHorizon {
                arrival: req.arrival,
                horizon: self.horizon,
            });
        }
        if req.arrival < 0 {
            return Err(EngineError::InvalidNumber {
                field: "arrival",
                value: req.arrival.to_string(),
            });
        }
        if req.duration < 0 {
            return Err(EngineError::InvalidNumber {
                field: "duration",
                value: req.duration.to_string(),
            });
        }
        if req.duration > MAX_DURATION_MINUTES {
            return Err(EngineError::LimitExceeded("duration too long"));
        }
        if req.metadata.extra.len() > MAX_EXTRA_FIELDS
            || req
                .metadata
                .extra
                .values()
                .any(|v| v.len() > MAX_EXTRA_VALUE_LEN)
        {
            return Err(EngineError::LimitExceeded("metadata too large"));
        }
        if req
            .callback
            .as_ref()
            .is_some_and(|c| c.len() > MAX_CALLBACK_URL_LEN)
        {
            return Err(EngineError::LimitExceeded("callback url too long"));
        }
        if self.waiting.len() + self.waiting.replanned_len() >= MAX_WAITING {
            return Err(EngineError::LimitExceeded("too many waiting requests"));
        }
        Ok(())
    }

    /// Decide an inbound request: commit it now or park it.
    pub fn submit(&mut self, req: Request) -> Result<Submission, EngineError> {
        self.validate(&req)?;
        let mut side_commits = Vec::new();
        let outcome = match self.decide(&req, &mut side_commits) {
            Decision::Admit(start) => Outcome::Admitted(self.commit(&req, start)),
            Decision::Defer(reason) => {
                // Replanned re-arrivals are already in their own holding area.
                if reason != DeferReason::Replanned {
                    self.waiting.park(req);
                }
                Outcome::Deferred(reason)
            }
        };
        Ok(Submission {
            outcome,
            side_commits,
        })
    }

    /// One reconciliation pass over the waiting list, in arrival order.
    pub fn reconcile(&mut self) -> Vec<Commit> {
        let mut commits = Vec::new();

        if let Some(watermark) = self.watermark.get() {
            for replanned in self.waiting.drain_replanned_before(watermark) {
                let commit = self.commit(&replanned, replanned.arrival);
                commits.push(commit);
            }
        }

        for request_id in self.waiting.sorted_ids() {
            // Preemption earlier in the pass may already have taken it.
            let Some(req) = self.waiting.get(request_id).cloned() else {
                continue;
            };
            if let Decision::Admit(start) = self.decide(&req, &mut commits) {
                self.waiting.remove(request_id);
                let commit = self.commit(&req, start);
                commits.push(commit);
            }
        }
        commits
    }

    /// Turn an admitted request into a booking: ledger, watermark, reply.
    pub(super) fn commit(&mut self, req: &Request, start: Minutes) -> Commit {
        let booking = Booking::new(
            req.entity,
            req.stage.clone(),
            req.arrival,
            start,
            req.duration,
            req.metadata.clone(),
        );
        let is_entry = req.stage == self.domain.entry_stage;
        let new_entity = is_entry && self.seen.insert(req.entity);
        if new_entity {
            self.watermark.advance(req.arrival);
        }
        self.next_entity = self.next_entity.max(req.entity + 1);
        self.ledger.commit(booking.clone());

        let reply = if is_entry && !req.metadata.has_tag(&self.domain.urgent_tag) {
            let snapshot = self.traffic_at(start);
            Reply::SendHome {
                send_home: self.send_home.send_home(&snapshot),
                id: req.entity,
            }
        } else {
            Reply::timing(&booking)
        };

        Commit {
            request_id: req.request_id,
            booking,
            new_entity,
            reply,
            callback: req.callback.clone(),
        }
    }

    /// Occupancy, capacity and backlog per stage at `t`.
    pub fn traffic_at(&self, t: Minutes) -> TrafficSnapshot {
        let stages = self
            .ledger
            .stages()
            .map(|book| StageLoad {
                stage: book.config.name.clone(),
                occupied: book.occupied_at(t),
                capacity: capacity_at(&book.config, t).as_option(),
                waiting: self.waiting.waiting_for_stage(&book.config.name),
            })
            .collect();
        TrafficSnapshot { at: t, stages }
    }

    /// Re-apply a committed record from the ledger (startup replay).
    pub fn restore(&mut self, record: &LedgerRecord) {
        match record {
            LedgerRecord::BookingCommitted {
                booking,
                new_entity,
            } => {
                if *new_entity {
                    self.seen.insert(booking.entity);
                    self.watermark.advance(booking.arrival);
                }
                self.next_entity = self.next_entity.max(booking.entity + 1);
                self.ledger.commit(booking.clone());
            }
        }
    }

    pub fn status(&self) -> StatusInfo {
        StatusInfo {
            watermark: self.watermark.get(),
            waiting: self.waiting.len(),
            replanned: self.waiting.replanned_len(),
            seen: self.seen.len(),
            bookings: self.ledger.total_bookings(),
        }
    }
}
