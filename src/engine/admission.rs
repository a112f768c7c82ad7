use ulid::Ulid;

use crate::model::*;

use super::capacity::{capacity_at, Capacity};
use super::ledger::StageBook;
use super::state::{Commit, SchedulerState};

/// Outcome of one admission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Admit(Minutes),
    Defer(DeferReason),
}

/// Which gate held the request back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferReason {
    /// Entry-stage re-arrival of a known entity, parked in the replanned area.
    Replanned,
    /// A waiting request for the same stage arrived strictly earlier.
    EarlierPeer,
    /// An unseen entry arrival could still precede this arrival.
    WatermarkBeforeArrival,
    /// Another entity's active booking at a dependency stage ended before this arrival.
    DependencyPending,
    /// No slot within the search window.
    NoSlot,
    /// An unseen entry arrival could still precede the computed start.
    WatermarkBeforeStart,
    /// An urgent request for the same stage was run first.
    UrgentFirst,
}

impl DeferReason {
    pub fn label(&self) -> &'static str {
        match self {
            DeferReason::Replanned => "replanned",
            DeferReason::EarlierPeer => "earlier_peer",
            DeferReason::WatermarkBeforeArrival => "watermark_arrival",
            DeferReason::DependencyPending => "dependency_pending",
            DeferReason::NoSlot => "no_slot",
            DeferReason::WatermarkBeforeStart => "watermark_start",
            DeferReason::UrgentFirst => "urgent_first",
        }
    }
}

impl SchedulerState {
    /// Run the admission gates for `req`, in order; the first that fires decides.
    ///
    /// Side commits (drained replanned entries, preempting urgent requests) are
    /// applied to the state and pushed onto `commits`. The request itself is
    /// neither committed nor parked here.
    pub fn decide(&mut self, req: &Request, commits: &mut Vec<Commit>) -> Decision {
        let mut chain = Vec::new();
        self.decide_in_chain(req, commits, &mut chain)
    }

    fn decide_in_chain(
        &mut self,
        req: &Request,
        commits: &mut Vec<Commit>,
        chain: &mut Vec<Ulid>,
    ) -> Decision {
        let is_new = !self.is_seen(req.entity);

        // 1. Entry stage
        if req.stage == self.domain.entry_stage {
            if !is_new {
                self.waiting.hold_replanned(req.clone());
                return Decision::Defer(DeferReason::Replanned);
            }
            // Entry capacity is unbounded, so replanned arrivals go in at their own time.
            for replanned in self.waiting.drain_replanned_before(req.arrival) {
                let commit = self.commit(&replanned, replanned.arrival);
                commits.push(commit);
            }
        }

        // 2. Earlier peers first. Requests that yielded to this one are not peers.
        if self
            .waiting
            .has_earlier_peer(&req.stage, req.arrival, req.entity, chain.as_slice())
        {
            return Decision::Defer(DeferReason::EarlierPeer);
        }

        let Some(book) = self.ledger.stage(&req.stage) else {
            return Decision::Defer(DeferReason::NoSlot);
        };

        // 3. Dependency-free stage, unseen entity
        if book.config.dependencies.is_empty() && is_new {
            return Decision::Admit(req.arrival);
        }

        // 4. Unseen predecessors before the arrival
        if self.watermark.is_behind(req.arrival) {
            return Decision::Defer(DeferReason::WatermarkBeforeArrival);
        }

        // 5. Dependency completion. Polarity is load-bearing: an active booking
        // that already ended before this arrival belongs to an entity that may
        // still emit a competing request.
        for dep in &book.config.dependencies {
            let pending = self
                .ledger
                .active_for(dep, req.entity)
                .iter()
                .any(|b| b.end < req.arrival);
            if pending {
                return Decision::Defer(DeferReason::DependencyPending);
            }
        }

        // 6. Greedy placement
        let Some(start) = place(
            book,
            req.arrival,
            req.duration,
            self.search_window,
            self.horizon,
        ) else {
            return Decision::Defer(DeferReason::NoSlot);
        };

        // 7. Unseen predecessors before the start
        if self.watermark.is_behind(start) {
            return Decision::Defer(DeferReason::WatermarkBeforeStart);
        }

        // 8. Urgent requests go first
        let urgent = self.waiting.urgent_before(
            &req.stage,
            start,
            req.entity,
            &self.domain.urgent_tag,
        );
        if let Some(candidate_id) = urgent.into_iter().find(|id| !chain.contains(id)) {
            if let Some(candidate) = self.waiting.get(candidate_id).cloned() {
                chain.push(req.request_id);
                let decision = self.decide_in_chain(&candidate, commits, chain);
                chain.pop();
                if let Decision::Admit(urgent_start) = decision {
                    self.waiting.remove(candidate_id);
                    let commit = self.commit(&candidate, urgent_start);
                    commits.push(commit);
                }
            }
            return Decision::Defer(DeferReason::UrgentFirst);
        }

        // 9.
        Decision::Admit(start)
    }
}

/// Earliest start at or after `arrival` where the stage has room for
/// `[start, start + duration]`, searching at most `window` minutes ahead and
/// never past `horizon`.
pub fn place(
    book: &StageBook,
    arrival: Minutes,
    duration: Minutes,
    window: Minutes,
    horizon: Minutes,
) -> Option<Minutes> {
    let limit = arrival.saturating_add(window).min(horizon);
    let mut candidate = arrival;
    while candidate <= limit {
        let capacity = capacity_at(&book.config, candidate);
        match capacity {
            Capacity::Unbounded => return Some(candidate),
            Capacity::Limited(0) => candidate += 1,
            Capacity::Limited(_) => {
                let mut occupied = 0usize;
                let mut earliest_end = Minutes::MAX;
                for b in book.overlapping(candidate, candidate + duration) {
                    occupied += 1;
                    earliest_end = earliest_end.min(b.end);
                }
                if capacity.admits(occupied) {
                    return Some(candidate);
                }
                // Every overlapping booking ends at or after `candidate`.
                candidate = earliest_end + 1;
            }
        }
    }
    None
}
