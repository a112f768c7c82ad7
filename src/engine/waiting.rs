use ulid::Ulid;

use crate::model::*;

/// Deferred requests: the general waiting list and the replanned holding area
/// for entry-stage re-arrivals of entities already seen.
#[derive(Debug, Clone, Default)]
pub struct WaitingList {
    waiting: Vec<Request>,
    replanned: Vec<Request>,
}

impl WaitingList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }

    pub fn replanned_len(&self) -> usize {
        self.replanned.len()
    }

    pub fn contains(&self, request_id: Ulid) -> bool {
        self.waiting.iter().any(|r| r.request_id == request_id)
    }

    pub fn get(&self, request_id: Ulid) -> Option<&Request> {
        self.waiting.iter().find(|r| r.request_id == request_id)
    }

    /// Park a request. No-op if it is already parked.
    pub fn park(&mut self, request: Request) {
        if !self.contains(request.request_id) {
            self.waiting.push(request);
        }
    }

    pub fn remove(&mut self, request_id: Ulid) -> Option<Request> {
        let pos = self.waiting.iter().position(|r| r.request_id == request_id)?;
        Some(self.waiting.remove(pos))
    }

    /// Sort by arrival (ties by request id) and return the scan order.
    pub fn sorted_ids(&mut self) -> Vec<Ulid> {
        self.waiting
            .sort_by(|a, b| a.arrival.cmp(&b.arrival).then(a.request_id.cmp(&b.request_id)));
        self.waiting.iter().map(|r| r.request_id).collect()
    }

    /// Is another waiting request for `stage` from a different entity strictly
    /// earlier? Requests in `skip` are not counted.
    pub fn has_earlier_peer(
        &self,
        stage: &str,
        arrival: Minutes,
        entity: EntityId,
        skip: &[Ulid],
    ) -> bool {
        self.waiting.iter().any(|r| {
            r.stage == stage
                && r.arrival < arrival
                && r.entity != entity
                && !skip.contains(&r.request_id)
        })
    }

    /// Waiting urgent requests for `stage` (other entities) arriving before `before`,
    /// earliest first.
    pub fn urgent_before(
        &self,
        stage: &str,
        before: Minutes,
        entity: EntityId,
        urgent_tag: &str,
    ) -> Vec<Ulid> {
        let mut hits: Vec<&Request> = self
            .waiting
            .iter()
            .filter(|r| {
                r.stage == stage
                    && r.entity != entity
                    && r.arrival < before
                    && r.metadata.has_tag(urgent_tag)
            })
            .collect();
        hits.sort_by(|a, b| a.arrival.cmp(&b.arrival).then(a.request_id.cmp(&b.request_id)));
        hits.into_iter().map(|r| r.request_id).collect()
    }

    pub fn waiting_for_stage(&self, stage: &str) -> usize {
        self.waiting.iter().filter(|r| r.stage == stage).count()
    }

    // ── Replanned holding area ───────────────────────────────

    pub fn hold_replanned(&mut self, request: Request) {
        if !self.replanned.iter().any(|r| r.request_id == request.request_id) {
            self.replanned.push(request);
        }
    }

    /// Remove and return replanned requests arriving strictly before `before`, earliest first.
    pub fn drain_replanned_before(&mut self, before: Minutes) -> Vec<Request> {
        let (mut due, keep): (Vec<Request>, Vec<Request>) = self
            .replanned
            .drain(..)
            .partition(|r| r.arrival < before);
        self.replanned = keep;
        due.sort_by(|a, b| a.arrival.cmp(&b.arrival).then(a.request_id.cmp(&b.request_id)));
        due
    }
}
