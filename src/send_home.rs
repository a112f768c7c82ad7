use serde::Serialize;

use crate::model::Minutes;

/// Load of one stage at an instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageLoad {
    pub stage: String,
    /// Bookings whose interval contains the instant.
    pub occupied: usize,
    /// `None` = unbounded.
    pub capacity: Option<u32>,
    /// Requests parked in the waiting list for this stage.
    pub waiting: usize,
}

impl StageLoad {
    pub fn is_full(&self) -> bool {
        match self.capacity {
            None => false,
            Some(cap) => self.occupied >= cap as usize,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrafficSnapshot {
    pub at: Minutes,
    pub stages: Vec<StageLoad>,
}

impl TrafficSnapshot {
    pub fn stage(&self, name: &str) -> Option<&StageLoad> {
        self.stages.iter().find(|s| s.stage == name)
    }
}

/// Verdict on whether a freshly admitted, non-urgent entity is sent home.
pub trait SendHomePolicy: Send + Sync {
    fn send_home(&self, traffic: &TrafficSnapshot) -> bool;
}

/// Send home when the gate stage is closed or full, or when the downstream
/// backlog has already reached `max_backlog` waiting requests.
#[derive(Debug, Clone)]
pub struct OccupancyPolicy {
    pub gate_stage: String,
    pub backlog_stages: Vec<String>,
    pub max_backlog: usize,
}

impl OccupancyPolicy {
    pub fn healthcare() -> Self {
        Self {
            gate_stage: "Intake".into(),
            backlog_stages: vec!["Surgery".into(), "Nursing_A".into(), "Nursing_B".into()],
            max_backlog: 2,
        }
    }
}

impl SendHomePolicy for OccupancyPolicy {
    fn send_home(&self, traffic: &TrafficSnapshot) -> bool {
        let gate_blocked = match traffic.stage(&self.gate_stage) {
            Some(gate) => gate.capacity == Some(0) || gate.is_full(),
            None => false,
        };
        let backlog: usize = self
            .backlog_stages
            .iter()
            .filter_map(|s| traffic.stage(s))
            .map(|s| s.waiting)
            .sum();
        gate_blocked || backlog >= self.max_backlog
    }
}

/// Never sends anyone home.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdmitAll;

impl SendHomePolicy for AdmitAll {
    fn send_home(&self, _traffic: &TrafficSnapshot) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(stage: &str, occupied: usize, capacity: Option<u32>, waiting: usize) -> StageLoad {
        StageLoad {
            stage: stage.into(),
            occupied,
            capacity,
            waiting,
        }
    }

    #[test]
    fn open_intake_no_backlog_stays() {
        let snapshot = TrafficSnapshot {
            at: 600,
            stages: vec![load("Intake", 1, Some(4), 0), load("Surgery", 5, Some(5), 1)],
        };
        assert!(!OccupancyPolicy::healthcare().send_home(&snapshot));
    }

    #[test]
    fn closed_intake_sends_home() {
        let snapshot = TrafficSnapshot {
            at: 1200,
            stages: vec![load("Intake", 0, Some(0), 0)],
        };
        assert!(OccupancyPolicy::healthcare().send_home(&snapshot));
    }

    #[test]
    fn full_intake_sends_home() {
        let snapshot = TrafficSnapshot {
            at: 600,
            stages: vec![load("Intake", 4, Some(4), 0)],
        };
        assert!(OccupancyPolicy::healthcare().send_home(&snapshot));
    }

    #[test]
    fn downstream_backlog_sends_home() {
        let snapshot = TrafficSnapshot {
            at: 600,
            stages: vec![
                load("Intake", 0, Some(4), 0),
                load("Surgery", 5, Some(5), 1),
                load("Nursing_B", 3, Some(40), 1),
            ],
        };
        assert!(OccupancyPolicy::healthcare().send_home(&snapshot));
    }

    #[test]
    fn unbounded_is_never_full() {
        assert!(!load("Admission", 10_000, None, 0).is_full());
        assert!(!AdmitAll.send_home(&TrafficSnapshot { at: 0, stages: vec![] }));
    }
}
