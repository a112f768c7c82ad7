use crate::domain::StageConfig;
use crate::model::*;

/// Concurrent occupations a stage allows at an instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
    Limited(u32),
    Unbounded,
}

impl Capacity {
    pub fn is_closed(&self) -> bool {
        matches!(self, Capacity::Limited(0))
    }

    /// True if `occupied` more bookings still fit under this capacity.
    pub fn admits(&self, occupied: usize) -> bool {
        match self {
            Capacity::Unbounded => true,
            Capacity::Limited(cap) => occupied < *cap as usize,
        }
    }

    pub fn as_option(&self) -> Option<u32> {
        match self {
            Capacity::Unbounded => None,
            Capacity::Limited(cap) => Some(*cap),
        }
    }
}

/// Capacity of `stage` at `t`: first rule matching weekday and hour wins, none ⇒ 0.
pub fn capacity_at(stage: &StageConfig, t: Minutes) -> Capacity {
    let (day, hour) = (weekday(t), hour_of_day(t));
    stage
        .capacity
        .iter()
        .find(|rule| rule.matches(day, hour))
        .map(|rule| match rule.capacity {
            Some(cap) => Capacity::Limited(cap),
            None => Capacity::Unbounded,
        })
        .unwrap_or(Capacity::Limited(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CapacityRule, DomainConfig, ALL_DAYS, WORKDAYS};

    const H: Minutes = MINUTES_PER_HOUR;
    const D: Minutes = MINUTES_PER_DAY;

    #[test]
    fn intake_open_on_weekday_mornings() {
        let domain = DomainConfig::healthcare();
        let intake = domain.stage("Intake").unwrap();
        assert_eq!(capacity_at(intake, 8 * H), Capacity::Limited(4));
        assert_eq!(capacity_at(intake, 17 * H - 1), Capacity::Limited(4));
        assert_eq!(capacity_at(intake, 17 * H), Capacity::Limited(0));
        assert_eq!(capacity_at(intake, 7 * H + 59), Capacity::Limited(0));
        // Saturday
        assert_eq!(capacity_at(intake, 5 * D + 10 * H), Capacity::Limited(0));
    }

    #[test]
    fn surgery_falls_back_to_off_hours_capacity() {
        let domain = DomainConfig::healthcare();
        let surgery = domain.stage("Surgery").unwrap();
        assert_eq!(capacity_at(surgery, D + 9 * H), Capacity::Limited(5));
        assert_eq!(capacity_at(surgery, D + 20 * H), Capacity::Limited(1));
        assert_eq!(capacity_at(surgery, 6 * D + 9 * H), Capacity::Limited(1));
    }

    #[test]
    fn unbounded_stage() {
        let domain = DomainConfig::healthcare();
        let admission = domain.stage("Admission").unwrap();
        assert_eq!(capacity_at(admission, 123_456), Capacity::Unbounded);
        assert!(Capacity::Unbounded.admits(usize::MAX - 1));
    }

    #[test]
    fn no_matching_rule_means_closed() {
        let stage = StageConfig {
            name: "Lab".into(),
            capacity: vec![CapacityRule::limited(2, &WORKDAYS, 8, 12)],
            dependencies: vec![],
        };
        assert!(capacity_at(&stage, 13 * H).is_closed());
        assert!(capacity_at(&StageConfig { capacity: vec![], ..stage }, 9 * H).is_closed());
    }

    #[test]
    fn first_match_wins() {
        let stage = StageConfig {
            name: "Lab".into(),
            capacity: vec![
                CapacityRule::limited(1, &ALL_DAYS, 0, 24),
                CapacityRule::limited(9, &ALL_DAYS, 8, 17),
            ],
            dependencies: vec![],
        };
        assert_eq!(capacity_at(&stage, 9 * H), Capacity::Limited(1));
    }

    #[test]
    fn lookup_is_pure() {
        let domain = DomainConfig::healthcare();
        let surgery = domain.stage("Surgery").unwrap();
        for t in (0..2 * D).step_by(37) {
            assert_eq!(capacity_at(surgery, t), capacity_at(surgery, t));
        }
    }

    #[test]
    fn admits_counts_strictly_below() {
        assert!(Capacity::Limited(2).admits(1));
        assert!(!Capacity::Limited(2).admits(2));
        assert!(!Capacity::Limited(0).admits(0));
    }
}
