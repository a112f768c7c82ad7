use crate::model::*;

/// Chooses a new arrival time for an entity that has to come back later.
pub trait Planner: Send + Sync {
    fn plan(&self, arrival: Minutes) -> Minutes;
}

/// Next day, same time, pushed forward to 08:00 of the next working day
/// whenever that lands on a weekend or outside 08:00–17:00.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaivePlanner;

impl Planner for NaivePlanner {
    fn plan(&self, arrival: Minutes) -> Minutes {
        let mut t = arrival + MINUTES_PER_DAY;
        while !is_working_hour(t) {
            let next_day = t.div_euclid(MINUTES_PER_DAY) + 1;
            t = next_day * MINUTES_PER_DAY + 8 * MINUTES_PER_HOUR;
        }
        t
    }
}
