use crate::model::Minutes;

/// Arrival of the most recently admitted new entity at the entry stage.
///
/// New entities reach the entry stage in arrival order, so nothing unseen can
/// arrive at or before the watermark. Decisions beyond it must wait.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Watermark {
    last_entry_arrival: Option<Minutes>,
}

impl Watermark {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Minutes> {
        self.last_entry_arrival
    }

    /// Monotonic: a lower value is ignored. Returns true if the watermark moved.
    pub fn advance(&mut self, arrival: Minutes) -> bool {
        match self.last_entry_arrival {
            Some(current) if current >= arrival => false,
            _ => {
                self.last_entry_arrival = Some(arrival);
                true
            }
        }
    }

    /// True if a not-yet-seen entry could still precede `t`.
    pub fn is_behind(&self, t: Minutes) -> bool {
        match self.last_entry_arrival {
            None => true,
            Some(w) => w < t,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unset_and_behind_everything() {
        let w = Watermark::new();
        assert_eq!(w.get(), None);
        assert!(w.is_behind(i64::MIN));
    }

    #[test]
    fn never_decreases() {
        let mut w = Watermark::new();
        assert!(w.advance(100));
        assert!(!w.advance(50));
        assert_eq!(w.get(), Some(100));
        assert!(!w.advance(100));
        assert!(w.advance(101));
        assert_eq!(w.get(), Some(101));
    }

    #[test]
    fn behind_is_strict() {
        let mut w = Watermark::new();
        w.advance(100);
        assert!(!w.is_behind(100));
        assert!(!w.is_behind(99));
        assert!(w.is_behind(105));
    }
}
