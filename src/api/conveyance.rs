//! Debounced vertical-conveyance state machine

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConveyanceState {
    NotInConveyance,
    /// Consecutive positive detections so far
    PendingConfirmation(u32),
    Confirmed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConveyanceTransition {
    Unchanged,
    Entered,
    Exited,
}

#[derive(Debug, Clone)]
pub struct ConveyanceTracker {
    state: ConveyanceState,
    debounce: u32,
}

impl ConveyanceTracker {
    pub fn new(debounce: u32) -> Self {
        Self {
            state: ConveyanceState::NotInConveyance,
            debounce: debounce.max(1),
        }
    }

    pub fn state(&self) -> ConveyanceState {
        self.state
    }

    pub fn is_confirmed(&self) -> bool {
        self.state == ConveyanceState::Confirmed
    }

    /// Feed one raw detection. A single negative leaves `Confirmed`.
    pub fn observe(&mut self, detected: bool) -> ConveyanceTransition {
        use ConveyanceState::*;

        let (next, transition) = match (self.state, detected) {
            (Confirmed, true) => (Confirmed, ConveyanceTransition::Unchanged),
            (Confirmed, false) => (NotInConveyance, ConveyanceTransition::Exited),
            (_, false) => (NotInConveyance, ConveyanceTransition::Unchanged),
            (NotInConveyance, true) => self.advance(0),
            (PendingConfirmation(count), true) => self.advance(count),
        };
        self.state = next;
        transition
    }

    fn advance(&self, count: u32) -> (ConveyanceState, ConveyanceTransition) {
        let count = count + 1;
        if count >= self.debounce {
            (ConveyanceState::Confirmed, ConveyanceTransition::Entered)
        } else {
            (ConveyanceState::PendingConfirmation(count), ConveyanceTransition::Unchanged)
        }
    }

    pub fn reset(&mut self) {
        self.state = ConveyanceState::NotInConveyance;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fewer_than_debounce_never_confirms() {
        let mut tracker = ConveyanceTracker::new(4);
        for _ in 0..3 {
            assert_eq!(tracker.observe(true), ConveyanceTransition::Unchanged);
        }
        assert_eq!(tracker.state(), ConveyanceState::PendingConfirmation(3));
        assert_eq!(tracker.observe(false), ConveyanceTransition::Unchanged);
        assert_eq!(tracker.state(), ConveyanceState::NotInConveyance);

        for _ in 0..3 {
            tracker.observe(true);
        }
        assert!(!tracker.is_confirmed());
    }

    #[test]
    fn test_exactly_debounce_confirms() {
        let mut tracker = ConveyanceTracker::new(4);
        for _ in 0..3 {
            tracker.observe(true);
        }
        assert_eq!(tracker.observe(true), ConveyanceTransition::Entered);
        assert!(tracker.is_confirmed());
        assert_eq!(tracker.observe(true), ConveyanceTransition::Unchanged);
    }

    #[test]
    fn test_single_negative_exits() {
        let mut tracker = ConveyanceTracker::new(2);
        tracker.observe(true);
        tracker.observe(true);
        assert_eq!(tracker.observe(false), ConveyanceTransition::Exited);
        assert_eq!(tracker.state(), ConveyanceState::NotInConveyance);
    }

    #[test]
    fn test_debounce_of_one() {
        let mut tracker = ConveyanceTracker::new(0);
        assert_eq!(tracker.observe(true), ConveyanceTransition::Entered);
    }
}
