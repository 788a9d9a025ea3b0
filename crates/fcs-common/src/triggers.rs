//! Edge detection for level signals sampled once per poll tick.

use serde::{Deserialize, Serialize};

/// Rising edge trigger.
///
/// Detects a FALSE to TRUE transition on the sampled signal. The output is
/// TRUE for exactly one sample when the rising edge occurs, making it a
/// one-shot pulse rather than a level.
///
/// # Example
///
/// ```
/// use fcs_common::triggers::RTrig;
///
/// let mut trig = RTrig::new();
/// assert!(!trig.sample(false));
/// assert!(trig.sample(true)); // rising edge
/// assert!(!trig.sample(true)); // stays high, no edge
/// assert!(!trig.sample(false));
/// assert!(trig.sample(true)); // rises again
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RTrig {
    prev: bool,
}

impl RTrig {
    /// Create a new trigger with no edge pending.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sample the signal once; returns true on a rising edge.
    pub fn sample(&mut self, signal: bool) -> bool {
        let q = signal && !self.prev;
        self.prev = signal;
        q
    }

    /// Reset the trigger so the next TRUE sample counts as an edge.
    pub fn reset(&mut self) {
        self.prev = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rising_edge_is_one_shot() {
        let mut trig = RTrig::new();
        assert!(!trig.sample(false));
        assert!(trig.sample(true));
        assert!(!trig.sample(true));
        assert!(!trig.sample(true));
        assert!(!trig.sample(false));
        assert!(trig.sample(true));
    }

    #[test]
    fn test_pulse_train() {
        let mut trig = RTrig::new();
        let inputs = [false, true, false, true, true, false, true];
        let expected = [false, true, false, true, false, false, true];
        for (i, (&input, &exp)) in inputs.iter().zip(expected.iter()).enumerate() {
            assert_eq!(trig.sample(input), exp, "mismatch at sample {i}");
        }
    }

    #[test]
    fn test_reset() {
        let mut trig = RTrig::new();
        trig.sample(true);
        trig.reset();
        assert!(trig.sample(true));
    }
}
