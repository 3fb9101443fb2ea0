//! Generation sequencer
//!
//! Sole owner of the "current generation" value. Every liveness decision
//! compares against [`GenerationSequencer::current`] at the moment it is
//! made; nothing caches a "was current when scheduled" flag.

use crate::types::Generation;

/// Monotonic generation counter
#[derive(Debug, Default)]
pub struct GenerationSequencer {
    current: Generation,
}

impl GenerationSequencer {
    /// Create a sequencer at [`Generation::ZERO`]
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance and return the new current generation
    #[inline]
    pub fn next(&mut self) -> Generation {
        self.current = self.current.successor();
        self.current
    }

    /// The current generation
    #[inline]
    #[must_use]
    pub fn current(&self) -> Generation {
        self.current
    }

    /// Whether `generation` is still the current one
    #[inline]
    #[must_use]
    pub fn is_current(&self, generation: Generation) -> bool {
        self.current == generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn starts_at_zero() {
        let seq = GenerationSequencer::new();
        assert_eq!(seq.current(), Generation::ZERO);
        assert!(seq.is_current(Generation::ZERO));
    }

    #[test]
    fn next_supersedes_previous() {
        let mut seq = GenerationSequencer::new();
        let g1 = seq.next();
        let g2 = seq.next();

        assert!(g2 > g1);
        assert!(seq.is_current(g2));
        assert!(!seq.is_current(g1));
    }

    proptest! {
        #[test]
        fn prop_generations_strictly_increase(steps in 1usize..200) {
            let mut seq = GenerationSequencer::new();
            let mut last = seq.current();
            for _ in 0..steps {
                let next = seq.next();
                prop_assert!(next > last);
                prop_assert!(seq.is_current(next));
                prop_assert!(!seq.is_current(last));
                last = next;
            }
        }
    }
}
