//! Liveness watchdog
//!
//! One timer per rendered preview generation:
//!
//! ```text
//! Armed ──BootSignal(G), G current──▶ Acknowledged
//!   │
//!   └──deadline, G current──▶ TimedOut (sequencer advances, diagnostic rendered)
//!   └──deadline, G superseded──▶ dropped, no effect
//! ```
//!
//! Timers are spawned tasks that report their generation on a channel when
//! they fire. Whether a firing matters is decided when it is consumed, by
//! asking the sequencer, never when it was scheduled.

use crate::message::BootSignal;
use crate::sequencer::GenerationSequencer;
use crate::types::Generation;
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::Instant;

const RESOLVED_HISTORY: usize = 32;

/// Watchdog state of one generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogState {
    /// Waiting for the boot signal
    Armed,
    /// Boot signal received in time
    Acknowledged,
    /// Deadline passed, preview killed
    TimedOut,
}

/// Armed deadline for one generation
#[derive(Debug)]
pub struct WatchdogTimer {
    /// Generation being watched
    pub generation: Generation,
    /// When the timer was armed
    pub armed_at: Instant,
    /// When the timer fires
    pub deadline: Instant,
    task: AbortHandle,
}

/// Result of feeding a boot signal to the watchdog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// Timer for the current generation disarmed
    Acknowledged {
        /// Time from arming to acknowledgement
        latency: Duration,
    },
    /// Signal names a generation that is not current
    Stale,
    /// Current generation has no armed timer
    NotArmed,
}

/// Result of a timer firing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryOutcome {
    /// Generation was current and never booted
    Killed {
        /// Generation that timed out
        killed: Generation,
        /// Generation the diagnostic document must be rendered under
        replacement: Generation,
    },
    /// A newer generation exists, nothing to do
    Superseded,
    /// Timer was already acknowledged or expired
    AlreadyResolved,
}

/// Boot-deadline tracker
#[derive(Debug)]
pub struct Watchdog {
    boot_deadline: Duration,
    timers: BTreeMap<Generation, WatchdogTimer>,
    resolved: VecDeque<(Generation, WatchdogState)>,
    expiries: mpsc::UnboundedSender<Generation>,
}

impl Watchdog {
    /// Create watchdog and the channel its timers fire on
    #[must_use]
    pub fn new(boot_deadline: Duration) -> (Self, mpsc::UnboundedReceiver<Generation>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let watchdog = Self {
            boot_deadline,
            timers: BTreeMap::new(),
            resolved: VecDeque::with_capacity(RESOLVED_HISTORY),
            expiries: tx,
        };
        (watchdog, rx)
    }

    /// Configured boot deadline
    #[inline]
    #[must_use]
    pub fn boot_deadline(&self) -> Duration {
        self.boot_deadline
    }

    /// Arm a timer for a freshly rendered generation
    ///
    /// Must be called from within a tokio runtime. Returns the deadline.
    pub fn arm(&mut self, generation: Generation, now: Instant) -> Instant {
        let deadline = now + self.boot_deadline;
        let expiries = self.expiries.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = expiries.send(generation);
        })
        .abort_handle();

        let timer = WatchdogTimer {
            generation,
            armed_at: now,
            deadline,
            task,
        };
        if let Some(previous) = self.timers.insert(generation, timer) {
            previous.task.abort();
        }
        tracing::debug!("Watchdog armed for generation {} until {:?}", generation, deadline);
        deadline
    }

    /// Consume a boot signal
    pub fn acknowledge(
        &mut self,
        signal: BootSignal,
        sequencer: &GenerationSequencer,
        now: Instant,
    ) -> AckOutcome {
        if !sequencer.is_current(signal.generation) {
            return AckOutcome::Stale;
        }
        match self.timers.remove(&signal.generation) {
            Some(timer) => {
                timer.task.abort();
                self.record(signal.generation, WatchdogState::Acknowledged);
                AckOutcome::Acknowledged {
                    latency: now.saturating_duration_since(timer.armed_at),
                }
            }
            None => AckOutcome::NotArmed,
        }
    }

    /// Consume a timer firing
    ///
    /// On a kill the sequencer is advanced before returning, so any later
    /// signal for the killed generation is stale.
    pub fn expire(
        &mut self,
        generation: Generation,
        sequencer: &mut GenerationSequencer,
    ) -> ExpiryOutcome {
        if self.timers.remove(&generation).is_none() {
            return ExpiryOutcome::AlreadyResolved;
        }
        if !sequencer.is_current(generation) {
            return ExpiryOutcome::Superseded;
        }

        self.record(generation, WatchdogState::TimedOut);
        ExpiryOutcome::Killed {
            killed: generation,
            replacement: sequencer.next(),
        }
    }

    /// State of a generation's timer, if still known
    #[must_use]
    pub fn state(&self, generation: Generation) -> Option<WatchdogState> {
        if self.timers.contains_key(&generation) {
            return Some(WatchdogState::Armed);
        }
        self.resolved
            .iter()
            .rev()
            .find(|(g, _)| *g == generation)
            .map(|(_, state)| *state)
    }

    /// Timer for a generation
    #[inline]
    #[must_use]
    pub fn timer(&self, generation: Generation) -> Option<&WatchdogTimer> {
        self.timers.get(&generation)
    }

    /// Number of timers still armed, superseded ones included
    #[inline]
    #[must_use]
    pub fn armed_count(&self) -> usize {
        self.timers.len()
    }

    fn record(&mut self, generation: Generation, state: WatchdogState) {
        if self.resolved.len() == RESOLVED_HISTORY {
            self.resolved.pop_front();
        }
        self.resolved.push_back((generation, state));
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        for timer in self.timers.values() {
            timer.task.abort();
        }
    }
}
