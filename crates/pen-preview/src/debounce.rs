//! Edit debouncer
//!
//! One edit batch, three setters, one deadline. Edits to any fragment push
//! the shared deadline out by the quiet interval; when the deadline passes
//! the latest text of all three fragments is committed together.
//!
//! The debouncer is a plain state machine. The runtime owns the timer and
//! calls [`EditDebouncer::poll`] when [`EditDebouncer::deadline`] elapses.

use crate::source::SourceBuffer;
use crate::types::{FragmentKind, FragmentSet};
use std::time::Duration;
use tokio::time::Instant;

/// A batch of fragments ready to be rendered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// Fragment texts at commit time
    pub fragments: FragmentSet,
    /// Number of commits emitted before this one
    pub sequence: u64,
}

/// Coalesces edits into commits
#[derive(Debug)]
pub struct EditDebouncer {
    quiet: Duration,
    first_load_quiet: Duration,
    buffer: SourceBuffer,
    deadline: Option<Instant>,
    commits: u64,
}

impl EditDebouncer {
    /// Create a debouncer with the given quiet intervals
    #[must_use]
    pub fn new(quiet: Duration, first_load_quiet: Duration) -> Self {
        Self {
            quiet,
            first_load_quiet,
            buffer: SourceBuffer::new(),
            deadline: None,
            commits: 0,
        }
    }

    /// Record an edit and restart the quiet period
    ///
    /// Returns the new commit deadline.
    pub fn schedule(&mut self, kind: FragmentKind, text: impl Into<String>, now: Instant) -> Instant {
        self.buffer.set(kind, text, now);
        self.arm(now + self.quiet)
    }

    /// Replace all fragments at once
    ///
    /// Before the first commit the longer first-load interval applies.
    pub fn load(&mut self, fragments: FragmentSet, now: Instant) -> Instant {
        self.buffer.set_all(fragments, now);
        let quiet = if self.commits == 0 {
            self.first_load_quiet
        } else {
            self.quiet
        };
        self.arm(now + quiet)
    }

    /// Empty all fragments and schedule a commit
    pub fn clear(&mut self, now: Instant) -> Instant {
        self.buffer.set_all(FragmentSet::default(), now);
        self.arm(now + self.quiet)
    }

    /// Pending commit deadline
    #[inline]
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether edits are waiting for the quiet period to end
    #[inline]
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Emit a commit if the deadline has passed
    pub fn poll(&mut self, now: Instant) -> Option<Commit> {
        match self.deadline {
            Some(deadline) if deadline <= now => self.emit(),
            _ => None,
        }
    }

    /// Emit a commit now if edits are pending
    pub fn flush(&mut self) -> Option<Commit> {
        if self.deadline.is_some() {
            self.emit()
        } else {
            None
        }
    }

    /// Emit a commit of the current buffer regardless of pending edits
    pub fn force(&mut self) -> Commit {
        self.deadline = None;
        self.commit_now()
    }

    /// Current buffer
    #[inline]
    #[must_use]
    pub fn buffer(&self) -> &SourceBuffer {
        &self.buffer
    }

    fn arm(&mut self, deadline: Instant) -> Instant {
        self.deadline = Some(deadline);
        deadline
    }

    fn emit(&mut self) -> Option<Commit> {
        self.deadline = None;
        Some(self.commit_now())
    }

    fn commit_now(&mut self) -> Commit {
        let commit = Commit {
            fragments: self.buffer.snapshot(),
            sequence: self.commits,
        };
        self.commits += 1;
        commit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const QUIET: Duration = Duration::from_millis(600);
    const FIRST_LOAD: Duration = Duration::from_millis(1200);

    fn debouncer() -> EditDebouncer {
        EditDebouncer::new(QUIET, FIRST_LOAD)
    }

    #[test]
    fn nothing_pending_initially() {
        let mut d = debouncer();
        assert!(!d.is_pending());
        assert!(d.poll(Instant::now()).is_none());
        assert!(d.flush().is_none());
    }

    #[test]
    fn commit_after_quiet_period() {
        let mut d = debouncer();
        let t0 = Instant::now();
        let deadline = d.schedule(FragmentKind::Markup, "<b>", t0);

        assert_eq!(deadline, t0 + QUIET);
        assert!(d.poll(t0 + Duration::from_millis(599)).is_none());

        let commit = d.poll(deadline).unwrap();
        assert_eq!(commit.fragments.markup, "<b>");
        assert_eq!(commit.sequence, 0);
        assert!(!d.is_pending());
    }

    #[test]
    fn edits_reset_deadline_and_batch_all_fragments() {
        let mut d = debouncer();
        let t0 = Instant::now();
        d.schedule(FragmentKind::Markup, "<div>x</div>", t0);
        d.schedule(FragmentKind::Style, "div{color:red}", t0 + Duration::from_millis(300));
        let last = d.schedule(FragmentKind::Markup, "<div>y</div>", t0 + Duration::from_millis(500));

        assert!(d.poll(t0 + QUIET).is_none());
        let commit = d.poll(last).unwrap();
        assert_eq!(commit.fragments.markup, "<div>y</div>");
        assert_eq!(commit.fragments.style, "div{color:red}");
        assert!(d.poll(last + QUIET).is_none());
    }

    #[test]
    fn first_load_uses_longer_interval() {
        let mut d = debouncer();
        let t0 = Instant::now();
        let deadline = d.load(FragmentSet::new("<p>", "", ""), t0);
        assert_eq!(deadline, t0 + FIRST_LOAD);

        d.poll(deadline).unwrap();
        let again = d.load(FragmentSet::new("<i>", "", ""), deadline);
        assert_eq!(again, deadline + QUIET);
    }

    #[test]
    fn clear_commits_empty_fragments() {
        let mut d = debouncer();
        let t0 = Instant::now();
        d.schedule(FragmentKind::Script, "run()", t0);
        let deadline = d.clear(t0);

        let commit = d.poll(deadline).unwrap();
        assert!(commit.fragments.is_empty());
    }

    #[test]
    fn force_commits_without_pending_edits() {
        let mut d = debouncer();
        let first = d.force();
        let second = d.force();
        assert_eq!(first.sequence, 0);
        assert_eq!(second.sequence, 1);
        assert!(!d.is_pending());
    }

    proptest! {
        #[test]
        fn prop_burst_within_window_commits_once(
            gaps in prop::collection::vec(0u64..600, 1..40),
        ) {
            let mut d = debouncer();
            let start = Instant::now();
            let mut now = start;
            let mut commits = 0;
            let mut last_text = String::new();

            for (i, gap) in gaps.iter().enumerate() {
                now += Duration::from_millis(*gap);
                if d.poll(now).is_some() {
                    commits += 1;
                }
                last_text = format!("edit {i}");
                d.schedule(FragmentKind::Script, last_text.clone(), now);
            }

            prop_assert_eq!(commits, 0);
            let commit = d.poll(now + QUIET);
            prop_assert!(commit.is_some());
            prop_assert_eq!(commit.unwrap().fragments.script, last_text);
            prop_assert!(d.poll(now + QUIET * 10).is_none());
        }
    }
}
