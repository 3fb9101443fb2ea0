//! Source buffer
//!
//! Holds the latest text of each fragment together with the time it was
//! last edited. Snapshots taken from the buffer are immutable.

use crate::types::{FragmentKind, FragmentSet};
use tokio::time::Instant;

/// One fragment with its edit timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Fragment kind
    pub kind: FragmentKind,
    /// Raw text, attacker-controlled
    pub text: String,
    /// Last edit, `None` if never edited
    pub edited_at: Option<Instant>,
}

impl Fragment {
    fn empty(kind: FragmentKind) -> Self {
        Self {
            kind,
            text: String::new(),
            edited_at: None,
        }
    }
}

/// The three fragments being edited
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceBuffer {
    markup: Fragment,
    style: Fragment,
    script: Fragment,
}

impl SourceBuffer {
    /// Create an empty buffer
    #[must_use]
    pub fn new() -> Self {
        Self {
            markup: Fragment::empty(FragmentKind::Markup),
            style: Fragment::empty(FragmentKind::Style),
            script: Fragment::empty(FragmentKind::Script),
        }
    }

    /// Replace a fragment's text
    pub fn set(&mut self, kind: FragmentKind, text: impl Into<String>, at: Instant) {
        let fragment = self.slot_mut(kind);
        fragment.text = text.into();
        fragment.edited_at = Some(at);
    }

    /// Replace all three fragments
    pub fn set_all(&mut self, fragments: FragmentSet, at: Instant) {
        let FragmentSet {
            markup,
            style,
            script,
        } = fragments;
        self.set(FragmentKind::Markup, markup, at);
        self.set(FragmentKind::Style, style, at);
        self.set(FragmentKind::Script, script, at);
    }

    /// Get a fragment
    #[inline]
    #[must_use]
    pub fn get(&self, kind: FragmentKind) -> &Fragment {
        match kind {
            FragmentKind::Markup => &self.markup,
            FragmentKind::Style => &self.style,
            FragmentKind::Script => &self.script,
        }
    }

    /// Most recent edit across all fragments
    #[must_use]
    pub fn last_edit(&self) -> Option<Instant> {
        FragmentKind::ALL
            .into_iter()
            .filter_map(|kind| self.get(kind).edited_at)
            .max()
    }

    /// Capture the current texts
    #[must_use]
    pub fn snapshot(&self) -> FragmentSet {
        FragmentSet::new(
            self.markup.text.clone(),
            self.style.text.clone(),
            self.script.text.clone(),
        )
    }

    fn slot_mut(&mut self, kind: FragmentKind) -> &mut Fragment {
        match kind {
            FragmentKind::Markup => &mut self.markup,
            FragmentKind::Style => &mut self.style,
            FragmentKind::Script => &mut self.script,
        }
    }
}

impl Default for SourceBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn set_records_timestamp() {
        let mut buffer = SourceBuffer::new();
        let t0 = Instant::now();
        buffer.set(FragmentKind::Script, "let a = 1;", t0);

        let script = buffer.get(FragmentKind::Script);
        assert_eq!(script.text, "let a = 1;");
        assert_eq!(script.edited_at, Some(t0));
        assert_eq!(buffer.get(FragmentKind::Markup).edited_at, None);
    }

    #[test]
    fn last_edit_is_latest_across_fragments() {
        let mut buffer = SourceBuffer::new();
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_millis(5);
        buffer.set(FragmentKind::Style, "p{}", t1);
        buffer.set(FragmentKind::Markup, "<p>", t0);

        assert_eq!(buffer.last_edit(), Some(t1));
    }

    #[test]
    fn snapshot_is_detached_from_buffer() {
        let mut buffer = SourceBuffer::new();
        let t0 = Instant::now();
        buffer.set(FragmentKind::Markup, "<div>x</div>", t0);
        let snapshot = buffer.snapshot();
        buffer.set(FragmentKind::Markup, "<div>y</div>", t0);

        assert_eq!(snapshot.markup, "<div>x</div>");
        assert_eq!(buffer.snapshot().markup, "<div>y</div>");
    }
}
