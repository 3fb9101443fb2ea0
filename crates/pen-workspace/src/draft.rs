//! Draft auto-save
//!
//! Fragments are persisted under three fixed keys (`createpen-html`,
//! `createpen-css`, `createpen-js`). The store is consulted once when a
//! session starts; if anything is stored the user is offered a restore.

use crate::error::DraftError;
use async_trait::async_trait;
use parking_lot::Mutex;
use pen_preview::{FragmentKind, FragmentSet};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Stored fragments found at session start
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    /// Stored markup
    pub markup: Option<String>,
    /// Stored style
    pub style: Option<String>,
    /// Stored script
    pub script: Option<String>,
}

impl Draft {
    /// Stored text for a kind
    #[must_use]
    pub fn get(&self, kind: FragmentKind) -> Option<&str> {
        match kind {
            FragmentKind::Markup => self.markup.as_deref(),
            FragmentKind::Style => self.style.as_deref(),
            FragmentKind::Script => self.script.as_deref(),
        }
    }

    /// True when no key was stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        FragmentKind::ALL.into_iter().all(|kind| self.get(kind).is_none())
    }

    /// Overlay the draft on `current`; empty stored values are skipped
    #[must_use]
    pub fn apply_to(&self, current: &FragmentSet) -> FragmentSet {
        FragmentKind::ALL
            .into_iter()
            .fold(current.clone(), |set, kind| match self.get(kind) {
                Some(text) if !text.is_empty() => set.with(kind, text),
                _ => set,
            })
    }

    fn set(&mut self, kind: FragmentKind, text: String) {
        let slot = match kind {
            FragmentKind::Markup => &mut self.markup,
            FragmentKind::Style => &mut self.style,
            FragmentKind::Script => &mut self.script,
        };
        *slot = Some(text);
    }
}

/// Key-value persistence for drafts
#[async_trait]
pub trait DraftStore: Send + Sync {
    /// Read one fragment
    async fn read(&self, kind: FragmentKind) -> Result<Option<String>, DraftError>;

    /// Write one fragment
    async fn write(&self, kind: FragmentKind, text: &str) -> Result<(), DraftError>;

    /// Remove one fragment; removing a missing key is not an error
    async fn remove(&self, kind: FragmentKind) -> Result<(), DraftError>;

    /// Read all three keys, `None` if none is stored
    async fn load(&self) -> Result<Option<Draft>, DraftError> {
        let mut draft = Draft::default();
        for kind in FragmentKind::ALL {
            if let Some(text) = self.read(kind).await? {
                draft.set(kind, text);
            }
        }
        Ok((!draft.is_empty()).then_some(draft))
    }

    /// Persist fragments
    ///
    /// Empty fragments are only written when `save_empty` is set, so an
    /// untouched editor does not overwrite a stored draft with blanks.
    async fn save(&self, fragments: &FragmentSet, save_empty: bool) -> Result<(), DraftError> {
        for kind in FragmentKind::ALL {
            let text = fragments.get(kind);
            if save_empty || !text.is_empty() {
                self.write(kind, text).await?;
            }
        }
        Ok(())
    }

    /// Remove all three keys
    async fn clear(&self) -> Result<(), DraftError> {
        for kind in FragmentKind::ALL {
            self.remove(kind).await?;
        }
        Ok(())
    }
}

/// One file per key in a directory
#[derive(Debug, Clone)]
pub struct FsDraftStore {
    dir: PathBuf,
}

impl FsDraftStore {
    /// Create store rooted at `dir`; the directory is created on first write
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store directory
    #[inline]
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, kind: FragmentKind) -> PathBuf {
        self.dir.join(kind.draft_key())
    }
}

#[async_trait]
impl DraftStore for FsDraftStore {
    async fn read(&self, kind: FragmentKind) -> Result<Option<String>, DraftError> {
        let path = self.path(kind);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(DraftError::io_error(path, err)),
        }
    }

    async fn write(&self, kind: FragmentKind, text: &str) -> Result<(), DraftError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| DraftError::io_error(&self.dir, e))?;
        let path = self.path(kind);
        tokio::fs::write(&path, text)
            .await
            .map_err(|e| DraftError::io_error(path, e))
    }

    async fn remove(&self, kind: FragmentKind) -> Result<(), DraftError> {
        let path = self.path(kind);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(DraftError::io_error(path, err)),
        }
    }
}

/// In-process draft store
///
/// Clones share entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryDraftStore {
    entries: Arc<Mutex<HashMap<FragmentKind, String>>>,
}

impl MemoryDraftStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True if nothing is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl DraftStore for MemoryDraftStore {
    async fn read(&self, kind: FragmentKind) -> Result<Option<String>, DraftError> {
        Ok(self.entries.lock().get(&kind).cloned())
    }

    async fn write(&self, kind: FragmentKind, text: &str) -> Result<(), DraftError> {
        self.entries.lock().insert(kind, text.to_string());
        Ok(())
    }

    async fn remove(&self, kind: FragmentKind) -> Result<(), DraftError> {
        self.entries.lock().remove(&kind);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_store_has_no_draft() {
        let store = MemoryDraftStore::new();
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn untouched_editor_does_not_write_blanks() {
        let store = MemoryDraftStore::new();
        store
            .save(&FragmentSet::new("<p>", "", ""), false)
            .await
            .unwrap();
        assert_eq!(store.len(), 1);

        store.save(&FragmentSet::default(), true).await.unwrap();
        assert_eq!(store.len(), 3);
        let draft = store.load().await.unwrap().unwrap();
        assert_eq!(draft.get(FragmentKind::Markup), Some(""));
    }

    #[tokio::test]
    async fn clear_removes_every_key() {
        let store = MemoryDraftStore::new();
        store
            .save(&FragmentSet::new("a", "b", "c"), true)
            .await
            .unwrap();
        store.clear().await.unwrap();
        assert!(store.is_empty());
        store.clear().await.unwrap();
    }

    #[test]
    fn apply_skips_empty_values() {
        let draft = Draft {
            markup: Some("<h1>saved</h1>".to_string()),
            style: Some(String::new()),
            script: None,
        };
        let current = FragmentSet::new("<p>live</p>", "p{}", "run()");
        assert_eq!(
            draft.apply_to(&current),
            FragmentSet::new("<h1>saved</h1>", "p{}", "run()")
        );
    }

    #[tokio::test]
    async fn fs_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDraftStore::new(dir.path().join("drafts"));

        assert_eq!(store.load().await.unwrap(), None);
        store
            .save(&FragmentSet::new("<p>", "p{}", ""), false)
            .await
            .unwrap();

        assert!(dir.path().join("drafts/createpen-html").exists());
        assert!(!dir.path().join("drafts/createpen-js").exists());

        let draft = store.load().await.unwrap().unwrap();
        assert_eq!(draft.get(FragmentKind::Style), Some("p{}"));
        assert_eq!(draft.get(FragmentKind::Script), None);

        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
    }
}
