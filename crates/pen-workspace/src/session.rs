//! Editor session
//!
//! An [`EditorSession`] binds one preview runtime to one draft store and,
//! optionally, a Pen service. It owns an auto-save task that writes every
//! committed fragment set to the draft store.
//!
//! Clear and Save raise a generation floor before removing the draft, so a
//! commit that was already in flight cannot write the removed draft back.

use crate::bundle::{self, Import};
use crate::draft::{Draft, DraftStore};
use crate::error::WorkspaceError;
use crate::models::{CreatePen, Pen};
use crate::service::PenService;
use pen_preview::{FragmentKind, FragmentSet, Generation, PreviewEvent, PreviewHandle};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

#[derive(Debug, Default)]
struct AutosaveState {
    /// Set by the first keystroke edit
    user_edited: AtomicBool,
    /// Commits below this generation are not saved
    floor: AtomicU64,
    /// Serializes draft writes against draft removal
    write_lock: Mutex<()>,
}

/// One editing session
pub struct EditorSession {
    preview: PreviewHandle,
    drafts: Arc<dyn DraftStore>,
    service: Option<Arc<dyn PenService>>,
    state: Arc<AutosaveState>,
    autosave: JoinHandle<()>,
}

impl EditorSession {
    /// Start a session and its auto-save task
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(preview: PreviewHandle, drafts: Arc<dyn DraftStore>) -> Self {
        let state = Arc::new(AutosaveState::default());
        let autosave = tokio::spawn(autosave(
            preview.subscribe(),
            Arc::clone(&drafts),
            Arc::clone(&state),
        ));
        Self {
            preview,
            drafts,
            service: None,
            state,
            autosave,
        }
    }

    /// With Pen service
    #[inline]
    #[must_use]
    pub fn with_service(mut self, service: Arc<dyn PenService>) -> Self {
        self.service = Some(service);
        self
    }

    /// Preview handle
    #[inline]
    #[must_use]
    pub fn preview(&self) -> &PreviewHandle {
        &self.preview
    }

    /// Whether the user has typed into any fragment
    #[inline]
    #[must_use]
    pub fn has_user_edited(&self) -> bool {
        self.state.user_edited.load(Ordering::Acquire)
    }

    /// Keystroke edit
    ///
    /// # Errors
    /// Returns `WorkspaceError::Preview` if the runtime has shut down
    pub async fn edit(&self, kind: FragmentKind, text: impl Into<String>) -> Result<(), WorkspaceError> {
        self.state.user_edited.store(true, Ordering::Release);
        self.preview.edit(kind, text).await?;
        Ok(())
    }

    /// Commit pending edits now
    ///
    /// # Errors
    /// Returns `WorkspaceError::Preview` if the runtime has shut down
    pub async fn flush(&self) -> Result<Option<Generation>, WorkspaceError> {
        Ok(self.preview.flush().await?)
    }

    /// Stop the preview
    ///
    /// # Errors
    /// Returns `WorkspaceError::Preview` if the runtime has shut down
    pub async fn stop(&self) -> Result<Generation, WorkspaceError> {
        Ok(self.preview.stop().await?)
    }

    /// Re-render the current fragments
    ///
    /// # Errors
    /// Returns `WorkspaceError::Preview` if the runtime has shut down
    pub async fn refresh(&self) -> Result<Generation, WorkspaceError> {
        Ok(self.preview.refresh().await?)
    }

    /// Empty every fragment and remove the draft
    ///
    /// # Errors
    /// Returns `WorkspaceError` if the runtime has shut down or the draft
    /// cannot be removed
    pub async fn clear(&self) -> Result<(), WorkspaceError> {
        self.preview.clear().await?;
        self.remove_draft_after_commit().await?;
        tracing::info!("Cleared editor and draft");
        Ok(())
    }

    /// Read files into the fragments
    ///
    /// Imported text is applied as edits and committed after the usual
    /// quiet interval.
    ///
    /// # Errors
    /// Returns `WorkspaceError` if a file cannot be read or the runtime has
    /// shut down
    pub async fn import<P: AsRef<Path>>(&self, paths: &[P]) -> Result<Import, WorkspaceError> {
        let imported = bundle::import(paths).await?;
        for (kind, text) in imported.edits() {
            self.preview.edit(kind, text).await?;
        }
        tracing::info!(
            "Imported {} fragment(s), skipped {} file(s)",
            imported.fragments.len(),
            imported.skipped.len()
        );
        Ok(imported)
    }

    /// Write the buffered fragments to `dir`
    ///
    /// # Errors
    /// Returns `WorkspaceError` if the runtime has shut down or a file
    /// cannot be written
    pub async fn export(&self, dir: &Path) -> Result<Vec<PathBuf>, WorkspaceError> {
        let fragments = self.preview.status().await?.fragments;
        bundle::export(&fragments, dir).await
    }

    /// Save the fragments as a new pen, then remove the draft
    ///
    /// # Errors
    /// - `WorkspaceError::ServiceUnavailable` without a service
    /// - `WorkspaceError::Service` if validation or the call fails; the
    ///   draft is kept
    pub async fn save(
        &self,
        title: impl Into<String>,
        description: Option<String>,
    ) -> Result<Pen, WorkspaceError> {
        let service = self
            .service
            .as_ref()
            .ok_or(WorkspaceError::ServiceUnavailable)?;

        self.preview.flush().await?;
        let fragments = self.preview.status().await?.fragments;
        let mut request = CreatePen::from_fragments(&fragments, title);
        request.description = description;

        let pen = service.save(request).await?;
        self.remove_draft_after_commit().await?;
        Ok(pen)
    }

    /// Stored draft, if any
    ///
    /// # Errors
    /// Returns `WorkspaceError::Draft` if the store cannot be read
    pub async fn pending_draft(&self) -> Result<Option<Draft>, WorkspaceError> {
        Ok(self.drafts.load().await?)
    }

    /// Load the stored draft into the preview
    ///
    /// Only non-empty stored fragments replace the buffer. Returns the
    /// resulting fragments, or `None` if nothing was stored.
    ///
    /// # Errors
    /// Returns `WorkspaceError` if the store cannot be read or the runtime
    /// has shut down
    pub async fn restore_draft(&self) -> Result<Option<FragmentSet>, WorkspaceError> {
        let Some(draft) = self.drafts.load().await? else {
            return Ok(None);
        };
        let current = self.preview.status().await?.fragments;
        let restored = draft.apply_to(&current);
        self.preview.load(restored.clone()).await?;
        tracing::info!("Restored draft");
        Ok(Some(restored))
    }

    /// Delete the stored draft without loading it
    ///
    /// # Errors
    /// Returns `WorkspaceError::Draft` if the store cannot be written
    pub async fn discard_draft(&self) -> Result<(), WorkspaceError> {
        let _guard = self.state.write_lock.lock().await;
        self.drafts.clear().await?;
        Ok(())
    }

    /// Stop auto-save and shut the preview down
    ///
    /// # Errors
    /// Returns `WorkspaceError::Preview` if the runtime is already gone
    pub async fn shutdown(self) -> Result<(), WorkspaceError> {
        self.autosave.abort();
        self.preview.shutdown().await?;
        Ok(())
    }

    async fn remove_draft_after_commit(&self) -> Result<(), WorkspaceError> {
        self.preview.flush().await?;
        let current = self.preview.status().await?.current;

        let _guard = self.state.write_lock.lock().await;
        self.state
            .floor
            .fetch_max(current.value() + 1, Ordering::AcqRel);
        self.drafts.clear().await?;
        Ok(())
    }
}

impl std::fmt::Debug for EditorSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditorSession")
            .field("has_service", &self.service.is_some())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Drop for EditorSession {
    fn drop(&mut self) {
        self.autosave.abort();
    }
}

async fn autosave(
    mut events: broadcast::Receiver<PreviewEvent>,
    drafts: Arc<dyn DraftStore>,
    state: Arc<AutosaveState>,
) {
    loop {
        match events.recv().await {
            Ok(PreviewEvent::Committed {
                generation,
                fragments,
            }) => {
                let _guard = state.write_lock.lock().await;
                if generation.value() < state.floor.load(Ordering::Acquire) {
                    continue;
                }
                let save_empty = state.user_edited.load(Ordering::Acquire);
                if let Err(e) = drafts.save(&fragments, save_empty).await {
                    tracing::warn!("Draft auto-save failed for generation {}: {}", generation, e);
                }
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Auto-save lagged, skipped {} events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    tracing::debug!("Auto-save stopped");
}
