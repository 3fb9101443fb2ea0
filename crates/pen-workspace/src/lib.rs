//! Pen Workspace - editor session around the preview sandbox
//!
//! Adds what an editor needs on top of `pen-preview`:
//! - Draft auto-save and restore
//! - Import and export of fragment files
//! - A client for the Pen service
//!
//! # Example
//!
//! ```rust,ignore
//! use pen_workspace::prelude::*;
//!
//! let preview = PreviewRuntime::spawn(settings.preview.clone(), host)?;
//! let drafts = Arc::new(FsDraftStore::new(&settings.workspace.draft_dir));
//! let session = EditorSession::new(preview, drafts);
//!
//! if session.pending_draft().await?.is_some() {
//!     session.restore_draft().await?;
//! }
//! session.edit(FragmentKind::Markup, "<h1>hi</h1>").await?;
//! ```

pub mod bundle;
pub mod config;
pub mod draft;
pub mod error;
pub mod models;
pub mod service;
pub mod session;

pub use config::{Settings, WorkspaceConfig};
pub use error::{DraftError, ServiceError, ValidationError, WorkspaceError};
pub use session::EditorSession;

/// Common imports
pub mod prelude {
    pub use crate::bundle::{export, import, Import};
    pub use crate::config::{Settings, WorkspaceConfig};
    pub use crate::draft::{Draft, DraftStore, FsDraftStore, MemoryDraftStore};
    pub use crate::models::{ApiResponse, CreatePen, Pen, UpdatePen};
    pub use crate::service::{HttpPenService, MemoryPenService, PenService};
    pub use crate::session::EditorSession;
    pub use crate::WorkspaceError;
    pub use pen_preview::prelude::*;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
