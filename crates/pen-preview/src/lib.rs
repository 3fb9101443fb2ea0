//! Pen Preview - live code-preview sandbox
//!
//! Renders untrusted HTML/CSS/JavaScript in an isolated context and keeps
//! the host responsive when the script misbehaves:
//! - Edits are coalesced into commits by a shared quiet interval
//! - Loops in the script are guarded by a wall-clock budget
//! - Every render is tagged with a monotonic generation
//! - A watchdog replaces previews that never prove they booted
//!
//! # Example
//!
//! ```rust,ignore
//! use pen_preview::prelude::*;
//!
//! let host = MemoryHost::new();
//! let preview = PreviewRuntime::spawn(PreviewConfig::default(), host.clone())?;
//!
//! preview.edit(FragmentKind::Markup, "<div>x</div>").await?;
//! preview.edit(FragmentKind::Script, "while(true){}").await?;
//! let generation = preview.flush().await?;
//! ```

// Core modules
pub mod debounce;
pub mod error;
pub mod instrument;
pub mod message;
pub mod runtime;
pub mod sandbox;
pub mod sequencer;
pub mod source;
pub mod synth;
pub mod types;
pub mod watchdog;

// Test harness
pub mod test_harness;

// Re-exports
pub use error::{ConfigError, MessageError, PreviewError, SandboxError};
pub use runtime::{IgnoreReason, PreviewEvent, PreviewHandle, PreviewRuntime, PreviewStatus};
pub use types::{ContextId, FragmentKind, FragmentSet, Generation, PreviewConfig};

/// Common imports
pub mod prelude {
    pub use crate::debounce::{Commit, EditDebouncer};
    pub use crate::instrument::{InstrumentedScript, LoopGuardInstrumenter, ScriptInstrumenter};
    pub use crate::message::{BootSignal, InboundMessage, MessagePort, OriginPolicy};
    pub use crate::runtime::{PreviewEvent, PreviewHandle, PreviewRuntime, PreviewStatus};
    pub use crate::sandbox::{MemoryHost, SandboxCapability, SandboxHost, SandboxPolicy};
    pub use crate::sequencer::GenerationSequencer;
    pub use crate::synth::{DocumentKind, DocumentSynthesizer, SynthesizedDocument};
    pub use crate::types::{FragmentKind, FragmentSet, Generation, PreviewConfig};
    pub use crate::watchdog::Watchdog;
    pub use crate::{PreviewError, SandboxError};
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
