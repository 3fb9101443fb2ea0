//! Sandbox host
//!
//! A host owns the single live execution context. Every `render` discards
//! the previous context and creates a new one with a fresh [`ContextId`],
//! so stale traffic can be told apart by identity.
//!
//! Contexts run with the capabilities in a [`SandboxPolicy`]. Scripts are
//! always allowed; same-origin access and top-level navigation never are.

use crate::error::SandboxError;
use crate::message::MessagePort;
use crate::synth::{DocumentKind, SynthesizedDocument};
use crate::types::{ContextId, Generation};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// A capability token of an isolated frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SandboxCapability {
    /// Run scripts
    AllowScripts,
    /// Submit forms
    AllowForms,
    /// Open modal dialogs
    AllowModals,
    /// Open popups
    AllowPopups,
    /// Treat the content as same-origin with the host
    AllowSameOrigin,
    /// Navigate the top-level browsing context
    AllowTopNavigation,
}

impl SandboxCapability {
    /// Attribute token
    #[inline]
    #[must_use]
    pub fn token(self) -> &'static str {
        match self {
            Self::AllowScripts => "allow-scripts",
            Self::AllowForms => "allow-forms",
            Self::AllowModals => "allow-modals",
            Self::AllowPopups => "allow-popups",
            Self::AllowSameOrigin => "allow-same-origin",
            Self::AllowTopNavigation => "allow-top-navigation",
        }
    }

    /// Whether granting this capability breaks isolation from the host
    #[inline]
    #[must_use]
    pub fn is_forbidden(self) -> bool {
        matches!(self, Self::AllowSameOrigin | Self::AllowTopNavigation)
    }
}

impl std::fmt::Display for SandboxCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.token())
    }
}

/// Capability set of the isolated context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxPolicy {
    capabilities: BTreeSet<SandboxCapability>,
}

impl SandboxPolicy {
    /// Create a policy with extra capabilities on top of script execution
    ///
    /// # Errors
    /// Returns `SandboxError::ForbiddenCapability` for same-origin or
    /// top-navigation grants
    pub fn new(
        extra: impl IntoIterator<Item = SandboxCapability>,
    ) -> Result<Self, SandboxError> {
        let mut policy = Self::default();
        policy.capabilities.extend(extra);
        policy.validate()?;
        Ok(policy)
    }

    /// Check the policy keeps the context isolated
    ///
    /// # Errors
    /// Returns `SandboxError::ForbiddenCapability` naming the first offending grant
    pub fn validate(&self) -> Result<(), SandboxError> {
        match self.capabilities.iter().find(|cap| cap.is_forbidden()) {
            Some(cap) => Err(SandboxError::ForbiddenCapability(*cap)),
            None => Ok(()),
        }
    }

    /// Whether a capability is granted
    #[inline]
    #[must_use]
    pub fn allows(&self, capability: SandboxCapability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Granted capabilities
    pub fn capabilities(&self) -> impl Iterator<Item = SandboxCapability> + '_ {
        self.capabilities.iter().copied()
    }

    /// Space-separated `sandbox` attribute value
    #[must_use]
    pub fn attribute(&self) -> String {
        self.capabilities
            .iter()
            .map(|cap| cap.token())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Default for SandboxPolicy {
    fn default() -> Self {
        Self {
            capabilities: BTreeSet::from([SandboxCapability::AllowScripts]),
        }
    }
}

/// Seam over whatever displays the preview
///
/// Implementations own the live context. The runtime only ever calls
/// `render`; it never reaches into host state.
pub trait SandboxHost: Send + 'static {
    /// Receive the port on which contexts post messages back
    ///
    /// Called once, before the first render.
    fn attach(&mut self, port: MessagePort) {
        let _ = port;
    }

    /// Replace the live context with a new one running `document`
    ///
    /// # Errors
    /// Returns `SandboxError` if no context could be created. The previous
    /// context must then be left in place.
    fn render(
        &mut self,
        document: &SynthesizedDocument,
        policy: &SandboxPolicy,
    ) -> Result<ContextId, SandboxError>;
}

/// A context created by [`MemoryHost`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFrame {
    /// Context identity
    pub context: ContextId,
    /// Document shown in the context
    pub document: SynthesizedDocument,
    /// `sandbox` attribute the context was created with
    pub sandbox: String,
}

impl RenderedFrame {
    /// Generation of the rendered document
    #[inline]
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.document.generation()
    }

    /// Kind of the rendered document
    #[inline]
    #[must_use]
    pub fn kind(&self) -> DocumentKind {
        self.document.kind()
    }
}

#[derive(Debug, Default)]
struct MemoryHostState {
    frames: Vec<RenderedFrame>,
    port: Option<MessagePort>,
    fail_next: Option<String>,
}

/// Host that records every render in memory
///
/// Clones share state, so a test can keep one clone while the runtime owns
/// another.
#[derive(Debug, Clone, Default)]
pub struct MemoryHost {
    state: Arc<Mutex<MemoryHostState>>,
}

impl MemoryHost {
    /// Create empty host
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Live frame, if any
    #[must_use]
    pub fn current(&self) -> Option<RenderedFrame> {
        self.state.lock().frames.last().cloned()
    }

    /// Every frame rendered so far, oldest first
    #[must_use]
    pub fn history(&self) -> Vec<RenderedFrame> {
        self.state.lock().frames.clone()
    }

    /// Number of renders
    #[must_use]
    pub fn render_count(&self) -> usize {
        self.state.lock().frames.len()
    }

    /// Port attached by the runtime
    #[must_use]
    pub fn port(&self) -> Option<MessagePort> {
        self.state.lock().port.clone()
    }

    /// Make the next render fail with `reason`
    pub fn fail_next(&self, reason: impl Into<String>) {
        self.state.lock().fail_next = Some(reason.into());
    }
}

impl SandboxHost for MemoryHost {
    fn attach(&mut self, port: MessagePort) {
        self.state.lock().port = Some(port);
    }

    fn render(
        &mut self,
        document: &SynthesizedDocument,
        policy: &SandboxPolicy,
    ) -> Result<ContextId, SandboxError> {
        policy.validate()?;
        let mut state = self.state.lock();
        if let Some(reason) = state.fail_next.take() {
            return Err(SandboxError::RenderFailed {
                generation: document.generation(),
                reason,
            });
        }

        let context = ContextId::new(document.generation());
        state.frames.push(RenderedFrame {
            context,
            document: document.clone(),
            sandbox: policy.attribute(),
        });
        Ok(context)
    }
}
