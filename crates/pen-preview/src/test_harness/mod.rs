//! Test harness
//!
//! A simulated sandbox that behaves like a browser frame as far as the
//! runtime can observe, plus canned end-to-end scenarios.

pub mod simulator;

pub use simulator::{run_scenario, Scenario, ScenarioReport, Violation};

use crate::error::SandboxError;
use crate::message::{InboundMessage, MessagePort};
use crate::sandbox::{MemoryHost, RenderedFrame, SandboxHost, SandboxPolicy};
use crate::synth::SynthesizedDocument;
use crate::types::{ContextId, Generation};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

static BOOT_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"type: "BOOT_OK", key: (\d+)"#).expect("boot key pattern is valid")
});

/// How a simulated frame reacts to its document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameBehavior {
    /// Bootstrap runs and posts after a delay
    Boots {
        /// Delay between render and boot message
        after: Duration,
    },
    /// Frame hangs before the bootstrap runs
    NeverBoots,
}

type BehaviorFn = dyn Fn(&SynthesizedDocument) -> FrameBehavior + Send + Sync;

/// Sandbox host emulating a browser frame
///
/// On render it executes the bootstrap block as far as it is observable:
/// the boot key is read from the document text and posted back on the
/// attached port as a sandboxed frame would, origin `"null"`.
#[derive(Clone)]
pub struct SimulatedSandbox {
    frames: MemoryHost,
    behavior: Arc<BehaviorFn>,
}

impl SimulatedSandbox {
    /// Frames that boot after `after`
    #[must_use]
    pub fn booting(after: Duration) -> Self {
        Self::with_behavior(move |_| FrameBehavior::Boots { after })
    }

    /// Frames that never boot
    #[must_use]
    pub fn hanging() -> Self {
        Self::with_behavior(|_| FrameBehavior::NeverBoots)
    }

    /// Decide behavior per document
    #[must_use]
    pub fn with_behavior(
        behavior: impl Fn(&SynthesizedDocument) -> FrameBehavior + Send + Sync + 'static,
    ) -> Self {
        Self {
            frames: MemoryHost::new(),
            behavior: Arc::new(behavior),
        }
    }

    /// Live frame
    #[must_use]
    pub fn current(&self) -> Option<RenderedFrame> {
        self.frames.current()
    }

    /// All frames rendered so far
    #[must_use]
    pub fn history(&self) -> Vec<RenderedFrame> {
        self.frames.history()
    }

    fn schedule_boot(port: MessagePort, context: ContextId, key: Generation, after: Duration) {
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            port.post(InboundMessage::boot(context, key));
        });
    }
}

impl fmt::Debug for SimulatedSandbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedSandbox")
            .field("frames", &self.frames.render_count())
            .finish_non_exhaustive()
    }
}

impl SandboxHost for SimulatedSandbox {
    fn attach(&mut self, port: MessagePort) {
        self.frames.attach(port);
    }

    fn render(
        &mut self,
        document: &SynthesizedDocument,
        policy: &SandboxPolicy,
    ) -> Result<ContextId, SandboxError> {
        let port = self.frames.port().ok_or(SandboxError::Detached)?;
        let context = self.frames.render(document, policy)?;

        let key = boot_key(document.as_str());
        match (key, (self.behavior)(document)) {
            (Some(key), FrameBehavior::Boots { after }) => {
                Self::schedule_boot(port, context, key, after);
            }
            (None, FrameBehavior::Boots { .. }) | (_, FrameBehavior::NeverBoots) => {}
        }
        Ok(context)
    }
}

/// Boot key embedded in a document's bootstrap block
#[must_use]
pub fn boot_key(html: &str) -> Option<Generation> {
    BOOT_KEY
        .captures(html)
        .and_then(|caps| caps[1].parse().ok())
        .map(Generation)
}
