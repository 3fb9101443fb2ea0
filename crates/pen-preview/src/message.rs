//! Sandbox message contract
//!
//! The only traffic from a sandboxed context to the host. Wire format:
//!
//! ```text
//! { "type": "BOOT_OK", "key": <generation> }
//! ```
//!
//! Payloads are decoded into [`SandboxMessage`] at the boundary; anything
//! that does not decode is dropped before it reaches the watchdog.

use crate::error::MessageError;
use crate::types::{ContextId, Generation};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Wire tag of the boot acknowledgement
pub const BOOT_OK: &str = "BOOT_OK";

/// Origin reported by a sandboxed frame without `allow-same-origin`
pub const OPAQUE_ORIGIN: &str = "null";

/// Messages a sandboxed context may post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SandboxMessage {
    /// Liveness proof
    #[serde(rename = "BOOT_OK")]
    BootOk {
        /// Generation the document was synthesized for
        key: Generation,
    },
}

/// Liveness proof for one generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootSignal {
    /// Generation that booted
    pub generation: Generation,
}

impl From<SandboxMessage> for BootSignal {
    fn from(message: SandboxMessage) -> Self {
        match message {
            SandboxMessage::BootOk { key } => Self { generation: key },
        }
    }
}

/// Which origins the host accepts messages from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OriginPolicy {
    /// Accept any origin
    #[default]
    Any,
    /// Accept only the opaque origin of a sandboxed frame
    OpaqueOnly,
}

impl OriginPolicy {
    /// Check an origin against the policy
    #[inline]
    #[must_use]
    pub fn allows(self, origin: &str) -> bool {
        match self {
            Self::Any => true,
            Self::OpaqueOnly => origin == OPAQUE_ORIGIN,
        }
    }
}

/// Raw message as delivered by a host
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Sending context, when the host can tell
    pub source: Option<ContextId>,
    /// Origin reported for the sender
    pub origin: String,
    /// Untrusted payload
    pub data: serde_json::Value,
}

impl InboundMessage {
    /// Create message from an unknown source
    #[inline]
    #[must_use]
    pub fn new(origin: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            source: None,
            origin: origin.into(),
            data,
        }
    }

    /// With sending context
    #[inline]
    #[must_use]
    pub fn from_context(mut self, source: ContextId) -> Self {
        self.source = Some(source);
        self
    }

    /// Boot message for `generation` as a sandboxed frame would post it
    #[must_use]
    pub fn boot(source: ContextId, generation: Generation) -> Self {
        Self::new(
            OPAQUE_ORIGIN,
            serde_json::json!({ "type": BOOT_OK, "key": generation }),
        )
        .from_context(source)
    }

    /// Validate origin and decode the payload
    ///
    /// # Errors
    /// - `MessageError::OriginRejected` if `policy` refuses the origin
    /// - `MessageError::Unrecognized` if the payload is not a known message
    pub fn decode(&self, policy: OriginPolicy) -> Result<SandboxMessage, MessageError> {
        if !policy.allows(&self.origin) {
            return Err(MessageError::OriginRejected(self.origin.clone()));
        }
        Ok(SandboxMessage::deserialize(&self.data)?)
    }
}

/// Sending half handed to sandbox hosts
///
/// Cloneable; hosts keep one and post every message their contexts emit.
#[derive(Debug, Clone)]
pub struct MessagePort {
    sender: mpsc::UnboundedSender<InboundMessage>,
}

impl MessagePort {
    pub(crate) fn new(sender: mpsc::UnboundedSender<InboundMessage>) -> Self {
        Self { sender }
    }

    /// Deliver a message to the runtime
    ///
    /// Returns `false` once the runtime has shut down.
    pub fn post(&self, message: InboundMessage) -> bool {
        self.sender.send(message).is_ok()
    }

    /// Whether the runtime is gone
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Create a connected port and receiver
#[must_use]
pub fn channel() -> (MessagePort, mpsc::UnboundedReceiver<InboundMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MessagePort::new(tx), rx)
}
