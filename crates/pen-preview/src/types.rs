//! Core types for the preview sandbox
//!
//! Defines the fundamental types shared by every stage:
//! - Generation identifiers and sandbox context identities
//! - Fragment kinds and fragment snapshots
//! - Preview configuration

use crate::error::ConfigError;
use crate::message::OriginPolicy;
use crate::sandbox::SandboxPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

/// Identifier of one synthesize-and-render cycle
///
/// Strictly increasing, never reused. Only the sequencer hands out new values.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Generation(pub u64);

impl Generation {
    /// The generation before any render happened
    pub const ZERO: Self = Self(0);

    /// Get numeric value
    #[inline]
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }

    /// The generation immediately after this one
    #[inline]
    #[must_use]
    pub(crate) fn successor(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of one rendered sandbox context
///
/// Two renders never share an identity, even for the same generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextId {
    /// Generation rendered into the context
    pub generation: Generation,
    /// Per-render nonce
    pub nonce: Uuid,
}

impl ContextId {
    /// Create a fresh identity for a context rendering `generation`
    #[inline]
    #[must_use]
    pub fn new(generation: Generation) -> Self {
        Self {
            generation,
            nonce: Uuid::new_v4(),
        }
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.generation, self.nonce)
    }
}

/// One of the three user-authored sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FragmentKind {
    /// HTML body markup
    Markup,
    /// CSS styles
    Style,
    /// JavaScript
    Script,
}

impl FragmentKind {
    /// All kinds, in document order
    pub const ALL: [FragmentKind; 3] = [Self::Markup, Self::Style, Self::Script];

    /// File extension without the dot
    #[inline]
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Markup => "html",
            Self::Style => "css",
            Self::Script => "js",
        }
    }

    /// File name used when exporting
    #[inline]
    #[must_use]
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Markup => "index.html",
            Self::Style => "style.css",
            Self::Script => "script.js",
        }
    }

    /// Key under which drafts of this fragment are stored
    #[inline]
    #[must_use]
    pub fn draft_key(self) -> &'static str {
        match self {
            Self::Markup => "createpen-html",
            Self::Style => "createpen-css",
            Self::Script => "createpen-js",
        }
    }

    /// Resolve a kind from a file extension (case-insensitive, dot optional)
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.');
        Self::ALL
            .into_iter()
            .find(|kind| kind.extension().eq_ignore_ascii_case(ext))
    }

    /// Resolve a kind from a path's extension
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

impl std::fmt::Display for FragmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Markup => "HTML",
            Self::Style => "CSS",
            Self::Script => "JS",
        };
        f.write_str(label)
    }
}

/// Snapshot of the three fragment texts
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FragmentSet {
    /// Markup fragment
    pub markup: String,
    /// Style fragment
    pub style: String,
    /// Script fragment
    pub script: String,
}

impl FragmentSet {
    /// Create new fragment set
    #[inline]
    #[must_use]
    pub fn new(
        markup: impl Into<String>,
        style: impl Into<String>,
        script: impl Into<String>,
    ) -> Self {
        Self {
            markup: markup.into(),
            style: style.into(),
            script: script.into(),
        }
    }

    /// Get text for a kind
    #[inline]
    #[must_use]
    pub fn get(&self, kind: FragmentKind) -> &str {
        match kind {
            FragmentKind::Markup => &self.markup,
            FragmentKind::Style => &self.style,
            FragmentKind::Script => &self.script,
        }
    }

    /// Replace text for a kind
    #[inline]
    pub fn set(&mut self, kind: FragmentKind, text: impl Into<String>) {
        let slot = match kind {
            FragmentKind::Markup => &mut self.markup,
            FragmentKind::Style => &mut self.style,
            FragmentKind::Script => &mut self.script,
        };
        *slot = text.into();
    }

    /// With text for a kind
    #[inline]
    #[must_use]
    pub fn with(mut self, kind: FragmentKind, text: impl Into<String>) -> Self {
        self.set(kind, text);
        self
    }

    /// True when all three fragments are empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.markup.is_empty() && self.style.is_empty() && self.script.is_empty()
    }
}

/// Preview configuration
///
/// Durations are stored in milliseconds so the struct maps directly onto a
/// TOML table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Quiet interval before edits are committed
    pub debounce_ms: u64,
    /// Quiet interval used for the first load of a session
    pub first_load_debounce_ms: u64,
    /// Wall-clock budget baked into loop guards
    pub loop_budget_ms: u64,
    /// Time a rendered document has to post its boot signal
    pub boot_deadline_ms: u64,
    /// Which message origins are accepted
    pub origin_policy: OriginPolicy,
    /// Capabilities granted to the sandboxed context
    pub sandbox: SandboxPolicy,
    /// Capacity of the command inbox
    pub command_capacity: usize,
    /// Capacity of the event broadcast channel
    pub event_capacity: usize,
}

impl PreviewConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With debounce quiet interval
    #[inline]
    #[must_use]
    pub fn with_debounce(mut self, quiet: Duration) -> Self {
        self.debounce_ms = duration_ms(quiet);
        self
    }

    /// With first-load quiet interval
    #[inline]
    #[must_use]
    pub fn with_first_load_debounce(mut self, quiet: Duration) -> Self {
        self.first_load_debounce_ms = duration_ms(quiet);
        self
    }

    /// With loop guard budget
    #[inline]
    #[must_use]
    pub fn with_loop_budget(mut self, budget: Duration) -> Self {
        self.loop_budget_ms = duration_ms(budget);
        self
    }

    /// With boot deadline
    #[inline]
    #[must_use]
    pub fn with_boot_deadline(mut self, deadline: Duration) -> Self {
        self.boot_deadline_ms = duration_ms(deadline);
        self
    }

    /// With origin policy
    #[inline]
    #[must_use]
    pub fn with_origin_policy(mut self, policy: OriginPolicy) -> Self {
        self.origin_policy = policy;
        self
    }

    /// Debounce quiet interval
    #[inline]
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// First-load quiet interval
    #[inline]
    #[must_use]
    pub fn first_load_debounce(&self) -> Duration {
        Duration::from_millis(self.first_load_debounce_ms)
    }

    /// Loop guard budget
    #[inline]
    #[must_use]
    pub fn loop_budget(&self) -> Duration {
        Duration::from_millis(self.loop_budget_ms)
    }

    /// Boot deadline
    #[inline]
    #[must_use]
    pub fn boot_deadline(&self) -> Duration {
        Duration::from_millis(self.boot_deadline_ms)
    }

    /// Validate configuration
    ///
    /// # Errors
    /// - `ConfigError::ZeroValue` if a duration or capacity is zero
    /// - `ConfigError::Sandbox` if the sandbox policy grants a forbidden capability
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("debounce_ms", self.debounce_ms),
            ("first_load_debounce_ms", self.first_load_debounce_ms),
            ("loop_budget_ms", self.loop_budget_ms),
            ("boot_deadline_ms", self.boot_deadline_ms),
            ("command_capacity", self.command_capacity as u64),
            ("event_capacity", self.event_capacity as u64),
        ];
        if let Some(&(field, _)) = checks.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::ZeroValue(field));
        }

        self.sandbox.validate()?;

        if self.boot_deadline_ms < self.loop_budget_ms {
            tracing::warn!(
                "Boot deadline ({}ms) is shorter than the loop budget ({}ms)",
                self.boot_deadline_ms,
                self.loop_budget_ms
            );
        }

        Ok(())
    }

    /// Parse and validate configuration from TOML
    ///
    /// # Errors
    /// Returns `ConfigError` on malformed TOML or invalid values
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 600,
            first_load_debounce_ms: 1200,
            loop_budget_ms: 800,
            boot_deadline_ms: 1500,
            origin_policy: OriginPolicy::default(),
            sandbox: SandboxPolicy::default(),
            command_capacity: 100,
            event_capacity: 64,
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
