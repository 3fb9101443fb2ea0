//! Instrumentation pass
//!
//! Rewrites the script fragment so every `for`, `while` and `do` body starts
//! with a cooperative time-budget check, then wraps the whole script in a
//! `try`/`catch` that reports the error on the sandbox console.
//!
//! The deadline is baked in as an offset: the injected header computes
//! `Date.now() + budget` when the script starts running inside the sandbox.
//!
//! # Known limitations
//!
//! The pass is textual, not a parser. Accepted false positives and
//! negatives:
//! - loop-like text inside strings, comments or template literals is
//!   rewritten as if it were code
//! - loop headers with a `)` inside the condition (`for (;i<f(x);)`) are
//!   not matched and stay unguarded
//! - loops without braces are not guarded
//! - recursion, promise chains and timer callbacks are not bounded

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::time::Duration;

/// Message carried by the error a guard throws
pub const TIME_LIMIT_MESSAGE: &str = "Time limit exceeded";

/// Statement injected at the top of every loop body
pub const GUARD_CALL: &str = "\n__guard();";

/// Opening brace of a `for (...)`, `while (...)` or `do` body
static LOOP_BODY_START: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:for|while)\s*\([^)]*\)\s*\{|\bdo\s*\{").expect("loop pattern is valid")
});

/// Script text after instrumentation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentedScript {
    text: String,
    guards: usize,
}

impl InstrumentedScript {
    /// Wrap text that is already safe to embed
    #[inline]
    #[must_use]
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            guards: 0,
        }
    }

    /// Instrumented text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Number of loop guards injected
    #[inline]
    #[must_use]
    pub fn guards(&self) -> usize {
        self.guards
    }
}

/// Narrow seam for script rewriting
///
/// Implementations must be total: any input produces output, nothing
/// panics.
pub trait ScriptInstrumenter: Send + Sync + std::fmt::Debug {
    /// Bound the run time of `script` to roughly `budget`
    fn instrument(&self, script: &str, budget: Duration) -> InstrumentedScript;
}

/// Regex-based loop guard injection
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopGuardInstrumenter;

impl LoopGuardInstrumenter {
    /// Create new instrumenter
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn header(budget: Duration) -> String {
        format!(
            "const __deadline = Date.now() + {};\n\
             function __guard(){{ if (Date.now() > __deadline) {{ throw new Error(\"{}\"); }} }}\n",
            budget.as_millis(),
            TIME_LIMIT_MESSAGE
        )
    }
}

impl ScriptInstrumenter for LoopGuardInstrumenter {
    fn instrument(&self, script: &str, budget: Duration) -> InstrumentedScript {
        let mut guards = 0usize;
        let guarded = LOOP_BODY_START.replace_all(script, |caps: &Captures<'_>| {
            guards += 1;
            format!("{}{}", &caps[0], GUARD_CALL)
        });

        let mut text = Self::header(budget);
        text.push_str("try {\n");
        text.push_str(&guarded);
        text.push_str("\n} catch (e) { console.error(e && e.message ? e.message : e); }");

        InstrumentedScript { text, guards }
    }
}
