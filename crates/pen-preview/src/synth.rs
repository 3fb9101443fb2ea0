//! Document synthesizer
//!
//! Assembles markup, styles and the instrumented script into one
//! self-contained document tagged with its generation. Output is a pure
//! function of the inputs: same fragments and generation, same bytes.
//!
//! The bootstrap block is a sibling `<script>` placed before the user
//! script, so it runs (and posts the boot signal) even when the user script
//! hangs on its first line.

use crate::instrument::InstrumentedScript;
use crate::message::BOOT_OK;
use crate::types::Generation;
use std::sync::Arc;

/// Notice shown when the watchdog kills a preview
pub const DIAGNOSTIC_NOTICE: &str = "Preview killed (script stuck / infinite loop).";

const BASELINE_RESET: &str = "html,body{height:100%;margin:0}";

/// What a synthesized document represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    /// User fragments with bootstrap and guards
    Preview,
    /// Watchdog kill notice
    Diagnostic,
    /// Empty document rendered by Stop
    Blank,
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Preview => "preview",
            Self::Diagnostic => "diagnostic",
            Self::Blank => "blank",
        };
        f.write_str(label)
    }
}

/// Fully assembled document for one generation
///
/// Immutable; cloning shares the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedDocument {
    generation: Generation,
    kind: DocumentKind,
    html: Arc<str>,
}

impl SynthesizedDocument {
    /// Fixed notice document shown after a watchdog kill
    #[must_use]
    pub fn diagnostic(generation: Generation) -> Self {
        let html = format!(
            "<html><body style=\"margin:0;font-family:sans-serif\">\n\
             <div style=\"padding:8px;background:#fee;color:#900;border-bottom:1px solid #fbb\">\n\
             {DIAGNOSTIC_NOTICE}\n\
             </div>\n\
             </body></html>"
        );
        Self {
            generation,
            kind: DocumentKind::Diagnostic,
            html: html.into(),
        }
    }

    /// Empty document, runs nothing
    #[must_use]
    pub fn blank(generation: Generation) -> Self {
        Self {
            generation,
            kind: DocumentKind::Blank,
            html: Arc::from(""),
        }
    }

    /// Generation this document belongs to
    #[inline]
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Document kind
    #[inline]
    #[must_use]
    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    /// Document text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.html
    }

    /// Whether the document expects to post a boot signal
    #[inline]
    #[must_use]
    pub fn expects_boot(&self) -> bool {
        self.kind == DocumentKind::Preview
    }
}

/// Builds preview documents
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentSynthesizer;

impl DocumentSynthesizer {
    /// Create new synthesizer
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Assemble one executable document
    #[must_use]
    pub fn synthesize(
        &self,
        markup: &str,
        style: &str,
        script: &InstrumentedScript,
        generation: Generation,
    ) -> SynthesizedDocument {
        let bootstrap = bootstrap_script(generation);
        let mut html = String::with_capacity(
            markup.len() + style.len() + script.as_str().len() + bootstrap.len() + 256,
        );

        html.push_str("<!doctype html>\n<html>\n  <head>\n    <meta charset=\"utf-8\" />\n");
        html.push_str("    <style>\n      ");
        html.push_str(BASELINE_RESET);
        html.push_str("\n      ");
        html.push_str(style);
        html.push_str("\n    </style>\n  </head>\n  <body>\n    ");
        html.push_str(markup);
        html.push_str("\n    <script>\n");
        html.push_str(&bootstrap);
        html.push_str("    </script>\n    <script>\n");
        html.push_str(script.as_str());
        html.push_str("\n    </script>\n  </body>\n</html>");

        SynthesizedDocument {
            generation,
            kind: DocumentKind::Preview,
            html: html.into(),
        }
    }
}

/// Bootstrap block: post the boot signal, then neutralize blocking dialogs
#[must_use]
pub fn bootstrap_script(generation: Generation) -> String {
    format!(
        "      try {{ parent.postMessage({{ type: \"{BOOT_OK}\", key: {generation} }}, \"*\"); }} catch(e) {{}}\n\
         \x20     window.alert = () => {{}};\n\
         \x20     window.prompt = () => null;\n\
         \x20     window.confirm = () => false;\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::{LoopGuardInstrumenter, ScriptInstrumenter};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::time::Duration;

    fn build(markup: &str, style: &str, script: &str, generation: u64) -> SynthesizedDocument {
        let script = LoopGuardInstrumenter::new().instrument(script, Duration::from_millis(800));
        DocumentSynthesizer::new().synthesize(markup, style, &script, Generation(generation))
    }

    #[test]
    fn embeds_fragments_verbatim() {
        let doc = build("<div>x</div>", "div{color:red}", "console.log(1)", 7);
        let html = doc.as_str();

        assert!(html.contains("<div>x</div>"));
        assert!(html.contains("html,body{height:100%;margin:0}\n      div{color:red}"));
        assert!(html.contains("console.log(1)"));
        assert_eq!(doc.generation(), Generation(7));
        assert_eq!(doc.kind(), DocumentKind::Preview);
    }

    #[test]
    fn bootstrap_runs_before_user_script() {
        let doc = build("", "", "while(true){}", 3);
        let html = doc.as_str();

        let boot = html.find("parent.postMessage").unwrap();
        let user = html.find("while(true){").unwrap();
        assert!(boot < user);
        assert!(html.contains("{ type: \"BOOT_OK\", key: 3 }"));
    }

    #[test]
    fn bootstrap_is_guarded_and_disables_dialogs() {
        let bootstrap = bootstrap_script(Generation(12));
        assert!(bootstrap.trim_start().starts_with("try {"));
        assert!(bootstrap.contains("catch(e) {}"));
        assert!(bootstrap.contains("window.alert = () => {};"));
        assert!(bootstrap.contains("window.prompt = () => null;"));
        assert!(bootstrap.contains("window.confirm = () => false;"));
    }

    #[test]
    fn diagnostic_document_carries_notice() {
        let doc = SynthesizedDocument::diagnostic(Generation(9));
        assert!(doc.as_str().contains(DIAGNOSTIC_NOTICE));
        assert_eq!(doc.kind(), DocumentKind::Diagnostic);
        assert!(!doc.expects_boot());
        assert!(!doc.as_str().contains("<script"));
    }

    #[test]
    fn blank_document_is_empty() {
        let doc = SynthesizedDocument::blank(Generation(2));
        assert_eq!(doc.as_str(), "");
        assert_eq!(doc.kind(), DocumentKind::Blank);
    }

    #[test]
    fn generation_changes_only_the_key() {
        let a = build("<p>", "p{}", "1", 1);
        let b = build("<p>", "p{}", "1", 2);
        assert_eq!(
            a.as_str().replace("key: 1 }", "key: 2 }"),
            b.as_str().to_string()
        );
    }

    proptest! {
        #[test]
        fn prop_synthesis_is_idempotent(
            markup in ".{0,80}",
            style in ".{0,80}",
            script in ".{0,80}",
            generation in 0u64..10_000,
        ) {
            let first = build(&markup, &style, &script, generation);
            let second = build(&markup, &style, &script, generation);
            prop_assert_eq!(first.as_str().as_bytes(), second.as_str().as_bytes());
        }
    }
}
