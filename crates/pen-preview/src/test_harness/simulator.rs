//! Preview scenario simulator
//!
//! Drives a real [`PreviewRuntime`] against a [`SimulatedSandbox`] and
//! checks the liveness invariants end to end:
//! - a frame that boots in time is never killed
//! - a frame that never boots is killed no earlier than the deadline
//! - a stopped generation's timer fires as a no-op
//! - an edit burst yields one generation
//! - boot signals from replaced frames are ignored
//!
//! Scenarios use tokio time, so under a paused clock they complete
//! instantly and deterministically.

use super::{FrameBehavior, SimulatedSandbox};
use crate::error::PreviewError;
use crate::message::InboundMessage;
use crate::runtime::{IgnoreReason, PreviewEvent, PreviewHandle, PreviewRuntime};
use crate::synth::DocumentKind;
use crate::types::{FragmentKind, FragmentSet, Generation, PreviewConfig};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

const BOOT_DELAY: Duration = Duration::from_millis(5);
const SLACK: Duration = Duration::from_millis(100);

/// Canned end-to-end scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Infinite loop after the bootstrap; frame still boots
    BootBeforeLoop,
    /// Frame never boots and is replaced by the diagnostic
    HungFrame,
    /// Stop issued while the watchdog is armed
    StopWhileArmed,
    /// Rapid edits inside the quiet interval
    EditBurst,
    /// Boot signal from a replaced frame arrives late
    StaleBootSignal,
}

impl Scenario {
    /// Every scenario
    pub const ALL: [Scenario; 5] = [
        Self::BootBeforeLoop,
        Self::HungFrame,
        Self::StopWhileArmed,
        Self::EditBurst,
        Self::StaleBootSignal,
    ];

    /// Kebab-case name
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::BootBeforeLoop => "boot-before-loop",
            Self::HungFrame => "hung-frame",
            Self::StopWhileArmed => "stop-while-armed",
            Self::EditBurst => "edit-burst",
            Self::StaleBootSignal => "stale-boot-signal",
        }
    }

    /// Look up a scenario by name
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|scenario| scenario.name() == name)
    }
}

impl std::fmt::Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A failed expectation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// What was expected
    pub check: &'static str,
    /// What happened instead
    pub detail: String,
}

/// Outcome of one scenario
#[derive(Debug, Clone)]
pub struct ScenarioReport {
    /// Scenario that ran
    pub scenario: Scenario,
    /// Current generation at the end
    pub final_generation: Generation,
    /// Kind of the live document at the end
    pub final_document: Option<DocumentKind>,
    /// Events observed, in order
    pub events: Vec<PreviewEvent>,
    /// Failed expectations
    pub violations: Vec<Violation>,
    /// Simulated time taken
    pub elapsed: Duration,
}

impl ScenarioReport {
    /// Check if every expectation held
    #[must_use]
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    /// Generate text report
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut report = String::new();

        report.push_str(&format!("=== Scenario: {} ===\n", self.scenario));
        report.push_str(&format!("Final Generation: {}\n", self.final_generation));
        report.push_str(&format!(
            "Final Document: {}\n",
            self.final_document
                .map_or_else(|| "none".to_string(), |kind| kind.to_string())
        ));
        report.push_str(&format!("Events: {}\n", self.events.len()));
        report.push_str(&format!("Elapsed: {:?}\n", self.elapsed));

        if !self.violations.is_empty() {
            report.push_str("\n--- Violations ---\n");
            for (i, v) in self.violations.iter().enumerate() {
                report.push_str(&format!("{}. {}: {}\n", i + 1, v.check, v.detail));
            }
        }

        report.push_str(&format!(
            "Result: {}\n",
            if self.passed() { "PASS" } else { "FAIL" }
        ));
        report
    }
}

struct Run {
    host: SimulatedSandbox,
    handle: PreviewHandle,
    events: broadcast::Receiver<PreviewEvent>,
    started: Instant,
    observed: Vec<PreviewEvent>,
    violations: Vec<Violation>,
}

impl Run {
    fn start(config: &PreviewConfig, host: SimulatedSandbox) -> Result<Self, PreviewError> {
        let handle = PreviewRuntime::spawn(config.clone(), host.clone())?;
        let events = handle.subscribe();
        Ok(Self {
            host,
            handle,
            events,
            started: Instant::now(),
            observed: Vec::new(),
            violations: Vec::new(),
        })
    }

    fn expect(&mut self, check: &'static str, holds: bool, detail: impl FnOnce() -> String) {
        if !holds {
            self.violations.push(Violation {
                check,
                detail: detail(),
            });
        }
    }

    fn count(&self, predicate: impl Fn(&PreviewEvent) -> bool) -> usize {
        self.observed.iter().filter(|event| predicate(*event)).count()
    }

    fn drain(&mut self) {
        loop {
            match self.events.try_recv() {
                Ok(event) => self.observed.push(event),
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    tracing::warn!("Scenario missed {} events", missed);
                }
                Err(_) => break,
            }
        }
    }

    /// Wait until an event matches, collecting everything seen
    async fn wait_for(
        &mut self,
        limit: Duration,
        predicate: impl Fn(&PreviewEvent) -> bool,
    ) -> Option<(PreviewEvent, Instant)> {
        let deadline = Instant::now() + limit;
        loop {
            match tokio::time::timeout_at(deadline, self.events.recv()).await {
                Ok(Ok(event)) => {
                    self.observed.push(event.clone());
                    if predicate(&event) {
                        return Some((event, Instant::now()));
                    }
                }
                Ok(Err(broadcast::error::RecvError::Lagged(_))) => {}
                Ok(Err(broadcast::error::RecvError::Closed)) | Err(_) => return None,
            }
        }
    }

    async fn finish(mut self, scenario: Scenario) -> Result<ScenarioReport, PreviewError> {
        let status = self.handle.status().await?;
        self.drain();
        self.handle.shutdown().await?;

        Ok(ScenarioReport {
            scenario,
            final_generation: status.current,
            final_document: status.rendered.map(|rendered| rendered.kind),
            events: self.observed,
            violations: self.violations,
            elapsed: self.started.elapsed(),
        })
    }
}

fn is_kill(event: &PreviewEvent) -> bool {
    matches!(event, PreviewEvent::Killed { .. })
}

/// Run one scenario against a fresh runtime
///
/// # Errors
/// Returns `PreviewError` if the runtime cannot be started or stops early
pub async fn run_scenario(
    scenario: Scenario,
    config: &PreviewConfig,
) -> Result<ScenarioReport, PreviewError> {
    tracing::info!("Running scenario {}", scenario);
    let deadline = config.boot_deadline();

    match scenario {
        Scenario::BootBeforeLoop => {
            let mut run = Run::start(config, SimulatedSandbox::booting(BOOT_DELAY))?;
            run.handle
                .load(FragmentSet::new("<div>x</div>", "", "while(true){}"))
                .await?;
            let generation = run.handle.flush().await?;

            let acked = run
                .wait_for(deadline + SLACK, |event| {
                    matches!(event, PreviewEvent::BootAcknowledged { .. })
                })
                .await;
            run.expect("boot acknowledged", acked.is_some(), || {
                "no boot signal before the deadline".to_string()
            });

            tokio::time::sleep(deadline + SLACK).await;
            run.drain();
            let kills = run.count(is_kill);
            run.expect("no diagnostic", kills == 0, || format!("{kills} kills"));

            let guarded = run
                .host
                .current()
                .is_some_and(|frame| frame.document.as_str().contains("__guard();"));
            run.expect("loop guarded", guarded, || "no guard in live document".to_string());
            run.expect("one generation", generation == Some(Generation(1)), || {
                format!("flush produced {generation:?}")
            });
            run.finish(scenario).await
        }

        Scenario::HungFrame => {
            let mut run = Run::start(config, SimulatedSandbox::hanging())?;
            run.handle.edit(FragmentKind::Script, "run()").await?;
            let rendered_at = Instant::now();
            run.handle.flush().await?;

            let killed = run.wait_for(deadline + SLACK, is_kill).await;
            match killed {
                Some((PreviewEvent::Killed { killed, replacement }, at)) => {
                    let waited = at - rendered_at;
                    run.expect("kill not early", waited >= deadline, || {
                        format!("killed after {waited:?}")
                    });
                    run.expect("killed generation", killed == Generation(1), || {
                        format!("killed {killed}")
                    });
                    run.expect("replacement advances", replacement > killed, || {
                        format!("replacement {replacement}")
                    });
                }
                _ => run.expect("kill observed", false, || {
                    format!("no kill within {:?}", deadline + SLACK)
                }),
            }

            let frame = run.host.current().map(|frame| frame.kind());
            run.expect("diagnostic shown", frame == Some(DocumentKind::Diagnostic), || {
                format!("live document {frame:?}")
            });
            run.finish(scenario).await
        }

        Scenario::StopWhileArmed => {
            let mut run = Run::start(config, SimulatedSandbox::hanging())?;
            run.handle.edit(FragmentKind::Script, "while(true){}").await?;
            run.handle.flush().await?;
            let stopped = run.handle.stop().await?;

            tokio::time::sleep(deadline + SLACK).await;
            run.drain();

            let kills = run.count(is_kill);
            run.expect("old timer is a no-op", kills == 0, || format!("{kills} kills"));

            let status = run.handle.status().await?;
            run.expect("generation held", status.current == stopped, || {
                format!("current {} after stop at {}", status.current, stopped)
            });
            run.expect("timer resolved", status.armed_watchdogs == 0, || {
                format!("{} timers armed", status.armed_watchdogs)
            });
            let frame = run.host.current().map(|frame| frame.kind());
            run.expect("blank shown", frame == Some(DocumentKind::Blank), || {
                format!("live document {frame:?}")
            });
            run.finish(scenario).await
        }

        Scenario::EditBurst => {
            let mut run = Run::start(config, SimulatedSandbox::booting(BOOT_DELAY))?;
            let step = config.debounce() / 4;
            for i in 0..20 {
                run.handle
                    .edit(FragmentKind::Markup, format!("<p>{i}</p>"))
                    .await?;
                tokio::time::sleep(step).await;
            }

            tokio::time::sleep(config.debounce() + SLACK).await;
            run.drain();

            let commits: Vec<Generation> = run
                .observed
                .iter()
                .filter_map(|event| match event {
                    PreviewEvent::Committed { generation, .. } => Some(*generation),
                    _ => None,
                })
                .collect();
            run.expect("single commit", commits == [Generation(1)], || {
                format!("commits {commits:?}")
            });

            let last = run
                .host
                .current()
                .is_some_and(|frame| frame.document.as_str().contains("<p>19</p>"));
            run.expect("last edit wins", last, || "final markup missing".to_string());
            run.finish(scenario).await
        }

        Scenario::StaleBootSignal => {
            let late = deadline / 2;
            let host = SimulatedSandbox::with_behavior(move |doc| {
                if doc.generation() == Generation(1) {
                    FrameBehavior::Boots { after: late }
                } else {
                    FrameBehavior::Boots { after: BOOT_DELAY }
                }
            });
            let mut run = Run::start(config, host)?;

            run.handle.edit(FragmentKind::Markup, "<p>old</p>").await?;
            let first = run.handle.flush().await?;
            run.handle.edit(FragmentKind::Markup, "<p>new</p>").await?;
            let second = run.handle.flush().await?;

            if let Some(first) = first {
                run.handle
                    .message_port()
                    .post(InboundMessage::new("null", serde_json::json!({
                        "type": "BOOT_OK",
                        "key": first,
                    })));
            }

            tokio::time::sleep(deadline + SLACK).await;
            run.drain();

            let stale_context = run.count(|event| {
                matches!(
                    event,
                    PreviewEvent::SignalIgnored {
                        reason: IgnoreReason::StaleContext,
                        ..
                    }
                )
            });
            let stale_generation = run.count(|event| {
                matches!(
                    event,
                    PreviewEvent::SignalIgnored {
                        reason: IgnoreReason::StaleGeneration,
                        ..
                    }
                )
            });
            run.expect("late frame ignored", stale_context == 1, || {
                format!("{stale_context} stale-context discards")
            });
            run.expect("old key ignored", stale_generation == 1, || {
                format!("{stale_generation} stale-generation discards")
            });

            let acked: Vec<Generation> = run
                .observed
                .iter()
                .filter_map(|event| match event {
                    PreviewEvent::BootAcknowledged { generation, .. } => Some(*generation),
                    _ => None,
                })
                .collect();
            run.expect("new frame acknowledged", second.is_some_and(|g| acked == [g]), || {
                format!("acknowledged {acked:?}")
            });
            let kills = run.count(is_kill);
            run.expect("no diagnostic", kills == 0, || format!("{kills} kills"));
            run.finish(scenario).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_names_round_trip() {
        for scenario in Scenario::ALL {
            assert_eq!(Scenario::from_name(scenario.name()), Some(scenario));
        }
        assert_eq!(Scenario::from_name("nope"), None);
    }

    #[test]
    fn report_text() {
        let report = ScenarioReport {
            scenario: Scenario::HungFrame,
            final_generation: Generation(2),
            final_document: Some(DocumentKind::Diagnostic),
            events: Vec::new(),
            violations: vec![Violation {
                check: "kill not early",
                detail: "killed after 10ms".to_string(),
            }],
            elapsed: Duration::from_millis(1600),
        };
        let text = report.generate_text();
        assert!(text.contains("=== Scenario: hung-frame ==="));
        assert!(text.contains("Final Document: diagnostic"));
        assert!(text.contains("1. kill not early: killed after 10ms"));
        assert!(text.contains("Result: FAIL"));
        assert!(!report.passed());
    }
}
