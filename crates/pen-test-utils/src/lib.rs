//! Testing utilities for the pen preview workspace
//!
//! Shared fixtures and event helpers.

#![allow(missing_docs)]

use pen_preview::sandbox::SandboxHost;
use pen_preview::{FragmentSet, PreviewConfig, PreviewEvent, PreviewHandle, PreviewRuntime};
use std::time::Duration;
use tokio::sync::broadcast;

/// Upper bound for waiting on an event in paused-clock tests
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(30);

pub fn test_config() -> PreviewConfig {
    PreviewConfig::default()
}

/// The hung-loop fragments used throughout the tests
pub fn looping_fragments() -> FragmentSet {
    FragmentSet::new("<div>x</div>", "", "while(true){}")
}

pub fn throwing_fragments() -> FragmentSet {
    FragmentSet::new("<p>broken</p>", "p{color:red}", "undefinedVariable.call();")
}

pub fn spawn_preview<H: SandboxHost>(host: H) -> PreviewHandle {
    PreviewRuntime::spawn(test_config(), host).unwrap()
}

/// Receive events until one matches, panicking on timeout
pub async fn next_matching(
    events: &mut broadcast::Receiver<PreviewEvent>,
    predicate: impl Fn(&PreviewEvent) -> bool,
) -> PreviewEvent {
    tokio::time::timeout(EVENT_TIMEOUT, async {
        loop {
            let event = events.recv().await.unwrap();
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for preview event")
}

/// Take every event already delivered
pub fn drain(events: &mut broadcast::Receiver<PreviewEvent>) -> Vec<PreviewEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

pub fn count_kills(events: &[PreviewEvent]) -> usize {
    events
        .iter()
        .filter(|event| matches!(event, PreviewEvent::Killed { .. }))
        .count()
}

pub fn committed_generations(events: &[PreviewEvent]) -> Vec<pen_preview::Generation> {
    events
        .iter()
        .filter_map(|event| match event {
            PreviewEvent::Committed { generation, .. } => Some(*generation),
            _ => None,
        })
        .collect()
}
