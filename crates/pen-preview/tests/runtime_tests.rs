//! Runtime tests
//!
//! Commit scheduling and explicit actions through the public handle.

use pen_preview::prelude::*;
use pen_preview::test_harness::{run_scenario, Scenario, SimulatedSandbox};
use pen_test_utils::{committed_generations, drain, next_matching, spawn_preview, test_config};
use pretty_assertions::assert_eq;
use std::time::Duration;

const QUIET: Duration = Duration::from_millis(600);

#[tokio::test(start_paused = true)]
async fn test_keystroke_burst_produces_one_generation() {
    let host = MemoryHost::new();
    let preview = spawn_preview(host.clone());
    let mut events = preview.subscribe();

    let text = "<div>hello world</div>";
    for end in 1..=text.len() {
        preview
            .edit(FragmentKind::Markup, &text[..end])
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
    }
    preview.edit(FragmentKind::Style, "div{color:red}").await.unwrap();

    tokio::time::sleep(QUIET + Duration::from_millis(10)).await;
    let seen = drain(&mut events);

    assert_eq!(committed_generations(&seen), vec![Generation(1)]);
    assert_eq!(host.render_count(), 1);
    let html = host.current().unwrap().document.as_str().to_string();
    assert!(html.contains(text));
    assert!(html.contains("div{color:red}"));
}

#[tokio::test(start_paused = true)]
async fn test_commit_waits_for_quiet_interval() {
    let host = MemoryHost::new();
    let preview = spawn_preview(host.clone());

    preview.edit(FragmentKind::Script, "go()").await.unwrap();
    tokio::time::sleep(QUIET - Duration::from_millis(1)).await;
    assert_eq!(host.render_count(), 0);
    assert!(preview.status().await.unwrap().pending_commit);

    tokio::time::sleep(Duration::from_millis(2)).await;
    assert_eq!(host.render_count(), 1);
    assert!(!preview.status().await.unwrap().pending_commit);
}

#[tokio::test(start_paused = true)]
async fn test_first_load_uses_longer_interval() {
    let host = MemoryHost::new();
    let preview = spawn_preview(host.clone());

    preview
        .load(FragmentSet::new("<p>draft</p>", "", ""))
        .await
        .unwrap();
    tokio::time::sleep(QUIET + Duration::from_millis(10)).await;
    assert_eq!(host.render_count(), 0);

    tokio::time::sleep(QUIET).await;
    assert_eq!(host.render_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_committed_event_carries_fragments() {
    let preview = spawn_preview(MemoryHost::new());
    let mut events = preview.subscribe();

    preview.edit(FragmentKind::Markup, "<b>").await.unwrap();
    preview.edit(FragmentKind::Script, "x()").await.unwrap();
    let generation = preview.flush().await.unwrap().unwrap();

    let committed = next_matching(&mut events, |e| {
        matches!(e, PreviewEvent::Committed { .. })
    })
    .await;
    assert_eq!(
        committed,
        PreviewEvent::Committed {
            generation,
            fragments: FragmentSet::new("<b>", "", "x()"),
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_refresh_recommits_buffer_under_new_generation() {
    let host = MemoryHost::new();
    let preview = spawn_preview(host.clone());

    preview.edit(FragmentKind::Markup, "<p>a</p>").await.unwrap();
    let first = preview.flush().await.unwrap().unwrap();
    let second = preview.refresh().await.unwrap();

    assert!(second > first);
    let history = host.history();
    assert_eq!(history.len(), 2);
    assert_ne!(history[0].context, history[1].context);
    assert_eq!(
        history[0].document.as_str().replace("key: 1 }", "key: 2 }"),
        history[1].document.as_str()
    );
}

#[tokio::test(start_paused = true)]
async fn test_refresh_absorbs_pending_edits() {
    let host = MemoryHost::new();
    let preview = spawn_preview(host.clone());

    preview.edit(FragmentKind::Markup, "<p>pending</p>").await.unwrap();
    preview.refresh().await.unwrap();
    tokio::time::sleep(QUIET * 2).await;

    assert_eq!(host.render_count(), 1);
    assert!(host
        .current()
        .unwrap()
        .document
        .as_str()
        .contains("<p>pending</p>"));
}

#[tokio::test(start_paused = true)]
async fn test_clear_commits_empty_document() {
    let host = MemoryHost::new();
    let preview = spawn_preview(host.clone());

    preview.edit(FragmentKind::Markup, "<p>gone</p>").await.unwrap();
    preview.flush().await.unwrap();
    preview.clear().await.unwrap();
    let generation = preview.flush().await.unwrap().unwrap();

    let status = preview.status().await.unwrap();
    assert!(status.fragments.is_empty());
    assert_eq!(status.current, generation);
    assert!(!host.current().unwrap().document.as_str().contains("<p>gone</p>"));
}

#[tokio::test(start_paused = true)]
async fn test_status_before_any_render() {
    let preview = spawn_preview(MemoryHost::new());
    let status = preview.status().await.unwrap();

    assert_eq!(status.current, Generation::ZERO);
    assert_eq!(status.rendered, None);
    assert_eq!(status.armed_watchdogs, 0);
    assert!(!status.pending_commit);
}

#[tokio::test(start_paused = true)]
async fn test_generations_strictly_increase_across_actions() {
    let preview = spawn_preview(SimulatedSandbox::booting(Duration::from_millis(1)));

    preview.edit(FragmentKind::Script, "1").await.unwrap();
    let a = preview.flush().await.unwrap().unwrap();
    let b = preview.stop().await.unwrap();
    let c = preview.refresh().await.unwrap();
    preview.edit(FragmentKind::Script, "2").await.unwrap();
    let d = preview.flush().await.unwrap().unwrap();

    assert!(a < b && b < c && c < d);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_closes_handle() {
    let preview = spawn_preview(MemoryHost::new());
    assert!(!preview.is_closed());

    preview.shutdown().await.unwrap();
    tokio::time::sleep(Duration::from_millis(1)).await;

    assert!(preview.is_closed());
    assert!(preview.status().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_scenarios_pass() {
    let config = test_config();
    for scenario in Scenario::ALL {
        let report = run_scenario(scenario, &config).await.unwrap();
        assert!(report.passed(), "{}", report.generate_text());
    }
}
