//! Liveness tests
//!
//! End-to-end watchdog behavior against a simulated frame, on a paused
//! clock.

use pen_preview::prelude::*;
use pen_preview::test_harness::{FrameBehavior, SimulatedSandbox};
use pen_preview::IgnoreReason;
use pen_test_utils::{
    count_kills, drain, looping_fragments, next_matching, spawn_preview, throwing_fragments,
};
use serde_json::json;
use std::time::Duration;
use tokio::time::Instant;

const DEADLINE: Duration = Duration::from_millis(1500);

#[tokio::test(start_paused = true)]
async fn test_infinite_loop_after_bootstrap_is_not_killed() {
    let host = SimulatedSandbox::booting(Duration::from_millis(2));
    let preview = spawn_preview(host.clone());
    let mut events = preview.subscribe();

    preview.load(looping_fragments()).await.unwrap();
    let generation = preview.flush().await.unwrap().unwrap();

    let acked = next_matching(&mut events, |e| {
        matches!(e, PreviewEvent::BootAcknowledged { .. })
    })
    .await;
    assert_eq!(
        acked,
        PreviewEvent::BootAcknowledged {
            generation,
            latency: Duration::from_millis(2)
        }
    );

    tokio::time::sleep(DEADLINE * 2).await;
    assert_eq!(count_kills(&drain(&mut events)), 0);
    assert_eq!(host.current().unwrap().kind(), DocumentKind::Preview);
}

#[tokio::test(start_paused = true)]
async fn test_throwing_script_still_boots() {
    let host = SimulatedSandbox::booting(Duration::from_millis(1));
    let preview = spawn_preview(host.clone());
    let mut events = preview.subscribe();

    preview.load(throwing_fragments()).await.unwrap();
    preview.flush().await.unwrap();

    tokio::time::sleep(DEADLINE * 2).await;
    let seen = drain(&mut events);
    assert_eq!(count_kills(&seen), 0);
    assert!(seen
        .iter()
        .any(|e| matches!(e, PreviewEvent::BootAcknowledged { .. })));

    let html = host.current().unwrap().document.as_str().to_string();
    assert!(html.contains("try {\nundefinedVariable.call();"));
}

#[tokio::test(start_paused = true)]
async fn test_hung_frame_killed_at_deadline() {
    let host = SimulatedSandbox::hanging();
    let preview = spawn_preview(host.clone());
    let mut events = preview.subscribe();

    preview.edit(FragmentKind::Script, "spin()").await.unwrap();
    let rendered_at = Instant::now();
    let generation = preview.flush().await.unwrap().unwrap();

    let killed = next_matching(&mut events, |e| matches!(e, PreviewEvent::Killed { .. })).await;
    let waited = rendered_at.elapsed();
    assert!(waited >= DEADLINE, "killed after {waited:?}");
    assert!(waited < DEADLINE + Duration::from_millis(50));

    let PreviewEvent::Killed {
        killed,
        replacement,
    } = killed
    else {
        unreachable!()
    };
    assert_eq!(killed, generation);
    assert_eq!(replacement, Generation(generation.value() + 1));

    let frame = host.current().unwrap();
    assert_eq!(frame.kind(), DocumentKind::Diagnostic);
    assert_eq!(frame.generation(), replacement);
    assert!(frame
        .document
        .as_str()
        .contains("Preview killed (script stuck / infinite loop)."));

    let status = preview.status().await.unwrap();
    assert_eq!(status.current, replacement);
    assert_eq!(status.armed_watchdogs, 0);
}

#[tokio::test(start_paused = true)]
async fn test_no_kill_before_deadline() {
    let host = SimulatedSandbox::hanging();
    let preview = spawn_preview(host.clone());
    let mut events = preview.subscribe();

    preview.edit(FragmentKind::Script, "spin()").await.unwrap();
    preview.flush().await.unwrap();

    tokio::time::sleep(DEADLINE - Duration::from_millis(1)).await;
    assert_eq!(count_kills(&drain(&mut events)), 0);
    assert_eq!(host.current().unwrap().kind(), DocumentKind::Preview);
}

#[tokio::test(start_paused = true)]
async fn test_edit_after_kill_recovers() {
    let host = SimulatedSandbox::with_behavior(|doc| {
        if doc.as_str().contains("spin()") {
            FrameBehavior::NeverBoots
        } else {
            FrameBehavior::Boots {
                after: Duration::from_millis(3),
            }
        }
    });
    let preview = spawn_preview(host.clone());
    let mut events = preview.subscribe();

    preview.edit(FragmentKind::Script, "spin()").await.unwrap();
    preview.flush().await.unwrap();
    next_matching(&mut events, |e| matches!(e, PreviewEvent::Killed { .. })).await;

    preview.edit(FragmentKind::Script, "ok()").await.unwrap();
    let generation = preview.flush().await.unwrap().unwrap();
    let acked = next_matching(&mut events, |e| {
        matches!(e, PreviewEvent::BootAcknowledged { .. })
    })
    .await;

    assert!(matches!(acked, PreviewEvent::BootAcknowledged { generation: g, .. } if g == generation));
    assert_eq!(host.current().unwrap().kind(), DocumentKind::Preview);
}

#[tokio::test(start_paused = true)]
async fn test_stop_while_armed_renders_blank_and_old_timer_is_noop() {
    let host = SimulatedSandbox::hanging();
    let preview = spawn_preview(host.clone());
    let mut events = preview.subscribe();

    preview.load(looping_fragments()).await.unwrap();
    let armed = preview.flush().await.unwrap().unwrap();
    let stopped = preview.stop().await.unwrap();
    assert!(stopped > armed);

    let frame = host.current().unwrap();
    assert_eq!(frame.kind(), DocumentKind::Blank);
    assert_eq!(frame.document.as_str(), "");

    tokio::time::sleep(DEADLINE * 2).await;
    let seen = drain(&mut events);
    assert_eq!(count_kills(&seen), 0);
    assert!(seen.contains(&PreviewEvent::Stopped { generation: stopped }));

    let status = preview.status().await.unwrap();
    assert_eq!(status.current, stopped);
    assert_eq!(status.armed_watchdogs, 0);
    assert_eq!(host.current().unwrap().kind(), DocumentKind::Blank);
}

#[tokio::test(start_paused = true)]
async fn test_superseded_timer_does_not_touch_newer_preview() {
    let host = SimulatedSandbox::with_behavior(|doc| {
        if doc.generation() == Generation(1) {
            FrameBehavior::NeverBoots
        } else {
            FrameBehavior::Boots {
                after: Duration::from_millis(10),
            }
        }
    });
    let preview = spawn_preview(host.clone());
    let mut events = preview.subscribe();

    preview.edit(FragmentKind::Markup, "<p>1</p>").await.unwrap();
    preview.flush().await.unwrap();
    tokio::time::sleep(DEADLINE / 2).await;

    preview.edit(FragmentKind::Markup, "<p>2</p>").await.unwrap();
    let newer = preview.flush().await.unwrap().unwrap();

    // Past the first generation's deadline, before the second one's
    tokio::time::sleep(DEADLINE / 2 + Duration::from_millis(100)).await;

    assert_eq!(count_kills(&drain(&mut events)), 0);
    let frame = host.current().unwrap();
    assert_eq!(frame.generation(), newer);
    assert_eq!(frame.kind(), DocumentKind::Preview);
    assert_eq!(preview.status().await.unwrap().current, newer);
}

#[tokio::test(start_paused = true)]
async fn test_boot_for_old_generation_is_ignored() {
    let host = SimulatedSandbox::hanging();
    let preview = spawn_preview(host.clone());
    let mut events = preview.subscribe();

    preview.edit(FragmentKind::Markup, "<p>1</p>").await.unwrap();
    let old = preview.flush().await.unwrap().unwrap();
    preview.refresh().await.unwrap();

    preview
        .message_port()
        .post(InboundMessage::new("null", json!({ "type": "BOOT_OK", "key": old })));

    let ignored = next_matching(&mut events, |e| {
        matches!(e, PreviewEvent::SignalIgnored { .. })
    })
    .await;
    assert_eq!(
        ignored,
        PreviewEvent::SignalIgnored {
            generation: Some(old),
            reason: IgnoreReason::StaleGeneration,
        }
    );
    assert_eq!(preview.status().await.unwrap().armed_watchdogs, 2);
}

#[tokio::test(start_paused = true)]
async fn test_opaque_only_policy_rejects_foreign_origin() {
    let host = SimulatedSandbox::hanging();
    let config = PreviewConfig::default().with_origin_policy(OriginPolicy::OpaqueOnly);
    let preview = PreviewRuntime::spawn(config, host.clone()).unwrap();
    let mut events = preview.subscribe();

    preview.edit(FragmentKind::Markup, "<p>1</p>").await.unwrap();
    let generation = preview.flush().await.unwrap().unwrap();
    let context = host.current().unwrap().context;

    let mut forged = InboundMessage::boot(context, generation);
    forged.origin = "https://attacker.example".to_string();
    preview.message_port().post(forged);

    let ignored = next_matching(&mut events, |e| {
        matches!(e, PreviewEvent::SignalIgnored { .. })
    })
    .await;
    assert!(matches!(
        ignored,
        PreviewEvent::SignalIgnored {
            reason: IgnoreReason::OriginRejected,
            ..
        }
    ));

    preview
        .message_port()
        .post(InboundMessage::boot(context, generation));
    next_matching(&mut events, |e| {
        matches!(e, PreviewEvent::BootAcknowledged { .. })
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_malformed_messages_are_dropped() {
    let host = SimulatedSandbox::hanging();
    let preview = spawn_preview(host.clone());
    let mut events = preview.subscribe();

    preview.edit(FragmentKind::Markup, "<p>1</p>").await.unwrap();
    preview.flush().await.unwrap();

    for data in [json!({ "type": "BOOT_OK" }), json!({ "kind": "BOOT_OK", "key": 1 }), json!(7)] {
        preview.message_port().post(InboundMessage::new("null", data));
    }

    for _ in 0..3 {
        let ignored = next_matching(&mut events, |e| {
            matches!(e, PreviewEvent::SignalIgnored { .. })
        })
        .await;
        assert_eq!(
            ignored,
            PreviewEvent::SignalIgnored {
                generation: None,
                reason: IgnoreReason::Malformed,
            }
        );
    }
    assert_eq!(preview.status().await.unwrap().armed_watchdogs, 1);
}

#[tokio::test(start_paused = true)]
async fn test_every_render_is_scripts_only() {
    let host = SimulatedSandbox::hanging();
    let preview = spawn_preview(host.clone());

    preview.edit(FragmentKind::Script, "spin()").await.unwrap();
    preview.flush().await.unwrap();
    preview.stop().await.unwrap();
    tokio::time::sleep(DEADLINE * 2).await;

    let history = host.history();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|frame| frame.sandbox == "allow-scripts"));
}
