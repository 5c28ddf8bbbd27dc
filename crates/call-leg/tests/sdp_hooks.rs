//! SDP change hooks: synchronous rewrite, deferred completion, rejection

mod common;

use common::*;
use rvoip_call_leg::prelude::*;

fn addresses(body: &MsgBody) -> Vec<String> {
    body.connection_addresses().unwrap()
}

#[tokio::test]
async fn test_remote_hook_rewrites_reinvite_offer() {
    let hook = RecordingHook::new(HookPolicy::Rewrite("10.0.0.1"));
    let remote = hook.clone();
    let mut h = Harness::with(test_config(), move |b| b.with_remote_sdp_hook(remote));

    let invite = h.request(Method::Invite).with_body(sdp("198.51.100.7"));
    h.send(invite).await;

    assert_eq!(hook.count(), 1);
    assert_eq!(hook.changes.lock()[0].direction, SdpDirection::Remote);
    assert_eq!(h.state().await, "Updating(UAS)");

    let events = h.drain_events();
    assert_eq!(event_names(&events), vec!["Update"]);
    assert_eq!(addresses(events[0].body().unwrap()), vec!["10.0.0.1"]);
    assert_eq!(addresses(&h.snapshot().await.remote_sdp.unwrap()), vec!["10.0.0.1"]);
}

#[tokio::test]
async fn test_deferred_remote_hook_backlogs_input() {
    let hook = RecordingHook::new(HookPolicy::Defer);
    let remote = hook.clone();
    let mut h = Harness::with(test_config(), move |b| b.with_remote_sdp_hook(remote));

    let invite = h.request(Method::Invite).with_body(sdp("198.51.100.7"));
    h.send(invite).await;
    let id = hook.last_id().unwrap();

    let snapshot = h.snapshot().await;
    assert_eq!(snapshot.pending_sdp_change, Some((id, SdpDirection::Remote)));
    assert_eq!(snapshot.state, "Updating(UAS)");
    assert!(h.drain_events().is_empty());

    let options = h.request(Method::Options);
    let options_tx = h.send(options).await;
    assert!(options_tx.codes().is_empty());
    h.leg.disconnect("caller").await;
    assert_eq!(h.snapshot().await.backlog_len, 2);

    let processed = sdp("10.0.0.2");
    assert!(h.leg.complete_sdp_change(id, Ok(processed.clone())).await);

    // Update first, then the backlog in arrival order
    let events = h.drain_events();
    assert_eq!(event_names(&events), vec!["Update"]);
    assert_eq!(events[0].body().unwrap().text(), processed.text());
    assert_eq!(options_tx.codes(), vec![200]);
    assert_eq!(h.state().await, "Disconnected");
    assert_eq!(h.transactions.methods(), vec![Method::Bye]);

    let snapshot = h.snapshot().await;
    assert!(snapshot.pending_sdp_change.is_none());
    assert_eq!(snapshot.backlog_len, 0);
    assert_eq!(snapshot.remote_sdp.unwrap().text(), processed.text());
}

#[tokio::test]
async fn test_completion_with_unknown_id_is_refused() {
    let hook = RecordingHook::new(HookPolicy::Defer);
    let remote = hook.clone();
    let mut h = Harness::with(test_config(), move |b| b.with_remote_sdp_hook(remote));

    assert!(!h.leg.complete_sdp_change(SdpChangeId(42), Ok(sdp("10.0.0.2"))).await);

    let invite = h.request(Method::Invite).with_body(sdp("198.51.100.7"));
    h.send(invite).await;
    let id = hook.last_id().unwrap();

    assert!(!h.leg.complete_sdp_change(SdpChangeId(id.0 + 1), Ok(sdp("10.0.0.2"))).await);
    assert!(h.snapshot().await.pending_sdp_change.is_some());

    assert!(h.leg.complete_sdp_change(id, Ok(sdp("10.0.0.2"))).await);
    // A second completion of the same change finds nothing pending
    assert!(!h.leg.complete_sdp_change(id, Ok(sdp("10.0.0.3"))).await);
    assert_eq!(event_names(&h.drain_events()), vec!["Update"]);
}

#[tokio::test]
async fn test_failed_completion_reports_malformed_sdp() {
    let hook = RecordingHook::new(HookPolicy::Defer);
    let remote = hook.clone();
    let mut h = Harness::with(test_config(), move |b| b.with_remote_sdp_hook(remote));

    let invite = h.request(Method::Invite).with_body(sdp("198.51.100.7"));
    h.send(invite).await;
    let id = hook.last_id().unwrap();

    let failure = LegError::sdp_hook("relay out of ports");
    assert!(h.leg.complete_sdp_change(id, Err(failure)).await);

    let events = h.drain_events();
    assert_eq!(event_names(&events), vec!["Fail"]);
    assert_eq!(events[0].code(), Some(400));
    assert!(events[0].warning.as_deref().unwrap().contains("relay out of ports"));
    assert!(h.snapshot().await.pending_sdp_change.is_none());
}

#[tokio::test]
async fn test_rejecting_hook_reports_malformed_sdp() {
    let hook = RecordingHook::new(HookPolicy::Reject);
    let remote = hook.clone();
    let mut h = Harness::with(test_config(), move |b| b.with_remote_sdp_hook(remote));

    let invite = h.request(Method::Invite).with_body(sdp("198.51.100.7"));
    let tx = h.send(invite).await;

    let events = h.drain_events();
    assert_eq!(event_names(&events), vec!["Fail"]);
    match &events[0].kind {
        CallEventKind::Fail { code, reason_phrase } => {
            assert_eq!(*code, 400);
            assert_eq!(reason_phrase, "Malformed SDP Body");
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(events[0].warning.as_deref().unwrap().contains("codec list rejected"));

    // Call control's rejection ends the re-INVITE
    h.leg.recv_event(events[0].clone()).await;
    assert_eq!(tx.codes(), vec![100, 400]);
    assert_eq!(h.state().await, "Connected");
}

#[tokio::test]
async fn test_remote_hook_processes_ack_body() {
    let hook = RecordingHook::new(HookPolicy::Rewrite("10.0.0.5"));
    let remote = hook.clone();
    let mut h = Harness::with(test_config(), move |b| b.with_remote_sdp_hook(remote));

    h.ack(Some(sdp("198.51.100.7"))).await;
    let events = h.drain_events();
    assert_eq!(event_names(&events), vec!["Connect"]);
    assert_eq!(addresses(events[0].body().unwrap()), vec!["10.0.0.5"]);
    assert_eq!(addresses(&h.snapshot().await.remote_sdp.unwrap()), vec!["10.0.0.5"]);
}

#[tokio::test]
async fn test_local_hook_rewrites_update_offer() {
    let hook = RecordingHook::new(HookPolicy::Rewrite("10.0.0.9"));
    let local = hook.clone();
    let h = Harness::with(test_config(), move |b| b.with_local_sdp_hook(local));

    h.leg
        .recv_event(CallEvent::update(Some(sdp("203.0.113.9")), None, now(), "caller"))
        .await;

    assert_eq!(hook.count(), 1);
    assert_eq!(hook.changes.lock()[0].direction, SdpDirection::Local);
    assert_eq!(h.state().await, "Updating(UAC)");
    let invite = h.transactions.last_of(Method::Invite).unwrap();
    assert_eq!(addresses(invite.request.body.as_ref().unwrap()), vec!["10.0.0.9"]);
    assert_eq!(addresses(&h.snapshot().await.local_sdp.unwrap()), vec!["10.0.0.9"]);
}

#[tokio::test]
async fn test_processed_body_skips_local_hook() {
    let hook = RecordingHook::new(HookPolicy::Reject);
    let local = hook.clone();
    let h = Harness::with(test_config(), move |b| b.with_local_sdp_hook(local));

    let body = sdp("203.0.113.9").with_needs_update(false);
    h.leg.recv_event(CallEvent::update(Some(body), None, now(), "caller")).await;

    assert_eq!(hook.count(), 0);
    assert_eq!(h.state().await, "Updating(UAC)");
}

#[tokio::test]
async fn test_deferred_local_hook_resumes_update() {
    let hook = RecordingHook::new(HookPolicy::Defer);
    let local = hook.clone();
    let mut h = Harness::with(test_config(), move |b| b.with_local_sdp_hook(local));

    h.leg
        .recv_event(CallEvent::update(Some(sdp("203.0.113.9")), None, now(), "caller"))
        .await;
    let id = hook.last_id().unwrap();
    assert_eq!(h.snapshot().await.pending_sdp_change, Some((id, SdpDirection::Local)));
    assert!(h.transactions.methods().is_empty());

    let info = h.request(Method::Info);
    let info_tx = h.send(info).await;
    assert!(info_tx.codes().is_empty());

    assert!(h.leg.complete_sdp_change(id, Ok(sdp("10.0.0.3"))).await);
    assert_eq!(h.state().await, "Updating(UAC)");
    let invite = h.transactions.last_of(Method::Invite).unwrap();
    assert_eq!(invite.request.body.as_ref().unwrap().text(), sdp("10.0.0.3").text());
    assert_eq!(info_tx.codes(), vec![200]);
    assert_eq!(event_names(&h.drain_events()), vec!["Info"]);
}

#[tokio::test]
async fn test_local_hook_rewrites_uas_answer() {
    let hook = RecordingHook::new(HookPolicy::Rewrite("10.0.0.7"));
    let local = hook.clone();
    let mut h = Harness::with(test_config(), move |b| b.with_local_sdp_hook(local));

    let invite = h.request(Method::Invite).with_body(sdp("198.51.100.7"));
    let tx = h.send(invite).await;
    h.leg
        .recv_event(CallEvent::connect(200, "OK", Some(sdp("203.0.113.9")), now(), "caller"))
        .await;

    let (answer, expect_ack) = tx.last().unwrap();
    assert_eq!(answer.code, 200);
    assert!(expect_ack);
    assert_eq!(addresses(answer.body.as_ref().unwrap()), vec!["10.0.0.7"]);
    assert_eq!(h.state().await, "Connected");
}

#[tokio::test]
async fn test_closure_hook() {
    let local = std::sync::Arc::new(|change: SdpChange| -> LegResult<SdpHookReply> {
        Ok(SdpHookReply::Ready(change.body.with_connection_address("10.9.9.9")?))
    });
    let h = Harness::with(test_config(), move |b| b.with_local_sdp_hook(local));

    h.leg
        .recv_event(CallEvent::update(Some(sdp("203.0.113.9")), None, now(), "caller"))
        .await;
    let invite = h.transactions.last_of(Method::Invite).unwrap();
    assert_eq!(addresses(invite.request.body.as_ref().unwrap()), vec!["10.9.9.9"]);
}

#[tokio::test]
async fn test_full_backlog_refuses_requests() {
    let hook = RecordingHook::new(HookPolicy::Defer);
    let remote = hook.clone();
    let mut h = Harness::with(test_config().with_max_backlog(1), move |b| b.with_remote_sdp_hook(remote));

    let invite = h.request(Method::Invite).with_body(sdp("198.51.100.7"));
    h.send(invite).await;
    let id = hook.last_id().unwrap();

    let options = h.request(Method::Options);
    let held = h.send(options).await;
    let options = h.request(Method::Options);
    let refused = h.send(options).await;
    assert!(held.codes().is_empty());
    assert_eq!(refused.codes(), vec![503]);

    // Call control input is still kept
    h.leg.disconnect("caller").await;
    assert_eq!(h.snapshot().await.backlog_len, 2);

    assert!(h.leg.complete_sdp_change(id, Ok(sdp("10.0.0.2"))).await);
    assert_eq!(held.codes(), vec![200]);
    assert_eq!(refused.codes(), vec![503]);
    assert_eq!(h.state().await, "Disconnected");
}
