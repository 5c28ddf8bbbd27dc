//! Call-control events while Connected

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use common::*;
use pretty_assertions::assert_eq;
use rvoip_call_leg::message::MaxForwardsHeader;
use rvoip_call_leg::prelude::*;

fn carol() -> SipAddress {
    address("sip:carol@chicago.example.com").with_display_name("Carol")
}

#[tokio::test]
async fn test_redirect_with_refer_enabled_sends_refer() {
    let mut h = Harness::with_config(test_config().with_refer_transfer());
    h.leg
        .recv_event(CallEvent::disconnect(Some(carol()), now(), "caller"))
        .await;

    assert_eq!(h.state().await, "Disconnected");
    assert_eq!(h.transactions.methods(), vec![Method::Refer]);

    let refer = h.transactions.last().unwrap();
    assert_eq!(refer.request.cseq, 2);
    assert_eq!(refer.request.refer_to().unwrap().body().unwrap().uri(), carol().uri());
    // Referred-By is the local URI alone
    let referred_by = refer.request.referred_by().unwrap().body().unwrap();
    assert_eq!(referred_by.uri().to_string(), "sip:b2bua@biloxi.example.com");
    assert!(referred_by.display_name().is_none());
    assert!(referred_by.address().params.is_empty());

    let snapshot = h.snapshot().await;
    assert_eq!(snapshot.local_cseq, 3);
    assert_eq!(snapshot.redirect_target.unwrap().uri(), carol().uri());
    assert_eq!(
        h.observer.seen(),
        vec![Observed::Disconnect {
            origin: "caller".into(),
            code: 0
        }]
    );
    assert!(h.drain_events().is_empty());
}

#[tokio::test]
async fn test_redirect_without_refer_sends_bye_with_also() {
    let h = Harness::new();
    h.leg
        .recv_event(CallEvent::redirect(302, "Moved Temporarily", Some(carol()), now(), "caller"))
        .await;

    assert_eq!(h.transactions.methods(), vec![Method::Bye]);
    let bye = h.transactions.last().unwrap();
    assert_eq!(bye.request.also().len(), 1);
    assert_eq!(bye.request.also()[0].body().unwrap().uri(), carol().uri());
    assert_eq!(h.state().await, "Disconnected");
}

#[tokio::test]
async fn test_fail_sends_bye_with_extra_headers() {
    let h = Harness::new();
    let event = CallEvent::fail(503, "Service Unavailable", now(), "caller")
        .with_extra_header(Header::Reason("Q.850;cause=41".into()));
    h.leg.recv_event(event).await;

    let bye = h.transactions.last_of(Method::Bye).unwrap();
    assert!(bye.request.also().is_empty());
    assert_eq!(bye.request.reason(), Some("Q.850;cause=41"));
    assert_eq!(h.state().await, "Disconnected");
}

#[tokio::test]
async fn test_request_generation_failure_leaves_leg_untouched() {
    let mut broken = dialog();
    broken.remote_target.clear();
    let transactions = Arc::new(MockTransactionLayer::default());
    let (leg, _events) = CallLeg::builder(broken, transactions.clone())
        .with_timer_scheduler(Arc::new(ManualScheduler::default()))
        .build()
        .unwrap();

    leg.recv_event(CallEvent::disconnect(None, now(), "caller")).await;
    assert_eq!(leg.state_name().await, "Connected");
    assert_eq!(leg.snapshot().await.local_cseq, 2);
    assert!(transactions.methods().is_empty());
}

#[tokio::test]
async fn test_teardown_proceeds_when_transaction_start_fails() {
    let h = Harness::new();
    h.transactions.refuse.store(true, Ordering::SeqCst);
    h.leg.disconnect("caller").await;
    assert_eq!(h.state().await, "Disconnected");
}

#[tokio::test]
async fn test_update_with_unchanged_local_sdp_short_circuits() {
    let mut h = Harness::new();
    h.leg
        .recv_event(CallEvent::update(Some(sdp("192.0.2.1")), None, now(), "caller"))
        .await;

    assert!(h.transactions.methods().is_empty());
    assert_eq!(h.state().await, "Connected");
    let events = h.drain_events();
    assert_eq!(event_names(&events), vec!["Connect"]);
    assert_eq!(events[0].code(), Some(200));
    assert_eq!(events[0].body().unwrap().text(), sdp("192.0.2.4").text());
}

#[tokio::test]
async fn test_update_with_exhausted_max_forwards_fails() {
    let mut h = Harness::new();
    let event = CallEvent::update(
        Some(sdp("203.0.113.9")),
        Some(MaxForwardsHeader::new(0)),
        now(),
        "caller",
    );
    h.leg.recv_event(event).await;

    let events = h.drain_events();
    assert_eq!(event_names(&events), vec!["Fail"]);
    assert_eq!(events[0].code(), Some(483));
    assert!(h.transactions.methods().is_empty());
    assert_eq!(h.state().await, "Connected");
    assert_eq!(h.snapshot().await.local_cseq, 2);
}

#[tokio::test]
async fn test_update_with_malformed_max_forwards_aborts() {
    let mut h = Harness::new();
    let event = CallEvent::update(
        Some(sdp("203.0.113.9")),
        Some(MaxForwardsHeader::from_raw("lots")),
        now(),
        "caller",
    );
    h.leg.recv_event(event).await;

    assert!(h.drain_events().is_empty());
    assert!(h.transactions.methods().is_empty());
    assert_eq!(h.state().await, "Connected");
}

#[tokio::test]
async fn test_update_sends_reinvite_with_decremented_max_forwards() {
    let h = Harness::new();
    let event = CallEvent::update(
        Some(sdp("203.0.113.9")),
        Some(MaxForwardsHeader::new(5)),
        now(),
        "caller",
    );
    h.leg.recv_event(event).await;

    assert_eq!(h.state().await, "Updating(UAC)");
    let invite = h.transactions.last_of(Method::Invite).unwrap();
    assert_eq!(invite.request.max_forwards().unwrap().body().unwrap(), 4);
    assert_eq!(invite.request.body.as_ref().unwrap().text(), sdp("203.0.113.9").text());
    assert_eq!(invite.request.cseq, 2);

    let snapshot = h.snapshot().await;
    assert_eq!(snapshot.local_cseq, 3);
    assert_eq!(snapshot.local_sdp.unwrap().text(), sdp("203.0.113.9").text());
}

#[tokio::test]
async fn test_update_uses_default_max_forwards() {
    let h = Harness::new();
    h.leg
        .recv_event(CallEvent::update(Some(sdp("203.0.113.9")), None, now(), "caller"))
        .await;
    let invite = h.transactions.last_of(Method::Invite).unwrap();
    assert_eq!(invite.request.max_forwards().unwrap().body().unwrap(), 70);
}

#[tokio::test]
async fn test_info_event_sends_info() {
    let h = Harness::new();
    let body = MsgBody::new("application/dtmf-relay", "Signal=1\r\n");
    h.leg
        .recv_event(CallEvent::info(Some(body.clone()), now(), "caller"))
        .await;

    let info = h.transactions.last_of(Method::Info).unwrap();
    assert_eq!(info.request.body.as_ref().unwrap().text(), body.text());
    assert_eq!(h.snapshot().await.local_cseq, 3);
    assert_eq!(h.state().await, "Connected");
}

#[tokio::test]
async fn test_connect_without_pending_transaction_is_ignored() {
    let mut h = Harness::new();
    h.leg
        .recv_event(CallEvent::connect(200, "OK", Some(sdp("203.0.113.9")), now(), "caller"))
        .await;
    assert!(h.drain_events().is_empty());
    assert_eq!(h.observer.connects(), 0);
    assert_eq!(h.snapshot().await.local_sdp.unwrap().text(), sdp("192.0.2.1").text());
}

#[tokio::test]
async fn test_connect_completes_pending_ack() {
    let pending = Arc::new(MockClientTransaction::default());
    let tr = pending.clone();
    let h = Harness::with(test_config(), move |b| b.with_pending_ack(tr));

    assert!(h.snapshot().await.has_pending_transaction);
    assert_eq!(h.scheduler.armed(EXPIRE), 1);

    h.leg
        .recv_event(CallEvent::connect(200, "OK", Some(sdp("203.0.113.9")), now(), "caller"))
        .await;

    assert_eq!(pending.ack_count(), 1);
    assert_eq!(
        pending.ack_body.lock().as_ref().unwrap().text(),
        sdp("203.0.113.9").text()
    );
    let snapshot = h.snapshot().await;
    assert!(!snapshot.has_pending_transaction);
    assert!(snapshot.connect_ts.is_some());
    assert_eq!(snapshot.local_sdp.unwrap().text(), sdp("203.0.113.9").text());
    assert_eq!(h.scheduler.armed(EXPIRE), 0);
    assert_eq!(h.observer.connects(), 1);
}

#[tokio::test]
async fn test_leaving_connected_flushes_pending_ack() {
    let pending = Arc::new(MockClientTransaction::default());
    let tr = pending.clone();
    let mut h = Harness::with(test_config(), move |b| b.with_pending_ack(tr));

    let bye = h.request(Method::Bye);
    h.send(bye).await;

    assert_eq!(pending.ack_count(), 1);
    let snapshot = h.snapshot().await;
    assert!(!snapshot.has_pending_transaction);
    assert_eq!(h.scheduler.armed(EXPIRE), 0);
    assert_eq!(snapshot.state, "Disconnected");
}

#[tokio::test]
async fn test_connected_at_fires_connect_callback() {
    let h = Harness::with(test_config(), |b| b.connected_at(now()));
    assert_eq!(
        h.observer.seen(),
        vec![Observed::Connect {
            origin: "callee".into()
        }]
    );
}
