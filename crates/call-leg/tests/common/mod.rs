//! Shared test harness: recording transaction layer, manual timers, observer
//! and SDP hooks.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::Level;

use rvoip_call_leg::logging::{init_logging, LoggingConfig};
use rvoip_call_leg::prelude::*;

pub const EXPIRE: Duration = Duration::from_secs(10);
pub const KEEPALIVE: Duration = Duration::from_secs(20);
pub const LINGER: Duration = Duration::from_secs(30);
pub const CREDIT: Duration = Duration::from_secs(100);

pub const CALL_ID: &str = "3848276298220188511@atlanta.example.com";

pub fn init_test_logging() {
    let _ = init_logging(LoggingConfig::new(Level::DEBUG).for_tests());
}

pub fn sdp(address: &str) -> MsgBody {
    MsgBody::sdp(format!(
        "v=0\r\no=- 1 1 IN IP4 {address}\r\ns=-\r\nc=IN IP4 {address}\r\nt=0 0\r\nm=audio 4000 RTP/AVP 0\r\n"
    ))
}

pub fn address(text: &str) -> SipAddress {
    text.parse().unwrap()
}

pub fn dialog() -> LegDialog {
    LegDialog::new(
        CALL_ID,
        address("sip:b2bua@biloxi.example.com")
            .with_display_name("B2BUA")
            .with_param("tag", Some("314159")),
        address("sip:bob@biloxi.example.com").with_param("tag", Some("8321234356")),
        "sip:bob@192.0.2.4:5060",
    )
    .with_local_cseq(2)
}

pub fn test_config() -> LegConfig {
    LegConfig::default()
        .with_expire_timeout(EXPIRE)
        .with_disconnect_linger(LINGER)
}

/// Client transaction that records what the leg did with it
#[derive(Default)]
pub struct MockClientTransaction {
    pub acks: AtomicUsize,
    pub ack_body: Mutex<Option<MsgBody>>,
    pub cancelled: AtomicBool,
}

impl MockClientTransaction {
    pub fn ack_count(&self) -> usize {
        self.acks.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl ClientTransaction for MockClientTransaction {
    fn set_ack_body(&self, body: Option<MsgBody>) {
        *self.ack_body.lock() = body;
    }

    fn send_ack(&self) -> LegResult<()> {
        self.acks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

pub struct SentRequest {
    pub request: Request,
    pub handler: Option<Arc<dyn ResponseHandler>>,
    pub tr: Arc<MockClientTransaction>,
}

impl SentRequest {
    /// Feed a response back through the leg's handler
    pub async fn respond(&self, code: u16, reason: &str, body: Option<MsgBody>) {
        let mut response = Response::new(code, reason, self.request.method.clone());
        response.cseq = self.request.cseq;
        response.body = body;
        if let Some(handler) = &self.handler {
            handler.on_response(response).await;
        }
    }
}

#[derive(Default)]
pub struct MockTransactionLayer {
    pub sent: Mutex<Vec<Arc<SentRequest>>>,
    pub refuse: AtomicBool,
}

impl MockTransactionLayer {
    pub fn requests(&self) -> Vec<Request> {
        self.sent.lock().iter().map(|s| s.request.clone()).collect()
    }

    pub fn methods(&self) -> Vec<Method> {
        self.sent.lock().iter().map(|s| s.request.method.clone()).collect()
    }

    pub fn last(&self) -> Option<Arc<SentRequest>> {
        self.sent.lock().last().cloned()
    }

    pub fn last_of(&self, method: Method) -> Option<Arc<SentRequest>> {
        self.sent
            .lock()
            .iter()
            .rev()
            .find(|s| s.request.method == method)
            .cloned()
    }
}

impl TransactionLayer for MockTransactionLayer {
    fn begin_client_transaction(
        &self,
        request: Request,
        handler: Option<Arc<dyn ResponseHandler>>,
    ) -> LegResult<Arc<dyn ClientTransaction>> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(LegError::transaction("transport unavailable"));
        }
        let tr = Arc::new(MockClientTransaction::default());
        self.sent.lock().push(Arc::new(SentRequest {
            request,
            handler,
            tr: tr.clone(),
        }));
        Ok(tr)
    }
}

/// Server transaction collecting the responses sent on it
#[derive(Default)]
pub struct MockServerTransaction {
    pub responses: Mutex<Vec<(Response, bool)>>,
}

impl MockServerTransaction {
    pub fn codes(&self) -> Vec<u16> {
        self.responses.lock().iter().map(|(r, _)| r.code).collect()
    }

    pub fn last(&self) -> Option<(Response, bool)> {
        self.responses.lock().last().cloned()
    }
}

impl ServerTransaction for MockServerTransaction {
    fn send_response(&self, response: Response, expect_ack: bool) {
        self.responses.lock().push((response, expect_ack));
    }
}

struct ManualTimer {
    after: Duration,
    fire: Option<BoxFuture<'static, ()>>,
    cancelled: Arc<AtomicBool>,
}

struct ManualHandle(Arc<AtomicBool>);

impl TimerHandle for ManualHandle {
    fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Scheduler whose timers only fire when a test says so.
///
/// Timers are told apart by their delay: each kind uses a distinct duration
/// in [`test_config`], and a timer matches `d` when its delay lies in
/// `(d - 1s, d]` (the credit delay shrinks slightly with elapsed time).
#[derive(Default)]
pub struct ManualScheduler {
    timers: Mutex<Vec<ManualTimer>>,
}

fn matches_delay(after: Duration, wanted: Duration) -> bool {
    after <= wanted && after + Duration::from_secs(1) > wanted
}

impl ManualScheduler {
    /// Number of armed timers with delay `d`
    pub fn armed(&self, d: Duration) -> usize {
        self.timers
            .lock()
            .iter()
            .filter(|t| matches_delay(t.after, d) && t.fire.is_some() && !t.cancelled.load(Ordering::SeqCst))
            .count()
    }

    /// How many timers with delay `d` were ever scheduled
    pub fn scheduled(&self, d: Duration) -> usize {
        self.timers.lock().iter().filter(|t| matches_delay(t.after, d)).count()
    }

    fn take_fire(&self, d: Duration, cancelled: bool) -> Option<BoxFuture<'static, ()>> {
        let mut timers = self.timers.lock();
        let found = timers
            .iter_mut()
            .rev()
            .find(|t| matches_delay(t.after, d) && t.fire.is_some() && t.cancelled.load(Ordering::SeqCst) == cancelled)
            .and_then(|t| t.fire.take());
        found
    }

    /// Fire the most recent armed timer with delay `d`
    pub async fn fire(&self, d: Duration) -> bool {
        match self.take_fire(d, false) {
            Some(fire) => {
                fire.await;
                true
            }
            None => false,
        }
    }

    /// Fire a timer even though it was cancelled (a late firing)
    pub async fn fire_cancelled(&self, d: Duration) -> bool {
        match self.take_fire(d, true) {
            Some(fire) => {
                fire.await;
                true
            }
            None => false,
        }
    }
}

impl TimerScheduler for ManualScheduler {
    fn schedule(&self, after: Duration, fire: BoxFuture<'static, ()>) -> Box<dyn TimerHandle> {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.timers.lock().push(ManualTimer {
            after,
            fire: Some(fire),
            cancelled: cancelled.clone(),
        });
        Box::new(ManualHandle(cancelled))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Observed {
    Connect { origin: String },
    Disconnect { origin: String, code: u16 },
    Dead,
}

#[derive(Default)]
pub struct RecordingObserver {
    pub seen: Mutex<Vec<Observed>>,
}

impl RecordingObserver {
    pub fn seen(&self) -> Vec<Observed> {
        self.seen.lock().clone()
    }

    pub fn connects(&self) -> usize {
        self.seen().iter().filter(|o| matches!(o, Observed::Connect { .. })).count()
    }
}

impl LegObserver for RecordingObserver {
    fn on_connect(&self, _leg_id: &LegId, _rtime: Instant, origin: &str) {
        self.seen.lock().push(Observed::Connect {
            origin: origin.to_string(),
        });
    }

    fn on_disconnect(&self, _leg_id: &LegId, _rtime: Instant, origin: &str, code: u16) {
        self.seen.lock().push(Observed::Disconnect {
            origin: origin.to_string(),
            code,
        });
    }

    fn on_dead(&self, _leg_id: &LegId) {
        self.seen.lock().push(Observed::Dead);
    }
}

/// Hook answering according to a fixed policy and recording every change
pub struct RecordingHook {
    pub changes: Mutex<Vec<SdpChange>>,
    policy: HookPolicy,
}

pub enum HookPolicy {
    /// Replace the connection address synchronously
    Rewrite(&'static str),
    Defer,
    Reject,
}

impl RecordingHook {
    pub fn new(policy: HookPolicy) -> Arc<Self> {
        Arc::new(Self {
            changes: Mutex::new(Vec::new()),
            policy,
        })
    }

    pub fn last_id(&self) -> Option<SdpChangeId> {
        self.changes.lock().last().map(|c| c.id)
    }

    pub fn count(&self) -> usize {
        self.changes.lock().len()
    }
}

impl SdpChangeHook for RecordingHook {
    fn on_change(&self, change: SdpChange) -> LegResult<SdpHookReply> {
        let body = change.body.clone();
        self.changes.lock().push(change);
        match self.policy {
            HookPolicy::Rewrite(address) => Ok(SdpHookReply::Ready(body.with_connection_address(address)?)),
            HookPolicy::Defer => Ok(SdpHookReply::Deferred),
            HookPolicy::Reject => Err(LegError::sdp_hook("codec list rejected")),
        }
    }
}

/// A leg wired to recording collaborators
pub struct Harness {
    pub leg: CallLeg,
    pub events: mpsc::UnboundedReceiver<LegEvent>,
    pub transactions: Arc<MockTransactionLayer>,
    pub scheduler: Arc<ManualScheduler>,
    pub observer: Arc<RecordingObserver>,
    next_cseq: u32,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(test_config(), |b| b)
    }

    pub fn with_config(config: LegConfig) -> Self {
        Self::with(config, |b| b)
    }

    /// Build with the default collaborators plus builder customisation.
    /// The leg starts with local SDP 192.0.2.1 and remote SDP 192.0.2.4.
    pub fn with(config: LegConfig, customize: impl FnOnce(CallLegBuilder) -> CallLegBuilder) -> Self {
        init_test_logging();
        let transactions = Arc::new(MockTransactionLayer::default());
        let scheduler = Arc::new(ManualScheduler::default());
        let observer = Arc::new(RecordingObserver::default());

        let builder = CallLeg::builder(dialog(), transactions.clone())
            .with_config(config)
            .with_origin("callee")
            .with_local_sdp(sdp("192.0.2.1"))
            .with_remote_sdp(sdp("192.0.2.4"))
            .with_timer_scheduler(scheduler.clone())
            .with_observer(observer.clone());
        let (leg, events) = customize(builder).build().expect("leg builds");

        Self {
            leg,
            events,
            transactions,
            scheduler,
            observer,
            next_cseq: 100,
        }
    }

    /// In-dialog request from the peer with the next CSeq
    pub fn request(&mut self, method: Method) -> Request {
        self.next_cseq += 1;
        Request::new(method, "sip:b2bua@192.0.2.1:5060")
            .with_call_id(CALL_ID)
            .with_cseq(self.next_cseq)
    }

    /// Deliver a request, returning the server transaction it was answered on
    pub async fn send(&self, request: Request) -> Arc<MockServerTransaction> {
        let tx = Arc::new(MockServerTransaction::default());
        self.leg.recv_request(request, tx.clone()).await;
        tx
    }

    pub async fn ack(&mut self, body: Option<MsgBody>) {
        let mut ack = self.request(Method::Ack);
        ack.body = body;
        self.leg.recv_ack(ack).await;
    }

    /// Events enqueued to call control so far
    pub fn drain_events(&mut self) -> Vec<CallEvent> {
        let mut out = Vec::new();
        while let Ok(LegEvent { event, .. }) = self.events.try_recv() {
            out.push(event);
        }
        out
    }

    pub async fn state(&self) -> &'static str {
        self.leg.state_name().await
    }

    pub async fn snapshot(&self) -> LegSnapshot {
        self.leg.snapshot().await
    }
}

pub fn event_names(events: &[CallEvent]) -> Vec<&'static str> {
    events.iter().map(|e| e.name()).collect()
}

pub fn now() -> Instant {
    Instant::now()
}
