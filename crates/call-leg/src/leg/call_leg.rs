//! Call leg handle and its dispatch core

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Instant;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use super::context::LegContext;
use super::dialog::LegDialog;
use super::observer::{LegObserver, NoopObserver};
use super::LegId;
use crate::config::LegConfig;
use crate::errors::{LegError, LegResult};
use crate::events::{CallEvent, LegEvent};
use crate::message::{Method, Request, Response, SipAddress};
use crate::sdp::{MsgBody, SdpChangeHook, SdpChangeId, SdpDirection};
use crate::state::{Connected, Dead, LegState};
use crate::timer::{LegTimers, TimerKind, TimerScheduler, TokioTimerScheduler};
use crate::transaction::handlers::ResponseRoute;
use crate::transaction::{ClientTransaction, ServerTransaction, TransactionLayer};

/// One unit of work for a leg
enum LegInput {
    Request(Request, Arc<dyn ServerTransaction>),
    Event(CallEvent),
    Ack(Request),
    Response(ResponseRoute, Response),
    Timer(TimerKind, u64),
}

impl LegInput {
    fn describe(&self) -> String {
        match self {
            LegInput::Request(req, _) => format!("{} request", req.method),
            LegInput::Event(event) => format!("event {}", event),
            LegInput::Ack(_) => "ACK".to_string(),
            LegInput::Response(route, resp) => format!("{} response ({:?})", resp.code, route),
            LegInput::Timer(kind, _) => format!("{} timer", kind),
        }
    }
}

/// State machine plus context, guarded by the leg lock
struct LegCore {
    ctx: LegContext,
    state: LegState,
    /// Inputs received while an SDP hook is pending
    backlog: VecDeque<LegInput>,
}

impl LegCore {
    fn submit(&mut self, input: LegInput) {
        if self.state.is_dead() {
            debug!(leg = %self.ctx.id, "dead leg dropped {}", input.describe());
            return;
        }
        if self.ctx.pending_sdp.is_some() {
            self.backlog_input(input);
            return;
        }
        self.process(input);
        self.drain();
    }

    /// Hold input until the pending SDP change completes. Peer requests
    /// beyond `max_backlog` are refused with 503 and retransmitted ACKs
    /// dropped; call-control events, responses and timers are always kept.
    fn backlog_input(&mut self, input: LegInput) {
        let held = self
            .backlog
            .iter()
            .filter(|queued| matches!(queued, LegInput::Request(..) | LegInput::Ack(_)))
            .count();
        if held >= self.ctx.config.max_backlog {
            match input {
                LegInput::Request(request, tx) => {
                    warn!(leg = %self.ctx.id, "backlog full, refusing {} request", request.method);
                    self.ctx
                        .respond(tx.as_ref(), &request, 503, "Service Unavailable", None);
                    return;
                }
                LegInput::Ack(_) => {
                    warn!(leg = %self.ctx.id, "backlog full, dropping ACK");
                    return;
                }
                _ => {}
            }
        }
        debug!(leg = %self.ctx.id, "suspended on SDP change, backlogging {}", input.describe());
        self.backlog.push_back(input);
    }

    /// Run self-delivered events, then backlogged input, until suspended or idle
    fn drain(&mut self) {
        loop {
            if self.state.is_dead() {
                self.backlog.clear();
                return;
            }
            if self.ctx.pending_sdp.is_some() {
                return;
            }
            if let Some(event) = self.ctx.self_queue.pop_front() {
                self.process(LegInput::Event(event));
                continue;
            }
            match self.backlog.pop_front() {
                Some(input) => self.process(input),
                None => return,
            }
        }
    }

    fn process(&mut self, input: LegInput) {
        let ctx = &mut self.ctx;
        let next = match input {
            LegInput::Request(request, tx) => {
                if let Err(e) = ctx.dialog.update_remote_sequence(&request) {
                    warn!(leg = %ctx.id, "{}", e);
                    ctx.respond(tx.as_ref(), &request, 500, "Server Internal Error", None);
                    return;
                }
                self.state.recv_request(ctx, request, tx)
            }
            LegInput::Event(event) => {
                let name = event.name();
                match self.state.recv_event(ctx, event) {
                    Ok(next) => next,
                    Err(e) => {
                        error!(leg = %ctx.id, "{}: error handling {} event: {}", self.state.name(), name, e);
                        None
                    }
                }
            }
            LegInput::Ack(ack) => {
                self.state.recv_ack(ctx, ack);
                None
            }
            LegInput::Response(ResponseRoute::Reinvite, response) => self.state.recv_response(ctx, response),
            LegInput::Response(ResponseRoute::Keepalive, response) => {
                self.state.keepalive_response(ctx, response);
                None
            }
            LegInput::Response(ResponseRoute::Transfer, response) => {
                transfer_outcome(ctx, &response);
                None
            }
            LegInput::Timer(kind, generation) => self.timer_fired(kind, generation),
        };

        if let Some(next) = next {
            self.change_state(next);
        }
    }

    fn timer_fired(&mut self, kind: TimerKind, generation: u64) -> Option<LegState> {
        let ctx = &mut self.ctx;
        if !ctx.timers.take_if_current(kind, generation) {
            debug!(leg = %ctx.id, "stale {} timer ignored", kind);
            return None;
        }
        match kind {
            TimerKind::Expire => {
                warn!(leg = %ctx.id, "{}: no ACK/answer before expire timeout", self.state.name());
                ctx.disconnect_now(Instant::now());
                None
            }
            TimerKind::Credit => {
                info!(leg = %ctx.id, "credit time exhausted");
                ctx.disconnect_now(Instant::now());
                None
            }
            TimerKind::Keepalive => {
                self.state.keepalive_tick(ctx);
                None
            }
            TimerKind::Linger => self
                .state
                .is_disconnected()
                .then(|| LegState::Dead(Dead)),
        }
    }

    fn change_state(&mut self, next: LegState) {
        self.state.on_state_change(&mut self.ctx);
        let previous = std::mem::replace(&mut self.state, next);
        info!(leg = %self.ctx.id, "{} -> {}", previous.name(), self.state.name());
        self.state.on_activation(&mut self.ctx);
    }

    fn complete_sdp_change(&mut self, id: SdpChangeId, result: LegResult<MsgBody>) -> bool {
        let Some(pending) = self.ctx.pending_sdp.take_if(|p| p.id == id) else {
            warn!(leg = %self.ctx.id, "no pending SDP change {}", id);
            return false;
        };
        debug!(leg = %self.ctx.id, "SDP change {} completed", id);

        if self.state.is_dead() {
            return true;
        }
        match result {
            Ok(body) => self.ctx.resume_sdp_change(pending.continuation, body),
            Err(e) => self.ctx.report_malformed_sdp(Instant::now(), e),
        }
        self.drain();
        true
    }
}

/// Any final response to our REFER ends the dialog with a BYE
fn transfer_outcome(ctx: &mut LegContext, response: &Response) {
    if response.is_provisional() {
        return;
    }
    debug!(leg = %ctx.id, "REFER answered with {}, sending BYE", response.code);
    if let Err(e) = ctx.send_request(Method::Bye, None, &[], None, |_| {}) {
        error!(leg = %ctx.id, "cannot send BYE after REFER: {}", e);
    }
}

/// Point-in-time view of a leg
#[derive(Debug, Clone)]
pub struct LegSnapshot {
    pub state: &'static str,
    pub local_sdp: Option<MsgBody>,
    pub remote_sdp: Option<MsgBody>,
    pub local_cseq: u32,
    pub remote_cseq: Option<u32>,
    pub has_pending_transaction: bool,
    pub redirect_target: Option<SipAddress>,
    pub connect_ts: Option<Instant>,
    pub disconnect_ts: Option<Instant>,
    /// When the credit timer runs out, fixed on its first start
    pub credit_deadline: Option<Instant>,
    /// Direction of the SDP change the leg is suspended on
    pub pending_sdp_change: Option<(SdpChangeId, SdpDirection)>,
    pub backlog_len: usize,
}

/// Handle on one call leg
#[derive(Clone)]
pub struct CallLeg {
    id: LegId,
    core: Arc<Mutex<LegCore>>,
}

/// Non-owning handle, used by timers and response handlers
#[derive(Clone)]
pub struct WeakCallLeg {
    id: LegId,
    core: Weak<Mutex<LegCore>>,
}

impl WeakCallLeg {
    pub fn id(&self) -> LegId {
        self.id
    }

    pub fn upgrade(&self) -> Option<CallLeg> {
        self.core.upgrade().map(|core| CallLeg { id: self.id, core })
    }
}

impl std::fmt::Debug for CallLeg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallLeg").field("id", &self.id).finish()
    }
}

impl CallLeg {
    /// Start building a leg for an established dialog
    pub fn builder(dialog: LegDialog, transactions: Arc<dyn TransactionLayer>) -> CallLegBuilder {
        CallLegBuilder::new(dialog, transactions)
    }

    pub fn id(&self) -> LegId {
        self.id
    }

    pub fn downgrade(&self) -> WeakCallLeg {
        WeakCallLeg {
            id: self.id,
            core: Arc::downgrade(&self.core),
        }
    }

    async fn submit(&self, input: LegInput) {
        self.core.lock().await.submit(input);
    }

    /// Inbound in-dialog request (anything but ACK and CANCEL)
    pub async fn recv_request(&self, request: Request, tx: Arc<dyn ServerTransaction>) {
        self.submit(LegInput::Request(request, tx)).await;
    }

    /// Instruction from call control
    pub async fn recv_event(&self, event: CallEvent) {
        self.submit(LegInput::Event(event)).await;
    }

    /// ACK for a 2xx sent with `expect_ack`
    pub async fn recv_ack(&self, ack: Request) {
        self.submit(LegInput::Ack(ack)).await;
    }

    /// Resume a leg suspended on a deferred SDP hook.
    ///
    /// Returns `false` when `id` is not the change the leg is waiting for.
    pub async fn complete_sdp_change(&self, id: SdpChangeId, result: LegResult<MsgBody>) -> bool {
        self.core.lock().await.complete_sdp_change(id, result)
    }

    /// Tear the leg down as if call control sent Disconnect
    pub async fn disconnect(&self, origin: impl Into<String>) {
        self.recv_event(CallEvent::disconnect(None, Instant::now(), origin)).await;
    }

    pub(crate) async fn handle_response(&self, route: ResponseRoute, response: Response) {
        self.submit(LegInput::Response(route, response)).await;
    }

    pub(crate) async fn timer_fired(&self, kind: TimerKind, generation: u64) {
        self.submit(LegInput::Timer(kind, generation)).await;
    }

    pub async fn state_name(&self) -> &'static str {
        self.core.lock().await.state.name()
    }

    pub async fn is_dead(&self) -> bool {
        self.core.lock().await.state.is_dead()
    }

    pub async fn snapshot(&self) -> LegSnapshot {
        let core = self.core.lock().await;
        let ctx = &core.ctx;
        LegSnapshot {
            state: core.state.name(),
            local_sdp: ctx.local_sdp.clone(),
            remote_sdp: ctx.remote_sdp.clone(),
            local_cseq: ctx.dialog.local_cseq,
            remote_cseq: ctx.dialog.remote_cseq,
            has_pending_transaction: ctx.pending_tr.is_some(),
            redirect_target: ctx.redirect_target.clone(),
            connect_ts: ctx.connect_ts,
            disconnect_ts: ctx.disconnect_ts,
            credit_deadline: ctx.credit_deadline,
            pending_sdp_change: ctx.pending_sdp.as_ref().map(|p| (p.id, p.direction)),
            backlog_len: core.backlog.len(),
        }
    }
}

/// Builder for [`CallLeg`]
pub struct CallLegBuilder {
    id: LegId,
    dialog: LegDialog,
    transactions: Arc<dyn TransactionLayer>,
    config: Arc<LegConfig>,
    origin: String,
    local_sdp: Option<MsgBody>,
    remote_sdp: Option<MsgBody>,
    scheduler: Option<Arc<dyn TimerScheduler>>,
    observer: Arc<dyn LegObserver>,
    local_sdp_hook: Option<Arc<dyn SdpChangeHook>>,
    remote_sdp_hook: Option<Arc<dyn SdpChangeHook>>,
    pending_tr: Option<Arc<dyn ClientTransaction>>,
    connected_at: Option<Instant>,
}

impl CallLegBuilder {
    pub fn new(dialog: LegDialog, transactions: Arc<dyn TransactionLayer>) -> Self {
        Self {
            id: LegId::new(),
            dialog,
            transactions,
            config: Arc::new(LegConfig::default()),
            origin: "caller".to_string(),
            local_sdp: None,
            remote_sdp: None,
            scheduler: None,
            observer: Arc::new(NoopObserver),
            local_sdp_hook: None,
            remote_sdp_hook: None,
            pending_tr: None,
            connected_at: None,
        }
    }

    pub fn with_id(mut self, id: LegId) -> Self {
        self.id = id;
        self
    }

    pub fn with_config(mut self, config: LegConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    pub fn with_shared_config(mut self, config: Arc<LegConfig>) -> Self {
        self.config = config;
        self
    }

    /// Origin label stamped on events this leg produces
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn with_local_sdp(mut self, body: MsgBody) -> Self {
        self.local_sdp = Some(body);
        self
    }

    pub fn with_remote_sdp(mut self, body: MsgBody) -> Self {
        self.remote_sdp = Some(body);
        self
    }

    pub fn with_timer_scheduler(mut self, scheduler: Arc<dyn TimerScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn LegObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_local_sdp_hook(mut self, hook: Arc<dyn SdpChangeHook>) -> Self {
        self.local_sdp_hook = Some(hook);
        self
    }

    pub fn with_remote_sdp_hook(mut self, hook: Arc<dyn SdpChangeHook>) -> Self {
        self.remote_sdp_hook = Some(hook);
        self
    }

    /// Start with a 2xx whose ACK waits for call control's answer
    pub fn with_pending_ack(mut self, tr: Arc<dyn ClientTransaction>) -> Self {
        self.pending_tr = Some(tr);
        self
    }

    /// Fire the connect callback when the leg starts
    pub fn connected_at(mut self, rtime: Instant) -> Self {
        self.connected_at = Some(rtime);
        self
    }

    /// Create the leg in the Connected state.
    ///
    /// Without an explicit scheduler the leg uses the current tokio runtime.
    pub fn build(self) -> LegResult<(CallLeg, mpsc::UnboundedReceiver<LegEvent>)> {
        self.config.validate()?;
        let scheduler: Arc<dyn TimerScheduler> = match self.scheduler {
            Some(scheduler) => scheduler,
            None => Arc::new(TokioTimerScheduler::current()?),
        };
        if self.dialog.call_id.is_empty() {
            return Err(LegError::config("leg dialog has no Call-ID"));
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let id = self.id;
        let origin = self.origin;
        let connected_at = self.connected_at;
        let has_pending_ack = self.pending_tr.is_some();

        let core = Arc::new_cyclic(|weak: &Weak<Mutex<LegCore>>| {
            let ctx = LegContext {
                id,
                config: self.config,
                dialog: self.dialog,
                origin: origin.clone(),
                local_sdp: self.local_sdp,
                remote_sdp: self.remote_sdp,
                pending_tr: self.pending_tr,
                client_tr: None,
                uas_tr: None,
                redirect_target: None,
                connect_ts: connected_at,
                disconnect_ts: None,
                credit_deadline: None,
                timers: LegTimers::new(),
                transactions: self.transactions,
                scheduler,
                observer: self.observer,
                local_sdp_hook: self.local_sdp_hook,
                remote_sdp_hook: self.remote_sdp_hook,
                events_tx,
                self_queue: VecDeque::new(),
                pending_sdp: None,
                next_sdp_change: 0,
                handle: WeakCallLeg {
                    id,
                    core: weak.clone(),
                },
            };
            let mut core = LegCore {
                ctx,
                state: LegState::Connected(Connected::new(connected_at, origin)),
                backlog: VecDeque::new(),
            };
            if has_pending_ack {
                core.ctx.start_expire_timer();
            }
            if let Some(rtime) = connected_at {
                core.ctx.start_credit_timer(rtime);
            }
            core.state.on_activation(&mut core.ctx);
            Mutex::new(core)
        });

        info!(leg = %id, "call leg created");
        Ok((CallLeg { id, core }, events_rx))
    }
}
