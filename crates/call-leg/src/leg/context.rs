//! Mutable leg state shared by every [`UaState`](crate::state::UaState)
//!
//! State structs hold only what is private to one state; everything that
//! survives transitions (dialog, SDP snapshots, pending transactions, timers,
//! the outbound event channel) lives here.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::call_leg::WeakCallLeg;
use super::dialog::LegDialog;
use super::observer::LegObserver;
use super::LegId;
use crate::config::LegConfig;
use crate::errors::LegResult;
use crate::events::{CallEvent, LegEvent};
use crate::message::{Header, Method, Request, SipAddress};
use crate::sdp::hooks::SdpContinuation;
use crate::sdp::{
    MsgBody, PendingSdpChange, SdpChange, SdpChangeHook, SdpChangeId, SdpDirection, SdpHookReply,
};
use crate::timer::{LegTimers, TimerKind, TimerScheduler};
use crate::transaction::handlers::{LegResponseHandler, ResponseRoute};
use crate::transaction::{ClientTransaction, ResponseHandler, ServerTransaction, TransactionLayer};

pub(crate) const MALFORMED_SDP: &str = "Malformed SDP Body";

/// An inbound INVITE the leg has not answered yet
pub(crate) struct UasTransaction {
    pub(crate) request: Request,
    pub(crate) tx: Arc<dyn ServerTransaction>,
}

/// Leg data visible to state handlers
pub struct LegContext {
    pub(crate) id: LegId,
    pub(crate) config: Arc<LegConfig>,
    pub(crate) dialog: LegDialog,
    /// Label used as origin of events the leg produces itself
    pub(crate) origin: String,
    pub(crate) local_sdp: Option<MsgBody>,
    pub(crate) remote_sdp: Option<MsgBody>,
    /// Client INVITE whose 2xx ACK waits for call control's answer
    pub(crate) pending_tr: Option<Arc<dyn ClientTransaction>>,
    /// Outstanding re-INVITE we sent
    pub(crate) client_tr: Option<Arc<dyn ClientTransaction>>,
    /// Outstanding re-INVITE we received
    pub(crate) uas_tr: Option<UasTransaction>,
    pub(crate) redirect_target: Option<SipAddress>,
    pub(crate) connect_ts: Option<Instant>,
    pub(crate) disconnect_ts: Option<Instant>,
    pub(crate) credit_deadline: Option<Instant>,
    pub(crate) timers: LegTimers,
    pub(crate) transactions: Arc<dyn TransactionLayer>,
    pub(crate) scheduler: Arc<dyn TimerScheduler>,
    pub(crate) observer: Arc<dyn LegObserver>,
    pub(crate) local_sdp_hook: Option<Arc<dyn SdpChangeHook>>,
    pub(crate) remote_sdp_hook: Option<Arc<dyn SdpChangeHook>>,
    pub(crate) events_tx: mpsc::UnboundedSender<LegEvent>,
    /// Events the leg delivers to itself once the current handler returns
    pub(crate) self_queue: VecDeque<CallEvent>,
    pub(crate) pending_sdp: Option<PendingSdpChange>,
    pub(crate) next_sdp_change: u64,
    pub(crate) handle: WeakCallLeg,
}

impl LegContext {
    pub fn id(&self) -> LegId {
        self.id
    }

    pub fn config(&self) -> &LegConfig {
        &self.config
    }

    pub fn local_sdp(&self) -> Option<&MsgBody> {
        self.local_sdp.as_ref()
    }

    pub fn remote_sdp(&self) -> Option<&MsgBody> {
        self.remote_sdp.as_ref()
    }

    /// Hand an event to call control
    pub(crate) fn enqueue(&self, event: CallEvent) {
        debug!(leg = %self.id, "enqueue {}", event);
        if self
            .events_tx
            .send(LegEvent {
                leg_id: self.id,
                event,
            })
            .is_err()
        {
            warn!(leg = %self.id, "call control channel closed, event dropped");
        }
    }

    /// Queue an event for this leg, processed after the current handler
    pub(crate) fn deliver_to_self(&mut self, event: CallEvent) {
        self.self_queue.push_back(event);
    }

    /// Report a disconnect to call control and tear the leg down
    pub(crate) fn disconnect_now(&mut self, rtime: Instant) {
        let origin = self.origin.clone();
        self.enqueue(CallEvent::disconnect(None, rtime, origin.clone()));
        self.deliver_to_self(CallEvent::disconnect(None, rtime, origin));
    }

    pub(crate) fn gen_request(
        &self,
        method: Method,
        body: Option<MsgBody>,
        extra_headers: &[Header],
    ) -> LegResult<Request> {
        self.dialog
            .gen_request(method, body, extra_headers, self.config.max_forwards)
    }

    pub(crate) fn inc_local_cseq(&mut self) {
        self.dialog.inc_local_cseq();
    }

    pub(crate) fn begin_transaction(
        &self,
        request: Request,
        route: Option<ResponseRoute>,
    ) -> LegResult<Arc<dyn ClientTransaction>> {
        let handler = route.map(|route| {
            Arc::new(LegResponseHandler::new(self.handle.clone(), route)) as Arc<dyn ResponseHandler>
        });
        self.transactions.begin_client_transaction(request, handler)
    }

    /// Generate, send and commit a request whose outcome the leg ignores.
    ///
    /// Generation errors propagate; transaction start failures are logged.
    pub(crate) fn send_request(
        &mut self,
        method: Method,
        body: Option<MsgBody>,
        extra_headers: &[Header],
        route: Option<ResponseRoute>,
        customize: impl FnOnce(&mut Request),
    ) -> LegResult<()> {
        let mut request = self.gen_request(method, body, extra_headers)?;
        customize(&mut request);
        self.inc_local_cseq();
        let method = request.method.clone();
        if let Err(e) = self.begin_transaction(request, route) {
            warn!(leg = %self.id, "failed to start {} transaction: {}", method, e);
        }
        Ok(())
    }

    /// Answer an inbound request
    pub(crate) fn respond(
        &self,
        tx: &dyn ServerTransaction,
        request: &Request,
        code: u16,
        reason: &str,
        body: Option<MsgBody>,
    ) {
        self.respond_with_ack(tx, request, code, reason, body, false);
    }

    pub(crate) fn respond_with_ack(
        &self,
        tx: &dyn ServerTransaction,
        request: &Request,
        code: u16,
        reason: &str,
        body: Option<MsgBody>,
        expect_ack: bool,
    ) {
        let response = request.gen_response(code, reason, body, self.config.server_header.as_deref());
        tx.send_response(response, expect_ack);
    }

    /// Answer the outstanding inbound re-INVITE, if any
    pub(crate) fn respond_uas(&mut self, code: u16, reason: &str, body: Option<MsgBody>, expect_ack: bool) {
        match self.uas_tr.take() {
            Some(uas) => {
                self.respond_with_ack(uas.tx.as_ref(), &uas.request, code, reason, body, expect_ack)
            }
            None => debug!(leg = %self.id, "no inbound re-INVITE to answer with {}", code),
        }
    }

    /// Send the held-back ACK, if any
    pub(crate) fn flush_pending_ack(&mut self) {
        if let Some(tr) = self.pending_tr.take() {
            if let Err(e) = tr.send_ack() {
                warn!(leg = %self.id, "failed to send pending ACK: {}", e);
            }
        }
    }

    pub(crate) fn cancel_client_transaction(&mut self) {
        if let Some(tr) = self.client_tr.take() {
            tr.cancel();
        }
    }

    pub(crate) fn fire_connect(&self, rtime: Instant, origin: &str) {
        self.observer.on_connect(&self.id, rtime, origin);
    }

    pub(crate) fn start_timer(&mut self, kind: TimerKind, after: Duration) {
        let generation = self.timers.next_generation();
        let leg = self.handle.clone();
        let fire = Box::pin(async move {
            if let Some(leg) = leg.upgrade() {
                leg.timer_fired(kind, generation).await;
            }
        });
        let handle = self.scheduler.schedule(after, fire);
        self.timers.arm(kind, generation, handle);
        debug!(leg = %self.id, "{} timer armed for {:?}", kind, after);
    }

    pub(crate) fn cancel_timer(&mut self, kind: TimerKind) {
        if self.timers.cancel(kind) {
            debug!(leg = %self.id, "{} timer cancelled", kind);
        }
    }

    pub(crate) fn start_expire_timer(&mut self) {
        let after = self.config.expire_timeout();
        self.start_timer(TimerKind::Expire, after);
    }

    pub(crate) fn cancel_expire_timer(&mut self) {
        self.cancel_timer(TimerKind::Expire);
    }

    /// Arm the credit timer to fire `credit_time` after the first connect.
    /// Later starts (ACKs of re-INVITEs) re-arm against the same deadline.
    pub(crate) fn start_credit_timer(&mut self, rtime: Instant) {
        if let Some(credit) = self.config.credit_time() {
            let deadline = *self.credit_deadline.get_or_insert(rtime + credit);
            let after = deadline.saturating_duration_since(Instant::now());
            self.start_timer(TimerKind::Credit, after);
        }
    }

    pub(crate) fn cancel_credit_timer(&mut self) {
        self.cancel_timer(TimerKind::Credit);
    }

    pub(crate) fn start_keepalive_timer(&mut self) {
        if let Some(interval) = self.config.keepalive_interval() {
            self.start_timer(TimerKind::Keepalive, interval);
        }
    }

    pub(crate) fn has_local_sdp_hook(&self) -> bool {
        self.local_sdp_hook.is_some()
    }

    pub(crate) fn has_remote_sdp_hook(&self) -> bool {
        self.remote_sdp_hook.is_some()
    }

    fn next_change_id(&mut self) -> SdpChangeId {
        self.next_sdp_change += 1;
        SdpChangeId(self.next_sdp_change)
    }

    /// Pass a locally produced body through the local hook. The event is
    /// delivered again with the processed body, now or once the hook
    /// completes.
    pub(crate) fn on_local_sdp_change(&mut self, body: &MsgBody, event: CallEvent) -> LegResult<()> {
        let Some(hook) = self.local_sdp_hook.clone() else {
            let mut event = event;
            event.set_body(Some(body.clone().with_needs_update(false)));
            self.deliver_to_self(event);
            return Ok(());
        };
        let id = self.next_change_id();
        let change = SdpChange {
            id,
            leg_id: self.id,
            direction: SdpDirection::Local,
            body: body.clone(),
        };
        match hook.on_change(change)? {
            SdpHookReply::Ready(processed) => {
                self.resume_sdp_change(SdpContinuation::Redeliver(event), processed);
            }
            SdpHookReply::Deferred => {
                debug!(leg = %self.id, "local SDP change {} deferred", id);
                self.pending_sdp = Some(PendingSdpChange {
                    id,
                    direction: SdpDirection::Local,
                    continuation: SdpContinuation::Redeliver(event),
                });
            }
        }
        Ok(())
    }

    /// Pass a body received from the peer through the remote hook. The
    /// processed body becomes the remote SDP and `event` goes to call control.
    pub(crate) fn on_remote_sdp_change(&mut self, body: &MsgBody, event: CallEvent) -> LegResult<()> {
        let Some(hook) = self.remote_sdp_hook.clone() else {
            self.delayed_remote_sdp_update(event, body.clone());
            return Ok(());
        };
        let id = self.next_change_id();
        let change = SdpChange {
            id,
            leg_id: self.id,
            direction: SdpDirection::Remote,
            body: body.clone(),
        };
        match hook.on_change(change)? {
            SdpHookReply::Ready(processed) => {
                self.resume_sdp_change(SdpContinuation::RemoteUpdate(event), processed);
            }
            SdpHookReply::Deferred => {
                debug!(leg = %self.id, "remote SDP change {} deferred", id);
                self.pending_sdp = Some(PendingSdpChange {
                    id,
                    direction: SdpDirection::Remote,
                    continuation: SdpContinuation::RemoteUpdate(event),
                });
            }
        }
        Ok(())
    }

    pub(crate) fn resume_sdp_change(&mut self, continuation: SdpContinuation, body: MsgBody) {
        match continuation {
            SdpContinuation::Redeliver(mut event) => {
                event.set_body(Some(body.with_needs_update(false)));
                self.deliver_to_self(event);
            }
            SdpContinuation::RemoteUpdate(event) => self.delayed_remote_sdp_update(event, body),
        }
    }

    /// Adopt a processed remote body and forward the event carrying it
    pub(crate) fn delayed_remote_sdp_update(&mut self, mut event: CallEvent, body: MsgBody) {
        self.remote_sdp = Some(body.clone());
        event.set_body(Some(body));
        self.enqueue(event);
    }

    /// Report a body rejected by a hook
    pub(crate) fn report_malformed_sdp(&self, rtime: Instant, error: impl std::fmt::Display) {
        warn!(leg = %self.id, "SDP hook rejected body: {}", error);
        self.enqueue(
            CallEvent::fail(400, MALFORMED_SDP, rtime, self.origin.clone()).with_warning(error.to_string()),
        );
    }
}
