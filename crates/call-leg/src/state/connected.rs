//! Connected state
//!
//! The steady state of an established call. Handles inbound in-dialog
//! requests (REFER, re-INVITE, BYE, INFO, OPTIONS, UPDATE), call-control
//! instructions (teardown, re-offer, INFO, answer to a late offer), the ACK
//! for a 2xx we sent, and the keepalive probe.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use super::{recv_bye, recv_info, send_teardown, Disconnected, LegState, UaState, UacUpdating, UasUpdating};
use crate::errors::LegResult;
use crate::events::{CallEvent, CallEventKind};
use crate::leg::context::UasTransaction;
use crate::leg::LegContext;
use crate::message::{Header, Method, Request, Response};
use crate::sdp::HOLD_ADDRESS;
use crate::timer::TimerKind;
use crate::transaction::handlers::ResponseRoute;
use crate::transaction::{ClientTransaction, ServerTransaction};

pub struct Connected {
    /// Outstanding keepalive OPTIONS
    ka_tr: Option<Arc<dyn ClientTransaction>>,
    /// When set, the connect callback fires on activation
    rtime: Option<Instant>,
    origin: String,
}

impl Connected {
    pub fn new(rtime: Option<Instant>, origin: impl Into<String>) -> Self {
        Self {
            ka_tr: None,
            rtime,
            origin: origin.into(),
        }
    }

    fn recv_refer(
        &mut self,
        ctx: &mut LegContext,
        request: Request,
        tx: Arc<dyn ServerTransaction>,
    ) -> Option<LegState> {
        let Some(refer_to) = request.refer_to() else {
            ctx.respond(tx.as_ref(), &request, 400, "Bad Request", None);
            return None;
        };
        ctx.respond(tx.as_ref(), &request, 202, "Accepted", None);

        let target = match refer_to.body() {
            Ok(target) => target,
            Err(e) => {
                error!(leg = %ctx.id, "Connected: error parsing Refer-To: {}", e);
                return None;
            }
        };
        info!(leg = %ctx.id, "transfer requested to {}", target.uri());

        ctx.enqueue(CallEvent::disconnect(Some(target), request.rtime, ctx.origin.clone()));
        ctx.deliver_to_self(CallEvent::disconnect(None, request.rtime, ctx.origin.clone()));
        None
    }

    fn recv_reinvite(
        &mut self,
        ctx: &mut LegContext,
        request: Request,
        tx: Arc<dyn ServerTransaction>,
    ) -> Option<LegState> {
        ctx.respond(tx.as_ref(), &request, 100, "Trying", None);

        let body = match &request.body {
            // Body-less re-INVITE used as a hold request: offer our view of
            // the peer's session with a null connection address.
            None => {
                let Some(remote) = ctx.remote_sdp.as_ref() else {
                    error!(leg = %ctx.id, "Connected: body-less re-INVITE without remote SDP");
                    return None;
                };
                match remote.with_connection_address(HOLD_ADDRESS) {
                    Ok(body) => body,
                    Err(e) => {
                        error!(leg = %ctx.id, "Connected: cannot build hold offer: {}", e);
                        return None;
                    }
                }
            }
            Some(body) => {
                if ctx.remote_sdp.as_ref().is_some_and(|remote| remote.same_text(body)) {
                    debug!(leg = %ctx.id, "re-INVITE with unchanged SDP, answering locally");
                    let answer = ctx.local_sdp.clone();
                    ctx.respond(tx.as_ref(), &request, 200, "OK", answer);
                    return None;
                }
                body.clone()
            }
        };

        let event = CallEvent::update(
            Some(body.clone()),
            request.max_forwards().cloned(),
            request.rtime,
            ctx.origin.clone(),
        )
        .with_reason(request.reason());
        let rtime = request.rtime;
        ctx.uas_tr = Some(UasTransaction { request, tx });

        if ctx.has_remote_sdp_hook() {
            if let Err(e) = ctx.on_remote_sdp_change(&body, event) {
                ctx.report_malformed_sdp(rtime, e);
            }
        } else {
            ctx.remote_sdp = Some(body);
            ctx.enqueue(event);
        }
        Some(LegState::UasUpdating(UasUpdating::new()))
    }

    fn send_update(&mut self, ctx: &mut LegContext, event: CallEvent) -> LegResult<Option<LegState>> {
        let CallEventKind::Update { body, max_forwards } = &event.kind else {
            return Ok(None);
        };

        if let (Some(local), Some(body)) = (ctx.local_sdp.as_ref(), body.as_ref()) {
            if local.same_text(body) {
                debug!(leg = %ctx.id, "update with unchanged SDP, answering locally");
                ctx.enqueue(CallEvent::connect(
                    200,
                    "OK",
                    ctx.remote_sdp.clone(),
                    event.rtime,
                    event.origin.clone(),
                ));
                return Ok(None);
            }
        }

        if let Some(body) = body.as_ref().filter(|b| b.needs_update() && ctx.has_local_sdp_hook()) {
            let body = body.clone();
            let rtime = event.rtime;
            if let Err(e) = ctx.on_local_sdp_change(&body, event) {
                ctx.report_malformed_sdp(rtime, e);
            }
            return Ok(None);
        }

        let mut extra_headers = event.extra_headers.clone();
        if let Some(max_forwards) = max_forwards {
            let hops = max_forwards.body()?;
            if hops <= 0 {
                ctx.enqueue(CallEvent::fail(483, "Too Many Hops", event.rtime, ctx.origin.clone()));
                return Ok(None);
            }
            extra_headers.push(Header::max_forwards(hops - 1));
        }

        let request = ctx.gen_request(Method::Invite, body.clone(), &extra_headers)?;
        let tr = ctx.begin_transaction(request, Some(ResponseRoute::Reinvite))?;
        ctx.inc_local_cseq();
        ctx.local_sdp = body.clone();
        ctx.client_tr = Some(tr);
        Ok(Some(LegState::UacUpdating(UacUpdating::new(body.is_some()))))
    }

    fn send_info(&mut self, ctx: &mut LegContext, event: &CallEvent) -> LegResult<Option<LegState>> {
        let body = event.body().cloned();
        ctx.send_request(Method::Info, None, &event.extra_headers, None, |req| req.set_body(body))?;
        Ok(None)
    }

    /// Call control's answer to a late-offer 2xx: complete the held ACK
    fn answer_late_offer(&mut self, ctx: &mut LegContext, event: CallEvent) -> LegResult<Option<LegState>> {
        ctx.cancel_expire_timer();

        let body = event.body().cloned();
        if let Some(b) = body.as_ref().filter(|b| b.needs_update() && ctx.has_local_sdp_hook()) {
            let b = b.clone();
            let rtime = event.rtime;
            if let Err(e) = ctx.on_local_sdp_change(&b, event) {
                ctx.report_malformed_sdp(rtime, e);
            }
            return Ok(None);
        }

        ctx.start_credit_timer(event.rtime);
        ctx.connect_ts = Some(event.rtime);
        ctx.local_sdp = body.clone();
        if let Some(tr) = ctx.pending_tr.take() {
            tr.set_ack_body(body);
            if let Err(e) = tr.send_ack() {
                warn!(leg = %ctx.id, "failed to send ACK: {}", e);
            }
        }
        let origin = ctx.origin.clone();
        ctx.fire_connect(event.rtime, &origin);
        Ok(None)
    }
}

impl UaState for Connected {
    fn name(&self) -> &'static str {
        "Connected"
    }

    fn on_activation(&mut self, ctx: &mut LegContext) {
        if let Some(rtime) = self.rtime {
            ctx.fire_connect(rtime, &self.origin);
        }
        if !ctx.timers.is_armed(TimerKind::Keepalive) {
            ctx.start_keepalive_timer();
        }
    }

    fn on_state_change(&mut self, ctx: &mut LegContext) {
        if let Some(tr) = self.ka_tr.take() {
            tr.cancel();
        }
        ctx.flush_pending_ack();
        ctx.cancel_expire_timer();
        ctx.cancel_timer(TimerKind::Keepalive);
    }

    fn recv_request(
        &mut self,
        ctx: &mut LegContext,
        request: Request,
        tx: Arc<dyn ServerTransaction>,
    ) -> Option<LegState> {
        match request.method {
            Method::Refer => self.recv_refer(ctx, request, tx),
            Method::Invite => self.recv_reinvite(ctx, request, tx),
            Method::Bye => recv_bye(ctx, self.name(), request, tx),
            Method::Info => {
                recv_info(ctx, request, tx);
                None
            }
            Method::Options | Method::Update => {
                ctx.respond(tx.as_ref(), &request, 200, "OK", None);
                None
            }
            ref other => {
                debug!(leg = %ctx.id, "Connected: {} ignored", other);
                None
            }
        }
    }

    fn recv_event(&mut self, ctx: &mut LegContext, event: CallEvent) -> LegResult<Option<LegState>> {
        match &event.kind {
            CallEventKind::Disconnect { .. } | CallEventKind::Redirect { .. } | CallEventKind::Fail { .. } => {
                send_teardown(ctx, &event)?;
                ctx.cancel_credit_timer();
                ctx.disconnect_ts = Some(event.rtime);
                Ok(Some(LegState::Disconnected(Disconnected::new(
                    event.rtime,
                    event.origin,
                    0,
                ))))
            }
            CallEventKind::Update { .. } => self.send_update(ctx, event),
            CallEventKind::Info { .. } => self.send_info(ctx, &event),
            CallEventKind::Connect { .. } if ctx.pending_tr.is_some() => self.answer_late_offer(ctx, event),
            _ => {
                debug!(leg = %ctx.id, "Connected: {} ignored", event);
                Ok(None)
            }
        }
    }

    fn recv_ack(&mut self, ctx: &mut LegContext, ack: Request) {
        let rtime = ack.rtime;
        let body = ack.body;
        let event = CallEvent::connect(0, "ACK", body.clone(), rtime, ctx.origin.clone());

        ctx.cancel_expire_timer();
        ctx.start_credit_timer(rtime);
        ctx.connect_ts = Some(rtime);
        let origin = ctx.origin.clone();
        ctx.fire_connect(rtime, &origin);

        match body {
            Some(body) if ctx.has_remote_sdp_hook() => {
                if let Err(e) = ctx.on_remote_sdp_change(&body, event) {
                    ctx.report_malformed_sdp(rtime, e);
                }
                return;
            }
            Some(body) => ctx.remote_sdp = Some(body),
            None => ctx.remote_sdp = None,
        }
        ctx.enqueue(event);
    }

    /// The timer is re-armed only once the previous probe is answered
    fn keepalive_tick(&mut self, ctx: &mut LegContext) {
        let sent = ctx
            .gen_request(Method::Options, None, &[])
            .and_then(|request| ctx.begin_transaction(request, Some(ResponseRoute::Keepalive)));
        match sent {
            Ok(tr) => {
                ctx.inc_local_cseq();
                self.ka_tr = Some(tr);
            }
            Err(e) => {
                warn!(leg = %ctx.id, "keepalive not sent: {}", e);
                ctx.start_keepalive_timer();
            }
        }
    }

    fn keepalive_response(&mut self, ctx: &mut LegContext, response: Response) {
        if response.is_provisional() || self.ka_tr.is_none() {
            return;
        }
        self.ka_tr = None;
        if matches!(response.code, 408 | 481) {
            info!(leg = %ctx.id, "keepalive got {}, disconnecting", response.code);
            ctx.disconnect_now(response.rtime);
        } else {
            ctx.start_keepalive_timer();
        }
    }
}
