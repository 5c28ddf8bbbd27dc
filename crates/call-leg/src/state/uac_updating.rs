//! Waiting for the peer's answer to our re-INVITE

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{recv_bye, recv_info, send_teardown, Connected, Disconnected, LegState, UaState};
use crate::errors::LegResult;
use crate::events::{CallEvent, CallEventKind};
use crate::leg::LegContext;
use crate::message::{Method, Request, Response};
use crate::transaction::ServerTransaction;

pub struct UacUpdating {
    /// Whether our re-INVITE carried an offer
    offered: bool,
}

impl UacUpdating {
    pub fn new(offered: bool) -> Self {
        Self { offered }
    }

    fn on_success(&mut self, ctx: &mut LegContext, response: Response) -> Option<LegState> {
        let tr = ctx.client_tr.take();
        let body = response.body;
        let event = CallEvent::connect(
            response.code,
            response.reason,
            body.clone(),
            response.rtime,
            ctx.origin.clone(),
        );

        match tr {
            // Peer made the offer in its 2xx; the ACK must carry our answer.
            Some(tr) if !self.offered && body.is_some() => {
                debug!(leg = %ctx.id, "late offer in 2xx, holding ACK for call control");
                ctx.pending_tr = Some(tr);
                ctx.start_expire_timer();
            }
            Some(tr) => {
                if let Err(e) = tr.send_ack() {
                    warn!(leg = %ctx.id, "failed to send ACK: {}", e);
                }
            }
            None => {}
        }

        match body {
            Some(body) if ctx.has_remote_sdp_hook() => {
                if let Err(e) = ctx.on_remote_sdp_change(&body, event) {
                    ctx.report_malformed_sdp(response.rtime, e);
                }
            }
            Some(body) => {
                ctx.remote_sdp = Some(body);
                ctx.enqueue(event);
            }
            None => {
                ctx.remote_sdp = None;
                ctx.enqueue(event);
            }
        }

        Some(LegState::Connected(Connected::new(
            Some(response.rtime),
            ctx.origin.clone(),
        )))
    }
}

impl UaState for UacUpdating {
    fn name(&self) -> &'static str {
        "Updating(UAC)"
    }

    fn recv_request(
        &mut self,
        ctx: &mut LegContext,
        request: Request,
        tx: Arc<dyn ServerTransaction>,
    ) -> Option<LegState> {
        match request.method {
            Method::Invite => {
                ctx.respond(tx.as_ref(), &request, 491, "Request Pending", None);
                None
            }
            Method::Bye => {
                ctx.cancel_client_transaction();
                recv_bye(ctx, self.name(), request, tx)
            }
            Method::Info => {
                recv_info(ctx, request, tx);
                None
            }
            Method::Options | Method::Update => {
                ctx.respond(tx.as_ref(), &request, 200, "OK", None);
                None
            }
            ref other => {
                debug!(leg = %ctx.id, "Updating(UAC): {} ignored", other);
                None
            }
        }
    }

    fn recv_event(&mut self, ctx: &mut LegContext, event: CallEvent) -> LegResult<Option<LegState>> {
        match &event.kind {
            CallEventKind::Disconnect { .. } | CallEventKind::Redirect { .. } | CallEventKind::Fail { .. } => {
                ctx.cancel_client_transaction();
                send_teardown(ctx, &event)?;
                ctx.cancel_credit_timer();
                ctx.disconnect_ts = Some(event.rtime);
                Ok(Some(LegState::Disconnected(Disconnected::new(
                    event.rtime,
                    event.origin,
                    0,
                ))))
            }
            _ => {
                debug!(leg = %ctx.id, "Updating(UAC): {} ignored", event);
                Ok(None)
            }
        }
    }

    fn recv_response(&mut self, ctx: &mut LegContext, response: Response) -> Option<LegState> {
        if response.is_provisional() {
            return None;
        }
        if response.is_success() {
            return self.on_success(ctx, response);
        }

        ctx.client_tr = None;
        if matches!(response.code, 408 | 481) {
            info!(leg = %ctx.id, "re-INVITE got {}, dialog is gone", response.code);
            ctx.enqueue(CallEvent::disconnect(None, response.rtime, ctx.origin.clone()));
            ctx.cancel_credit_timer();
            ctx.disconnect_ts = Some(response.rtime);
            return Some(LegState::Disconnected(Disconnected::new(
                response.rtime,
                ctx.origin.clone(),
                response.code,
            )));
        }

        ctx.enqueue(CallEvent::fail(
            response.code,
            response.reason,
            response.rtime,
            ctx.origin.clone(),
        ));
        Some(LegState::Connected(Connected::new(None, ctx.origin.clone())))
    }
}
