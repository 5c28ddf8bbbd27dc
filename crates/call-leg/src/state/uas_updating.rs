//! Waiting for call control's answer to a re-INVITE we received

use std::sync::Arc;

use tracing::debug;

use super::{recv_bye, recv_info, send_teardown, Connected, Disconnected, LegState, UaState};
use crate::errors::LegResult;
use crate::events::{CallEvent, CallEventKind};
use crate::leg::LegContext;
use crate::message::{Method, Request};
use crate::transaction::ServerTransaction;

#[derive(Debug, Default)]
pub struct UasUpdating;

impl UasUpdating {
    pub fn new() -> Self {
        Self
    }

    fn answer(&mut self, ctx: &mut LegContext, event: CallEvent) -> LegResult<Option<LegState>> {
        let CallEventKind::Connect { code, reason_phrase, body } = &event.kind else {
            return Ok(None);
        };

        if let Some(b) = body.as_ref().filter(|b| b.needs_update() && ctx.has_local_sdp_hook()) {
            let b = b.clone();
            let rtime = event.rtime;
            if let Err(e) = ctx.on_local_sdp_change(&b, event) {
                ctx.report_malformed_sdp(rtime, e);
            }
            return Ok(None);
        }

        let (code, reason) = if (200..300).contains(code) {
            (*code, reason_phrase.as_str())
        } else {
            (200, "OK")
        };
        ctx.local_sdp = body.clone();
        ctx.respond_uas(code, reason, body.clone(), true);
        ctx.start_expire_timer();
        Ok(Some(LegState::Connected(Connected::new(None, ctx.origin.clone()))))
    }

    fn reject(&mut self, ctx: &mut LegContext, code: u16, reason: &str) -> Option<LegState> {
        let (code, reason) = if (300..700).contains(&code) {
            (code, reason)
        } else {
            (488, "Not Acceptable Here")
        };
        ctx.respond_uas(code, reason, None, false);
        Some(LegState::Connected(Connected::new(None, ctx.origin.clone())))
    }
}

impl UaState for UasUpdating {
    fn name(&self) -> &'static str {
        "Updating(UAS)"
    }

    fn on_state_change(&mut self, ctx: &mut LegContext) {
        if ctx.uas_tr.is_some() {
            ctx.respond_uas(500, "Server Internal Error", None, false);
        }
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
                ctx.respond_uas(487, "Request Terminated", None, false);
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
                debug!(leg = %ctx.id, "Updating(UAS): {} ignored", other);
                None
            }
        }
    }

    fn recv_event(&mut self, ctx: &mut LegContext, event: CallEvent) -> LegResult<Option<LegState>> {
        match &event.kind {
            CallEventKind::Connect { .. } => self.answer(ctx, event),
            CallEventKind::Fail { code, reason_phrase } | CallEventKind::Redirect { code, reason_phrase, .. } => {
                Ok(self.reject(ctx, *code, reason_phrase))
            }
            CallEventKind::Disconnect { .. } => {
                ctx.respond_uas(487, "Request Terminated", None, false);
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
                debug!(leg = %ctx.id, "Updating(UAS): {} ignored", event);
                Ok(None)
            }
        }
    }
}
