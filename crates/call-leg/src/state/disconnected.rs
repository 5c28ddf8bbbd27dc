//! Disconnected state
//!
//! The dialog is over. The leg lingers to answer retransmitted BYEs, then
//! moves to [`Dead`](super::Dead) when the linger timer fires.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use super::{LegState, UaState};
use crate::errors::LegResult;
use crate::events::CallEvent;
use crate::leg::LegContext;
use crate::message::{Method, Request};
use crate::timer::TimerKind;
use crate::transaction::ServerTransaction;

pub struct Disconnected {
    rtime: Instant,
    origin: String,
    code: u16,
}

impl Disconnected {
    pub fn new(rtime: Instant, origin: impl Into<String>, code: u16) -> Self {
        Self {
            rtime,
            origin: origin.into(),
            code,
        }
    }

    pub fn code(&self) -> u16 {
        self.code
    }
}

impl UaState for Disconnected {
    fn name(&self) -> &'static str {
        "Disconnected"
    }

    fn on_activation(&mut self, ctx: &mut LegContext) {
        info!(leg = %ctx.id, "disconnected by {} (code {})", self.origin, self.code);
        ctx.cancel_expire_timer();
        ctx.cancel_timer(TimerKind::Keepalive);
        ctx.cancel_client_transaction();
        ctx.flush_pending_ack();
        ctx.observer.on_disconnect(&ctx.id, self.rtime, &self.origin, self.code);

        let linger = ctx.config.disconnect_linger();
        ctx.start_timer(TimerKind::Linger, linger);
    }

    fn recv_request(
        &mut self,
        ctx: &mut LegContext,
        request: Request,
        tx: Arc<dyn ServerTransaction>,
    ) -> Option<LegState> {
        if request.method == Method::Bye {
            ctx.respond(tx.as_ref(), &request, 200, "OK", None);
        } else {
            debug!(leg = %ctx.id, "Disconnected: {} ignored", request.method);
        }
        None
    }

    fn recv_event(&mut self, ctx: &mut LegContext, event: CallEvent) -> LegResult<Option<LegState>> {
        debug!(leg = %ctx.id, "Disconnected: {} ignored", event);
        Ok(None)
    }
}
