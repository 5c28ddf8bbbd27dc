//! Leg states
//!
//! ```text
//!                 Update event                 2xx / failure
//!   ┌───────────┐ ───────────▶ ┌──────────────┐ ─────────────┐
//!   │           │              │ UacUpdating  │              │
//!   │ Connected │ ◀──────────────────────────────────────────┘
//!   │           │ re-INVITE    ┌──────────────┐ Connect/Fail
//!   │           │ ───────────▶ │ UasUpdating  │ ─────────────┐
//!   └─────┬─────┘ ◀──────────────────────────────────────────┘
//!         │ BYE / Disconnect / REFER / timers      (also from both Updating states)
//!         ▼
//!   ┌──────────────┐  linger   ┌──────┐
//!   │ Disconnected │ ────────▶ │ Dead │
//!   └──────────────┘           └──────┘
//! ```
//!
//! Handlers are synchronous and never block: anything that must happen
//! later goes through the context (self-delivery queue, timers, outbound
//! event channel).

pub mod connected;
pub mod dead;
pub mod disconnected;
pub mod uac_updating;
pub mod uas_updating;

use std::sync::Arc;

use tracing::{debug, error};

pub use connected::Connected;
pub use dead::Dead;
pub use disconnected::Disconnected;
pub use uac_updating::UacUpdating;
pub use uas_updating::UasUpdating;

use crate::errors::LegResult;
use crate::events::CallEvent;
use crate::leg::LegContext;
use crate::message::{Header, Method, Request, Response};
use crate::transaction::handlers::ResponseRoute;
use crate::transaction::ServerTransaction;

/// Behaviour of one leg state.
///
/// Handlers return the next state, or `None` to stay. `on_state_change`
/// runs on the old state before `on_activation` runs on the new one.
pub trait UaState: Send {
    fn name(&self) -> &'static str;

    fn on_activation(&mut self, _ctx: &mut LegContext) {}

    fn on_state_change(&mut self, _ctx: &mut LegContext) {}

    fn recv_request(
        &mut self,
        ctx: &mut LegContext,
        request: Request,
        tx: Arc<dyn ServerTransaction>,
    ) -> Option<LegState>;

    fn recv_event(&mut self, ctx: &mut LegContext, event: CallEvent) -> LegResult<Option<LegState>>;

    fn recv_ack(&mut self, ctx: &mut LegContext, _ack: Request) {
        debug!(leg = %ctx.id, "{}: ACK ignored", self.name());
    }

    /// Response to our re-INVITE
    fn recv_response(&mut self, _ctx: &mut LegContext, _response: Response) -> Option<LegState> {
        None
    }

    fn keepalive_tick(&mut self, _ctx: &mut LegContext) {}

    fn keepalive_response(&mut self, _ctx: &mut LegContext, _response: Response) {}
}

/// The closed set of leg states
pub enum LegState {
    Connected(Connected),
    UacUpdating(UacUpdating),
    UasUpdating(UasUpdating),
    Disconnected(Disconnected),
    Dead(Dead),
}

impl LegState {
    fn inner(&mut self) -> &mut dyn UaState {
        match self {
            LegState::Connected(s) => s,
            LegState::UacUpdating(s) => s,
            LegState::UasUpdating(s) => s,
            LegState::Disconnected(s) => s,
            LegState::Dead(s) => s,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LegState::Connected(s) => s.name(),
            LegState::UacUpdating(s) => s.name(),
            LegState::UasUpdating(s) => s.name(),
            LegState::Disconnected(s) => s.name(),
            LegState::Dead(s) => s.name(),
        }
    }

    pub fn is_dead(&self) -> bool {
        matches!(self, LegState::Dead(_))
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, LegState::Disconnected(_))
    }

    pub(crate) fn on_activation(&mut self, ctx: &mut LegContext) {
        self.inner().on_activation(ctx)
    }

    pub(crate) fn on_state_change(&mut self, ctx: &mut LegContext) {
        self.inner().on_state_change(ctx)
    }

    pub(crate) fn recv_request(
        &mut self,
        ctx: &mut LegContext,
        request: Request,
        tx: Arc<dyn ServerTransaction>,
    ) -> Option<LegState> {
        self.inner().recv_request(ctx, request, tx)
    }

    pub(crate) fn recv_event(&mut self, ctx: &mut LegContext, event: CallEvent) -> LegResult<Option<LegState>> {
        self.inner().recv_event(ctx, event)
    }

    pub(crate) fn recv_ack(&mut self, ctx: &mut LegContext, ack: Request) {
        self.inner().recv_ack(ctx, ack)
    }

    pub(crate) fn recv_response(&mut self, ctx: &mut LegContext, response: Response) -> Option<LegState> {
        self.inner().recv_response(ctx, response)
    }

    pub(crate) fn keepalive_tick(&mut self, ctx: &mut LegContext) {
        self.inner().keepalive_tick(ctx)
    }

    pub(crate) fn keepalive_response(&mut self, ctx: &mut LegContext, response: Response) {
        self.inner().keepalive_response(ctx, response)
    }
}

impl std::fmt::Debug for LegState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Send the request ending the dialog for a Disconnect, Redirect or Fail
/// event: REFER when transferring with REFER enabled, BYE otherwise (with
/// an Also header when transferring).
pub(crate) fn send_teardown(ctx: &mut LegContext, event: &CallEvent) -> LegResult<()> {
    let target = event.redirect_target().cloned();

    match target {
        Some(target) if ctx.config.use_refer => {
            let referred_by = ctx.dialog.local_uri.uri_only();
            ctx.send_request(
                Method::Refer,
                None,
                &event.extra_headers,
                Some(ResponseRoute::Transfer),
                |req| {
                    req.append_header(Header::refer_to(&target));
                    req.append_header(Header::referred_by(&referred_by));
                },
            )?;
            ctx.redirect_target = Some(target);
        }
        Some(target) => {
            ctx.send_request(Method::Bye, None, &event.extra_headers, None, |req| {
                req.append_header(Header::also(&target))
            })?;
            ctx.redirect_target = Some(target);
        }
        None => ctx.send_request(Method::Bye, None, &event.extra_headers, None, |_| {})?,
    }
    Ok(())
}

/// Shared BYE handling for Connected and both Updating states.
///
/// Answers 200, reports Disconnect (with the first Also target as redirect)
/// and returns the Disconnected state. A malformed Also aborts after the 200.
pub(crate) fn recv_bye(
    ctx: &mut LegContext,
    state: &'static str,
    request: Request,
    tx: Arc<dyn ServerTransaction>,
) -> Option<LegState> {
    ctx.respond(tx.as_ref(), &request, 200, "OK", None);

    let redirect = match request.also().first() {
        Some(also) => match also.body() {
            Ok(address) => Some(address),
            Err(e) => {
                error!(leg = %ctx.id, "{}: error parsing Also header: {}", state, e);
                return None;
            }
        },
        None => None,
    };

    let event =
        CallEvent::disconnect(redirect, request.rtime, ctx.origin.clone()).with_reason(request.reason());
    ctx.enqueue(event);
    ctx.cancel_credit_timer();
    ctx.disconnect_ts = Some(request.rtime);
    Some(LegState::Disconnected(Disconnected::new(
        request.rtime,
        ctx.origin.clone(),
        0,
    )))
}

/// INFO outside a pending exchange: answer 200 and forward the body
pub(crate) fn recv_info(ctx: &mut LegContext, request: Request, tx: Arc<dyn ServerTransaction>) {
    ctx.respond(tx.as_ref(), &request, 200, "OK", None);
    let event = CallEvent::info(request.body.clone(), request.rtime, ctx.origin.clone())
        .with_reason(request.reason());
    ctx.enqueue(event);
}
