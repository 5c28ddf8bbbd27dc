//! Terminal state: all timers stopped, every input dropped

use std::sync::Arc;

use tracing::debug;

use super::{LegState, UaState};
use crate::errors::LegResult;
use crate::events::CallEvent;
use crate::leg::LegContext;
use crate::message::Request;
use crate::transaction::ServerTransaction;

#[derive(Debug, Default)]
pub struct Dead;

impl UaState for Dead {
    fn name(&self) -> &'static str {
        "Dead"
    }

    fn on_activation(&mut self, ctx: &mut LegContext) {
        debug!(leg = %ctx.id, "leg is dead");
        ctx.timers.cancel_all();
        ctx.self_queue.clear();
        ctx.observer.on_dead(&ctx.id);
    }

    fn recv_request(
        &mut self,
        _ctx: &mut LegContext,
        _request: Request,
        _tx: Arc<dyn ServerTransaction>,
    ) -> Option<LegState> {
        None
    }

    fn recv_event(&mut self, _ctx: &mut LegContext, _event: CallEvent) -> LegResult<Option<LegState>> {
        Ok(None)
    }
}
