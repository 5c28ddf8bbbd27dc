//! Response handlers owned by the leg

use async_trait::async_trait;
use tracing::trace;

use super::ResponseHandler;
use crate::leg::WeakCallLeg;
use crate::message::Response;

/// Which leg operation a client transaction belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResponseRoute {
    /// re-INVITE sent from Connected
    Reinvite,
    /// REFER sent for a transfer
    Transfer,
    /// In-dialog OPTIONS probe
    Keepalive,
}

/// Forwards responses into the leg that started the transaction
pub(crate) struct LegResponseHandler {
    leg: WeakCallLeg,
    route: ResponseRoute,
}

impl LegResponseHandler {
    pub(crate) fn new(leg: WeakCallLeg, route: ResponseRoute) -> Self {
        Self { leg, route }
    }
}

#[async_trait]
impl ResponseHandler for LegResponseHandler {
    async fn on_response(&self, response: Response) {
        match self.leg.upgrade() {
            Some(leg) => leg.handle_response(self.route, response).await,
            None => trace!(
                "dropping {} response for released leg {}",
                response.code,
                self.leg.id()
            ),
        }
    }
}
