//! Transaction façade
//!
//! The leg does not own a transport. It talks to whatever transaction layer
//! the application provides through the traits in this module:
//!
//! - [`TransactionLayer`]: starts client transactions for requests the leg
//!   generates (re-INVITE, BYE, REFER, INFO, OPTIONS)
//! - [`ClientTransaction`]: handle on one outgoing request, used to cancel it
//!   or to send a deferred ACK
//! - [`ServerTransaction`]: handle on one incoming request, used to answer it
//! - [`ResponseHandler`]: receives responses to a client transaction
//!
//! Responses are routed back into the owning leg by the handlers in
//! [`handlers`], which hold only a weak reference to the leg.

pub mod handlers;

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::LegResult;
use crate::message::{Request, Response};
use crate::sdp::MsgBody;

/// Receives responses for a client transaction
#[async_trait]
pub trait ResponseHandler: Send + Sync {
    /// Called for every provisional and final response
    async fn on_response(&self, response: Response);
}

/// An outgoing request in progress
pub trait ClientTransaction: Send + Sync {
    /// Body to place on the ACK once it is sent
    fn set_ack_body(&self, body: Option<MsgBody>);

    /// Send the ACK for a 2xx whose acknowledgement was held back
    fn send_ack(&self) -> LegResult<()>;

    /// Cancel the request (CANCEL for INVITE, silently dropped otherwise)
    fn cancel(&self);
}

/// An incoming request awaiting an answer
pub trait ServerTransaction: Send + Sync {
    /// Send a response.
    ///
    /// With `expect_ack` set the transaction layer hands the matching ACK to
    /// `CallLeg::recv_ack` instead of absorbing it.
    fn send_response(&self, response: Response, expect_ack: bool);
}

/// Starts client transactions on behalf of a leg
pub trait TransactionLayer: Send + Sync {
    fn begin_client_transaction(
        &self,
        request: Request,
        handler: Option<Arc<dyn ResponseHandler>>,
    ) -> LegResult<Arc<dyn ClientTransaction>>;
}
