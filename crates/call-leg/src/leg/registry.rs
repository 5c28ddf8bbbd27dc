//! Call-ID keyed leg lookup for the transaction layer

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use super::call_leg::CallLeg;
use crate::message::{Method, Request};
use crate::transaction::ServerTransaction;

/// Routes inbound in-dialog messages to their leg
#[derive(Debug, Clone, Default)]
pub struct LegRegistry {
    legs: Arc<DashMap<String, CallLeg>>,
}

impl LegRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a leg under its Call-ID, returning any leg it replaced
    pub fn register(&self, call_id: impl Into<String>, leg: CallLeg) -> Option<CallLeg> {
        let call_id = call_id.into();
        debug!(leg = %leg.id(), "registering leg for call {}", call_id);
        self.legs.insert(call_id, leg)
    }

    pub fn get(&self, call_id: &str) -> Option<CallLeg> {
        self.legs.get(call_id).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, call_id: &str) -> Option<CallLeg> {
        self.legs.remove(call_id).map(|(_, leg)| leg)
    }

    pub fn len(&self) -> usize {
        self.legs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }

    /// Hand a request to its leg; unknown dialogs get 481
    pub async fn route_request(&self, request: Request, tx: Arc<dyn ServerTransaction>) {
        match self.get(&request.call_id) {
            Some(leg) if request.method == Method::Ack => leg.recv_ack(request).await,
            Some(leg) => leg.recv_request(request, tx).await,
            None if request.method == Method::Ack => {
                debug!("ACK for unknown call {} dropped", request.call_id);
            }
            None => {
                warn!("{} for unknown call {}", request.method, request.call_id);
                let response = request.gen_response(481, "Call/Transaction Does Not Exist", None, None);
                tx.send_response(response, false);
            }
        }
    }

    /// Drop dead legs, returning how many were removed
    pub async fn prune_dead(&self) -> usize {
        let legs: Vec<(String, CallLeg)> = self
            .legs
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let mut removed = 0;
        for (call_id, leg) in legs {
            if leg.is_dead().await && self.legs.remove_if(&call_id, |_, l| l.id() == leg.id()).is_some() {
                removed += 1;
            }
        }
        removed
    }
}
