// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Two maps: outstanding RPC calls keyed by outgoing message id, and
//! outstanding ping probes keyed by ping id with a per-probe disconnect
//! timer.

use std::collections::HashMap;

use log::debug;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

use crate::errors::SessionError;
use crate::value::Structure;

/// A logical RPC in flight. Removed on match, on re-send after recovery,
/// or when the session is torn down.
pub struct PendingRequest {
    pub request: Structure,
    response: oneshot::Sender<Result<Structure, SessionError>>,
}

impl PendingRequest {
    pub fn new(request: Structure, response: oneshot::Sender<Result<Structure, SessionError>>) -> Self {
        Self { request, response }
    }

    pub fn fulfil_ok(self, result: Structure) {
        let _ = self.response.send(Ok(result));
    }

    pub fn fulfil_err(self, error: SessionError) {
        let _ = self.response.send(Err(error));
    }

    /// Splits this entry back into its parts so it can be re-registered
    /// under a fresh outgoing message id without recreating the caller's
    /// response slot.
    pub fn into_parts(self) -> (Structure, oneshot::Sender<Result<Structure, SessionError>>) {
        (self.request, self.response)
    }
}

/// A ping probe awaiting its `pong`, with the disconnect timer armed when
/// it was sent.
pub struct PendingPong {
    disconnect_timer: AbortHandle,
}

impl PendingPong {
    pub fn new(disconnect_timer: AbortHandle) -> Self {
        Self { disconnect_timer }
    }
}

impl Drop for PendingPong {
    fn drop(&mut self) {
        self.disconnect_timer.abort();
    }
}

/// Tracks every pending RPC and ping probe for the current connection.
#[derive(Default)]
pub struct PendingRegistry {
    by_msg_id: HashMap<u64, PendingRequest>,
    by_ping_id: HashMap<i64, PendingPong>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_request(&mut self, msg_id: u64, request: PendingRequest) {
        self.by_msg_id.insert(msg_id, request);
    }

    pub fn remove_request(&mut self, msg_id: u64) -> Option<PendingRequest> {
        self.by_msg_id.remove(&msg_id)
    }

    pub fn contains_request(&self, msg_id: u64) -> bool {
        self.by_msg_id.contains_key(&msg_id)
    }

    pub fn insert_pong(&mut self, ping_id: i64, pong: PendingPong) {
        self.by_ping_id.insert(ping_id, pong);
    }

    /// Removes a ping entry, cancelling its disconnect timer as a side
    /// effect of dropping it. Idempotent: absent ids are a no-op.
    pub fn remove_pong(&mut self, ping_id: i64) {
        self.by_ping_id.remove(&ping_id);
    }

    /// Fulfils every not-yet-resolved response with [`SessionError::Interruption`]
    /// and cancels every armed disconnect timer, so that awaiting callers
    /// unblock. Idempotent.
    pub fn clear_all(&mut self) {
        let pending = std::mem::take(&mut self.by_msg_id);
        debug!("clearing {} pending request(s)", pending.len());
        for (_, request) in pending {
            request.fulfil_err(SessionError::Interruption);
        }
        self.by_ping_id.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_request() -> Structure {
        crate::value::structure("ping", [])
    }

    #[test]
    fn insert_then_remove_is_idempotent() {
        let mut registry = PendingRegistry::new();
        let (tx, _rx) = oneshot::channel();
        registry.insert_request(1, PendingRequest::new(dummy_request(), tx));
        assert!(registry.contains_request(1));
        assert!(registry.remove_request(1).is_some());
        assert!(registry.remove_request(1).is_none());
        assert!(!registry.contains_request(1));
    }

    #[tokio::test]
    async fn clear_all_fulfils_every_pending_response_with_interruption() {
        let mut registry = PendingRegistry::new();
        let (tx1, rx1) = oneshot::channel();
        let (tx2, rx2) = oneshot::channel();
        registry.insert_request(1, PendingRequest::new(dummy_request(), tx1));
        registry.insert_request(2, PendingRequest::new(dummy_request(), tx2));

        registry.clear_all();

        assert!(matches!(rx1.await.unwrap(), Err(SessionError::Interruption)));
        assert!(matches!(rx2.await.unwrap(), Err(SessionError::Interruption)));
        assert!(!registry.contains_request(1));
        assert!(!registry.contains_request(2));
    }

    #[tokio::test]
    async fn clear_all_is_idempotent() {
        let mut registry = PendingRegistry::new();
        registry.clear_all();
        registry.clear_all();
    }

    #[tokio::test]
    async fn removing_a_pong_cancels_its_disconnect_timer() {
        let handle = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        });
        let abort = handle.abort_handle();
        let mut registry = PendingRegistry::new();
        registry.insert_pong(42, PendingPong::new(abort));
        registry.remove_pong(42);

        let result = handle.await;
        assert!(result.unwrap_err().is_cancelled());
    }
}
