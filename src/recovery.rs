// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Transparent recovery from `bad_server_salt` and `bad_msg_notification`
//! (error 32): re-sends the culprit request under a fresh message id while
//! preserving the original caller's response slot, so the failure is never
//! observed outside this crate.

use std::cell::RefCell;
use std::rc::Rc;

use crate::constants::{ERROR_MSG_SEQNO_TOO_LOW, MAX_SEQNO_INCREMENT, RESPONSE_DEADLINE};
use crate::session::{SessionInner, send_direct};
use crate::transport::Transport;

/// The server rejected a message because our session salt is stale.
pub(crate) async fn handle_bad_server_salt<T: Transport>(
    transport: &mut T,
    inner: &Rc<RefCell<SessionInner>>,
    bad_msg_id: u64,
    new_server_salt: i64,
) {
    if transport.get_server_salt() != 0 {
        inner.borrow_mut().stable_seqno = false;
    }
    transport.set_server_salt(new_server_salt);
    resubmit_if_pending(transport, inner, bad_msg_id).await;
}

/// The server rejected a message for carrying too low a seqno. Only acted
/// on while numbering is still unstable; once a result has been accepted,
/// the counter is trusted.
pub(crate) async fn handle_bad_msg_notification<T: Transport>(
    transport: &mut T,
    inner: &Rc<RefCell<SessionInner>>,
    bad_msg_id: u64,
    error_code: i32,
) {
    if error_code != ERROR_MSG_SEQNO_TOO_LOW || inner.borrow().stable_seqno {
        return;
    }

    {
        let mut state = inner.borrow_mut();
        state.seqno_increment = state.seqno_increment.saturating_mul(2).min(MAX_SEQNO_INCREMENT);
        let bump = state.seqno_increment;
        state.seqno.advance_by(bump);
    }

    resubmit_if_pending(transport, inner, bad_msg_id).await;
}

/// Detaches `bad_msg_id`'s pending request, if it is still registered, and
/// re-submits it in no-response mode: the original caller, still holding
/// the same response slot, sees the eventual `rpc_result` as if nothing had
/// happened.
async fn resubmit_if_pending<T: Transport>(transport: &mut T, inner: &Rc<RefCell<SessionInner>>, bad_msg_id: u64) {
    let Some(pending) = inner.borrow_mut().registry.remove_request(bad_msg_id) else {
        return;
    };
    let (request, response_tx) = pending.into_parts();

    if let Some(msg_id) = send_direct(transport, inner, request, response_tx).await {
        let cleanup_inner = Rc::clone(inner);
        tokio::task::spawn_local(async move {
            tokio::time::sleep(RESPONSE_DEADLINE).await;
            cleanup_inner.borrow_mut().registry.remove_request(msg_id);
        });
    }
}
