// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Classifies decrypted server messages and turns them into the tagged
//! [`ServerBody`] the rest of the core matches on exhaustively.
//!
//! The source this crate is modeled after repeatedly compares `body` to
//! string constructor tags and then accesses fields on the assumption that
//! the comparison implies the shape; here the untyped [`Structure`] boundary
//! value is classified exactly once, at the edge, into a real enum.

use crate::transport::ServerMessage;
use crate::value::{Structure, Value, cons_of, is_cons};

/// A server message already unwrapped of its gzip envelope (if any), with
/// its constructor classified.
#[derive(Clone, Debug)]
pub enum ServerBody {
    RpcResult {
        req_msg_id: u64,
        result: Structure,
    },
    Pong {
        msg_id: u64,
        ping_id: i64,
    },
    BadServerSalt {
        bad_msg_id: u64,
        new_server_salt: i64,
    },
    BadMsgNotification {
        bad_msg_id: u64,
        error_code: i32,
    },
    /// A constructor this core does not act on. Logged and ignored, never
    /// an error.
    Unknown(Structure),
}

/// A decrypted server message with its body already unwrapped and
/// classified; `msg_id`/`seqno` still belong to the (possibly container)
/// envelope that carried `body`.
pub struct ClassifiedMessage {
    pub msg_id: u64,
    pub seqno: u32,
    pub body: ServerBody,
}

/// Unwraps gzip (exactly one level) and container messages, yielding one
/// [`ClassifiedMessage`] per leaf message found, in arrival order.
///
/// Containers themselves never appear in the output: only their
/// constituent content messages do, which is what makes them eligible for
/// acknowledgment downstream.
pub fn flatten(message: ServerMessage) -> Vec<ClassifiedMessage> {
    let mut out = Vec::new();
    flatten_into(message.msg_id, message.seqno, message.body, &mut out);
    out
}

fn flatten_into(msg_id: u64, seqno: u32, body: Structure, out: &mut Vec<ClassifiedMessage>) {
    let body = unwrap_gzip(body);

    if is_cons(&body, "msg_container") {
        for inner in body.get("messages").and_then(Value::as_list).into_iter().flatten() {
            if let Some(inner) = inner.as_map() {
                let inner_msg_id = inner.get("msg_id").and_then(Value::as_int).unwrap_or(0) as u64;
                let inner_seqno = inner.get("seqno").and_then(Value::as_int).unwrap_or(0) as u32;
                let inner_body = inner.get("body").and_then(Value::as_map).cloned().unwrap_or_default();
                flatten_into(inner_msg_id, inner_seqno, inner_body, out);
            }
        }
        return;
    }

    out.push(ClassifiedMessage {
        msg_id,
        seqno,
        body: classify(body),
    });
}

/// Unwraps a single `gzip_packed` envelope, if present, returning the
/// wrapped `packed_data` as the real body. Idempotent on already-unwrapped
/// bodies.
fn unwrap_gzip(body: Structure) -> Structure {
    if is_cons(&body, "gzip_packed") {
        body.get("packed_data")
            .and_then(Value::as_map)
            .cloned()
            .unwrap_or(body)
    } else {
        body
    }
}

fn classify(body: Structure) -> ServerBody {
    match cons_of(&body).as_deref() {
        Some("rpc_result") => {
            let req_msg_id = body.get("req_msg_id").and_then(Value::as_int).unwrap_or(0) as u64;
            let result = body
                .get("result")
                .and_then(Value::as_map)
                .map(|result| unwrap_gzip(result.clone()))
                .unwrap_or_default();
            ServerBody::RpcResult { req_msg_id, result }
        }
        Some("pong") => ServerBody::Pong {
            msg_id: body.get("msg_id").and_then(Value::as_int).unwrap_or(0) as u64,
            ping_id: body.get("ping_id").and_then(Value::as_int).unwrap_or(0),
        },
        Some("bad_server_salt") => ServerBody::BadServerSalt {
            bad_msg_id: body.get("bad_msg_id").and_then(Value::as_int).unwrap_or(0) as u64,
            new_server_salt: body.get("new_server_salt").and_then(Value::as_int).unwrap_or(0),
        },
        Some("bad_msg_notification") => ServerBody::BadMsgNotification {
            bad_msg_id: body.get("bad_msg_id").and_then(Value::as_int).unwrap_or(0) as u64,
            error_code: body.get("error_code").and_then(Value::as_int).unwrap_or(0) as i32,
        },
        _ => ServerBody::Unknown(body),
    }
}
