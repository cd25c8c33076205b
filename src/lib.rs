// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The session state machine and RPC dispatcher sitting between a framed,
//! encrypted MTProto transport and a caller that issues logical remote
//! procedure calls.
//!
//! [`Session`] is the entry point: it lazily (re)establishes the transport
//! returned by a [`Connect`] implementation, assigns strictly monotonic
//! message ids and parity-correct sequence numbers, multiplexes many
//! in-flight [`Session::rpc_call`]s over a single connection, keeps the
//! connection alive with a ping/pong watchdog, batches acknowledgments, and
//! transparently recovers from `bad_server_salt`/`bad_msg_notification`
//! without the caller ever observing the retry.
//!
//! Encoding/decoding TL payloads, the obfuscated TCP framing, the key
//! exchange, and AES-IGE encryption all live below the [`Transport`] trait
//! this crate consumes and are out of scope here.

#![deny(unsafe_code)]

mod ack;
mod connect;
mod constants;
mod datacenter;
mod dispatch;
mod errors;
mod ping;
mod recovery;
mod registry;
mod seqno;
mod session;
mod transport;
mod value;

#[cfg(test)]
mod test_support;

pub use connect::{Connect, FnConnect};
pub use datacenter::{AuthKey, DatacenterDescriptor};
pub use errors::SessionError;
pub use session::{Session, SessionPhase};
pub use transport::{ServerMessage, Transport, TransportError};
pub use value::{Structure, Value, cons_of, is_cons, structure};
