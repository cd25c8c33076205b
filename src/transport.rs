// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The framed, encrypted transport this crate sits above.
//!
//! Obfuscated TCP framing, key exchange, and AES-IGE encryption all live in
//! [`grammers-mtproto`] and [`grammers-mtsender`] and are out of scope here;
//! this module only declares the contract the session core consumes.

use std::fmt;
use tokio::sync::oneshot;

use crate::value::Structure;

/// A decrypted, deserialized message as handed back by [`Transport::read`].
#[derive(Clone, Debug)]
pub struct ServerMessage {
    pub msg_id: u64,
    pub seqno: u32,
    pub body: Structure,
}

/// Failure reported by the underlying transport.
///
/// The transport's own framing/crypto errors are opaque to this crate; we
/// only need to know that the connection is no longer usable.
#[derive(Clone, Debug)]
pub struct TransportError(pub String);

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport error: {}", self.0)
    }
}

impl std::error::Error for TransportError {}

/// The contract a framed, encrypted MTProto transport must expose to the
/// session core.
///
/// Implementations own the socket, the encryption state, and the
/// server-salt bookkeeping baked into MTProto's wire format.
pub trait Transport {
    /// Assigns and returns a monotonically increasing message id for
    /// `body`, synchronously, and returns a receiver that resolves once the
    /// encoded frame has been flushed.
    fn write(&mut self, seqno: u32, body: Structure) -> (u64, oneshot::Receiver<Result<(), TransportError>>);

    /// Awaits and returns the next decrypted, deserialized server message.
    ///
    /// Fails if the connection has been lost.
    fn read(&mut self) -> impl std::future::Future<Output = Result<ServerMessage, TransportError>>;

    /// Installs a freshly learned server salt.
    fn set_server_salt(&mut self, salt: i64);

    /// Returns the currently installed server salt.
    fn get_server_salt(&self) -> i64;

    /// Terminates the connection; subsequent `read`/`write` calls fail.
    fn stop(&mut self);
}
