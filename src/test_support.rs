// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! An in-memory fake [`Transport`] standing in for a real socket in tests,
//! built from `tokio::sync::mpsc`/`oneshot` the same way the rest of this
//! crate favors channels over shared mutable state.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use tokio::sync::{mpsc, oneshot};

use crate::connect::Connect;
use crate::datacenter::{AuthKey, DatacenterDescriptor};
use crate::transport::{ServerMessage, Transport, TransportError};
use crate::value::Structure;

/// What the fake transport wrote, as observed by the test's "server" half.
pub(crate) struct WrittenMessage {
    pub msg_id: u64,
    pub seqno: u32,
    pub body: Structure,
}

pub(crate) struct FakeTransport {
    next_msg_id: u64,
    server_salt: i64,
    outbox: mpsc::UnboundedSender<WrittenMessage>,
    inbox: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Transport for FakeTransport {
    fn write(&mut self, seqno: u32, body: Structure) -> (u64, oneshot::Receiver<Result<(), TransportError>>) {
        let msg_id = self.next_msg_id;
        self.next_msg_id += 4;
        let _ = self.outbox.send(WrittenMessage { msg_id, seqno, body });
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Ok(()));
        (msg_id, rx)
    }

    async fn read(&mut self) -> Result<ServerMessage, TransportError> {
        self.inbox
            .recv()
            .await
            .ok_or_else(|| TransportError("fake connection closed".into()))
    }

    fn set_server_salt(&mut self, salt: i64) {
        self.server_salt = salt;
    }

    fn get_server_salt(&self) -> i64 {
        self.server_salt
    }

    fn stop(&mut self) {
        self.inbox.close();
    }
}

/// The "server" half of a [`FakeTransport`]: observes what the session
/// wrote and feeds it whatever messages the test wants to simulate.
pub(crate) struct FakeServer {
    pub outbox: mpsc::UnboundedReceiver<WrittenMessage>,
    pub inbox: mpsc::UnboundedSender<ServerMessage>,
}

pub(crate) fn fake_transport_pair(first_msg_id: u64) -> (FakeTransport, FakeServer) {
    let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
    let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
    (
        FakeTransport {
            next_msg_id: first_msg_id,
            server_salt: 0,
            outbox: outbox_tx,
            inbox: inbox_rx,
        },
        FakeServer {
            outbox: outbox_rx,
            inbox: inbox_tx,
        },
    )
}

/// A [`Connect`] that hands out pre-built fake transports in order, one per
/// `connect()` call.
pub(crate) struct QueueConnect {
    queue: Rc<RefCell<VecDeque<FakeTransport>>>,
}

impl QueueConnect {
    pub fn single(transport: FakeTransport) -> Self {
        Self {
            queue: Rc::new(RefCell::new(VecDeque::from([transport]))),
        }
    }

    pub fn queue(transports: impl IntoIterator<Item = FakeTransport>) -> Self {
        Self {
            queue: Rc::new(RefCell::new(transports.into_iter().collect())),
        }
    }
}

impl Connect for QueueConnect {
    type Transport = FakeTransport;

    async fn connect(
        &self,
        _datacenter: &DatacenterDescriptor,
        _auth_key: &AuthKey,
    ) -> Result<FakeTransport, TransportError> {
        self.queue
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| TransportError("no fake transport queued for this connect attempt".into()))
    }
}

pub(crate) fn fake_datacenter() -> DatacenterDescriptor {
    DatacenterDescriptor::new("127.0.0.1:443".parse().unwrap())
}

pub(crate) fn fake_auth_key() -> AuthKey {
    AuthKey::new(vec![0u8; 256])
}
