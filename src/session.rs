// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The façade: owns the transport handle, the read-loop task, and
//! coordinates every other component.
//!
//! The whole session is meant to run on a single [`tokio::task::LocalSet`]:
//! state lives in `Rc<RefCell<SessionInner>>`, never behind a `Mutex`, since
//! nothing here ever crosses a thread boundary.

use std::cell::RefCell;
use std::rc::Rc;

use log::{debug, trace, warn};
use tokio::sync::{Notify, mpsc, oneshot};
use tokio::task::{self, AbortHandle, JoinHandle};

use crate::ack::AckBatcher;
use crate::connect::Connect;
use crate::constants::{RESPONSE_DEADLINE, WRITE_DEADLINE};
use crate::datacenter::{AuthKey, DatacenterDescriptor};
use crate::dispatch::{self, ServerBody};
use crate::errors::SessionError;
use crate::ping;
use crate::recovery;
use crate::registry::{PendingPong, PendingRegistry, PendingRequest};
use crate::seqno::SeqNoAllocator;
use crate::transport::Transport;
use crate::value::{Structure, Value, cons_of, structure};

/// Lifecycle of a session's connection, modeled explicitly rather than
/// inferred from which fields happen to be populated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Connecting,
    Connected,
}

/// A request to the task that exclusively owns the transport. Anything
/// other than that task itself must go through this channel to send.
pub(crate) enum Command {
    Write {
        request: Structure,
        response_tx: oneshot::Sender<Result<Structure, SessionError>>,
        msg_id_tx: oneshot::Sender<u64>,
    },
    Stop,
}

pub(crate) struct SessionInner {
    pub(crate) phase: SessionPhase,
    pub(crate) seqno: SeqNoAllocator,
    pub(crate) stable_seqno: bool,
    pub(crate) seqno_increment: u32,
    pub(crate) registry: PendingRegistry,
    pub(crate) ack: AckBatcher,
    pub(crate) cmd_tx: Option<mpsc::UnboundedSender<Command>>,
    pub(crate) loop_task: Option<JoinHandle<()>>,
    pub(crate) next_ping_timer: Option<AbortHandle>,
    pub(crate) connected_notify: Rc<Notify>,
}

impl SessionInner {
    fn new() -> Self {
        Self {
            phase: SessionPhase::Idle,
            seqno: SeqNoAllocator::new(),
            stable_seqno: false,
            seqno_increment: 1,
            registry: PendingRegistry::new(),
            ack: AckBatcher::new(),
            cmd_tx: None,
            loop_task: None,
            next_ping_timer: None,
            connected_notify: Rc::new(Notify::new()),
        }
    }
}

/// The session core: a caller-facing `rpc_call`/`disconnect` pair sitting
/// above a lazily (re)established transport.
pub struct Session<C: Connect> {
    connector: C,
    datacenter: DatacenterDescriptor,
    auth_key: AuthKey,
    inner: Rc<RefCell<SessionInner>>,
}

impl<C: Connect + 'static> Session<C>
where
    C::Transport: 'static,
{
    pub fn new(datacenter: DatacenterDescriptor, auth_key: AuthKey, connector: C) -> Self {
        Self {
            connector,
            datacenter,
            auth_key,
            inner: Rc::new(RefCell::new(SessionInner::new())),
        }
    }

    /// Submits `message` and awaits its decoded result.
    ///
    /// `message` must carry a `_cons` constructor tag or this fails with
    /// [`SessionError::Usage`] without touching the transport.
    pub async fn rpc_call(&self, message: Structure) -> Result<Structure, SessionError> {
        if cons_of(&message).is_none() {
            return Err(SessionError::Usage("request is missing its `_cons` constructor tag"));
        }

        self.ensure_connected().await?;

        let cmd_tx = self
            .inner
            .borrow()
            .cmd_tx
            .clone()
            .expect("a Connected session always has a command channel");

        send_via_channel(&cmd_tx, &self.inner, message, false).await
    }

    /// Cancels the read-loop task, stops the transport, cancels every
    /// pending ping timer, and fulfils all pending RPC responses with an
    /// interruption error. Idempotent.
    pub fn disconnect(&self) {
        disconnect(&self.inner);
    }

    async fn ensure_connected(&self) -> Result<(), SessionError> {
        loop {
            let phase = self.inner.borrow().phase;
            match phase {
                SessionPhase::Connected => {
                    let finished = self
                        .inner
                        .borrow()
                        .loop_task
                        .as_ref()
                        .map(JoinHandle::is_finished)
                        .unwrap_or(true);
                    if !finished {
                        return Ok(());
                    }
                    self.inner.borrow_mut().phase = SessionPhase::Idle;
                }
                SessionPhase::Connecting => {
                    let notify = Rc::clone(&self.inner.borrow().connected_notify);
                    notify.notified().await;
                }
                SessionPhase::Idle => {
                    self.start_loop().await?;
                    return Ok(());
                }
            }
        }
    }

    async fn start_loop(&self) -> Result<(), SessionError> {
        {
            let mut state = self.inner.borrow_mut();
            state.phase = SessionPhase::Connecting;
            state.registry.clear_all();
            state.ack = AckBatcher::new();
            state.seqno = SeqNoAllocator::new();
            state.stable_seqno = false;
            state.seqno_increment = 1;
        }

        let mut transport = match self.connector.connect(&self.datacenter, &self.auth_key).await {
            Ok(transport) => transport,
            Err(error) => {
                self.inner.borrow_mut().phase = SessionPhase::Idle;
                self.inner.borrow().connected_notify.notify_waiters();
                return Err(error.into());
            }
        };

        let ping_id = ping::random_ping_id();
        let (throwaway_tx, _throwaway_rx) = oneshot::channel();
        if let Some(msg_id) =
            send_direct(&mut transport, &self.inner, ping::ping_request(ping_id), throwaway_tx).await
        {
            debug!("sent initial keepalive ping {ping_id} as message {msg_id}");
        }
        arm_ping_disconnect(&self.inner, ping_id);

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let loop_inner = Rc::clone(&self.inner);
        let loop_cmd_tx = cmd_tx.clone();
        let task = task::spawn_local(run_loop(transport, cmd_rx, loop_inner, loop_cmd_tx));

        {
            let mut state = self.inner.borrow_mut();
            state.cmd_tx = Some(cmd_tx);
            state.loop_task = Some(task);
            state.phase = SessionPhase::Connected;
        }
        self.inner.borrow().connected_notify.notify_waiters();

        Ok(())
    }
}

/// Cancels the read-loop task, stops the transport, cancels every pending
/// ping timer, and fulfils all pending RPC responses with an interruption
/// error. Idempotent; safe to call from within the loop task itself (e.g.
/// on a fatal read error) since it only asks the task to stop rather than
/// requiring it to still be polling its command channel.
pub(crate) fn disconnect(inner: &Rc<RefCell<SessionInner>>) {
    let (cmd_tx, task) = {
        let mut state = inner.borrow_mut();
        state.registry.clear_all();
        if let Some(handle) = state.next_ping_timer.take() {
            handle.abort();
        }
        state.phase = SessionPhase::Idle;
        (state.cmd_tx.take(), state.loop_task.take())
    };
    if let Some(tx) = cmd_tx {
        let _ = tx.send(Command::Stop);
    }
    if let Some(task) = task {
        task.abort();
    }
}

/// Arms a 10-second disconnect timer for `ping_id` and registers it in the
/// pending-pong map; dropping (or explicitly removing) that entry cancels
/// the timer.
pub(crate) fn arm_ping_disconnect(inner: &Rc<RefCell<SessionInner>>, ping_id: i64) {
    let timer_inner = Rc::clone(inner);
    let handle = task::spawn_local(async move {
        tokio::time::sleep(crate::constants::PING_DISCONNECT_DELAY).await;
        warn!("no pong for ping {ping_id} within the disconnect delay, tearing down the session");
        disconnect(&timer_inner);
    });
    inner.borrow_mut().registry.insert_pong(ping_id, PendingPong::new(handle.abort_handle()));
}

/// Schedules the next probe 10 seconds after a `pong` was observed.
fn schedule_next_ping(inner: Rc<RefCell<SessionInner>>, cmd_tx: mpsc::UnboundedSender<Command>) {
    task::spawn_local(async move {
        tokio::time::sleep(crate::constants::PING_INTERVAL).await;
        let ping_id = ping::random_ping_id();
        arm_ping_disconnect(&inner, ping_id);
        let _ = send_via_channel(&cmd_tx, &inner, ping::ping_request(ping_id), true).await;
    });
}

/// Sends `request` through the task that owns the transport and awaits its
/// outcome. `no_response` mirrors `rpc_call`'s no-response mode: the
/// registration is bound-by-time instead of awaited.
async fn send_via_channel(
    cmd_tx: &mpsc::UnboundedSender<Command>,
    inner: &Rc<RefCell<SessionInner>>,
    request: Structure,
    no_response: bool,
) -> Result<Structure, SessionError> {
    let (response_tx, response_rx) = oneshot::channel();
    let (msg_id_tx, msg_id_rx) = oneshot::channel();

    if cmd_tx
        .send(Command::Write {
            request,
            response_tx,
            msg_id_tx,
        })
        .is_err()
    {
        return Err(SessionError::Interruption);
    }

    let msg_id = match msg_id_rx.await {
        Ok(msg_id) => msg_id,
        Err(_) => return response_rx.await.unwrap_or(Err(SessionError::Interruption)),
    };

    if no_response {
        let cleanup_inner = Rc::clone(inner);
        task::spawn_local(async move {
            tokio::time::sleep(RESPONSE_DEADLINE).await;
            cleanup_inner.borrow_mut().registry.remove_request(msg_id);
        });
        return Ok(Structure::new());
    }

    match tokio::time::timeout(RESPONSE_DEADLINE, response_rx).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(SessionError::Interruption),
        Err(_) => {
            inner.borrow_mut().registry.remove_request(msg_id);
            Err(SessionError::DeadlineExceeded)
        }
    }
}

/// Sends `request` using a transport the caller already owns exclusively
/// (the loop task itself, or `start_loop` before the loop task exists),
/// flushing pending acks first. Returns the assigned message id on success;
/// on failure, `response_tx` has already been fulfilled with the error.
pub(crate) async fn send_direct<T: Transport>(
    transport: &mut T,
    inner: &Rc<RefCell<SessionInner>>,
    request: Structure,
    response_tx: oneshot::Sender<Result<Structure, SessionError>>,
) -> Option<u64> {
    if let Err(error) = flush_acks(transport, inner).await {
        let _ = response_tx.send(Err(error));
        return None;
    }

    let odd_seqno = inner.borrow_mut().seqno.next_odd();
    let request_for_registry = request.clone();
    let (msg_id, write_complete) = transport.write(odd_seqno, request);
    inner
        .borrow_mut()
        .registry
        .insert_request(msg_id, PendingRequest::new(request_for_registry, response_tx));

    match tokio::time::timeout(WRITE_DEADLINE, write_complete).await {
        Ok(Ok(())) => {
            inner.borrow_mut().seqno_increment += 1;
            Some(msg_id)
        }
        Ok(Err(error)) => {
            if let Some(pending) = inner.borrow_mut().registry.remove_request(msg_id) {
                pending.fulfil_err(error.clone().into());
            }
            None
        }
        Err(_) => {
            if let Some(pending) = inner.borrow_mut().registry.remove_request(msg_id) {
                pending.fulfil_err(SessionError::DeadlineExceeded);
            }
            None
        }
    }
}

/// Flushes the ack buffer unconditionally (gated on `stable_seqno` and
/// non-emptiness internally). Called both before every `send_direct` and
/// from the read loop when the size/age threshold trips.
async fn flush_acks<T: Transport>(transport: &mut T, inner: &Rc<RefCell<SessionInner>>) -> Result<(), SessionError> {
    let plan = {
        let mut state = inner.borrow_mut();
        state.ack.touch();
        if state.ack.is_empty() || !state.stable_seqno {
            None
        } else {
            let seqno = state.seqno.next_even();
            Some((seqno, state.ack.ids().to_vec()))
        }
    };
    let Some((even_seqno, ids)) = plan else {
        return Ok(());
    };

    let body = structure(
        "msgs_ack",
        [(
            "msg_ids",
            Value::List(ids.iter().map(|id| Value::Int(*id as i64)).collect()),
        )],
    );
    let (_msg_id, write_complete) = transport.write(even_seqno, body);
    match tokio::time::timeout(WRITE_DEADLINE, write_complete).await {
        Ok(Ok(())) => {
            inner.borrow_mut().ack.clear();
            Ok(())
        }
        Ok(Err(error)) => Err(error.into()),
        Err(_) => Err(SessionError::DeadlineExceeded),
    }
}

async fn flush_if_threshold<T: Transport>(
    transport: &mut T,
    inner: &Rc<RefCell<SessionInner>>,
) -> Result<(), SessionError> {
    let should_flush = {
        let state = inner.borrow();
        state.stable_seqno && state.ack.threshold_reached()
    };
    if should_flush { flush_acks(transport, inner).await } else { Ok(()) }
}

async fn handle_classified<T: Transport>(
    transport: &mut T,
    inner: &Rc<RefCell<SessionInner>>,
    cmd_tx: &mpsc::UnboundedSender<Command>,
    msg_id: u64,
    seqno: u32,
    body: ServerBody,
) {
    match body {
        ServerBody::RpcResult { req_msg_id, result } => {
            if let Some(pending) = inner.borrow_mut().registry.remove_request(req_msg_id) {
                pending.fulfil_ok(result);
            }
            let mut state = inner.borrow_mut();
            state.stable_seqno = true;
            state.seqno_increment = 1;
        }
        ServerBody::Pong { msg_id: echoed_msg_id, ping_id } => {
            inner.borrow_mut().registry.remove_pong(ping_id);
            if let Some(pending) = inner.borrow_mut().registry.remove_request(echoed_msg_id) {
                pending.fulfil_ok(ping::pong_result());
            }
            schedule_next_ping(Rc::clone(inner), cmd_tx.clone());
        }
        ServerBody::BadServerSalt {
            bad_msg_id,
            new_server_salt,
        } => {
            recovery::handle_bad_server_salt(transport, inner, bad_msg_id, new_server_salt).await;
        }
        ServerBody::BadMsgNotification { bad_msg_id, error_code } => {
            recovery::handle_bad_msg_notification(transport, inner, bad_msg_id, error_code).await;
        }
        ServerBody::Unknown(body) => {
            trace!("ignoring message {msg_id} with unhandled constructor {:?}", cons_of(&body));
        }
    }

    if seqno % 2 == 1 {
        inner.borrow_mut().ack.enqueue(msg_id);
    }
}

async fn run_loop<T: Transport>(
    mut transport: T,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    inner: Rc<RefCell<SessionInner>>,
    cmd_tx: mpsc::UnboundedSender<Command>,
) {
    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(Command::Write { request, response_tx, msg_id_tx }) => {
                        if let Some(msg_id) = send_direct(&mut transport, &inner, request, response_tx).await {
                            let _ = msg_id_tx.send(msg_id);
                        }
                    }
                    Some(Command::Stop) | None => {
                        transport.stop();
                        break;
                    }
                }
            }
            read_result = transport.read() => {
                match read_result {
                    Ok(message) => {
                        // The envelope's own seqno must be observed too: a
                        // msg_container can carry a higher seqno than any of
                        // its inner messages, and `observe` never lowers the
                        // counter so flattening first would lose it.
                        inner.borrow_mut().seqno.observe(message.seqno);
                        for classified in dispatch::flatten(message) {
                            inner.borrow_mut().seqno.observe(classified.seqno);
                            handle_classified(
                                &mut transport,
                                &inner,
                                &cmd_tx,
                                classified.msg_id,
                                classified.seqno,
                                classified.body,
                            )
                            .await;
                        }
                        if let Err(error) = flush_if_threshold(&mut transport, &inner).await {
                            warn!("batched ack flush failed, will retry at the next threshold: {error}");
                        }
                    }
                    Err(error) => {
                        warn!("read loop terminating: {error}");
                        disconnect(&inner);
                        break;
                    }
                }
            }
        }
    }
}
