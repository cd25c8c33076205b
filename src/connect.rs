// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! How a [`crate::Session`] obtains a fresh [`Transport`](crate::transport::Transport)
//! when it needs to (re)connect.
//!
//! Establishing the actual socket, running the key exchange, and wiring up
//! AES-IGE encryption are all `grammers-mtproto`/`grammers-mtsender`
//! responsibilities out of scope for this crate; a [`Connect`] implementation
//! is the caller-supplied bridge to that machinery.

use crate::datacenter::{AuthKey, DatacenterDescriptor};
use crate::transport::{Transport, TransportError};

/// Produces a connected [`Transport`] for a given datacenter and auth key.
pub trait Connect {
    type Transport: Transport;

    fn connect(
        &self,
        datacenter: &DatacenterDescriptor,
        auth_key: &AuthKey,
    ) -> impl std::future::Future<Output = Result<Self::Transport, TransportError>>;
}

/// Adapts any `Fn(&DatacenterDescriptor, &AuthKey) -> Fut` closure into a
/// [`Connect`] implementation, the same way `grammers-mtsender` lets callers
/// hand it a bare async closure instead of a named type.
pub struct FnConnect<F> {
    f: F,
}

impl<F> FnConnect<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F, Fut, T> Connect for FnConnect<F>
where
    F: Fn(&DatacenterDescriptor, &AuthKey) -> Fut,
    Fut: std::future::Future<Output = Result<T, TransportError>>,
    T: Transport,
{
    type Transport = T;

    fn connect(
        &self,
        datacenter: &DatacenterDescriptor,
        auth_key: &AuthKey,
    ) -> impl std::future::Future<Output = Result<T, TransportError>> {
        (self.f)(datacenter, auth_key)
    }
}
