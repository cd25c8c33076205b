// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Builds the `ping` request and the empty mapping its `pong` is fulfilled
//! with.
//!
//! The watchdog behavior itself — arming the per-probe disconnect timer and
//! rescheduling the next probe — is orchestrated by [`crate::session`],
//! since both require access to the pending registry and the command
//! channel this module has no business knowing about.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::SystemTime;

use crate::value::{Structure, Value, structure};

/// Generates a probably-unique 64-bit ping id, the same way
/// `grammers-mtsender::generate_random_id` seeds a counter off the system
/// clock and then increments it, rather than pulling in a dedicated RNG
/// crate for a value whose only requirement is "don't collide with the last
/// one".
pub fn random_ping_id() -> i64 {
    static LAST_ID: AtomicI64 = AtomicI64::new(0);

    while LAST_ID.load(Ordering::SeqCst) == 0 {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .expect("system time is before epoch")
            .as_nanos() as i64;

        if LAST_ID.compare_exchange(0, now, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            std::thread::yield_now();
        }
    }

    LAST_ID.fetch_add(1, Ordering::SeqCst)
}

/// Builds the `ping` request body for a given probe id.
pub fn ping_request(ping_id: i64) -> Structure {
    structure("ping", [("ping_id", Value::Int(ping_id))])
}

/// The empty mapping a ping's pending request is fulfilled with once its
/// `pong` arrives.
pub fn pong_result() -> Structure {
    Structure::new()
}
