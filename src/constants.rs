// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Named thresholds shared by the session controller, ack batcher, and
//! ping watchdog.

use std::time::Duration;

/// How long a single transport write may take before `rpc_call` gives up.
pub const WRITE_DEADLINE: Duration = Duration::from_secs(120);

/// How long a `rpc_call` waits for its `rpc_result` before giving up.
pub const RESPONSE_DEADLINE: Duration = Duration::from_secs(600);

/// How long we wait for a `pong` before tearing the session down.
pub const PING_DISCONNECT_DELAY: Duration = Duration::from_secs(10);

/// Delay between a `pong` being received and the next `ping` being sent.
pub const PING_INTERVAL: Duration = Duration::from_secs(10);

/// Maximum age of the oldest unacknowledged message id before a flush.
pub const ACK_MAX_AGE: Duration = Duration::from_secs(10);

/// Maximum number of buffered message ids before a flush.
pub const ACK_MAX_SIZE: usize = 32;

/// Upper clamp for `seqno_increment`, i.e. `2^31 - 1`.
pub const MAX_SEQNO_INCREMENT: u32 = (1 << 31) - 1;

/// `bad_msg_notification` error code meaning "msg_seqno too low".
pub const ERROR_MSG_SEQNO_TOO_LOW: i32 = 32;
