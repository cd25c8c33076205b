// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::fmt;

use crate::transport::TransportError;

/// Errors surfaced to a caller awaiting [`crate::Session::rpc_call`].
#[derive(Clone, Debug)]
pub enum SessionError {
    /// The request was missing the mandatory `_cons` constructor tag.
    Usage(&'static str),

    /// The session was torn down, or this particular request was
    /// deregistered, before a response arrived. The caller may retry.
    Interruption,

    /// The write did not complete, or the response did not arrive, within
    /// its deadline.
    DeadlineExceeded,

    /// The underlying transport failed. The session has been torn down.
    Transport(TransportError),
}

impl std::error::Error for SessionError {}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Usage(msg) => write!(f, "usage error: {msg}"),
            Self::Interruption => write!(f, "request interrupted before completion"),
            Self::DeadlineExceeded => write!(f, "deadline exceeded"),
            Self::Transport(err) => write!(f, "transport failure: {err}"),
        }
    }
}

impl From<TransportError> for SessionError {
    fn from(error: TransportError) -> Self {
        Self::Transport(error)
    }
}
