//
// Copyright 2026 the seqrpc authors. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Tracking of in-flight calls awaiting responses.
//!
//! Each outstanding request owns a [`Waiter`]: a one-shot completion
//! channel, the per-call deadline task, and the delivery mode for its
//! payload. The [`WaiterTable`] maps sequence numbers to waiters so the
//! read loop can route responses back to the correct caller even when
//! replies arrive out of order.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::client::conn::ResponseBuffer;
use crate::error::RpcError;

/// How a response payload reaches its waiter.
///
/// A caller that awaits strictly sequentially can decode straight out of
/// the connection's shared receive buffer, skipping a move; that requires
/// exactly one call outstanding, so at most one waiter per connection is in
/// `Borrow` mode at a time. Pipelined callers get the buffers moved into
/// their waiter before the loop reads the next frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeliveryMode {
    /// Decode from the connection's shared receive buffer.
    Borrow,
    /// Move the receive buffers into the waiter.
    Own,
}

/// Raw payload handed to a waiter, per its [`DeliveryMode`].
#[derive(Debug)]
pub(crate) enum RawPayload {
    /// The payload sits in the connection's shared receive buffer.
    Shared,
    /// The payload was moved out of the connection.
    Owned(ResponseBuffer),
}

/// What the read loop (or an error broadcast) delivers to a waiter.
#[derive(Debug)]
pub(crate) enum RawResponse {
    /// A response frame arrived for this call.
    Remote {
        /// Body and attachment, per the waiter's delivery mode.
        payload: RawPayload,
        /// Error-code byte from the response header.
        err_code: u8,
    },
    /// The connection failed before a response arrived.
    Local(RpcError),
}

/// One in-flight call: completion channel, deadline, delivery mode.
#[derive(Debug)]
pub(crate) struct Waiter {
    tx: oneshot::Sender<RawResponse>,
    timer: Option<JoinHandle<()>>,
    mode: DeliveryMode,
}

impl Waiter {
    pub(crate) fn new(
        tx: oneshot::Sender<RawResponse>,
        timer: Option<JoinHandle<()>>,
        mode: DeliveryMode,
    ) -> Self {
        Self { tx, timer, mode }
    }

    pub(crate) fn mode(&self) -> DeliveryMode {
        self.mode
    }

    /// Resolves the waiter and cancels its deadline.
    ///
    /// A send error means the caller dropped its ticket; the response is
    /// discarded, as cancelling a call never cancels the server-side work.
    pub(crate) fn complete(self, response: RawResponse) {
        if let Some(timer) = &self.timer {
            timer.abort();
        }
        let _ = self.tx.send(response);
    }

    /// Resolves the waiter with a local error.
    pub(crate) fn fail(self, err: RpcError) {
        self.complete(RawResponse::Local(err));
    }

    /// Cancels the deadline and drops the waiter without resolving it.
    ///
    /// Used when registration is rolled back before the caller ever
    /// receives a ticket.
    pub(crate) fn discard(self) {
        if let Some(timer) = &self.timer {
            timer.abort();
        }
    }
}

/// Map from in-flight sequence number to waiter.
///
/// `is_recving` lives inside the table so lazy read-loop startup and
/// read-loop exit are linearized under one lock.
#[derive(Debug)]
pub(crate) struct WaiterTable {
    entries: HashMap<u32, Waiter>,
    pub(crate) is_recving: bool,
}

impl WaiterTable {
    pub(crate) fn new() -> Self {
        Self {
            entries: HashMap::new(),
            is_recving: false,
        }
    }

    /// Registers a waiter under `seq_num`.
    ///
    /// A sequence number may not be reused while its previous entry is
    /// live; on collision the new waiter is handed back untouched.
    pub(crate) fn insert(&mut self, seq_num: u32, waiter: Waiter) -> Result<(), Waiter> {
        match self.entries.entry(seq_num) {
            Entry::Occupied(_) => Err(waiter),
            Entry::Vacant(slot) => {
                slot.insert(waiter);
                Ok(())
            }
        }
    }

    pub(crate) fn remove(&mut self, seq_num: u32) -> Option<Waiter> {
        self.entries.remove(&seq_num)
    }

    /// Takes every waiter out of the table, for an error broadcast.
    pub(crate) fn drain(&mut self) -> Vec<Waiter> {
        self.entries.drain().map(|(_, waiter)| waiter).collect()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
