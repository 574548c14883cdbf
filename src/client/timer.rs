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

//! Per-call deadlines.
//!
//! A deadline that fires closes the whole connection: the protocol has no
//! cancel frame, so expiring a single call without closing would leave the
//! stream carrying a reply nobody reads. Closing fails every in-flight
//! call; callers needing independent timeouts use separate connections.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::client::conn::Control;

/// Arms a deadline that closes the connection when it fires.
///
/// The task holds only a weak reference: if the client is gone by expiry,
/// firing is a no-op. The returned handle is aborted when the call
/// completes first.
pub(crate) fn arm_deadline(control: &Arc<Control>, duration: Duration) -> JoinHandle<()> {
    let watcher: Weak<Control> = Arc::downgrade(control);
    tokio::spawn(async move {
        tokio::time::sleep(duration).await;
        if let Some(control) = watcher.upgrade() {
            tracing::warn!("rpc deadline elapsed, closing the connection");
            control.is_timeout.store(true, Ordering::SeqCst);
            Control::close_socket(&control);
        }
    })
}
