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

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

//! # seqrpc — asynchronous, pipelined binary RPC client
//!
//! `seqrpc` is the client side of a binary request/response RPC protocol
//! with pipelined (multiplexed) semantics over a single TCP — optionally
//! TLS — connection. Typed calls are encoded as length-prefixed frames,
//! written to the server, and decoded replies are dispatched back to
//! per-request waiters by sequence number.
//!
//! - **Pipelining**: any number of calls may be in flight concurrently on
//!   one connection; replies may arrive in any order and are demultiplexed
//!   by sequence number.
//! - **Per-call timeouts**: a deadline that elapses closes the connection
//!   and fails every in-flight call.
//! - **Attachments**: opaque byte blobs carried alongside request and
//!   response payloads without passing through the codec.
//! - **TLS**: optional client-mode TLS with CA verification and SNI
//!   (feature `tls`).
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use seqrpc::{function_id, RpcClient};
//!
//! const ECHO: u64 = function_id("echo");
//!
//! # async fn example() -> Result<(), seqrpc::RpcError> {
//! let mut client = RpcClient::new(0);
//! client.connect("127.0.0.1:8801").await?;
//!
//! let reply: String = client.call(ECHO, &("hello",)).await?;
//! assert_eq!(reply, "hello");
//! # Ok(())
//! # }
//! ```
//!
//! ## Pipelining
//!
//! [`RpcClient::send_request`] separates "request written" from "response
//! received": the outer future resolves once the frame is on the wire and
//! the waiter registered, yielding a [`ResponseTicket`] that resolves when
//! the reply arrives. Fire N requests, then await N tickets:
//!
//! ```rust,no_run
//! # use seqrpc::{function_id, RpcClient};
//! # const SQUARE: u64 = function_id("square");
//! # async fn example(client: &RpcClient) -> Result<(), seqrpc::RpcError> {
//! let t1 = client.send_request::<i64, _>(SQUARE, &(3i64,)).await?;
//! let t2 = client.send_request::<i64, _>(SQUARE, &(4i64,)).await?;
//! assert_eq!(t1.recv().await?.into_value(), 9);
//! assert_eq!(t2.recv().await?.into_value(), 16);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error handling
//!
//! Every public operation returns [`RpcResult`], discriminating success
//! from [`RpcError`] with a stable machine-checkable [`ErrorKind`]. Local
//! failures (I/O, timeout, protocol violations) close the connection and
//! fail every outstanding call; server-side errors close it only when the
//! stream may be desynchronized. After any terminal error the client can be
//! revived with [`RpcClient::reconnect`].

pub mod client;
pub mod codec;
pub mod error;
pub mod protocol;

pub use client::{CallResponse, ClientConfig, ResponseBuffer, ResponseTicket, RpcClient};
pub use codec::function_id;
pub use error::{ErrorKind, RpcError, RpcResult};
