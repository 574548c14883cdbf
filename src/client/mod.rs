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

//! The RPC client: connection lifecycle and the public call API.
//!
//! [`RpcClient`] owns one connection at a time. [`RpcClient::call`] and
//! [`RpcClient::call_for`] write a request and await its response;
//! [`RpcClient::send_request`] and [`RpcClient::send_request_for`] split
//! the two stages apart so callers can pipeline: fire N requests, then
//! await N [`ResponseTicket`]s. Replies may arrive in any order; the
//! sequence number restores per-caller matching.
//!
//! After any terminal error the connection stays closed until
//! [`RpcClient::reconnect`]; sequence numbers keep advancing across
//! reconnects.

mod config;
pub(crate) mod conn;
mod pending;
mod timer;

#[cfg(feature = "tls")]
mod tls;

use std::marker::PhantomData;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use tokio::net::TcpStream;
use tokio::sync::oneshot;

use crate::codec;
use crate::error::{ErrorKind, RpcError, RpcResult};
use crate::protocol;

use conn::{Control, RpcStream};
use pending::{DeliveryMode, RawPayload, RawResponse, Waiter};

pub use config::{ClientConfig, DEFAULT_TIMEOUT};
pub use conn::ResponseBuffer;

#[cfg(feature = "tls")]
use tls::TlsContext;

/// Client side of a pipelined binary RPC connection.
///
/// One client drives one TCP (optionally TLS) connection. Lifecycle
/// operations ([`connect`](Self::connect), [`reconnect`](Self::reconnect))
/// take `&mut self`; calls take `&self`, so any number of tasks can
/// pipeline requests over a shared reference once connected.
///
/// # Examples
///
/// ```rust,no_run
/// use seqrpc::{function_id, RpcClient};
///
/// const ECHO: u64 = function_id("echo");
///
/// # async fn example() -> Result<(), seqrpc::RpcError> {
/// let mut client = RpcClient::new(0);
/// client.connect("127.0.0.1:8801").await?;
/// let reply: String = client.call(ECHO, &("hi",)).await?;
/// # Ok(())
/// # }
/// ```
pub struct RpcClient {
    config: ClientConfig,
    control: Arc<Control>,
    request_id: AtomicU32,
    is_waiting_for_response: AtomicBool,
    req_attachment: Mutex<Vec<u8>>,
    #[cfg(feature = "tls")]
    tls: Option<TlsContext>,
    #[cfg(feature = "tls")]
    tls_ready: bool,
}

impl RpcClient {
    /// Creates an unconnected client.
    ///
    /// `client_id` is an opaque label carried in log events.
    pub fn new(client_id: u32) -> Self {
        Self {
            config: ClientConfig::new().with_client_id(client_id),
            control: Control::new(client_id),
            request_id: AtomicU32::new(0),
            is_waiting_for_response: AtomicBool::new(false),
            req_attachment: Mutex::new(Vec::new()),
            #[cfg(feature = "tls")]
            tls: None,
            #[cfg(feature = "tls")]
            tls_ready: true,
        }
    }

    /// Applies a full configuration before the first connect.
    ///
    /// With the `tls` feature enabled and `ssl_cert_path` set, the TLS
    /// context is built eagerly; a failure here poisons subsequent
    /// connects with [`ErrorKind::NotConnected`].
    pub fn init_config(&mut self, config: ClientConfig) -> RpcResult<()> {
        self.config = config;
        #[cfg(feature = "tls")]
        if let Some(cert_path) = self.config.ssl_cert_path.clone() {
            match TlsContext::from_ca_file(&cert_path, &self.config.ssl_domain) {
                Ok(context) => {
                    self.tls = Some(context);
                    self.tls_ready = true;
                }
                Err(e) => {
                    tracing::error!(error = %e, "init tls failed");
                    self.tls_ready = false;
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// The configured target host.
    pub fn host(&self) -> &str {
        &self.config.host
    }

    /// The configured target port.
    pub fn port(&self) -> &str {
        &self.config.port
    }

    /// The opaque client id used in log events.
    pub fn client_id(&self) -> u32 {
        self.config.client_id
    }

    /// Whether the connection has been closed (by [`close`](Self::close),
    /// an error, or a deadline). Cleared only by
    /// [`reconnect`](Self::reconnect).
    pub fn has_closed(&self) -> bool {
        self.control.has_closed.load(Ordering::SeqCst)
    }

    /// Connects to a `"host:port"` endpoint using the configured timeout.
    ///
    /// Legal on a fresh client only; once closed, use
    /// [`reconnect`](Self::reconnect). On timeout the error is
    /// [`ErrorKind::TimedOut`], on any other failure
    /// [`ErrorKind::NotConnected`]; either way the client transitions to
    /// closed.
    pub async fn connect(&mut self, endpoint: &str) -> RpcResult<()> {
        self.connect_with_timeout(endpoint, self.config.timeout_duration)
            .await
    }

    /// Connects with an explicit deadline.
    pub async fn connect_with_timeout(
        &mut self,
        endpoint: &str,
        timeout: Duration,
    ) -> RpcResult<()> {
        let (host, port) = parse_endpoint(endpoint)?;
        self.config.host = host;
        self.config.port = port;
        self.config.timeout_duration = timeout;
        self.connect_inner(false).await
    }

    /// Re-creates the connection and connects again.
    ///
    /// Legal from any state: an open connection is closed first, the
    /// closed and timeout flags are cleared, and the sequence-number
    /// counter keeps advancing from where it left off.
    pub async fn reconnect(&mut self, endpoint: &str) -> RpcResult<()> {
        self.reconnect_with_timeout(endpoint, self.config.timeout_duration)
            .await
    }

    /// [`reconnect`](Self::reconnect) with an explicit deadline.
    pub async fn reconnect_with_timeout(
        &mut self,
        endpoint: &str,
        timeout: Duration,
    ) -> RpcResult<()> {
        let (host, port) = parse_endpoint(endpoint)?;
        self.config.host = host;
        self.config.port = port;
        self.config.timeout_duration = timeout;
        self.reset();
        self.connect_inner(true).await
    }

    fn reset(&mut self) {
        Control::close_socket(&self.control);
        self.control = Control::new(self.config.client_id);
    }

    async fn connect_inner(&mut self, is_reconnect: bool) -> RpcResult<()> {
        #[cfg(feature = "tls")]
        if !self.tls_ready {
            return Err(RpcError::from_kind(ErrorKind::NotConnected));
        }
        if !is_reconnect && self.control.has_closed.load(Ordering::SeqCst) {
            tracing::error!(
                "a closed client is not allowed to connect again, use reconnect or create a new client"
            );
            return Err(RpcError::new(
                ErrorKind::IoError,
                "client has been closed, please re-connect",
            ));
        }

        tracing::info!(
            client_id = self.config.client_id,
            host = %self.config.host,
            port = %self.config.port,
            "connecting"
        );
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let control = self.control.clone();
        let stream =
            match tokio::time::timeout(self.config.timeout_duration, TcpStream::connect(&addr))
                .await
            {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    Control::close_socket(&control);
                    return Err(RpcError::new(
                        ErrorKind::NotConnected,
                        format!("failed to connect {addr}: {e}"),
                    ));
                }
                Err(_) => {
                    tracing::warn!(client_id = self.config.client_id, "connect timeout");
                    control.is_timeout.store(true, Ordering::SeqCst);
                    Control::close_socket(&control);
                    return Err(RpcError::from_kind(ErrorKind::TimedOut));
                }
            };
        let _ = stream.set_nodelay(true);

        #[cfg(feature = "tls")]
        let stream = match &self.tls {
            Some(tls) => match tls.handshake(stream).await {
                Ok(tls_stream) => RpcStream::Tls(Box::new(tls_stream)),
                Err(e) => {
                    Control::close_socket(&control);
                    return Err(e);
                }
            },
            None => RpcStream::Plain(stream),
        };
        #[cfg(not(feature = "tls"))]
        let stream = RpcStream::Plain(stream);

        control.attach_stream(stream).await;
        Ok(())
    }

    /// Closes the connection.
    ///
    /// Idempotent and callable from any thread; the socket teardown is
    /// scheduled on the runtime. Every outstanding call fails with
    /// [`ErrorKind::IoError`], and every subsequent call fails immediately
    /// without touching the socket.
    pub fn close(&self) {
        tracing::info!(client_id = self.config.client_id, "client close");
        Control::close_socket(&self.control);
    }

    /// Stages an attachment to be carried by the next request.
    ///
    /// The bytes ride alongside the serialized arguments without passing
    /// through the codec, and are consumed by the next successful send.
    /// Attachments over `u32::MAX` bytes are rejected here, before
    /// anything is sent.
    pub fn set_req_attachment(&self, attachment: impl Into<Vec<u8>>) -> RpcResult<()> {
        let attachment = attachment.into();
        if attachment.len() as u64 > u32::MAX as u64 {
            tracing::error!("too large rpc attachment");
            return Err(RpcError::from_kind(ErrorKind::MessageTooLarge));
        }
        *self.req_attachment.lock().unwrap() = attachment;
        Ok(())
    }

    /// Returns a copy of the attachment from the most recent
    /// borrow-delivered response (the [`call`](Self::call) path).
    ///
    /// Pipelined responses carry their attachment on the
    /// [`CallResponse`] instead.
    pub fn resp_attachment(&self) -> Vec<u8> {
        self.control.resp_buffer.lock().unwrap().attachment.clone()
    }

    /// Takes the attachment out of the shared receive buffer.
    pub fn release_resp_attachment(&self) -> Vec<u8> {
        mem::take(&mut self.control.resp_buffer.lock().unwrap().attachment)
    }

    /// Calls a remote procedure with the default 5-second deadline.
    pub async fn call<R, A>(&self, function_id: u64, args: &A) -> RpcResult<R>
    where
        R: DeserializeOwned,
        A: Serialize + ?Sized,
    {
        self.call_for(DEFAULT_TIMEOUT, function_id, args).await
    }

    /// Calls a remote procedure and awaits its response.
    ///
    /// If `timeout` elapses first, the connection is closed and every
    /// in-flight call on it fails; a zero `timeout` arms no deadline. The
    /// response payload is decoded straight from the connection's receive
    /// buffer, which is why this path requires awaiting strictly
    /// sequentially — use [`send_request_for`](Self::send_request_for) to
    /// pipeline.
    pub async fn call_for<R, A>(
        &self,
        timeout: Duration,
        function_id: u64,
        args: &A,
    ) -> RpcResult<R>
    where
        R: DeserializeOwned,
        A: Serialize + ?Sized,
    {
        self.is_waiting_for_response.store(true, Ordering::SeqCst);
        let ticket = self
            .send_request_for::<R, A>(timeout, function_id, args)
            .await?;
        Ok(ticket.recv().await?.into_value())
    }

    /// Sends a request with the default 5-second deadline, without
    /// awaiting the response.
    ///
    /// See [`send_request_for`](Self::send_request_for).
    pub async fn send_request<R, A>(
        &self,
        function_id: u64,
        args: &A,
    ) -> RpcResult<ResponseTicket<R>>
    where
        R: DeserializeOwned,
        A: Serialize + ?Sized,
    {
        self.send_request_for(DEFAULT_TIMEOUT, function_id, args)
            .await
    }

    /// Sends a request and returns a ticket for its response.
    ///
    /// Resolves once the frame is written and the waiter registered: the
    /// request is on the wire when this returns, so a caller can fire N
    /// requests before awaiting any ticket. The deadline covers the full
    /// round trip and, like every deadline, closes the connection when it
    /// fires.
    pub async fn send_request_for<R, A>(
        &self,
        timeout: Duration,
        function_id: u64,
        args: &A,
    ) -> RpcResult<ResponseTicket<R>>
    where
        R: DeserializeOwned,
        A: Serialize + ?Sized,
    {
        let control = self.control.clone();
        if control.has_closed.load(Ordering::SeqCst) {
            tracing::error!("client has been closed, please re-connect");
            return Err(RpcError::new(
                ErrorKind::IoError,
                "client has been closed, please re-connect",
            ));
        }
        #[cfg(feature = "tls")]
        if !self.tls_ready {
            return Err(RpcError::from_kind(ErrorKind::NotConnected));
        }

        let attachment = mem::take(&mut *self.req_attachment.lock().unwrap());
        let seq_num = self.request_id.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(seq_num, "send request");
        let frame = match protocol::build_request(function_id, seq_num, attachment.len() as u32, args)
        {
            Ok(frame) => frame,
            Err(e) => {
                // nothing was sent; the staged attachment survives
                *self.req_attachment.lock().unwrap() = attachment;
                return Err(e);
            }
        };

        let timer = (timeout > Duration::ZERO).then(|| timer::arm_deadline(&control, timeout));
        let mode = if self.is_waiting_for_response.swap(false, Ordering::SeqCst) {
            DeliveryMode::Borrow
        } else {
            DeliveryMode::Own
        };
        let (tx, rx) = oneshot::channel();
        let waiter = Waiter::new(tx, timer, mode);

        if let Err(waiter) = control.waiters.lock().unwrap().insert(seq_num, waiter) {
            waiter.discard();
            self.close();
            return Err(RpcError::from_kind(ErrorKind::SerialNumberConflict));
        }
        if let Err(e) = control.send_frame(&frame, &attachment).await {
            if let Some(waiter) = control.waiters.lock().unwrap().remove(seq_num) {
                waiter.discard();
            }
            return Err(e);
        }
        control.start_recv_if_needed();

        Ok(ResponseTicket {
            rx,
            watcher: Arc::downgrade(&control),
            _marker: PhantomData,
        })
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        Control::close_socket(&self.control);
    }
}

/// Splits a `"host:port"` endpoint at the first `:`.
fn parse_endpoint(endpoint: &str) -> RpcResult<(String, String)> {
    match endpoint.split_once(':') {
        Some((host, port)) => Ok((host.to_string(), port.to_string())),
        None => Err(RpcError::new(
            ErrorKind::NotConnected,
            format!("invalid endpoint {endpoint:?}, expected \"host:port\""),
        )),
    }
}

/// Handle for a pipelined call whose request has been written.
///
/// Returned by [`RpcClient::send_request`]; [`recv`](Self::recv) resolves
/// when the response arrives. Dropping the ticket does not cancel the
/// server-side work — the reply is read off the wire and discarded.
pub struct ResponseTicket<R> {
    rx: oneshot::Receiver<RawResponse>,
    watcher: Weak<Control>,
    _marker: PhantomData<fn() -> R>,
}

impl<R> ResponseTicket<R>
where
    R: DeserializeOwned,
{
    /// Awaits and decodes the response for this call.
    ///
    /// Local failures surface as [`ErrorKind::TimedOut`] (a deadline fired)
    /// or [`ErrorKind::IoError`]. Server-side errors surface with the
    /// server's code and message; they close the connection exactly when
    /// the stream can no longer be trusted (see [`ErrorKind`]).
    pub async fn recv(self) -> RpcResult<CallResponse<R>> {
        let raw = self.rx.await.map_err(|_| {
            RpcError::new(ErrorKind::OperationCanceled, "response channel closed")
        })?;
        let (payload, err_code) = match raw {
            RawResponse::Local(err) => {
                return Err(match err.kind {
                    ErrorKind::TimedOut | ErrorKind::OperationCanceled => {
                        RpcError::new(ErrorKind::TimedOut, err.msg)
                    }
                    _ => RpcError::new(ErrorKind::IoError, err.msg),
                });
            }
            RawResponse::Remote { payload, err_code } => (payload, err_code),
        };

        let mut should_close = false;
        let result = match payload {
            RawPayload::Owned(buffer) => {
                handle_response_buffer::<R>(&buffer.body, err_code, &mut should_close)
                    .map(|value| CallResponse {
                        value,
                        buffer: Some(buffer),
                    })
            }
            RawPayload::Shared => {
                let control = self.watcher.upgrade().ok_or_else(|| {
                    RpcError::new(ErrorKind::IoError, "connection already dropped")
                })?;
                let buffer = control.resp_buffer.lock().unwrap();
                handle_response_buffer::<R>(&buffer.body, err_code, &mut should_close)
                    .map(|value| CallResponse {
                        value,
                        buffer: None,
                    })
            }
        };

        if should_close {
            if let Some(control) = self.watcher.upgrade() {
                Control::close_socket(&control);
            }
        }
        result
    }
}

/// Classifies a response body by the header's error-code byte.
///
/// `0` decodes the return value; `0xFF` decodes a full `(code, message)`
/// error; anything else decodes a bare message string for a user-level
/// error. A user-level error, or any decode failure, marks the connection
/// for closing — the stream is presumed desynchronized.
fn handle_response_buffer<R>(body: &[u8], err_code: u8, should_close: &mut bool) -> RpcResult<R>
where
    R: DeserializeOwned,
{
    if err_code == 0 {
        if let Ok(value) = codec::decode::<R>(body) {
            return Ok(value);
        }
    } else if err_code != u8::MAX {
        if let Ok(msg) = codec::decode_error_message(body) {
            *should_close = true;
            return Err(RpcError::from_parts(u16::from(err_code), msg));
        }
    } else if let Ok((code, msg)) = codec::decode_error_body(body) {
        return Err(RpcError::from_parts(code, msg));
    }

    *should_close = true;
    tracing::warn!("failed to deserialize rpc result");
    Err(RpcError::new(
        ErrorKind::InvalidRpcResult,
        "failed to deserialize rpc return value",
    ))
}

/// Decoded response of one pipelined call.
///
/// For pipelined (`Own`-mode) deliveries the response buffers ride along,
/// so the attachment is read from here; sequential [`RpcClient::call`]
/// responses leave the attachment in the client's shared buffer instead
/// (see [`RpcClient::resp_attachment`]).
#[derive(Debug)]
pub struct CallResponse<R> {
    value: R,
    buffer: Option<ResponseBuffer>,
}

impl<R> CallResponse<R> {
    /// The decoded return value.
    pub fn value(&self) -> &R {
        &self.value
    }

    /// Consumes the response, returning the decoded value.
    pub fn into_value(self) -> R {
        self.value
    }

    /// The response attachment, when the buffers were delivered owned.
    pub fn attachment(&self) -> Option<&[u8]> {
        self.buffer.as_ref().map(ResponseBuffer::attachment)
    }

    /// Consumes the response, returning the value and any owned buffers.
    pub fn into_parts(self) -> (R, Option<ResponseBuffer>) {
        (self.value, self.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_endpoint_splits_at_first_colon() {
        let (host, port) = parse_endpoint("127.0.0.1:8801").unwrap();
        assert_eq!(host, "127.0.0.1");
        assert_eq!(port, "8801");

        let (host, port) = parse_endpoint("a:1:2").unwrap();
        assert_eq!(host, "a");
        assert_eq!(port, "1:2");
    }

    #[test]
    fn test_parse_endpoint_rejects_missing_port() {
        let err = parse_endpoint("localhost").unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotConnected);
    }

    #[test]
    fn test_handle_response_success() {
        let body = codec::encode(&42u32).unwrap();
        let mut should_close = false;
        let value: u32 = handle_response_buffer(&body, 0, &mut should_close).unwrap();
        assert_eq!(value, 42);
        assert!(!should_close);
    }

    #[test]
    fn test_handle_response_bad_success_body_closes() {
        let mut should_close = false;
        let err = handle_response_buffer::<String>(&[0xFF, 0xFF], 0, &mut should_close)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidRpcResult);
        assert!(should_close);
    }

    #[test]
    fn test_handle_response_user_error_closes() {
        let body = codec::encode("bad arg").unwrap();
        let mut should_close = false;
        let err = handle_response_buffer::<String>(&body, 3, &mut should_close).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TimedOut); // code 3 is the timed-out wire value
        assert_eq!(err.msg, "bad arg");
        assert!(should_close);
    }

    #[test]
    fn test_handle_response_framework_error_does_not_close() {
        let body = codec::encode(&(8u16, "function not registered".to_string())).unwrap();
        let mut should_close = false;
        let err = handle_response_buffer::<String>(&body, u8::MAX, &mut should_close).unwrap_err();
        assert_eq!(err.kind, ErrorKind::FunctionNotRegistered);
        assert!(!should_close);
    }

    #[tokio::test]
    async fn test_call_before_connect_is_not_connected() {
        let client = RpcClient::new(0);
        let err = client.call::<(), _>(1, &()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotConnected);
    }

    #[tokio::test]
    async fn test_call_after_close_fails_without_socket() {
        let client = RpcClient::new(0);
        client.close();
        let err = client.call::<(), _>(1, &()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::IoError);
        assert!(client.has_closed());
    }

    #[tokio::test]
    async fn test_connect_refused_is_not_connected() {
        let mut client = RpcClient::new(0);
        // port 1 is essentially never listening on loopback
        let err = client.connect("127.0.0.1:1").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotConnected);
        assert!(client.has_closed());
    }
}
