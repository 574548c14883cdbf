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

//! Connection state, write path, and the demultiplexing read loop.
//!
//! [`Control`] is the state shared between the owning client, the read
//! loop, per-call deadline tasks, and response tickets. The read loop holds
//! the only long-lived strong reference while it runs; deadlines and
//! tickets hold weak references and upgrade transiently, so no waiter keeps
//! a connection alive past its client.
//!
//! A single read loop per connection reads frames and dispatches them to
//! waiters by sequence number. It starts lazily with the first outstanding
//! request and exits once the waiter table drains. Any read failure,
//! protocol violation, or close signal aborts the loop, which then fails
//! every remaining waiter with the same local error.

use std::io;
use std::mem;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::io::{split, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex as AsyncMutex};

use crate::client::pending::{DeliveryMode, RawPayload, RawResponse, WaiterTable};
use crate::error::{ErrorKind, RpcError, RpcResult};
use crate::protocol::{ResponseHeader, RESP_HEAD_LEN};

/// Initial capacity of the shared receive buffer.
const DEFAULT_READ_BUF_CAPACITY: usize = 256;

/// The transport under a connection: plain TCP or a client-mode TLS stream.
pub(crate) enum RpcStream {
    Plain(TcpStream),
    #[cfg(feature = "tls")]
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl AsyncRead for RpcStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut *self {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            #[cfg(feature = "tls")]
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for RpcStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut *self {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            #[cfg(feature = "tls")]
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            #[cfg(feature = "tls")]
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            #[cfg(feature = "tls")]
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Receive buffers of one response frame: body plus attachment.
///
/// The connection reuses one instance across frames; `Own`-mode deliveries
/// move it out, borrow-mode deliveries publish it as the connection's
/// shared buffer.
#[derive(Debug, Default)]
pub struct ResponseBuffer {
    pub(crate) body: Vec<u8>,
    pub(crate) attachment: Vec<u8>,
}

impl ResponseBuffer {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            body: Vec::with_capacity(capacity),
            attachment: Vec::new(),
        }
    }

    /// The response body bytes.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The response attachment bytes; empty when the server attached none.
    pub fn attachment(&self) -> &[u8] {
        &self.attachment
    }

    /// Consumes the buffer, returning the attachment.
    pub fn into_attachment(self) -> Vec<u8> {
        self.attachment
    }
}

/// Connection state shared between the client, the read loop, deadline
/// tasks, and response tickets.
pub(crate) struct Control {
    /// Monotonic: once closed, only a reset (new `Control`) clears it.
    pub(crate) has_closed: AtomicBool,
    /// Set by any deadline that fired and triggered the close.
    pub(crate) is_timeout: AtomicBool,
    /// In-flight waiters keyed by sequence number.
    pub(crate) waiters: Mutex<WaiterTable>,
    /// Shared receive buffer published for borrow-mode deliveries.
    pub(crate) resp_buffer: Mutex<ResponseBuffer>,
    writer: AsyncMutex<Option<WriteHalf<RpcStream>>>,
    reader: Mutex<Option<ReadHalf<RpcStream>>>,
    closed_tx: watch::Sender<bool>,
    client_id: u32,
}

impl Control {
    pub(crate) fn new(client_id: u32) -> Arc<Self> {
        let (closed_tx, _) = watch::channel(false);
        Arc::new(Self {
            has_closed: AtomicBool::new(false),
            is_timeout: AtomicBool::new(false),
            waiters: Mutex::new(WaiterTable::new()),
            resp_buffer: Mutex::new(ResponseBuffer::default()),
            writer: AsyncMutex::new(None),
            reader: Mutex::new(None),
            closed_tx,
            client_id,
        })
    }

    /// Splits a freshly connected stream into the reader slot and writer
    /// slot.
    pub(crate) async fn attach_stream(&self, stream: RpcStream) {
        let (reader, writer) = split(stream);
        *self.writer.lock().await = Some(writer);
        *self.reader.lock().unwrap() = Some(reader);
    }

    /// Marks the connection closed and schedules the socket teardown.
    ///
    /// Idempotent and callable from any thread. The close signal aborts a
    /// read loop blocked mid-read; the actual shutdown happens on a spawned
    /// task so no caller ever touches the stream concurrently. Waiters that
    /// no read loop will ever service are failed here; an active read loop
    /// broadcasts to its own waiters when it aborts.
    pub(crate) fn close_socket(control: &Arc<Self>) {
        if control.has_closed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(client_id = control.client_id, "closing connection");
        let _ = control.closed_tx.send(true);

        let stranded = {
            let mut table = control.waiters.lock().unwrap();
            if table.is_recving {
                Vec::new()
            } else {
                table.drain()
            }
        };
        if !stranded.is_empty() {
            let err = control.close_error();
            for waiter in stranded {
                waiter.fail(err.clone());
            }
        }

        // The shutdown itself runs on the runtime so no caller ever touches
        // the stream concurrently. Without a runtime (client dropped after
        // the runtime shut down) the halves are freed with the control
        // block.
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let control = control.clone();
            runtime.spawn(async move {
                if let Some(mut writer) = control.writer.lock().await.take() {
                    let _ = writer.shutdown().await;
                }
                *control.reader.lock().unwrap() = None;
            });
        }
    }

    /// Writes one fully formed frame, optionally followed by its
    /// attachment, as back-to-back segments.
    ///
    /// On any failure the connection is closed and the error is reported as
    /// [`ErrorKind::TimedOut`] if a deadline already fired, otherwise
    /// [`ErrorKind::IoError`]. Writes are never retried.
    pub(crate) async fn send_frame(
        self: &Arc<Self>,
        frame: &[u8],
        attachment: &[u8],
    ) -> RpcResult<()> {
        let mut closed = self.closed_tx.subscribe();
        if self.has_closed.load(Ordering::SeqCst) {
            return Err(RpcError::new(ErrorKind::IoError, "client has been closed"));
        }

        let mut guard = self.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            // the close task may have emptied the slot between the flag
            // check and the lock
            return if self.has_closed.load(Ordering::SeqCst) {
                Err(RpcError::new(ErrorKind::IoError, "client has been closed"))
            } else {
                Err(RpcError::new(ErrorKind::NotConnected, "not connected"))
            };
        };
        let result = tokio::select! {
            result = async {
                writer.write_all(frame).await?;
                if !attachment.is_empty() {
                    writer.write_all(attachment).await?;
                }
                writer.flush().await
            } => result,
            _ = closed.changed() => {
                Err(io::Error::new(io::ErrorKind::ConnectionAborted, "connection closed"))
            }
        };
        drop(guard);

        match result {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::error!(
                    client_id = self.client_id,
                    error = %e,
                    "write failed, closing the connection"
                );
                Self::close_socket(self);
                if self.is_timeout.load(Ordering::SeqCst) {
                    Err(RpcError::from_kind(ErrorKind::TimedOut))
                } else {
                    Err(RpcError::new(
                        ErrorKind::IoError,
                        format!("write failed: {e}"),
                    ))
                }
            }
        }
    }

    /// Spawns the read loop if it is not already running.
    ///
    /// Called after a waiter has been registered and its frame written.
    pub(crate) fn start_recv_if_needed(self: &Arc<Self>) {
        {
            let mut table = self.waiters.lock().unwrap();
            if table.is_recving {
                return;
            }
            table.is_recving = true;
        }
        match self.reader.lock().unwrap().take() {
            Some(reader) => {
                tokio::spawn(recv_loop(self.clone(), reader));
            }
            None => {
                // closed (or never connected) in between; nothing to read
                self.waiters.lock().unwrap().is_recving = false;
            }
        }
    }

    /// The error every waiter receives when the connection goes away
    /// locally.
    pub(crate) fn close_error(&self) -> RpcError {
        if self.is_timeout.load(Ordering::SeqCst) {
            RpcError::from_kind(ErrorKind::TimedOut)
        } else {
            RpcError::new(ErrorKind::IoError, "client has been closed")
        }
    }

    fn map_read_abort(&self, abort: Abort) -> RpcError {
        match abort {
            Abort::Closed => self.close_error(),
            Abort::Io(e) => {
                if self.is_timeout.load(Ordering::SeqCst) {
                    RpcError::from_kind(ErrorKind::TimedOut)
                } else {
                    RpcError::new(ErrorKind::IoError, format!("read failed: {e}"))
                }
            }
        }
    }
}

enum Abort {
    /// The close signal fired while a read was pending.
    Closed,
    Io(io::Error),
}

/// Reads exactly `buf.len()` bytes, aborting early if the connection is
/// closed under the pending read.
async fn read_exact_or_closed(
    reader: &mut ReadHalf<RpcStream>,
    closed: &mut watch::Receiver<bool>,
    buf: &mut [u8],
) -> Result<(), Abort> {
    tokio::select! {
        result = reader.read_exact(buf) => result.map(|_| ()).map_err(Abort::Io),
        _ = closed.changed() => Err(Abort::Closed),
    }
}

/// The per-connection read loop.
///
/// Reads one fixed header, then exactly `body_length + attach_length`
/// payload bytes, looks up the waiter for the frame's sequence number, and
/// resolves it (moving or publishing the buffers per its delivery mode).
/// Exits when the waiter table drains; on any failure closes the socket and
/// fails every remaining waiter with the same error.
pub(crate) async fn recv_loop(control: Arc<Control>, mut reader: ReadHalf<RpcStream>) {
    let mut closed = control.closed_tx.subscribe();
    let mut buffer = ResponseBuffer::with_capacity(DEFAULT_READ_BUF_CAPACITY);

    let err: RpcError = loop {
        if control.has_closed.load(Ordering::SeqCst) {
            break control.close_error();
        }

        let mut head = [0u8; RESP_HEAD_LEN];
        if let Err(abort) = read_exact_or_closed(&mut reader, &mut closed, &mut head).await {
            break control.map_read_abort(abort);
        }
        let header = match ResponseHeader::decode(&head) {
            Ok(header) => header,
            Err(e) => {
                tracing::error!(
                    client_id = control.client_id,
                    error = %e,
                    "invalid response header, closing the socket"
                );
                break RpcError::new(ErrorKind::IoError, e.msg);
            }
        };

        buffer.body.resize(header.body_length as usize, 0);
        if header.attach_length == 0 {
            if let Err(abort) =
                read_exact_or_closed(&mut reader, &mut closed, &mut buffer.body).await
            {
                break control.map_read_abort(abort);
            }
            buffer.attachment.clear();
        } else {
            buffer.attachment.resize(header.attach_length as usize, 0);
            if let Err(abort) =
                read_exact_or_closed(&mut reader, &mut closed, &mut buffer.body).await
            {
                break control.map_read_abort(abort);
            }
            if let Err(abort) =
                read_exact_or_closed(&mut reader, &mut closed, &mut buffer.attachment).await
            {
                break control.map_read_abort(abort);
            }
        }

        let waiter = control.waiters.lock().unwrap().remove(header.seq_num);
        match waiter {
            Some(waiter) => {
                tracing::trace!(seq_num = header.seq_num, "dispatching response");
                let payload = match waiter.mode() {
                    DeliveryMode::Borrow => {
                        *control.resp_buffer.lock().unwrap() = mem::take(&mut buffer);
                        RawPayload::Shared
                    }
                    DeliveryMode::Own => RawPayload::Owned(mem::take(&mut buffer)),
                };
                waiter.complete(RawResponse::Remote {
                    payload,
                    err_code: header.err_code,
                });
            }
            None => {
                tracing::error!(
                    client_id = control.client_id,
                    seq_num = header.seq_num,
                    "response for unknown request id, closing the socket"
                );
                break RpcError::new(
                    ErrorKind::IoError,
                    format!("response for unknown request id {}", header.seq_num),
                );
            }
        }

        // Park the reader before deciding to exit, so a sender that
        // registers concurrently can restart the loop without losing it.
        *control.reader.lock().unwrap() = Some(reader);
        {
            let mut table = control.waiters.lock().unwrap();
            if table.is_empty() {
                table.is_recving = false;
                tracing::trace!(client_id = control.client_id, "waiter table drained");
                return;
            }
        }
        match control.reader.lock().unwrap().take() {
            Some(parked) => reader = parked,
            None => break control.close_error(),
        }
    };

    Control::close_socket(&control);
    let stranded = {
        let mut table = control.waiters.lock().unwrap();
        table.is_recving = false;
        table.drain()
    };
    tracing::error!(
        client_id = control.client_id,
        error = %err,
        in_flight = stranded.len(),
        "read loop aborted, failing in-flight calls"
    );
    for waiter in stranded {
        waiter.fail(err.clone());
    }
}
