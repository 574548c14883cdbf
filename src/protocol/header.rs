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

//! Fixed-size frame headers.
//!
//! Field order and widths are wire-compatible requirements; all multi-byte
//! fields are little-endian. Request and response headers have the same
//! total size and share the trailing `body_length`/`seq_num`/`attach_length`
//! block at offsets 12, 16, and 20.

use crate::error::{ErrorKind, RpcError};
use crate::protocol::{MAGIC, REQ_HEAD_LEN, RESP_HEAD_LEN, VERSION};

/// Request frame header.
///
/// Layout (24 bytes, little-endian):
///
/// ```text
/// ┌───────┬─────────┬────────────────┬───────┬─────────────┬─────────────┬─────────┬───────────────┐
/// │ magic │ version │ serialize_type │ flags │ function_id │ body_length │ seq_num │ attach_length │
/// │  u8   │   u8    │       u8       │  u8   │     u64     │     u32     │   u32   │      u32      │
/// └───────┴─────────┴────────────────┴───────┴─────────────┴─────────────┴─────────┴───────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    /// Codec tag for the body.
    pub serialize_type: u8,
    /// Compile-time hash identifying the remote procedure.
    pub function_id: u64,
    /// Size of the serialized argument payload, excluding the attachment.
    pub body_length: u32,
    /// Client-chosen identifier, unique per in-flight call.
    pub seq_num: u32,
    /// Size of the attached opaque bytes; may be zero.
    pub attach_length: u32,
}

impl RequestHeader {
    /// Appends the encoded header to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.reserve(REQ_HEAD_LEN);
        out.push(MAGIC);
        out.push(VERSION);
        out.push(self.serialize_type);
        out.push(0); // flags, reserved
        out.extend_from_slice(&self.function_id.to_le_bytes());
        out.extend_from_slice(&self.body_length.to_le_bytes());
        out.extend_from_slice(&self.seq_num.to_le_bytes());
        out.extend_from_slice(&self.attach_length.to_le_bytes());
    }

    /// Decodes and validates a request header.
    ///
    /// The client never reads requests; this is the server-side inverse of
    /// [`RequestHeader::encode_into`] used by loopback servers in tests.
    pub fn decode(buf: &[u8; REQ_HEAD_LEN]) -> Result<Self, RpcError> {
        if buf[0] != MAGIC {
            return Err(RpcError::new(
                ErrorKind::ProtocolError,
                format!("bad magic number {:#04x} in request header", buf[0]),
            ));
        }
        if buf[1] != VERSION {
            return Err(RpcError::new(
                ErrorKind::UnknownProtocolVersion,
                format!("unsupported protocol version {}", buf[1]),
            ));
        }
        Ok(Self {
            serialize_type: buf[2],
            function_id: u64::from_le_bytes(buf[4..12].try_into().unwrap()),
            body_length: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
            seq_num: u32::from_le_bytes(buf[16..20].try_into().unwrap()),
            attach_length: u32::from_le_bytes(buf[20..24].try_into().unwrap()),
        })
    }
}

/// Response frame header.
///
/// Same total size as [`RequestHeader`]; the `function_id` slot is reserved
/// and the fourth byte carries the server's error code:
///
/// - `0` — success, the body is the encoded return value.
/// - `1..=0xFE` — user-level error, the body is the encoded message string.
/// - `0xFF` — framework error, the body is an encoded `(code, message)`
///   pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    /// Codec tag for the body.
    pub serialize_type: u8,
    /// Server-reported error code byte.
    pub err_code: u8,
    /// Size of the response payload, excluding the attachment.
    pub body_length: u32,
    /// Sequence number of the request this frame answers.
    pub seq_num: u32,
    /// Size of the attached opaque bytes; may be zero.
    pub attach_length: u32,
}

impl ResponseHeader {
    /// Decodes and validates a response header.
    ///
    /// A magic mismatch or an unsupported version is a terminal protocol
    /// error: the stream can no longer be trusted and the connection must
    /// be closed.
    pub fn decode(buf: &[u8; RESP_HEAD_LEN]) -> Result<Self, RpcError> {
        if buf[0] != MAGIC {
            return Err(RpcError::new(
                ErrorKind::ProtocolError,
                format!("bad magic number {:#04x} in response header", buf[0]),
            ));
        }
        if buf[1] != VERSION {
            return Err(RpcError::new(
                ErrorKind::UnknownProtocolVersion,
                format!("unsupported protocol version {}", buf[1]),
            ));
        }
        Ok(Self {
            serialize_type: buf[2],
            err_code: buf[3],
            // bytes 4..12 are reserved
            body_length: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
            seq_num: u32::from_le_bytes(buf[16..20].try_into().unwrap()),
            attach_length: u32::from_le_bytes(buf[20..24].try_into().unwrap()),
        })
    }

    /// Encodes the header into a fixed buffer.
    ///
    /// The client never sends responses; this is the test-side inverse of
    /// [`ResponseHeader::decode`] used by loopback servers.
    pub fn encode(&self) -> [u8; RESP_HEAD_LEN] {
        let mut buf = [0u8; RESP_HEAD_LEN];
        buf[0] = MAGIC;
        buf[1] = VERSION;
        buf[2] = self.serialize_type;
        buf[3] = self.err_code;
        buf[12..16].copy_from_slice(&self.body_length.to_le_bytes());
        buf[16..20].copy_from_slice(&self.seq_num.to_le_bytes());
        buf[20..24].copy_from_slice(&self.attach_length.to_le_bytes());
        buf
    }
}
