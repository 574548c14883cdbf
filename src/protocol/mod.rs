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

//! Wire protocol: fixed-size headers and request assembly.
//!
//! One frame is one header plus a body plus an optional attachment. Both
//! header directions are 24 bytes, little-endian, and share the trailing
//! length block, so reading a frame is always a two-step operation: read
//! the fixed header, then read exactly `body_length + attach_length`
//! payload bytes. There is no keep-alive frame, no cancel frame, and no
//! multiplexing beyond the sequence number.

mod header;
mod request;

pub use header::{RequestHeader, ResponseHeader};
pub use request::build_request;

/// Sentinel byte opening every frame; a mismatch is a terminal protocol
/// error.
pub const MAGIC: u8 = 0xde;

/// Protocol version spoken by this client.
pub const VERSION: u8 = 0;

/// Size in bytes of the fixed request header.
pub const REQ_HEAD_LEN: usize = 24;

/// Size in bytes of the fixed response header.
pub const RESP_HEAD_LEN: usize = 24;
