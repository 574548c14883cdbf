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

//! Request assembly.
//!
//! A request frame is laid out as `[header | serialized args]` in one
//! contiguous buffer. The attachment is never copied into this buffer; the
//! write path sends it as a second segment after the payload.

use serde::Serialize;

use crate::codec;
use crate::error::{ErrorKind, RpcError, RpcResult};
use crate::protocol::RequestHeader;

/// Serializes `args` and prepends the request header.
///
/// `attach_length` is recorded in the header but the attachment bytes
/// themselves are not part of the returned buffer. Fails with
/// [`ErrorKind::MessageTooLarge`] if the serialized body does not fit a
/// `u32` length field; nothing is sent in that case.
pub fn build_request<A>(
    function_id: u64,
    seq_num: u32,
    attach_length: u32,
    args: &A,
) -> RpcResult<Vec<u8>>
where
    A: Serialize + ?Sized,
{
    let body = codec::encode(args)?;
    if body.len() as u64 > u32::MAX as u64 {
        tracing::error!(body_len = body.len(), "rpc body too large");
        return Err(RpcError::from_kind(ErrorKind::MessageTooLarge));
    }

    let header = RequestHeader {
        serialize_type: codec::SERIALIZE_TYPE,
        function_id,
        body_length: body.len() as u32,
        seq_num,
        attach_length,
    };

    let mut frame = Vec::with_capacity(crate::protocol::REQ_HEAD_LEN + body.len());
    header.encode_into(&mut frame);
    frame.extend_from_slice(&body);
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{MAGIC, REQ_HEAD_LEN};

    #[test]
    fn test_layout_is_header_then_args() {
        let frame = build_request(0x42, 9, 0, &("hi",)).unwrap();
        let body = codec::encode(&("hi",)).unwrap();

        assert_eq!(frame.len(), REQ_HEAD_LEN + body.len());
        assert_eq!(frame[0], MAGIC);
        assert_eq!(&frame[REQ_HEAD_LEN..], &body[..]);
        // body_length reflects the args, not the attachment
        let body_length = u32::from_le_bytes(frame[12..16].try_into().unwrap());
        assert_eq!(body_length as usize, body.len());
    }

    #[test]
    fn test_attachment_is_not_copied_in() {
        let with = build_request(1, 1, 4096, &(7u32,)).unwrap();
        let without = build_request(1, 1, 0, &(7u32,)).unwrap();

        // only the attach_length field differs
        assert_eq!(with.len(), without.len());
        let attach_length = u32::from_le_bytes(with[20..24].try_into().unwrap());
        assert_eq!(attach_length, 4096);
    }

    #[test]
    fn test_empty_args() {
        let frame = build_request(1, 0, 0, &()).unwrap();
        assert_eq!(frame.len(), REQ_HEAD_LEN);
        let body_length = u32::from_le_bytes(frame[12..16].try_into().unwrap());
        assert_eq!(body_length, 0);
    }

    #[test]
    fn test_seq_num_recorded() {
        let frame = build_request(1, 0xDEAD_BEEF, 0, &()).unwrap();
        let seq = u32::from_le_bytes(frame[16..20].try_into().unwrap());
        assert_eq!(seq, 0xDEAD_BEEF);
    }
}
