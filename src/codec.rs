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

//! Payload codec and function identity.
//!
//! The client treats serialization as an opaque `encode`/`decode` pair;
//! this module binds that pair to [postcard], a compact binary format over
//! serde. Argument tuples, return values, and error bodies all pass through
//! it. Attachments never do — they are raw bytes by definition.
//!
//! Remote procedures are identified by a 64-bit [`function_id`] computed
//! from a stable name both ends agree on out of band. The hash is FNV-1a,
//! evaluated at compile time, so call sites carry plain `u64` constants:
//!
//! ```rust
//! use seqrpc::function_id;
//!
//! const ECHO: u64 = function_id("echo");
//! ```

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{ErrorKind, RpcError, RpcResult};

/// Wire tag identifying this codec in the `serialize_type` header byte.
pub const SERIALIZE_TYPE: u8 = 0;

/// Encodes a value into its wire representation.
pub fn encode<T>(value: &T) -> RpcResult<Vec<u8>>
where
    T: Serialize + ?Sized,
{
    postcard::to_allocvec(value).map_err(|e| {
        RpcError::new(
            ErrorKind::InvalidRpcArguments,
            format!("failed to serialize rpc arguments: {e}"),
        )
    })
}

/// Decodes a value from its wire representation.
pub fn decode<T>(bytes: &[u8]) -> RpcResult<T>
where
    T: DeserializeOwned,
{
    postcard::from_bytes(bytes).map_err(|e| {
        RpcError::new(
            ErrorKind::InvalidRpcResult,
            format!("failed to deserialize rpc return value: {e}"),
        )
    })
}

/// Decodes a server-reported error body.
///
/// Framework errors (`err_code == 0xFF`) carry a full `(code, message)`
/// pair; user errors carry only the message string, with the code taken
/// from the response header.
pub(crate) fn decode_error_body(bytes: &[u8]) -> Result<(u16, String), postcard::Error> {
    postcard::from_bytes(bytes)
}

/// Decodes a user-level error message string.
pub(crate) fn decode_error_message(bytes: &[u8]) -> Result<String, postcard::Error> {
    postcard::from_bytes(bytes)
}

/// Computes the 64-bit identifier of a remote procedure from its stable
/// name.
///
/// The hash is FNV-1a over the UTF-8 bytes of `name`. It is evaluated at
/// compile time when used in a `const` context, so each call site carries a
/// plain integer. Both ends must derive ids from the same names; there is
/// no runtime negotiation.
///
/// # Examples
///
/// ```rust
/// use seqrpc::function_id;
///
/// const ADD: u64 = function_id("math::add");
/// assert_ne!(ADD, function_id("math::sub"));
/// ```
pub const fn function_id(name: &str) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    let bytes = name.as_bytes();
    let mut hash = FNV_OFFSET;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
        i += 1;
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        id: u32,
        text: String,
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let value = Sample {
            id: 7,
            text: "hello".to_string(),
        };
        let bytes = encode(&value).unwrap();
        let back: Sample = decode(&bytes).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_tuple_round_trip() {
        let args = ("hi".to_string(), 42u64);
        let bytes = encode(&args).unwrap();
        let back: (String, u64) = decode(&bytes).unwrap();
        assert_eq!(back, args);
    }

    #[test]
    fn test_unit_round_trip() {
        let bytes = encode(&()).unwrap();
        assert!(bytes.is_empty());
        decode::<()>(&bytes).unwrap();
    }

    #[test]
    fn test_decode_garbage_fails() {
        let result: RpcResult<Sample> = decode(&[0xff, 0xff, 0xff, 0xff]);
        let err = result.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidRpcResult);
    }

    #[test]
    fn test_error_body_round_trip() {
        let bytes = encode(&(8u16, "function not registered".to_string())).unwrap();
        let (code, msg) = decode_error_body(&bytes).unwrap();
        assert_eq!(code, 8);
        assert_eq!(msg, "function not registered");
    }

    #[test]
    fn test_function_id_is_stable() {
        const ECHO: u64 = function_id("echo");
        assert_eq!(ECHO, function_id("echo"));
        assert_ne!(function_id("echo"), function_id("Echo"));
        assert_ne!(function_id("a"), function_id("b"));
        // FNV-1a of the empty string is the offset basis.
        assert_eq!(function_id(""), 0xcbf2_9ce4_8422_2325);
    }
}
