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

//! RPC error taxonomy.
//!
//! Every public operation returns [`RpcResult`], discriminating success
//! from an [`RpcError`]. The error carries a machine-checkable
//! [`ErrorKind`] whose numeric code is a stable wire value shared with the
//! server, plus a human-readable message.
//!
//! Local errors (I/O, timeout, protocol violations) close the connection;
//! server-originated errors close it only when they indicate the byte
//! stream may be desynchronized.

use thiserror::Error;

/// Classification of an RPC failure.
///
/// The numeric codes are stable wire values: they appear inside
/// framework-level error bodies and must not be renumbered. Codes outside
/// the known range — including user error-code bytes reported by the
/// server — surface as [`ErrorKind::UserDefined`].
///
/// # Examples
///
/// ```rust
/// use seqrpc::ErrorKind;
///
/// assert_eq!(ErrorKind::TimedOut.code(), 3);
/// assert_eq!(ErrorKind::from_code(3), ErrorKind::TimedOut);
/// assert_eq!(ErrorKind::from_code(200), ErrorKind::UserDefined(200));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No error.
    Ok,
    /// A socket read, write, or shutdown failed, or the client was closed.
    IoError,
    /// Connecting or the TLS handshake failed.
    NotConnected,
    /// A connect or per-call deadline elapsed.
    TimedOut,
    /// The server could not decode the call arguments.
    InvalidRpcArguments,
    /// The server address is already in use.
    AddressInUse,
    /// An awaited response future was cancelled before completion.
    OperationCanceled,
    /// The remote handler raised an exception.
    RpcThrowException,
    /// The requested function id is not registered on the server.
    FunctionNotRegistered,
    /// Header validation failed (bad magic).
    ProtocolError,
    /// Header validation failed (unsupported protocol version).
    UnknownProtocolVersion,
    /// A request body or attachment exceeds `u32::MAX` bytes.
    MessageTooLarge,
    /// The server was already running.
    ServerHasRun,
    /// The success body could not be decoded into the expected type.
    InvalidRpcResult,
    /// A sequence number was issued twice while the first call was live.
    SerialNumberConflict,
    /// A server-defined error code outside the framework range.
    UserDefined(u16),
}

impl ErrorKind {
    /// Returns the stable wire code for this kind.
    pub const fn code(self) -> u16 {
        match self {
            Self::Ok => 0,
            Self::IoError => 1,
            Self::NotConnected => 2,
            Self::TimedOut => 3,
            Self::InvalidRpcArguments => 4,
            Self::AddressInUse => 5,
            Self::OperationCanceled => 6,
            Self::RpcThrowException => 7,
            Self::FunctionNotRegistered => 8,
            Self::ProtocolError => 9,
            Self::UnknownProtocolVersion => 10,
            Self::MessageTooLarge => 11,
            Self::ServerHasRun => 12,
            Self::InvalidRpcResult => 13,
            Self::SerialNumberConflict => 14,
            Self::UserDefined(code) => code,
        }
    }

    /// Maps a wire code back to its kind.
    ///
    /// Unknown codes map to [`ErrorKind::UserDefined`], never an error:
    /// servers are free to report their own codes in the `1..=0xFE` range.
    pub const fn from_code(code: u16) -> Self {
        match code {
            0 => Self::Ok,
            1 => Self::IoError,
            2 => Self::NotConnected,
            3 => Self::TimedOut,
            4 => Self::InvalidRpcArguments,
            5 => Self::AddressInUse,
            6 => Self::OperationCanceled,
            7 => Self::RpcThrowException,
            8 => Self::FunctionNotRegistered,
            9 => Self::ProtocolError,
            10 => Self::UnknownProtocolVersion,
            11 => Self::MessageTooLarge,
            12 => Self::ServerHasRun,
            13 => Self::InvalidRpcResult,
            14 => Self::SerialNumberConflict,
            code => Self::UserDefined(code),
        }
    }

    /// Returns the canonical message for this kind.
    pub const fn message(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::IoError => "io error",
            Self::NotConnected => "not connected",
            Self::TimedOut => "time out",
            Self::InvalidRpcArguments => "invalid rpc arg",
            Self::AddressInUse => "address in use",
            Self::OperationCanceled => "operation canceled",
            Self::RpcThrowException => "rpc throw exception",
            Self::FunctionNotRegistered => "function not registered",
            Self::ProtocolError => "protocol error",
            Self::UnknownProtocolVersion => "unknown protocol version",
            Self::MessageTooLarge => "message too large",
            Self::ServerHasRun => "server has run",
            Self::InvalidRpcResult => "invalid rpc result",
            Self::SerialNumberConflict => "serial number conflict",
            Self::UserDefined(_) => "user-defined error",
        }
    }
}

/// An RPC failure: a stable [`ErrorKind`] plus a human-readable message.
///
/// The kind is the machine-checkable value; the message adds context (the
/// underlying I/O error, the server-reported text, ...) and is never
/// required to be stable.
///
/// # Examples
///
/// ```rust
/// use seqrpc::{ErrorKind, RpcError};
///
/// let err = RpcError::from_kind(ErrorKind::TimedOut);
/// assert_eq!(err.kind, ErrorKind::TimedOut);
/// assert_eq!(err.to_string(), "rpc error 3: time out");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rpc error {}: {}", .kind.code(), .msg)]
pub struct RpcError {
    /// What failed.
    pub kind: ErrorKind,
    /// Human-readable context.
    pub msg: String,
}

impl RpcError {
    /// Creates an error with an explicit message.
    pub fn new(kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            msg: msg.into(),
        }
    }

    /// Creates an error carrying the kind's canonical message.
    pub fn from_kind(kind: ErrorKind) -> Self {
        Self {
            kind,
            msg: kind.message().to_string(),
        }
    }

    /// Reassembles a server-reported `(code, msg)` pair.
    pub fn from_parts(code: u16, msg: String) -> Self {
        Self {
            kind: ErrorKind::from_code(code),
            msg,
        }
    }
}

impl From<ErrorKind> for RpcError {
    fn from(kind: ErrorKind) -> Self {
        Self::from_kind(kind)
    }
}

/// Result alias used throughout the crate.
pub type RpcResult<T> = Result<T, RpcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        let table: [(ErrorKind, u16); 15] = [
            (ErrorKind::Ok, 0),
            (ErrorKind::IoError, 1),
            (ErrorKind::NotConnected, 2),
            (ErrorKind::TimedOut, 3),
            (ErrorKind::InvalidRpcArguments, 4),
            (ErrorKind::AddressInUse, 5),
            (ErrorKind::OperationCanceled, 6),
            (ErrorKind::RpcThrowException, 7),
            (ErrorKind::FunctionNotRegistered, 8),
            (ErrorKind::ProtocolError, 9),
            (ErrorKind::UnknownProtocolVersion, 10),
            (ErrorKind::MessageTooLarge, 11),
            (ErrorKind::ServerHasRun, 12),
            (ErrorKind::InvalidRpcResult, 13),
            (ErrorKind::SerialNumberConflict, 14),
        ];
        for (kind, code) in table {
            assert_eq!(kind.code(), code);
            assert_eq!(ErrorKind::from_code(code), kind);
        }
    }

    #[test]
    fn test_unknown_code_is_user_defined() {
        assert_eq!(ErrorKind::from_code(15), ErrorKind::UserDefined(15));
        assert_eq!(ErrorKind::from_code(255), ErrorKind::UserDefined(255));
        assert_eq!(ErrorKind::UserDefined(255).code(), 255);
    }

    #[test]
    fn test_from_parts() {
        let err = RpcError::from_parts(3, "deadline elapsed".to_string());
        assert_eq!(err.kind, ErrorKind::TimedOut);
        assert_eq!(err.msg, "deadline elapsed");

        let err = RpcError::from_parts(42, "bad arg".to_string());
        assert_eq!(err.kind, ErrorKind::UserDefined(42));
    }

    #[test]
    fn test_display() {
        let err = RpcError::from_kind(ErrorKind::NotConnected);
        assert_eq!(err.to_string(), "rpc error 2: not connected");
    }
}
