use std::{io, result::Result as StdResult};
use thiserror::Error as ThisError;

use super::types::status_description;

/// Unified EtherNet/IP protocol result type.
///
/// Protocol layers (codec/session/client) should prefer returning this type
/// instead of bare `io::Error` so that callers can distinguish transport,
/// wire-format and device-level failures.
pub type Result<T> = StdResult<T, Error>;

/// EtherNet/IP / CIP protocol error type.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Underlying I/O error from the transport.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TCP connect did not complete within the configured budget.
    #[error("connect timeout")]
    ConnectTimeout,

    /// Request or response timed out at the session layer.
    #[error("request timeout")]
    RequestTimeout,

    /// Operation requires a registered session and there is none.
    #[error("session is not registered")]
    NotRegistered,

    /// Peer closed the connection mid-exchange.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// Frame-level validation failed (e.g. header length mismatch).
    #[error("invalid frame")]
    InvalidFrame,

    /// Protocol contract violated (e.g. reserved/invalid field values,
    /// wrong echoed command or service code).
    #[error("protocol violation: {context}")]
    ProtocolViolation { context: &'static str },

    /// Encode error for wire-format serialization failures.
    #[error("encode error: {context}")]
    Encode { context: &'static str },

    /// Decode error for wire-format parsing failures that are not purely I/O.
    #[error("decode error: {context}")]
    Decode { context: &'static str },

    /// Input does not have enough bytes to complete the operation.
    #[error("insufficient data: needed {needed} bytes, available {available} bytes")]
    InsufficientData { needed: usize, available: usize },

    /// Device configuration could not be parsed or resolved.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Caller violated an operation precondition (e.g. zero-quantity range,
    /// removing a range that is not contained in its target).
    #[error("contract violation: {context}")]
    Contract { context: &'static str },

    /// Requested item falls outside the addressed object.
    #[error("out of range: {context}")]
    OutOfRange { context: &'static str },

    /// Data type code the value codec does not know how to handle.
    #[error("unsupported CIP data type: {code:#06x}")]
    UnsupportedDataType { code: u16 },

    /// Encapsulation header carried a non-zero status word.
    #[error("encapsulation status: {status:#010x}")]
    EncapStatus { status: u32 },

    /// CIP general status error from a service reply.
    ///
    /// Returned when the device answers a service with a non-zero general
    /// status. `ext_status` carries the first additional status word when
    /// the reply supplied one.
    #[error("CIP status {status:#04x} ({}): extended {ext_status:#06x}", status_description(*status))]
    CipStatus { status: u8, ext_status: u16 },
}

impl Error {
    /// Whether the failure invalidates the underlying connection.
    ///
    /// Device-level statuses and malformed payloads leave the session usable;
    /// transport faults and timeouts do not, since request/response pairing
    /// can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::ConnectTimeout
                | Error::RequestTimeout
                | Error::ConnectionClosed
                | Error::NotRegistered
        )
    }
}
