//! Error taxonomy for coordination-service calls.
//!
//! Response codes are partitioned into expected per-call outcomes
//! (returned as values by the `try_*` entry points) and infra-level
//! failures (always raised, and fatal for the owning connection).

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use snafu::Snafu;

use crate::types::TxnRequest;
use crate::types::TxnResponse;

/// Response code carried by every coordination-service response.
///
/// Numeric values match the wire protocol of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ErrorCode {
    Ok = 0,
    /// Generic server-side inconsistency, also used to mark
    /// sub-operations that were never evaluated in a failed transaction.
    RuntimeInconsistency = -2,
    ConnectionLoss = -4,
    MarshallingError = -5,
    OperationTimeout = -7,
    BadArguments = -8,
    InvalidState = -9,
    NoNode = -101,
    BadVersion = -103,
    NoChildrenForEphemerals = -108,
    NodeExists = -110,
    NotEmpty = -111,
    SessionExpired = -112,
}

impl ErrorCode {
    /// Outcomes a caller can legitimately provoke: a missing node, a stale
    /// version, a concurrent creator. Returned as values by `try_*` calls.
    pub fn is_user_error(self) -> bool {
        matches!(
            self,
            ErrorCode::NoNode
                | ErrorCode::BadVersion
                | ErrorCode::NoChildrenForEphemerals
                | ErrorCode::NodeExists
                | ErrorCode::NotEmpty
        )
    }

    /// Session- or connection-level failures. Always raised, and the
    /// dispatcher force-terminates the connection on timeout.
    pub fn is_hardware_error(self) -> bool {
        matches!(
            self,
            ErrorCode::ConnectionLoss
                | ErrorCode::MarshallingError
                | ErrorCode::OperationTimeout
                | ErrorCode::InvalidState
                | ErrorCode::SessionExpired
        )
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn from_i32(value: i32) -> Option<ErrorCode> {
        match value {
            0 => Some(ErrorCode::Ok),
            -2 => Some(ErrorCode::RuntimeInconsistency),
            -4 => Some(ErrorCode::ConnectionLoss),
            -5 => Some(ErrorCode::MarshallingError),
            -7 => Some(ErrorCode::OperationTimeout),
            -8 => Some(ErrorCode::BadArguments),
            -9 => Some(ErrorCode::InvalidState),
            -101 => Some(ErrorCode::NoNode),
            -103 => Some(ErrorCode::BadVersion),
            -108 => Some(ErrorCode::NoChildrenForEphemerals),
            -110 => Some(ErrorCode::NodeExists),
            -111 => Some(ErrorCode::NotEmpty),
            -112 => Some(ErrorCode::SessionExpired),
            _ => None,
        }
    }
}

impl Default for ErrorCode {
    fn default() -> Self {
        ErrorCode::Ok
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::Ok => "ok",
            ErrorCode::RuntimeInconsistency => "runtime inconsistency",
            ErrorCode::ConnectionLoss => "connection loss",
            ErrorCode::MarshallingError => "marshalling error",
            ErrorCode::OperationTimeout => "operation timeout",
            ErrorCode::BadArguments => "bad arguments",
            ErrorCode::InvalidState => "invalid state",
            ErrorCode::NoNode => "no node",
            ErrorCode::BadVersion => "bad version",
            ErrorCode::NoChildrenForEphemerals => "no children for ephemerals",
            ErrorCode::NodeExists => "node exists",
            ErrorCode::NotEmpty => "not empty",
            ErrorCode::SessionExpired => "session expired",
        };
        write!(f, "{name}")
    }
}

/// Errors raised by [`Keeper`](crate::keeper::Keeper) entry points.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum KeeperError {
    /// A call completed with a code the call site does not treat as an
    /// expected outcome.
    #[snafu(display("coordination error: {code}, path: {path}"))]
    Api {
        /// The response code.
        code: ErrorCode,
        /// Path the failing request was addressed to.
        path: String,
    },

    /// A multi-transaction was rejected because one sub-operation's
    /// precondition failed. Nothing was committed.
    #[snafu(display("transaction failed: {code}, op #{failed_op_index}, path: {}",
                    requests.get(*failed_op_index).map_or("", |r| r.path())))]
    Multi {
        /// Code of the first failing sub-operation.
        code: ErrorCode,
        /// Index of the first sub-response with a non-zero code.
        failed_op_index: usize,
        /// The submitted sub-requests, in order.
        requests: Vec<TxnRequest>,
        /// The per-sub-operation responses, in order.
        responses: Vec<TxnResponse>,
    },

    /// Configuration or argument error, detected eagerly at construction.
    #[snafu(display("invalid configuration: {message}"))]
    InvalidConfig { message: String },
}

impl KeeperError {
    /// The response code this error corresponds to.
    pub fn code(&self) -> ErrorCode {
        match self {
            KeeperError::Api { code, .. } => *code,
            KeeperError::Multi { code, .. } => *code,
            KeeperError::InvalidConfig { .. } => ErrorCode::BadArguments,
        }
    }

    /// Path of the first failing sub-operation of a failed transaction.
    pub fn failed_path(&self) -> Option<&str> {
        match self {
            KeeperError::Multi {
                failed_op_index,
                requests,
                ..
            } => requests.get(*failed_op_index).map(|r| r.path()),
            _ => None,
        }
    }
}
