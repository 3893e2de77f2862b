//! Request, response, and watch types exchanged with the coordination
//! service.
//!
//! Every response embeds the [`ErrorCode`] produced for its request; the
//! dispatcher decides per call site whether a non-zero code is an expected
//! outcome or an error. Responses are produced exactly once per request.

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use crate::error::ErrorCode;

/// Node metadata returned alongside data and children listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stat {
    /// Transaction id of the create.
    pub czxid: i64,
    /// Transaction id of the last modification.
    pub mzxid: i64,
    /// Creation time, Unix milliseconds.
    pub ctime_ms: i64,
    /// Last-modification time, Unix milliseconds.
    pub mtime_ms: i64,
    /// Data version, bumped by every set.
    pub version: i32,
    /// Children version, bumped by every child create/remove.
    pub cversion: i32,
    /// Number of direct children.
    pub num_children: i32,
    /// Length of the node's data in bytes.
    pub data_length: i32,
    /// Session id of the creator for ephemeral nodes, zero otherwise.
    pub ephemeral_owner: i64,
}

/// Lifetime and naming mode of a created node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreateMode {
    Persistent,
    /// Removed automatically when the creating session ends.
    Ephemeral,
    /// Final path segment gets a monotonically increasing numeric suffix.
    PersistentSequential,
    EphemeralSequential,
}

impl CreateMode {
    pub fn is_ephemeral(self) -> bool {
        matches!(self, CreateMode::Ephemeral | CreateMode::EphemeralSequential)
    }

    pub fn is_sequential(self) -> bool {
        matches!(
            self,
            CreateMode::PersistentSequential | CreateMode::EphemeralSequential
        )
    }
}

/// Version value disabling the version precondition on remove/set/check.
pub const ANY_VERSION: i32 = -1;

/// Operation kind, used in timeout diagnostics and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Create,
    Remove,
    Exists,
    Get,
    Set,
    List,
    Check,
    Multi,
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OpKind::Create => "create",
            OpKind::Remove => "remove",
            OpKind::Exists => "exists",
            OpKind::Get => "get",
            OpKind::Set => "set",
            OpKind::List => "list",
            OpKind::Check => "check",
            OpKind::Multi => "multi",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRequest {
    pub path: String,
    pub data: Vec<u8>,
    pub mode: CreateMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveRequest {
    pub path: String,
    pub version: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistsRequest {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetRequest {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetRequest {
    pub path: String,
    pub data: Vec<u8>,
    pub version: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRequest {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRequest {
    pub path: String,
    pub version: i32,
}

/// Uniform access to the code embedded in every response, plus the
/// ability to synthesize an error-only response when the dispatcher has
/// to report a timeout or a dropped connection.
pub trait OpResponse: Send + 'static {
    fn error(&self) -> ErrorCode;
    fn from_error(code: ErrorCode) -> Self;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateResponse {
    pub error: ErrorCode,
    /// The actual created path; differs from the requested path for
    /// sequential nodes.
    pub path_created: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveResponse {
    pub error: ErrorCode,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistsResponse {
    pub error: ErrorCode,
    pub stat: Option<Stat>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetResponse {
    pub error: ErrorCode,
    pub data: Vec<u8>,
    pub stat: Stat,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetResponse {
    pub error: ErrorCode,
    pub stat: Stat,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListResponse {
    pub error: ErrorCode,
    /// Direct child names, relative to the listed path.
    pub names: Vec<String>,
    pub stat: Stat,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResponse {
    pub error: ErrorCode,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiResponse {
    pub error: ErrorCode,
    /// Per-sub-operation responses, in request order. Empty when the
    /// batch failed at the infra level and nothing was evaluated.
    pub responses: Vec<TxnResponse>,
}

macro_rules! impl_op_response {
    ($($ty:ty),* $(,)?) => {
        $(impl OpResponse for $ty {
            fn error(&self) -> ErrorCode {
                self.error
            }

            fn from_error(code: ErrorCode) -> Self {
                Self {
                    error: code,
                    ..Default::default()
                }
            }
        })*
    };
}

impl_op_response!(
    CreateResponse,
    RemoveResponse,
    ExistsResponse,
    GetResponse,
    SetResponse,
    ListResponse,
    CheckResponse,
    MultiResponse,
);

/// A sub-operation of an atomic multi-transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxnRequest {
    Create {
        path: String,
        data: Vec<u8>,
        mode: CreateMode,
    },
    Remove {
        path: String,
        version: i32,
    },
    Set {
        path: String,
        data: Vec<u8>,
        version: i32,
    },
    Check {
        path: String,
        version: i32,
    },
}

impl TxnRequest {
    pub fn create(path: impl Into<String>, data: Vec<u8>, mode: CreateMode) -> Self {
        TxnRequest::Create {
            path: path.into(),
            data,
            mode,
        }
    }

    pub fn remove(path: impl Into<String>, version: i32) -> Self {
        TxnRequest::Remove {
            path: path.into(),
            version,
        }
    }

    pub fn set(path: impl Into<String>, data: Vec<u8>, version: i32) -> Self {
        TxnRequest::Set {
            path: path.into(),
            data,
            version,
        }
    }

    pub fn check(path: impl Into<String>, version: i32) -> Self {
        TxnRequest::Check {
            path: path.into(),
            version,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            TxnRequest::Create { path, .. }
            | TxnRequest::Remove { path, .. }
            | TxnRequest::Set { path, .. }
            | TxnRequest::Check { path, .. } => path,
        }
    }
}

/// Result of a single sub-operation of a multi-transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxnResponse {
    Create { error: ErrorCode, path_created: String },
    Remove { error: ErrorCode },
    Set { error: ErrorCode, stat: Stat },
    Check { error: ErrorCode },
}

impl TxnResponse {
    pub fn error(&self) -> ErrorCode {
        match self {
            TxnResponse::Create { error, .. }
            | TxnResponse::Remove { error }
            | TxnResponse::Set { error, .. }
            | TxnResponse::Check { error } => *error,
        }
    }
}

/// Kind of change a watch notification reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum EventKind {
    Created = 1,
    Deleted = 2,
    Changed = 3,
    ChildrenChanged = 4,
}

impl EventKind {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn from_i32(value: i32) -> Option<EventKind> {
        match value {
            1 => Some(EventKind::Created),
            2 => Some(EventKind::Deleted),
            3 => Some(EventKind::Changed),
            4 => Some(EventKind::ChildrenChanged),
            _ => None,
        }
    }
}

/// A one-shot watch notification. Fires at most once per registration and
/// never re-arms. A non-zero `error` means the session ended before any
/// qualifying change was observed; `kind` is absent in that case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchEvent {
    pub kind: Option<EventKind>,
    pub path: String,
    pub error: ErrorCode,
}

impl WatchEvent {
    pub fn change(kind: EventKind, path: impl Into<String>) -> Self {
        Self {
            kind: Some(kind),
            path: path.into(),
            error: ErrorCode::Ok,
        }
    }

    pub fn session_error(code: ErrorCode, path: impl Into<String>) -> Self {
        Self {
            kind: None,
            path: path.into(),
            error: code,
        }
    }
}

/// Watch callbacks run on the connection's delivery path and must do O(1)
/// work (typically signal a condition); they must never block.
pub type WatchCallback = Arc<dyn Fn(WatchEvent) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_mode_flags() {
        assert!(!CreateMode::Persistent.is_ephemeral());
        assert!(!CreateMode::Persistent.is_sequential());
        assert!(CreateMode::Ephemeral.is_ephemeral());
        assert!(CreateMode::PersistentSequential.is_sequential());
        assert!(CreateMode::EphemeralSequential.is_ephemeral());
        assert!(CreateMode::EphemeralSequential.is_sequential());
    }

    #[test]
    fn txn_request_path_accessor() {
        assert_eq!(
            TxnRequest::create("/a", vec![], CreateMode::Persistent).path(),
            "/a"
        );
        assert_eq!(TxnRequest::remove("/b", ANY_VERSION).path(), "/b");
        assert_eq!(TxnRequest::set("/c", vec![1], 2).path(), "/c");
        assert_eq!(TxnRequest::check("/d", 0).path(), "/d");
    }

    #[test]
    fn responses_synthesized_from_error_carry_the_code() {
        let get = GetResponse::from_error(ErrorCode::OperationTimeout);
        assert_eq!(get.error(), ErrorCode::OperationTimeout);
        assert!(get.data.is_empty());

        let multi = MultiResponse::from_error(ErrorCode::ConnectionLoss);
        assert_eq!(multi.error(), ErrorCode::ConnectionLoss);
        assert!(multi.responses.is_empty());
    }

    #[test]
    fn txn_requests_serialize_with_variant_tags() {
        let op = TxnRequest::check("/a", 2);
        let serialized = serde_json::to_string(&op).expect("serialize");
        assert_eq!(serialized, r#"{"Check":{"path":"/a","version":2}}"#);

        let deserialized: TxnRequest = serde_json::from_str(&serialized).expect("deserialize");
        assert_eq!(deserialized, op);
    }

    #[test]
    fn event_kind_roundtrips_through_i32() {
        for kind in [
            EventKind::Created,
            EventKind::Deleted,
            EventKind::Changed,
            EventKind::ChildrenChanged,
        ] {
            assert_eq!(EventKind::from_i32(kind.as_i32()), Some(kind));
        }
        assert_eq!(EventKind::from_i32(0), None);
    }
}
