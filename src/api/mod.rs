//! Capability interface to the coordination service.
//!
//! One trait, two backends: the real protocol client (an external
//! collaborator plugged in through [`Connect`]) and the in-memory double
//! ([`inmemory::TestKeeper`]). The variant is selected at
//! session-construction time by configuration, not by inheritance depth.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::KeeperConfig;
use crate::error::KeeperError;
use crate::types::CheckRequest;
use crate::types::CheckResponse;
use crate::types::CreateRequest;
use crate::types::CreateResponse;
use crate::types::ExistsRequest;
use crate::types::ExistsResponse;
use crate::types::GetRequest;
use crate::types::GetResponse;
use crate::types::ListRequest;
use crate::types::ListResponse;
use crate::types::MultiResponse;
use crate::types::RemoveRequest;
use crate::types::RemoveResponse;
use crate::types::SetRequest;
use crate::types::SetResponse;
use crate::types::TxnRequest;
use crate::types::WatchCallback;

pub mod inmemory;

pub use inmemory::TestKeeper;

/// A resolved endpoint ready for a connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedHost {
    pub addr: SocketAddr,
    pub secure: bool,
    /// The configured host name the address was resolved from.
    pub hostname: String,
}

/// One logical connection to the coordination service.
///
/// The connection multiplexes many concurrently outstanding requests;
/// responses are delivered in request issue order. Every response embeds
/// its code; transport-level failures surface as
/// [`ErrorCode::ConnectionLoss`](crate::ErrorCode::ConnectionLoss)-coded
/// responses, never as panics. Watch callbacks are registered atomically
/// with the carrying call, fire at most once, and run on the delivery
/// path, so they must not block.
#[async_trait]
pub trait KeeperConnection: Send + Sync {
    async fn create(&self, request: CreateRequest) -> CreateResponse;

    async fn remove(&self, request: RemoveRequest) -> RemoveResponse;

    async fn exists(&self, request: ExistsRequest, watch: Option<WatchCallback>)
        -> ExistsResponse;

    async fn get(&self, request: GetRequest, watch: Option<WatchCallback>) -> GetResponse;

    async fn set(&self, request: SetRequest) -> SetResponse;

    async fn list_children(&self, request: ListRequest, watch: Option<WatchCallback>)
        -> ListResponse;

    async fn check(&self, request: CheckRequest) -> CheckResponse;

    /// Apply an ordered batch atomically: either every sub-operation
    /// commits or none does.
    async fn multi(&self, requests: Vec<TxnRequest>) -> MultiResponse;

    /// Force-terminate the connection. Every outstanding and subsequent
    /// request observes an infra error; registered watches fire once
    /// with a session-level error.
    async fn finalize(&self, reason: &str);

    fn is_expired(&self) -> bool;

    fn session_id(&self) -> i64;
}

/// Factory for the real protocol client.
///
/// The wire encoding lives outside this crate; implementations receive
/// the endpoints in the order the selector produced and the session
/// parameters (credentials, timeouts, root prefix).
#[async_trait]
pub trait Connect: Send + Sync {
    async fn connect(
        &self,
        hosts: &[ResolvedHost],
        config: &KeeperConfig,
    ) -> Result<Arc<dyn KeeperConnection>, KeeperError>;
}
