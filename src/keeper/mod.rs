//! One logical session to the coordination service.
//!
//! [`Keeper`] owns the connection, the resolved configuration, and the
//! dispatch plumbing shared by every operation: issue the asynchronous
//! call, wait up to the operation timeout, and on timeout force-terminate
//! the connection. A timeout is treated as a connection-health signal,
//! not a per-call cancellation: every other in-flight request on the same
//! connection fails with an infra error.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::lookup_host;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::api::Connect;
use crate::api::KeeperConnection;
use crate::api::ResolvedHost;
use crate::api::TestKeeper;
use crate::config::Implementation;
use crate::config::KeeperConfig;
use crate::error::ErrorCode;
use crate::error::KeeperError;
use crate::hosts::HostSelector;
use crate::hosts::ShuffleHost;
use crate::types::OpKind;
use crate::types::OpResponse;

mod multi;
mod ops;
mod recursive;
mod watch;

pub use watch::WaitCondition;

/// A request in flight. Completed exactly once; dropping the handle
/// abandons the result but not the remote effect.
pub struct PendingOp<R> {
    rx: oneshot::Receiver<R>,
}

impl<R: OpResponse> PendingOp<R> {
    /// Wait for the response without any bound. A connection that went
    /// away before answering yields a connection-loss response.
    pub async fn wait(self) -> R {
        match self.rx.await {
            Ok(response) => response,
            Err(_) => R::from_error(ErrorCode::ConnectionLoss),
        }
    }
}

/// Client for one session to the coordination service.
///
/// Cheap to share behind an `Arc`; many tasks may dispatch concurrently.
/// After the session expires, swap to [`Keeper::start_new_session`]
/// rather than mutating this one: re-initialization must not race with
/// in-flight requests from the old session.
pub struct Keeper {
    config: KeeperConfig,
    connection: Arc<dyn KeeperConnection>,
    connector: Option<Arc<dyn Connect>>,
    selector: HostSelector,
    operation_timeout: Duration,
}

impl std::fmt::Debug for Keeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keeper")
            .field("config", &self.config)
            .field("selector", &self.selector)
            .field("operation_timeout", &self.operation_timeout)
            .finish_non_exhaustive()
    }
}

impl Keeper {
    /// Build a session from configuration. Only the in-memory
    /// implementation can be constructed without a connector.
    pub async fn new(config: KeeperConfig) -> Result<Self, KeeperError> {
        Self::init(config, None).await
    }

    /// Build a session using `connector` to establish the real protocol
    /// connection.
    pub async fn with_connector(
        config: KeeperConfig,
        connector: Arc<dyn Connect>,
    ) -> Result<Self, KeeperError> {
        Self::init(config, Some(connector)).await
    }

    /// Wrap an already-established connection. Used by tests and by
    /// callers that manage the transport themselves. The root-prefix
    /// existence check still runs.
    pub async fn from_connection(
        config: KeeperConfig,
        connection: Arc<dyn KeeperConnection>,
    ) -> Result<Self, KeeperError> {
        let mut config = config;
        config.normalize()?;
        let keeper = Self {
            selector: HostSelector::new(config.load_balancing),
            operation_timeout: Duration::from_millis(config.operation_timeout_ms),
            config,
            connection,
            connector: None,
        };
        keeper.check_root_exists().await?;
        Ok(keeper)
    }

    async fn init(
        config: KeeperConfig,
        connector: Option<Arc<dyn Connect>>,
    ) -> Result<Self, KeeperError> {
        let mut config = config;
        config.normalize()?;

        let selector = HostSelector::new(config.load_balancing);
        let connection: Arc<dyn KeeperConnection> = match config.implementation {
            Implementation::InMemory => Arc::new(TestKeeper::new(config.root.clone())),
            Implementation::Real => {
                let Some(connector) = connector.as_ref() else {
                    return Err(KeeperError::InvalidConfig {
                        message: "real implementation requires a connector".into(),
                    });
                };
                let hosts = resolve_hosts(&selector, &config).await?;
                connector.connect(&hosts, &config).await?
            }
        };

        if config.root.is_empty() {
            info!(hosts = ?config.nodes.iter().map(|n| n.address()).collect::<Vec<_>>(),
                  "session initialized");
        } else {
            info!(hosts = ?config.nodes.iter().map(|n| n.address()).collect::<Vec<_>>(),
                  root = %config.root,
                  "session initialized");
        }

        let keeper = Self {
            selector,
            operation_timeout: Duration::from_millis(config.operation_timeout_ms),
            config,
            connection,
            connector,
        };
        keeper.check_root_exists().await?;
        Ok(keeper)
    }

    /// Verify the configured path prefix exists, bounded by the
    /// operation timeout. Callers must not hold a lock for longer than
    /// the operation timeout around session construction; this check is
    /// the reason.
    async fn check_root_exists(&self) -> Result<(), KeeperError> {
        if self.config.root.is_empty() {
            return Ok(());
        }
        let response = self.exists_impl("/", None).await;
        match response.error {
            ErrorCode::Ok => Ok(()),
            ErrorCode::NoNode => {
                error!(root = %self.config.root,
                       "root node does not exist, create it before starting");
                Err(KeeperError::Api {
                    code: ErrorCode::NoNode,
                    path: self.config.root.clone(),
                })
            }
            code => Err(KeeperError::Api {
                code,
                path: "/".into(),
            }),
        }
    }

    /// A fresh session built from the same resolved configuration. Used
    /// after the active session expires.
    pub async fn start_new_session(&self) -> Result<Self, KeeperError> {
        Self::init(self.config.clone(), self.connector.clone()).await
    }

    /// Structural comparison against a candidate configuration. The
    /// in-memory implementation always reports no change: its state
    /// lives in the current instance and endpoint identity is
    /// irrelevant to it.
    pub fn config_changed(&self, other: &KeeperConfig) -> bool {
        let mut other = other.clone();
        if other.normalize().is_err() {
            return true;
        }
        if self.config.implementation == Implementation::InMemory
            && other.implementation == Implementation::InMemory
        {
            return false;
        }
        self.config != other
    }

    pub fn config(&self) -> &KeeperConfig {
        &self.config
    }

    /// Rank the configured endpoints by the session's load-balancing
    /// policy, with a fresh random tie-break. This is the order a
    /// reconnect would try them in.
    pub fn shuffled_hosts(&self) -> Vec<ShuffleHost> {
        self.selector.rank(&self.config.nodes)
    }

    pub fn operation_timeout(&self) -> Duration {
        self.operation_timeout
    }

    pub fn expired(&self) -> bool {
        self.connection.is_expired()
    }

    pub fn session_id(&self) -> i64 {
        self.connection.session_id()
    }

    /// Force-terminate the underlying connection.
    pub async fn finalize(&self, reason: &str) {
        self.connection.finalize(reason).await;
    }

    pub(crate) fn connection(&self) -> &Arc<dyn KeeperConnection> {
        &self.connection
    }

    /// Spawn a connection call as an independently completable handle.
    pub(crate) fn spawn_op<R, F>(&self, fut: F) -> PendingOp<R>
    where
        R: OpResponse,
        F: Future<Output = R> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let _ = tx.send(fut.await);
        });
        PendingOp { rx }
    }

    /// Wait for a pending call up to the operation timeout. On timeout
    /// the connection is force-terminated and the call reports
    /// [`ErrorCode::OperationTimeout`]; the dispatcher never retries.
    pub(crate) async fn settle<R: OpResponse>(
        &self,
        op: OpKind,
        path: &str,
        pending: PendingOp<R>,
    ) -> R {
        match timeout(self.operation_timeout, pending.wait()).await {
            Ok(response) => response,
            Err(_) => {
                let reason = format!("operation timeout on {op} {path}");
                warn!(%op, path, "operation timed out, terminating connection");
                self.connection.finalize(&reason).await;
                R::from_error(ErrorCode::OperationTimeout)
            }
        }
    }
}

/// Resolve endpoints in selector order, skipping names that fail to
/// resolve. Resolution failures are logged but only fail the session
/// when every endpoint is unusable.
async fn resolve_hosts(
    selector: &HostSelector,
    config: &KeeperConfig,
) -> Result<Vec<ResolvedHost>, KeeperError> {
    let mut resolved = Vec::with_capacity(config.nodes.len());
    let mut dns_error = false;
    for shuffle_host in selector.rank(&config.nodes) {
        let node = &shuffle_host.node;
        match lookup_host(node.address()).await {
            Ok(mut addrs) => match addrs.next() {
                Some(addr) => {
                    debug!(host = %node.address(), %addr, "adding coordination host");
                    resolved.push(ResolvedHost {
                        addr,
                        secure: node.secure,
                        hostname: node.host.clone(),
                    });
                }
                None => {
                    error!(host = %node.address(), "host resolved to no addresses");
                }
            },
            Err(err) => {
                dns_error = true;
                error!(host = %node.address(), %err, "cannot resolve coordination host");
            }
        }
    }

    if resolved.is_empty() {
        // DNS failures are reported as an infra error so callers treat
        // them as potentially transient, not as a bad configuration.
        if dns_error {
            return Err(KeeperError::Api {
                code: ErrorCode::ConnectionLoss,
                path: String::new(),
            });
        }
        return Err(KeeperError::InvalidConfig {
            message: "cannot use any of the provided coordination hosts".into(),
        });
    }
    Ok(resolved)
}
