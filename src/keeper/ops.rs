//! Per-operation entry points.
//!
//! Every operation kind comes in three calling conventions built on one
//! asynchronous primitive:
//!
//! - `submit_*` returns a [`PendingOp`] handle and never raises;
//! - `try_*` waits bounded by the operation timeout and returns the
//!   operation's expected negative outcomes as a code value;
//! - the plain form raises on anything but success.
//!
//! Retrying is the caller's responsibility; a timed-out call terminates
//! the connection and is never silently retried here.

use std::sync::Arc;

use crate::error::ErrorCode;
use crate::error::KeeperError;
use crate::paths;
use crate::types::CheckRequest;
use crate::types::CheckResponse;
use crate::types::CreateMode;
use crate::types::CreateRequest;
use crate::types::CreateResponse;
use crate::types::ExistsRequest;
use crate::types::ExistsResponse;
use crate::types::GetRequest;
use crate::types::GetResponse;
use crate::types::ListRequest;
use crate::types::ListResponse;
use crate::types::OpKind;
use crate::types::RemoveRequest;
use crate::types::RemoveResponse;
use crate::types::SetRequest;
use crate::types::SetResponse;
use crate::types::Stat;
use crate::types::WatchCallback;
use crate::types::ANY_VERSION;

use super::Keeper;
use super::PendingOp;

/// Raise unless the code is success or one of the call's expected
/// outcomes.
fn accept(code: ErrorCode, expected: &[ErrorCode], path: &str) -> Result<ErrorCode, KeeperError> {
    if code == ErrorCode::Ok || expected.contains(&code) {
        Ok(code)
    } else {
        Err(KeeperError::Api {
            code,
            path: path.to_string(),
        })
    }
}

impl Keeper {
    // ---- create ----------------------------------------------------------

    pub fn submit_create(
        &self,
        path: &str,
        data: Vec<u8>,
        mode: CreateMode,
    ) -> PendingOp<CreateResponse> {
        let conn = Arc::clone(self.connection());
        let request = CreateRequest {
            path: path.to_string(),
            data,
            mode,
        };
        self.spawn_op(async move { conn.create(request).await })
    }

    async fn create_impl(&self, path: &str, data: Vec<u8>, mode: CreateMode) -> CreateResponse {
        let pending = self.submit_create(path, data, mode);
        self.settle(OpKind::Create, path, pending).await
    }

    /// Create a node and return the actual created path, which differs
    /// from the requested one for sequential modes.
    pub async fn create(
        &self,
        path: &str,
        data: Vec<u8>,
        mode: CreateMode,
    ) -> Result<String, KeeperError> {
        let (code, created) = self.try_create(path, data, mode).await?;
        match created {
            Some(created) => Ok(created),
            None => Err(KeeperError::Api {
                code,
                path: path.to_string(),
            }),
        }
    }

    /// Expected outcomes: a missing parent, an existing node, an
    /// ephemeral parent.
    pub async fn try_create(
        &self,
        path: &str,
        data: Vec<u8>,
        mode: CreateMode,
    ) -> Result<(ErrorCode, Option<String>), KeeperError> {
        let response = self.create_impl(path, data, mode).await;
        let code = accept(
            response.error,
            &[
                ErrorCode::NoNode,
                ErrorCode::NodeExists,
                ErrorCode::NoChildrenForEphemerals,
            ],
            path,
        )?;
        let created = (code == ErrorCode::Ok).then_some(response.path_created);
        Ok((code, created))
    }

    /// Create the node unless it already exists.
    pub async fn create_if_not_exists(&self, path: &str, data: Vec<u8>) -> Result<(), KeeperError> {
        let response = self.create_impl(path, data, CreateMode::Persistent).await;
        match response.error {
            ErrorCode::Ok | ErrorCode::NodeExists => Ok(()),
            code => Err(KeeperError::Api {
                code,
                path: path.to_string(),
            }),
        }
    }

    /// Create every missing ancestor of `path`, excluding `path` itself.
    pub async fn create_ancestors(&self, path: &str) -> Result<(), KeeperError> {
        for ancestor in paths::ancestors(path) {
            self.create_if_not_exists(&ancestor, Vec::new()).await?;
        }
        Ok(())
    }

    /// Set the node's data, creating it when it does not exist yet.
    pub async fn create_or_update(
        &self,
        path: &str,
        data: Vec<u8>,
        mode: CreateMode,
    ) -> Result<(), KeeperError> {
        let code = self.try_set(path, data.clone(), ANY_VERSION).await?;
        if code == ErrorCode::NoNode {
            self.create(path, data, mode).await?;
        } else if code != ErrorCode::Ok {
            return Err(KeeperError::Api {
                code,
                path: path.to_string(),
            });
        }
        Ok(())
    }

    // ---- remove ----------------------------------------------------------

    pub fn submit_remove(&self, path: &str, version: i32) -> PendingOp<RemoveResponse> {
        let conn = Arc::clone(self.connection());
        let request = RemoveRequest {
            path: path.to_string(),
            version,
        };
        self.spawn_op(async move { conn.remove(request).await })
    }

    async fn remove_impl(&self, path: &str, version: i32) -> RemoveResponse {
        let pending = self.submit_remove(path, version);
        self.settle(OpKind::Remove, path, pending).await
    }

    pub async fn remove(&self, path: &str, version: i32) -> Result<(), KeeperError> {
        let code = self.try_remove(path, version).await?;
        if code != ErrorCode::Ok {
            return Err(KeeperError::Api {
                code,
                path: path.to_string(),
            });
        }
        Ok(())
    }

    /// Expected outcomes: already gone, stale version, children present.
    pub async fn try_remove(&self, path: &str, version: i32) -> Result<ErrorCode, KeeperError> {
        let response = self.remove_impl(path, version).await;
        accept(
            response.error,
            &[ErrorCode::NoNode, ErrorCode::BadVersion, ErrorCode::NotEmpty],
            path,
        )
    }

    // ---- exists ----------------------------------------------------------

    pub fn submit_exists(
        &self,
        path: &str,
        watch: Option<WatchCallback>,
    ) -> PendingOp<ExistsResponse> {
        let conn = Arc::clone(self.connection());
        let request = ExistsRequest {
            path: path.to_string(),
        };
        self.spawn_op(async move { conn.exists(request, watch).await })
    }

    pub(super) async fn exists_impl(
        &self,
        path: &str,
        watch: Option<WatchCallback>,
    ) -> ExistsResponse {
        let pending = self.submit_exists(path, watch);
        self.settle(OpKind::Exists, path, pending).await
    }

    /// Stat of the node, or `None` when it does not exist.
    pub async fn exists(&self, path: &str) -> Result<Option<Stat>, KeeperError> {
        self.exists_watch_impl(path, None).await
    }

    /// As [`Keeper::exists`], additionally arming a one-shot watch that
    /// fires on the next create, delete, or data change of the path.
    pub async fn exists_watch(
        &self,
        path: &str,
        watch: WatchCallback,
    ) -> Result<Option<Stat>, KeeperError> {
        self.exists_watch_impl(path, Some(watch)).await
    }

    async fn exists_watch_impl(
        &self,
        path: &str,
        watch: Option<WatchCallback>,
    ) -> Result<Option<Stat>, KeeperError> {
        let response = self.exists_impl(path, watch).await;
        accept(response.error, &[ErrorCode::NoNode], path)?;
        Ok(response.stat)
    }

    // ---- get -------------------------------------------------------------

    pub fn submit_get(&self, path: &str, watch: Option<WatchCallback>) -> PendingOp<GetResponse> {
        let conn = Arc::clone(self.connection());
        let request = GetRequest {
            path: path.to_string(),
        };
        self.spawn_op(async move { conn.get(request, watch).await })
    }

    async fn get_impl(&self, path: &str, watch: Option<WatchCallback>) -> GetResponse {
        let pending = self.submit_get(path, watch);
        self.settle(OpKind::Get, path, pending).await
    }

    pub async fn get(&self, path: &str) -> Result<(Vec<u8>, Stat), KeeperError> {
        self.get_watch_impl(path, None).await
    }

    /// As [`Keeper::get`], arming a one-shot watch on the node.
    pub async fn get_watch(
        &self,
        path: &str,
        watch: WatchCallback,
    ) -> Result<(Vec<u8>, Stat), KeeperError> {
        self.get_watch_impl(path, Some(watch)).await
    }

    async fn get_watch_impl(
        &self,
        path: &str,
        watch: Option<WatchCallback>,
    ) -> Result<(Vec<u8>, Stat), KeeperError> {
        match self.try_get_watch(path, watch).await? {
            (_, Some(found)) => Ok(found),
            (code, None) => Err(KeeperError::Api {
                code,
                path: path.to_string(),
            }),
        }
    }

    /// Expected outcome: the node does not exist.
    pub async fn try_get(
        &self,
        path: &str,
    ) -> Result<(ErrorCode, Option<(Vec<u8>, Stat)>), KeeperError> {
        self.try_get_watch(path, None).await
    }

    pub async fn try_get_watch(
        &self,
        path: &str,
        watch: Option<WatchCallback>,
    ) -> Result<(ErrorCode, Option<(Vec<u8>, Stat)>), KeeperError> {
        let response = self.get_impl(path, watch).await;
        let code = accept(response.error, &[ErrorCode::NoNode], path)?;
        let found = (code == ErrorCode::Ok).then_some((response.data, response.stat));
        Ok((code, found))
    }

    // ---- set -------------------------------------------------------------

    pub fn submit_set(&self, path: &str, data: Vec<u8>, version: i32) -> PendingOp<SetResponse> {
        let conn = Arc::clone(self.connection());
        let request = SetRequest {
            path: path.to_string(),
            data,
            version,
        };
        self.spawn_op(async move { conn.set(request).await })
    }

    async fn set_impl(&self, path: &str, data: Vec<u8>, version: i32) -> SetResponse {
        let pending = self.submit_set(path, data, version);
        self.settle(OpKind::Set, path, pending).await
    }

    pub async fn set(&self, path: &str, data: Vec<u8>, version: i32) -> Result<Stat, KeeperError> {
        let response = self.set_impl(path, data, version).await;
        if response.error != ErrorCode::Ok {
            return Err(KeeperError::Api {
                code: response.error,
                path: path.to_string(),
            });
        }
        Ok(response.stat)
    }

    /// Expected outcomes: a missing node, a stale version.
    pub async fn try_set(
        &self,
        path: &str,
        data: Vec<u8>,
        version: i32,
    ) -> Result<ErrorCode, KeeperError> {
        let response = self.set_impl(path, data, version).await;
        accept(
            response.error,
            &[ErrorCode::NoNode, ErrorCode::BadVersion],
            path,
        )
    }

    // ---- list children ---------------------------------------------------

    pub fn submit_get_children(
        &self,
        path: &str,
        watch: Option<WatchCallback>,
    ) -> PendingOp<ListResponse> {
        let conn = Arc::clone(self.connection());
        let request = ListRequest {
            path: path.to_string(),
        };
        self.spawn_op(async move { conn.list_children(request, watch).await })
    }

    async fn get_children_impl(&self, path: &str, watch: Option<WatchCallback>) -> ListResponse {
        let pending = self.submit_get_children(path, watch);
        self.settle(OpKind::List, path, pending).await
    }

    pub async fn get_children(&self, path: &str) -> Result<Vec<String>, KeeperError> {
        match self.try_get_children(path).await? {
            (ErrorCode::Ok, names) => Ok(names),
            (code, _) => Err(KeeperError::Api {
                code,
                path: path.to_string(),
            }),
        }
    }

    /// As [`Keeper::get_children`], arming a one-shot watch that fires on
    /// the next membership change under the path.
    pub async fn get_children_watch(
        &self,
        path: &str,
        watch: WatchCallback,
    ) -> Result<Vec<String>, KeeperError> {
        let response = self.get_children_impl(path, Some(watch)).await;
        if response.error != ErrorCode::Ok {
            return Err(KeeperError::Api {
                code: response.error,
                path: path.to_string(),
            });
        }
        Ok(response.names)
    }

    /// Expected outcome: the node does not exist.
    pub async fn try_get_children(
        &self,
        path: &str,
    ) -> Result<(ErrorCode, Vec<String>), KeeperError> {
        let response = self.get_children_impl(path, None).await;
        let code = accept(response.error, &[ErrorCode::NoNode], path)?;
        Ok((code, response.names))
    }

    // ---- check -----------------------------------------------------------

    pub fn submit_check(&self, path: &str, version: i32) -> PendingOp<CheckResponse> {
        let conn = Arc::clone(self.connection());
        let request = CheckRequest {
            path: path.to_string(),
            version,
        };
        self.spawn_op(async move { conn.check(request).await })
    }

    pub async fn check(&self, path: &str, version: i32) -> Result<(), KeeperError> {
        let code = self.try_check(path, version).await?;
        if code != ErrorCode::Ok {
            return Err(KeeperError::Api {
                code,
                path: path.to_string(),
            });
        }
        Ok(())
    }

    /// Expected outcomes: a missing node, a stale version.
    pub async fn try_check(&self, path: &str, version: i32) -> Result<ErrorCode, KeeperError> {
        let pending = self.submit_check(path, version);
        let response = self.settle(OpKind::Check, path, pending).await;
        accept(
            response.error,
            &[ErrorCode::NoNode, ErrorCode::BadVersion],
            path,
        )
    }
}
