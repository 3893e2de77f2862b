//! In-memory implementation of [`KeeperConnection`] for testing.
//!
//! Mirrors the behavior of the real service without network I/O: a
//! hierarchical node tree with versions, sequential suffixes, ephemeral
//! nodes, one-shot watches, and atomic multi-transactions. State lives in
//! this instance only; a new session starts from an empty tree.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::ErrorCode;
use crate::types::CheckRequest;
use crate::types::CheckResponse;
use crate::types::CreateMode;
use crate::types::CreateRequest;
use crate::types::CreateResponse;
use crate::types::EventKind;
use crate::types::ExistsRequest;
use crate::types::ExistsResponse;
use crate::types::GetRequest;
use crate::types::GetResponse;
use crate::types::ListRequest;
use crate::types::ListResponse;
use crate::types::MultiResponse;
use crate::types::OpResponse;
use crate::types::RemoveRequest;
use crate::types::RemoveResponse;
use crate::types::SetRequest;
use crate::types::SetResponse;
use crate::types::Stat;
use crate::types::TxnRequest;
use crate::types::TxnResponse;
use crate::types::WatchCallback;
use crate::types::WatchEvent;

use super::KeeperConnection;

static NEXT_SESSION_ID: AtomicI64 = AtomicI64::new(1);

#[derive(Clone)]
struct Node {
    data: Vec<u8>,
    czxid: i64,
    mzxid: i64,
    ctime_ms: i64,
    mtime_ms: i64,
    version: i32,
    cversion: i32,
    ephemeral_owner: i64,
    /// Next suffix handed to a sequential child.
    seq: u64,
}

impl Node {
    fn new(data: Vec<u8>, zxid: i64, now_ms: i64, ephemeral_owner: i64) -> Self {
        Self {
            data,
            czxid: zxid,
            mzxid: zxid,
            ctime_ms: now_ms,
            mtime_ms: now_ms,
            version: 0,
            cversion: 0,
            ephemeral_owner,
            seq: 0,
        }
    }
}

/// A watch trigger recorded while the tree lock is held; callbacks are
/// invoked only after the lock is released.
enum Trigger {
    Data(String, EventKind),
    Child(String, EventKind),
}

#[derive(Default)]
struct Watches {
    data: HashMap<String, Vec<WatchCallback>>,
    child: HashMap<String, Vec<WatchCallback>>,
}

struct TreeState {
    container: BTreeMap<String, Node>,
    watches: Watches,
    zxid: i64,
}

impl TreeState {
    fn new() -> Self {
        let mut container = BTreeMap::new();
        container.insert("/".to_string(), Node::new(Vec::new(), 0, now_ms(), 0));
        Self {
            container,
            watches: Watches::default(),
            zxid: 0,
        }
    }
}

/// In-memory coordination service consumed through the same interface as
/// the real one.
pub struct TestKeeper {
    state: Mutex<TreeState>,
    expired: AtomicBool,
    session_id: i64,
    root: String,
}

impl TestKeeper {
    /// Build a fresh empty tree, rooted at `root` when non-empty.
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(TreeState::new()),
            expired: AtomicBool::new(false),
            session_id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            root: root.into(),
        }
    }

    fn rooted(&self, path: &str) -> String {
        if self.root.is_empty() {
            path.to_string()
        } else if path == "/" {
            self.root.clone()
        } else {
            format!("{}{}", self.root, path)
        }
    }

    fn unrooted(&self, path: &str) -> String {
        if self.root.is_empty() {
            return path.to_string();
        }
        match path.strip_prefix(&self.root) {
            Some("") => "/".to_string(),
            Some(rest) => rest.to_string(),
            None => path.to_string(),
        }
    }

    /// Drain the callbacks a set of triggers fires, translating paths
    /// back into the client's namespace.
    fn collect_fires(
        &self,
        watches: &mut Watches,
        triggers: Vec<Trigger>,
    ) -> Vec<(WatchCallback, WatchEvent)> {
        let mut fires = Vec::new();
        for trigger in triggers {
            let (registry, path, kind) = match trigger {
                Trigger::Data(path, kind) => (&mut watches.data, path, kind),
                Trigger::Child(path, kind) => (&mut watches.child, path, kind),
            };
            if let Some(callbacks) = registry.remove(&path) {
                let event = WatchEvent::change(kind, self.unrooted(&path));
                for callback in callbacks {
                    fires.push((callback, event.clone()));
                }
            }
        }
        fires
    }
}

fn fire(fires: Vec<(WatchCallback, WatchEvent)>) {
    for (callback, event) in fires {
        callback(event);
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(pos) => &path[..pos],
        None => "/",
    }
}

fn valid_path(path: &str) -> bool {
    path.starts_with('/')
        && (path == "/" || !path.ends_with('/'))
        && !path.contains("//")
}

fn children_of(container: &BTreeMap<String, Node>, path: &str) -> Vec<String> {
    let prefix = if path == "/" {
        "/".to_string()
    } else {
        format!("{path}/")
    };
    container
        .range(prefix.clone()..)
        .take_while(|(key, _)| key.starts_with(&prefix))
        .filter(|(key, _)| key.len() > prefix.len() && !key[prefix.len()..].contains('/'))
        .map(|(key, _)| key[prefix.len()..].to_string())
        .collect()
}

fn stat_of(container: &BTreeMap<String, Node>, path: &str, node: &Node) -> Stat {
    Stat {
        czxid: node.czxid,
        mzxid: node.mzxid,
        ctime_ms: node.ctime_ms,
        mtime_ms: node.mtime_ms,
        version: node.version,
        cversion: node.cversion,
        num_children: children_of(container, path).len() as i32,
        data_length: node.data.len() as i32,
        ephemeral_owner: node.ephemeral_owner,
    }
}

fn apply_create(
    container: &mut BTreeMap<String, Node>,
    zxid: &mut i64,
    path: &str,
    data: &[u8],
    mode: CreateMode,
    session_id: i64,
) -> (CreateResponse, Vec<Trigger>) {
    if !valid_path(path) || path == "/" {
        return (CreateResponse::from_error(ErrorCode::BadArguments), vec![]);
    }
    let parent_path = parent_of(path).to_string();
    let Some(parent) = container.get(&parent_path) else {
        return (CreateResponse::from_error(ErrorCode::NoNode), vec![]);
    };
    if parent.ephemeral_owner != 0 {
        return (
            CreateResponse::from_error(ErrorCode::NoChildrenForEphemerals),
            vec![],
        );
    }

    let created_path = if mode.is_sequential() {
        format!("{path}{:010}", parent.seq)
    } else {
        path.to_string()
    };
    if container.contains_key(&created_path) {
        return (CreateResponse::from_error(ErrorCode::NodeExists), vec![]);
    }

    *zxid += 1;
    let owner = if mode.is_ephemeral() { session_id } else { 0 };
    container.insert(
        created_path.clone(),
        Node::new(data.to_vec(), *zxid, now_ms(), owner),
    );
    let parent = container
        .get_mut(&parent_path)
        .expect("parent checked above");
    parent.cversion += 1;
    if mode.is_sequential() {
        parent.seq += 1;
    }

    (
        CreateResponse {
            error: ErrorCode::Ok,
            path_created: created_path.clone(),
        },
        vec![
            Trigger::Data(created_path, EventKind::Created),
            Trigger::Child(parent_path, EventKind::ChildrenChanged),
        ],
    )
}

fn apply_remove(
    container: &mut BTreeMap<String, Node>,
    zxid: &mut i64,
    path: &str,
    version: i32,
) -> (RemoveResponse, Vec<Trigger>) {
    let Some(node) = container.get(path) else {
        return (RemoveResponse::from_error(ErrorCode::NoNode), vec![]);
    };
    if version >= 0 && version != node.version {
        return (RemoveResponse::from_error(ErrorCode::BadVersion), vec![]);
    }
    if !children_of(container, path).is_empty() {
        return (RemoveResponse::from_error(ErrorCode::NotEmpty), vec![]);
    }

    *zxid += 1;
    container.remove(path);
    let parent_path = parent_of(path).to_string();
    if let Some(parent) = container.get_mut(&parent_path) {
        parent.cversion += 1;
    }

    (
        RemoveResponse {
            error: ErrorCode::Ok,
        },
        vec![
            Trigger::Data(path.to_string(), EventKind::Deleted),
            Trigger::Child(path.to_string(), EventKind::Deleted),
            Trigger::Child(parent_path, EventKind::ChildrenChanged),
        ],
    )
}

fn apply_set(
    container: &mut BTreeMap<String, Node>,
    zxid: &mut i64,
    path: &str,
    data: &[u8],
    version: i32,
) -> (SetResponse, Vec<Trigger>) {
    let Some(node) = container.get(path) else {
        return (SetResponse::from_error(ErrorCode::NoNode), vec![]);
    };
    if version >= 0 && version != node.version {
        return (SetResponse::from_error(ErrorCode::BadVersion), vec![]);
    }

    *zxid += 1;
    let new_zxid = *zxid;
    let node = container.get_mut(path).expect("node checked above");
    node.data = data.to_vec();
    node.version += 1;
    node.mzxid = new_zxid;
    node.mtime_ms = now_ms();
    let stat = stat_of(container, path, &container[path]);

    (
        SetResponse {
            error: ErrorCode::Ok,
            stat,
        },
        vec![Trigger::Data(path.to_string(), EventKind::Changed)],
    )
}

fn apply_check(container: &BTreeMap<String, Node>, path: &str, version: i32) -> CheckResponse {
    let Some(node) = container.get(path) else {
        return CheckResponse::from_error(ErrorCode::NoNode);
    };
    if version >= 0 && version != node.version {
        return CheckResponse::from_error(ErrorCode::BadVersion);
    }
    CheckResponse {
        error: ErrorCode::Ok,
    }
}

#[async_trait]
impl KeeperConnection for TestKeeper {
    async fn create(&self, request: CreateRequest) -> CreateResponse {
        if self.is_expired() {
            return CreateResponse::from_error(ErrorCode::SessionExpired);
        }
        let path = self.rooted(&request.path);
        let mut state = self.state.lock().await;
        let TreeState {
            container,
            watches,
            zxid,
        } = &mut *state;
        let (mut response, triggers) =
            apply_create(container, zxid, &path, &request.data, request.mode, self.session_id);
        let fires = self.collect_fires(watches, triggers);
        drop(state);
        fire(fires);
        if response.error == ErrorCode::Ok {
            response.path_created = self.unrooted(&response.path_created);
        }
        response
    }

    async fn remove(&self, request: RemoveRequest) -> RemoveResponse {
        if self.is_expired() {
            return RemoveResponse::from_error(ErrorCode::SessionExpired);
        }
        let path = self.rooted(&request.path);
        let mut state = self.state.lock().await;
        let TreeState {
            container,
            watches,
            zxid,
        } = &mut *state;
        let (response, triggers) = apply_remove(container, zxid, &path, request.version);
        let fires = self.collect_fires(watches, triggers);
        drop(state);
        fire(fires);
        response
    }

    async fn exists(
        &self,
        request: ExistsRequest,
        watch: Option<WatchCallback>,
    ) -> ExistsResponse {
        if self.is_expired() {
            return ExistsResponse::from_error(ErrorCode::SessionExpired);
        }
        let path = self.rooted(&request.path);
        let mut state = self.state.lock().await;
        // An exists watch is armed whether or not the node is there, so a
        // later create fires it.
        if let Some(watch) = watch {
            state
                .watches
                .data
                .entry(path.clone())
                .or_default()
                .push(watch);
        }
        match state.container.get(&path) {
            Some(node) => ExistsResponse {
                error: ErrorCode::Ok,
                stat: Some(stat_of(&state.container, &path, node)),
            },
            None => ExistsResponse::from_error(ErrorCode::NoNode),
        }
    }

    async fn get(&self, request: GetRequest, watch: Option<WatchCallback>) -> GetResponse {
        if self.is_expired() {
            return GetResponse::from_error(ErrorCode::SessionExpired);
        }
        let path = self.rooted(&request.path);
        let mut state = self.state.lock().await;
        match state.container.get(&path) {
            Some(node) => {
                let response = GetResponse {
                    error: ErrorCode::Ok,
                    data: node.data.clone(),
                    stat: stat_of(&state.container, &path, node),
                };
                if let Some(watch) = watch {
                    state.watches.data.entry(path).or_default().push(watch);
                }
                response
            }
            None => GetResponse::from_error(ErrorCode::NoNode),
        }
    }

    async fn set(&self, request: SetRequest) -> SetResponse {
        if self.is_expired() {
            return SetResponse::from_error(ErrorCode::SessionExpired);
        }
        let path = self.rooted(&request.path);
        let mut state = self.state.lock().await;
        let TreeState {
            container,
            watches,
            zxid,
        } = &mut *state;
        let (response, triggers) = apply_set(container, zxid, &path, &request.data, request.version);
        let fires = self.collect_fires(watches, triggers);
        drop(state);
        fire(fires);
        response
    }

    async fn list_children(
        &self,
        request: ListRequest,
        watch: Option<WatchCallback>,
    ) -> ListResponse {
        if self.is_expired() {
            return ListResponse::from_error(ErrorCode::SessionExpired);
        }
        let path = self.rooted(&request.path);
        let mut state = self.state.lock().await;
        match state.container.get(&path) {
            Some(node) => {
                let response = ListResponse {
                    error: ErrorCode::Ok,
                    names: children_of(&state.container, &path),
                    stat: stat_of(&state.container, &path, node),
                };
                if let Some(watch) = watch {
                    state.watches.child.entry(path).or_default().push(watch);
                }
                response
            }
            None => ListResponse::from_error(ErrorCode::NoNode),
        }
    }

    async fn check(&self, request: CheckRequest) -> CheckResponse {
        if self.is_expired() {
            return CheckResponse::from_error(ErrorCode::SessionExpired);
        }
        let path = self.rooted(&request.path);
        let state = self.state.lock().await;
        apply_check(&state.container, &path, request.version)
    }

    async fn multi(&self, requests: Vec<TxnRequest>) -> MultiResponse {
        if self.is_expired() {
            return MultiResponse::from_error(ErrorCode::SessionExpired);
        }
        if requests.is_empty() {
            return MultiResponse::default();
        }

        let mut state = self.state.lock().await;
        // Stage every sub-operation against a copy; commit only if all
        // succeed, so no partial state is ever visible.
        let mut staging = state.container.clone();
        let mut zxid = state.zxid;
        let mut responses = Vec::with_capacity(requests.len());
        let mut triggers = Vec::new();
        let mut failure: Option<ErrorCode> = None;

        for request in &requests {
            if failure.is_some() {
                responses.push(unevaluated(request));
                continue;
            }
            let (response, code) = match request {
                TxnRequest::Create { path, data, mode } => {
                    let path = self.rooted(path);
                    let (r, t) =
                        apply_create(&mut staging, &mut zxid, &path, data, *mode, self.session_id);
                    triggers.extend(t);
                    let code = r.error;
                    (
                        TxnResponse::Create {
                            error: r.error,
                            path_created: self.unrooted(&r.path_created),
                        },
                        code,
                    )
                }
                TxnRequest::Remove { path, version } => {
                    let path = self.rooted(path);
                    let (r, t) = apply_remove(&mut staging, &mut zxid, &path, *version);
                    triggers.extend(t);
                    (TxnResponse::Remove { error: r.error }, r.error)
                }
                TxnRequest::Set {
                    path,
                    data,
                    version,
                } => {
                    let path = self.rooted(path);
                    let (r, t) = apply_set(&mut staging, &mut zxid, &path, data, *version);
                    triggers.extend(t);
                    (
                        TxnResponse::Set {
                            error: r.error,
                            stat: r.stat,
                        },
                        r.error,
                    )
                }
                TxnRequest::Check { path, version } => {
                    let path = self.rooted(path);
                    let r = apply_check(&staging, &path, *version);
                    (TxnResponse::Check { error: r.error }, r.error)
                }
            };
            if code != ErrorCode::Ok {
                failure = Some(code);
            }
            responses.push(response);
        }

        if let Some(code) = failure {
            debug!(%code, "multi transaction rejected");
            return MultiResponse { error: code, responses };
        }

        state.container = staging;
        state.zxid = zxid;
        let TreeState { watches, .. } = &mut *state;
        let fires = self.collect_fires(watches, triggers);
        drop(state);
        fire(fires);
        MultiResponse {
            error: ErrorCode::Ok,
            responses,
        }
    }

    async fn finalize(&self, reason: &str) {
        if self.expired.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(reason, "finalizing in-memory session");

        let mut state = self.state.lock().await;
        // Ephemerals die with the session.
        let ephemerals: Vec<String> = state
            .container
            .iter()
            .filter(|(_, node)| node.ephemeral_owner == self.session_id)
            .map(|(path, _)| path.clone())
            .collect();
        let mut triggers = Vec::new();
        for path in ephemerals.iter().rev() {
            let TreeState {
                container, zxid, ..
            } = &mut *state;
            let (_, t) = apply_remove(container, zxid, path, -1);
            triggers.extend(t);
        }
        let TreeState { watches, .. } = &mut *state;
        let mut fires = self.collect_fires(watches, triggers);

        // Every remaining watch fires once with a session-level error.
        let data = std::mem::take(&mut watches.data);
        let child = std::mem::take(&mut watches.child);
        for (path, callbacks) in data.into_iter().chain(child) {
            let event = WatchEvent::session_error(ErrorCode::SessionExpired, self.unrooted(&path));
            for callback in callbacks {
                fires.push((callback, event.clone()));
            }
        }
        drop(state);
        fire(fires);
    }

    fn is_expired(&self) -> bool {
        self.expired.load(Ordering::SeqCst)
    }

    fn session_id(&self) -> i64 {
        self.session_id
    }
}

fn unevaluated(request: &TxnRequest) -> TxnResponse {
    let error = ErrorCode::RuntimeInconsistency;
    match request {
        TxnRequest::Create { .. } => TxnResponse::Create {
            error,
            path_created: String::new(),
        },
        TxnRequest::Remove { .. } => TxnResponse::Remove { error },
        TxnRequest::Set { .. } => TxnResponse::Set {
            error,
            stat: Stat::default(),
        },
        TxnRequest::Check { .. } => TxnResponse::Check { error },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex as StdMutex;

    use super::*;

    fn keeper() -> TestKeeper {
        TestKeeper::new("")
    }

    async fn create(keeper: &TestKeeper, path: &str, mode: CreateMode) -> CreateResponse {
        keeper
            .create(CreateRequest {
                path: path.to_string(),
                data: b"x".to_vec(),
                mode,
            })
            .await
    }

    #[tokio::test]
    async fn create_then_get_roundtrip() {
        let keeper = keeper();
        let created = create(&keeper, "/a", CreateMode::Persistent).await;
        assert_eq!(created.error, ErrorCode::Ok);
        assert_eq!(created.path_created, "/a");

        let got = keeper
            .get(
                GetRequest {
                    path: "/a".to_string(),
                },
                None,
            )
            .await;
        assert_eq!(got.error, ErrorCode::Ok);
        assert_eq!(got.data, b"x".to_vec());
        assert_eq!(got.stat.version, 0);
    }

    #[tokio::test]
    async fn create_without_parent_reports_no_node() {
        let keeper = keeper();
        let created = create(&keeper, "/missing/child", CreateMode::Persistent).await;
        assert_eq!(created.error, ErrorCode::NoNode);
    }

    #[tokio::test]
    async fn duplicate_create_reports_node_exists() {
        let keeper = keeper();
        create(&keeper, "/a", CreateMode::Persistent).await;
        let again = create(&keeper, "/a", CreateMode::Persistent).await;
        assert_eq!(again.error, ErrorCode::NodeExists);
    }

    #[tokio::test]
    async fn ephemeral_nodes_cannot_have_children() {
        let keeper = keeper();
        create(&keeper, "/eph", CreateMode::Ephemeral).await;
        let child = create(&keeper, "/eph/child", CreateMode::Persistent).await;
        assert_eq!(child.error, ErrorCode::NoChildrenForEphemerals);
    }

    #[tokio::test]
    async fn sequential_suffixes_are_monotonic() {
        let keeper = keeper();
        create(&keeper, "/a", CreateMode::Persistent).await;
        let first = create(&keeper, "/a/b", CreateMode::EphemeralSequential).await;
        let second = create(&keeper, "/a/b", CreateMode::EphemeralSequential).await;
        assert_eq!(first.path_created, "/a/b0000000000");
        assert_eq!(second.path_created, "/a/b0000000001");
    }

    #[tokio::test]
    async fn set_bumps_version_and_checks_precondition() {
        let keeper = keeper();
        create(&keeper, "/x", CreateMode::Persistent).await;

        let set = keeper
            .set(SetRequest {
                path: "/x".into(),
                data: b"v1".to_vec(),
                version: 0,
            })
            .await;
        assert_eq!(set.error, ErrorCode::Ok);
        assert_eq!(set.stat.version, 1);

        let stale = keeper
            .set(SetRequest {
                path: "/x".into(),
                data: b"v2".to_vec(),
                version: 0,
            })
            .await;
        assert_eq!(stale.error, ErrorCode::BadVersion);

        let got = keeper.get(GetRequest { path: "/x".into() }, None).await;
        assert_eq!(got.data, b"v1".to_vec());
    }

    #[tokio::test]
    async fn remove_of_non_empty_node_is_rejected() {
        let keeper = keeper();
        create(&keeper, "/a", CreateMode::Persistent).await;
        create(&keeper, "/a/b", CreateMode::Persistent).await;
        let removed = keeper
            .remove(RemoveRequest {
                path: "/a".into(),
                version: -1,
            })
            .await;
        assert_eq!(removed.error, ErrorCode::NotEmpty);
    }

    #[tokio::test]
    async fn list_children_returns_sorted_names() {
        let keeper = keeper();
        create(&keeper, "/a", CreateMode::Persistent).await;
        create(&keeper, "/a/c", CreateMode::Persistent).await;
        create(&keeper, "/a/b", CreateMode::Persistent).await;
        let listed = keeper
            .list_children(ListRequest { path: "/a".into() }, None)
            .await;
        assert_eq!(listed.error, ErrorCode::Ok);
        assert_eq!(listed.names, vec!["b".to_string(), "c".to_string()]);
        assert_eq!(listed.stat.num_children, 2);
    }

    #[tokio::test]
    async fn multi_is_atomic_and_reports_first_failing_index() {
        let keeper = keeper();
        create(&keeper, "/a", CreateMode::Persistent).await;

        let response = keeper
            .multi(vec![
                TxnRequest::create("/a/one", vec![], CreateMode::Persistent),
                TxnRequest::check("/a", 5),
                TxnRequest::create("/a/two", vec![], CreateMode::Persistent),
            ])
            .await;
        assert_eq!(response.error, ErrorCode::BadVersion);
        assert_eq!(response.responses[0].error(), ErrorCode::Ok);
        assert_eq!(response.responses[1].error(), ErrorCode::BadVersion);
        assert_eq!(
            response.responses[2].error(),
            ErrorCode::RuntimeInconsistency
        );

        // Nothing committed.
        let exists = keeper
            .exists(
                ExistsRequest {
                    path: "/a/one".into(),
                },
                None,
            )
            .await;
        assert_eq!(exists.error, ErrorCode::NoNode);
    }

    #[tokio::test]
    async fn multi_commits_every_op_on_success() {
        let keeper = keeper();
        create(&keeper, "/a", CreateMode::Persistent).await;
        let response = keeper
            .multi(vec![
                TxnRequest::create("/a/one", vec![], CreateMode::Persistent),
                TxnRequest::set("/a", b"v".to_vec(), -1),
            ])
            .await;
        assert_eq!(response.error, ErrorCode::Ok);
        let got = keeper.get(GetRequest { path: "/a".into() }, None).await;
        assert_eq!(got.data, b"v".to_vec());
    }

    #[tokio::test]
    async fn data_watch_fires_once_on_delete() {
        let keeper = keeper();
        create(&keeper, "/w", CreateMode::Persistent).await;

        let seen: Arc<StdMutex<Vec<WatchEvent>>> = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        let watch: WatchCallback = Arc::new(move |event| sink.lock().unwrap().push(event));
        keeper
            .get(GetRequest { path: "/w".into() }, Some(watch))
            .await;

        keeper
            .remove(RemoveRequest {
                path: "/w".into(),
                version: -1,
            })
            .await;
        // A later mutation must not re-fire the one-shot watch.
        create(&keeper, "/w", CreateMode::Persistent).await;

        let events = seen.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, Some(EventKind::Deleted));
        assert_eq!(events[0].path, "/w");
    }

    #[tokio::test]
    async fn finalize_drops_ephemerals_and_expires_session() {
        let keeper = keeper();
        create(&keeper, "/a", CreateMode::Persistent).await;
        create(&keeper, "/a/e", CreateMode::Ephemeral).await;

        let seen: Arc<StdMutex<Vec<WatchEvent>>> = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        let watch: WatchCallback = Arc::new(move |event| sink.lock().unwrap().push(event));
        keeper
            .get(GetRequest { path: "/a".into() }, Some(watch))
            .await;

        keeper.finalize("test shutdown").await;
        assert!(keeper.is_expired());

        let get = keeper.get(GetRequest { path: "/a".into() }, None).await;
        assert_eq!(get.error, ErrorCode::SessionExpired);

        let events = seen.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].error, ErrorCode::SessionExpired);
    }

    #[tokio::test]
    async fn chroot_rewrites_paths_both_ways() {
        let keeper = TestKeeper::new("/tenant");
        // The prefix node itself lives outside the client namespace.
        {
            let mut state = keeper.state.lock().await;
            let TreeState {
                container, zxid, ..
            } = &mut *state;
            apply_create(container, zxid, "/tenant", b"", CreateMode::Persistent, 0);
        }

        let created = create(&keeper, "/a", CreateMode::Persistent).await;
        assert_eq!(created.error, ErrorCode::Ok);
        assert_eq!(created.path_created, "/a");

        let root = keeper
            .exists(ExistsRequest { path: "/".into() }, None)
            .await;
        assert_eq!(root.error, ErrorCode::Ok);

        let listed = keeper
            .list_children(ListRequest { path: "/".into() }, None)
            .await;
        assert_eq!(listed.names, vec!["a".to_string()]);
    }
}
