//! End-to-end scenarios driven through the in-memory backend.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use keeper_client::api::KeeperConnection;
use keeper_client::api::TestKeeper;
use keeper_client::types::CheckRequest;
use keeper_client::types::CheckResponse;
use keeper_client::types::CreateRequest;
use keeper_client::types::CreateResponse;
use keeper_client::types::ExistsRequest;
use keeper_client::types::ExistsResponse;
use keeper_client::types::GetRequest;
use keeper_client::types::GetResponse;
use keeper_client::types::ListRequest;
use keeper_client::types::ListResponse;
use keeper_client::types::MultiResponse;
use keeper_client::types::RemoveRequest;
use keeper_client::types::RemoveResponse;
use keeper_client::types::SetRequest;
use keeper_client::types::SetResponse;
use keeper_client::types::WatchCallback;
use keeper_client::CreateMode;
use keeper_client::ErrorCode;
use keeper_client::Keeper;
use keeper_client::KeeperConfig;
use keeper_client::TxnRequest;
use keeper_client::ANY_VERSION;

async fn in_memory_keeper() -> Keeper {
    let _ = tracing_subscriber::fmt().with_env_filter("keeper_client=debug").try_init();
    Keeper::new(KeeperConfig::in_memory()).await.unwrap()
}

#[tokio::test]
async fn sequential_children_and_recursive_removal() {
    let keeper = in_memory_keeper().await;

    keeper
        .create("/a", b"root".to_vec(), CreateMode::Persistent)
        .await
        .unwrap();
    let child = keeper
        .create("/a/b", b"".to_vec(), CreateMode::EphemeralSequential)
        .await
        .unwrap();
    assert_eq!(child, "/a/b0000000000");
    assert!(keeper.exists("/a/b0000000000").await.unwrap().is_some());

    // Removing a node with children is an expected negative outcome.
    let code = keeper.try_remove("/a", ANY_VERSION).await.unwrap();
    assert_eq!(code, ErrorCode::NotEmpty);

    keeper.remove_recursive("/a").await.unwrap();
    assert!(keeper.exists("/a").await.unwrap().is_none());
}

#[tokio::test]
async fn stale_version_is_a_code_not_an_error() {
    let keeper = in_memory_keeper().await;

    keeper
        .create("/x", b"".to_vec(), CreateMode::Persistent)
        .await
        .unwrap();
    keeper.set("/x", b"v1".to_vec(), 0).await.unwrap();

    let code = keeper.try_set("/x", b"v2".to_vec(), 0).await.unwrap();
    assert_eq!(code, ErrorCode::BadVersion);

    let (data, stat) = keeper.get("/x").await.unwrap();
    assert_eq!(data, b"v1".to_vec());
    assert_eq!(stat.version, 1);
}

#[tokio::test]
async fn recursive_removal_is_idempotent() {
    let keeper = in_memory_keeper().await;
    for path in ["/t", "/t/a", "/t/a/x", "/t/b"] {
        keeper
            .create(path, b"".to_vec(), CreateMode::Persistent)
            .await
            .unwrap();
    }

    assert!(keeper.try_remove_recursive("/t").await.unwrap());
    assert!(!keeper.try_remove_recursive("/t").await.unwrap());
    assert!(keeper.exists("/t").await.unwrap().is_none());
}

#[tokio::test]
async fn multi_transaction_failure_pinpoints_the_step() {
    let keeper = in_memory_keeper().await;
    keeper
        .create("/m", b"".to_vec(), CreateMode::Persistent)
        .await
        .unwrap();

    let err = keeper
        .multi(vec![
            TxnRequest::create("/m/one", b"".to_vec(), CreateMode::Persistent),
            TxnRequest::create("/m/two", b"".to_vec(), CreateMode::Persistent),
            TxnRequest::set("/m/one", b"v".to_vec(), 9),
            TxnRequest::remove("/m", ANY_VERSION),
        ])
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::BadVersion);
    assert_eq!(err.failed_path(), Some("/m/one"));

    // All-or-nothing: the creates before the failing step are rolled
    // back with it.
    assert!(keeper.exists("/m/one").await.unwrap().is_none());
    assert!(keeper.exists("/m/two").await.unwrap().is_none());
}

#[tokio::test]
async fn waiter_returns_once_the_node_is_deleted() {
    let keeper = Arc::new(in_memory_keeper().await);
    keeper
        .create("/ticket", b"".to_vec(), CreateMode::Persistent)
        .await
        .unwrap();

    let waiter = Arc::clone(&keeper);
    let handle = tokio::spawn(async move { waiter.wait_for_disappear("/ticket", None).await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    keeper.remove("/ticket", ANY_VERSION).await.unwrap();

    let disappeared = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("waiter should wake promptly")
        .unwrap()
        .unwrap();
    assert!(disappeared);
}

/// Delegates to an inner backend, but simulates an external actor by
/// creating one extra grandchild right before the first batched
/// transaction is applied.
struct InterferingConnection {
    inner: Arc<TestKeeper>,
    interfered: AtomicBool,
    extra_path: String,
}

#[async_trait]
impl KeeperConnection for InterferingConnection {
    async fn create(&self, request: CreateRequest) -> CreateResponse {
        self.inner.create(request).await
    }

    async fn remove(&self, request: RemoveRequest) -> RemoveResponse {
        self.inner.remove(request).await
    }

    async fn exists(&self, request: ExistsRequest, watch: Option<WatchCallback>) -> ExistsResponse {
        self.inner.exists(request, watch).await
    }

    async fn get(&self, request: GetRequest, watch: Option<WatchCallback>) -> GetResponse {
        self.inner.get(request, watch).await
    }

    async fn set(&self, request: SetRequest) -> SetResponse {
        self.inner.set(request).await
    }

    async fn list_children(&self, request: ListRequest, watch: Option<WatchCallback>) -> ListResponse {
        self.inner.list_children(request, watch).await
    }

    async fn check(&self, request: CheckRequest) -> CheckResponse {
        self.inner.check(request).await
    }

    async fn multi(&self, requests: Vec<TxnRequest>) -> MultiResponse {
        if !self.interfered.swap(true, Ordering::SeqCst) {
            let created = self
                .inner
                .create(CreateRequest {
                    path: self.extra_path.clone(),
                    data: Vec::new(),
                    mode: CreateMode::Persistent,
                })
                .await;
            assert_eq!(created.error, ErrorCode::Ok);
        }
        self.inner.multi(requests).await
    }

    async fn finalize(&self, reason: &str) {
        self.inner.finalize(reason).await;
    }

    fn is_expired(&self) -> bool {
        self.inner.is_expired()
    }

    fn session_id(&self) -> i64 {
        self.inner.session_id()
    }
}

#[tokio::test]
async fn concurrent_recreation_is_patched_by_the_fallback() {
    let connection = Arc::new(InterferingConnection {
        inner: Arc::new(TestKeeper::new("")),
        interfered: AtomicBool::new(false),
        extra_path: "/a/c1/surprise".to_string(),
    });
    let keeper = Keeper::from_connection(KeeperConfig::in_memory(), connection)
        .await
        .unwrap();

    for path in ["/a", "/a/c1", "/a/c2"] {
        keeper
            .create(path, b"".to_vec(), CreateMode::Persistent)
            .await
            .unwrap();
    }

    // The grandchild appears between the listing and the batched
    // delete, so the bulk transaction fails and the per-node fallback
    // has to patch the non-empty child.
    let as_expected = keeper
        .try_remove_children_recursive("/a", true, None)
        .await
        .unwrap();

    assert!(!as_expected);
    assert!(keeper.get_children("/a").await.unwrap().is_empty());
    assert!(keeper.exists("/a").await.unwrap().is_some());
}

#[tokio::test]
async fn derived_session_talks_to_a_fresh_tree() {
    let keeper = in_memory_keeper().await;
    keeper
        .create("/only-here", b"".to_vec(), CreateMode::Persistent)
        .await
        .unwrap();

    let next = keeper.start_new_session().await.unwrap();
    assert_ne!(next.session_id(), keeper.session_id());
    assert!(next.exists("/only-here").await.unwrap().is_none());
    assert!(!next.config_changed(keeper.config()));
}
