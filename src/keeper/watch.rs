//! Waiting for a path to disappear.
//!
//! A one-shot watch covers the common case; a short liveness poll
//! tolerates missed notifications and lets an external condition cancel
//! the wait.

use std::sync::atomic::AtomicI32;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::timeout;

use crate::constants::DISAPPEAR_POLL_INTERVAL_MS;
use crate::error::ErrorCode;
use crate::error::KeeperError;
use crate::types::EventKind;
use crate::types::GetRequest;
use crate::types::WatchCallback;

use super::Keeper;

/// External cancellation predicate checked between polls.
pub type WaitCondition = Arc<dyn Fn() -> bool + Send + Sync>;

#[derive(Default)]
struct WaitState {
    code: AtomicI32,
    event_type: AtomicI32,
    notify: Notify,
}

impl Keeper {
    /// Block until `path` no longer exists, or until `condition` becomes
    /// true, whichever happens first. Returns `true` when the path is
    /// gone and `false` when the condition cancelled the wait.
    ///
    /// Reads the node rather than checking existence so that a node
    /// which never existed does not leave a stray watch armed.
    pub async fn wait_for_disappear(
        &self,
        path: &str,
        condition: Option<WaitCondition>,
    ) -> Result<bool, KeeperError> {
        let state = Arc::new(WaitState::default());
        let poll_interval = Duration::from_millis(DISAPPEAR_POLL_INTERVAL_MS);

        loop {
            let watch_state = Arc::clone(&state);
            let watch: WatchCallback = Arc::new(move |event| {
                if watch_state.code.load(Ordering::SeqCst) == 0 {
                    watch_state.code.store(event.error.as_i32(), Ordering::SeqCst);
                    if event.error == ErrorCode::Ok {
                        let kind = event.kind.map_or(0, EventKind::as_i32);
                        watch_state.event_type.store(kind, Ordering::SeqCst);
                    }
                    watch_state.notify.notify_one();
                }
            });

            let response_state = Arc::clone(&state);
            let conn = Arc::clone(self.connection());
            let request = GetRequest {
                path: path.to_string(),
            };
            tokio::spawn(async move {
                let response = conn.get(request, Some(watch)).await;
                response_state
                    .code
                    .store(response.error.as_i32(), Ordering::SeqCst);
                if response.error != ErrorCode::Ok {
                    response_state.notify.notify_one();
                }
            });

            if timeout(poll_interval, state.notify.notified()).await.is_err() {
                if condition.as_ref().is_some_and(|c| c()) {
                    return Ok(false);
                }
                continue;
            }

            let code = ErrorCode::from_i32(state.code.load(Ordering::SeqCst))
                .unwrap_or(ErrorCode::InvalidState);
            if code == ErrorCode::NoNode {
                return Ok(true);
            }
            if code != ErrorCode::Ok {
                return Err(KeeperError::Api {
                    code,
                    path: path.to_string(),
                });
            }
            if EventKind::from_i32(state.event_type.load(Ordering::SeqCst))
                == Some(EventKind::Deleted)
            {
                return Ok(true);
            }
            if condition.as_ref().is_some_and(|c| c()) {
                return Ok(false);
            }
        }
    }
}
