//! Bulk subtree removal.
//!
//! Children are deleted depth-first in bounded batches, one
//! multi-transaction per batch, so a single transaction never grows
//! unbounded and fallback work stays proportional to one batch. When a
//! batch transaction fails (typically because a sibling process is
//! concurrently clearing the same subtree), removal falls back to
//! per-node deletes submitted concurrently, treating "already gone" as
//! success.

use std::future::Future;
use std::pin::Pin;

use crate::constants::MULTI_BATCH_SIZE;
use crate::error::ErrorCode;
use crate::error::KeeperError;
use crate::paths;
use crate::types::TxnRequest;
use crate::types::ANY_VERSION;

use super::Keeper;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

impl Keeper {
    /// Remove the direct children of `path` in bounded batches. Fails on
    /// the first unresolved batch.
    pub async fn remove_children(&self, path: &str) -> Result<(), KeeperError> {
        let mut children = self.get_children(path).await?;
        while !children.is_empty() {
            let mut ops = Vec::new();
            for _ in 0..MULTI_BATCH_SIZE {
                let Some(child) = children.pop() else { break };
                ops.push(TxnRequest::remove(paths::join(path, &child), ANY_VERSION));
            }
            self.multi(ops).await?;
        }
        Ok(())
    }

    /// Remove every descendant of `path`, leaving `path` itself and an
    /// optional named direct child untouched.
    pub async fn remove_children_recursive(
        &self,
        path: &str,
        keep_child: Option<&str>,
    ) -> Result<(), KeeperError> {
        self.remove_children_recursive_inner(path.to_string(), keep_child.map(String::from))
            .await
    }

    fn remove_children_recursive_inner(
        &self,
        path: String,
        keep_child: Option<String>,
    ) -> BoxFuture<'_, Result<(), KeeperError>> {
        Box::pin(async move {
            let mut children = self.get_children(&path).await?;
            while !children.is_empty() {
                let mut ops = Vec::new();
                for _ in 0..MULTI_BATCH_SIZE {
                    let Some(child) = children.pop() else { break };
                    let child_path = paths::join(&path, &child);
                    self.remove_children_recursive_inner(child_path.clone(), None)
                        .await?;
                    if keep_child.as_deref() != Some(child.as_str()) {
                        ops.push(TxnRequest::remove(child_path, ANY_VERSION));
                    }
                }
                self.multi(ops).await?;
            }
            Ok(())
        })
    }

    /// Best-effort recursive removal of the children of `path`.
    ///
    /// Returns `true` only when every deletion target was known to exist
    /// at removal time, i.e. there was no evidence of a concurrent
    /// remover or creator. With `probably_flat` the recursive listing of
    /// grandchildren is skipped; a child that turns out non-empty is
    /// patched by recursing into that one child and retrying, which
    /// covers one unexpected extra level but not deeper surprises.
    pub async fn try_remove_children_recursive(
        &self,
        path: &str,
        probably_flat: bool,
        keep_child: Option<&str>,
    ) -> Result<bool, KeeperError> {
        self.try_remove_children_recursive_inner(
            path.to_string(),
            probably_flat,
            keep_child.map(String::from),
        )
        .await
    }

    fn try_remove_children_recursive_inner(
        &self,
        path: String,
        probably_flat: bool,
        keep_child: Option<String>,
    ) -> BoxFuture<'_, Result<bool, KeeperError>> {
        Box::pin(async move {
            let (code, mut children) = self.try_get_children(&path).await?;
            if code != ErrorCode::Ok {
                return Ok(false);
            }

            let mut removed_as_expected = true;
            while !children.is_empty() {
                let mut ops = Vec::with_capacity(MULTI_BATCH_SIZE);
                let mut batch = Vec::with_capacity(MULTI_BATCH_SIZE);
                for _ in 0..MULTI_BATCH_SIZE {
                    let Some(child) = children.pop() else { break };
                    let child_path = paths::join(&path, &child);

                    // Skipping the recursive listing is much faster for
                    // paths with many leaf children, at the cost of
                    // missing deeper levels; see the NotEmpty patch-up
                    // below.
                    if !probably_flat {
                        self.try_remove_children_recursive_inner(child_path.clone(), false, None)
                            .await?;
                    }

                    if keep_child.as_deref() != Some(child.as_str()) {
                        batch.push(child_path.clone());
                        ops.push(TxnRequest::remove(child_path, ANY_VERSION));
                    }
                }

                // The bulk path: one transaction per batch. If it fails,
                // someone is concurrently mutating these children and we
                // fall back to removing them one by one.
                let (batch_code, _) = self.try_multi(ops).await?;
                if batch_code == ErrorCode::Ok {
                    continue;
                }

                removed_as_expected = false;
                let pendings: Vec<_> = batch
                    .iter()
                    .map(|child| self.submit_remove(child, ANY_VERSION))
                    .collect();

                for (index, pending) in pendings.into_iter().enumerate() {
                    let response = pending.wait().await;
                    match response.error {
                        ErrorCode::Ok | ErrorCode::NoNode => continue,
                        ErrorCode::NotEmpty => {
                            if probably_flat {
                                // It actually has children; remove them
                                // and retry this node once.
                                self.try_remove_children_recursive_inner(
                                    batch[index].clone(),
                                    false,
                                    None,
                                )
                                .await?;
                                self.try_remove(&batch[index], ANY_VERSION).await?;
                            }
                            continue;
                        }
                        code => {
                            return Err(KeeperError::Api {
                                code,
                                path: batch[index].clone(),
                            })
                        }
                    }
                }
            }
            Ok(removed_as_expected)
        })
    }

    /// Remove `path` and every descendant, failing on the first
    /// unresolved step.
    pub async fn remove_recursive(&self, path: &str) -> Result<(), KeeperError> {
        self.remove_children_recursive(path, None).await?;
        self.remove(path, ANY_VERSION).await
    }

    /// Best-effort removal of `path` and every descendant. "Already
    /// gone" counts as success; the return value reports whether removal
    /// matched exactly what was expected.
    pub async fn try_remove_recursive(&self, path: &str) -> Result<bool, KeeperError> {
        let children_as_expected = self
            .try_remove_children_recursive(path, false, None)
            .await?;
        let code = self.try_remove(path, ANY_VERSION).await?;
        Ok(children_as_expected && code == ErrorCode::Ok)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::KeeperConfig;
    use crate::types::CreateMode;

    use super::super::Keeper;
    use super::*;

    async fn keeper() -> Keeper {
        Keeper::new(KeeperConfig::in_memory()).await.unwrap()
    }

    async fn build_tree(keeper: &Keeper, paths: &[&str]) {
        for path in paths {
            keeper
                .create(path, b"".to_vec(), CreateMode::Persistent)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn remove_recursive_clears_a_deep_subtree() {
        let keeper = keeper().await;
        build_tree(
            &keeper,
            &["/a", "/a/b", "/a/b/c", "/a/b/d", "/a/e", "/a/e/f"],
        )
        .await;

        keeper.remove_recursive("/a").await.unwrap();
        assert!(keeper.exists("/a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn remove_children_keeps_the_node_itself() {
        let keeper = keeper().await;
        build_tree(&keeper, &["/a", "/a/b", "/a/c"]).await;

        keeper.remove_children("/a").await.unwrap();
        assert!(keeper.exists("/a").await.unwrap().is_some());
        assert!(keeper.get_children("/a").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn keep_child_survives_recursive_removal() {
        let keeper = keeper().await;
        build_tree(&keeper, &["/a", "/a/seq", "/a/x", "/a/x/y"]).await;

        keeper
            .remove_children_recursive("/a", Some("seq"))
            .await
            .unwrap();
        assert_eq!(keeper.get_children("/a").await.unwrap(), vec!["seq"]);
    }

    #[tokio::test]
    async fn try_remove_recursive_is_idempotent() {
        let keeper = keeper().await;
        build_tree(&keeper, &["/a", "/a/b"]).await;

        assert!(keeper.try_remove_recursive("/a").await.unwrap());
        assert!(keeper.exists("/a").await.unwrap().is_none());

        // Second pass: everything already gone, reported as a no-op
        // rather than an error.
        assert!(!keeper.try_remove_recursive("/a").await.unwrap());
    }

    #[tokio::test]
    async fn probably_flat_patches_one_extra_level() {
        let keeper = keeper().await;
        build_tree(&keeper, &["/a", "/a/b", "/a/b/c"]).await;

        // The flat fast path does not list grandchildren; the NotEmpty
        // fallback recurses into /a/b and retries.
        let as_expected = keeper
            .try_remove_children_recursive("/a", true, None)
            .await
            .unwrap();
        assert!(!as_expected);
        assert!(keeper.get_children("/a").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn large_subtrees_are_removed_in_batches() {
        let keeper = keeper().await;
        keeper
            .create("/big", b"".to_vec(), CreateMode::Persistent)
            .await
            .unwrap();
        for i in 0..(MULTI_BATCH_SIZE + 37) {
            keeper
                .create(
                    &format!("/big/child{i:04}"),
                    b"".to_vec(),
                    CreateMode::Persistent,
                )
                .await
                .unwrap();
        }

        keeper.remove_recursive("/big").await.unwrap();
        assert!(keeper.exists("/big").await.unwrap().is_none());
    }
}
