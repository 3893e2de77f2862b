//! Atomic multi-transactions.
//!
//! An ordered batch of sub-operations is submitted as one all-or-nothing
//! call. There is no partial-success state: either every sub-operation
//! commits or none does. A user-level rejection is enriched with the
//! index of the first failing sub-operation so callers can pinpoint the
//! logical step without parsing messages.

use crate::error::ErrorCode;
use crate::error::KeeperError;
use crate::types::MultiResponse;
use crate::types::OpKind;
use crate::types::TxnRequest;
use crate::types::TxnResponse;

use super::Keeper;

impl Keeper {
    /// Submit the batch without waiting; an empty batch is not
    /// dispatched at all.
    async fn multi_impl(&self, requests: Vec<TxnRequest>) -> MultiResponse {
        if requests.is_empty() {
            return MultiResponse::default();
        }
        let first_path = requests[0].path().to_string();
        let conn = std::sync::Arc::clone(self.connection());
        let pending = self.spawn_op(async move { conn.multi(requests).await });
        self.settle(OpKind::Multi, &first_path, pending).await
    }

    /// Apply the batch atomically, raising on any failure. User-level
    /// rejections carry the request/response lists and the index of the
    /// first failing sub-operation.
    pub async fn multi(&self, requests: Vec<TxnRequest>) -> Result<Vec<TxnResponse>, KeeperError> {
        let response = self.multi_impl(requests.clone()).await;
        check_multi(response.error, requests, response.responses)
    }

    /// Returns user-level rejection codes as values; infra failures are
    /// still raised.
    pub async fn try_multi(
        &self,
        requests: Vec<TxnRequest>,
    ) -> Result<(ErrorCode, Vec<TxnResponse>), KeeperError> {
        let response = self.multi_impl(requests).await;
        if response.error != ErrorCode::Ok && !response.error.is_user_error() {
            return Err(KeeperError::Api {
                code: response.error,
                path: String::new(),
            });
        }
        Ok((response.error, response.responses))
    }

    /// Never raises; infra failures are reported as the batch code with
    /// the batch entirely unresolved.
    pub async fn try_multi_no_throw(
        &self,
        requests: Vec<TxnRequest>,
    ) -> (ErrorCode, Vec<TxnResponse>) {
        let response = self.multi_impl(requests).await;
        (response.error, response.responses)
    }
}

/// Index of the first sub-response with a non-zero code. Only meaningful
/// for user-level batch rejections; an infra-level code means nothing
/// was resolved and no index exists.
pub(crate) fn failed_op_index(code: ErrorCode, responses: &[TxnResponse]) -> Option<usize> {
    if !code.is_user_error() {
        return None;
    }
    responses.iter().position(|r| r.error() != ErrorCode::Ok)
}

fn check_multi(
    code: ErrorCode,
    requests: Vec<TxnRequest>,
    responses: Vec<TxnResponse>,
) -> Result<Vec<TxnResponse>, KeeperError> {
    if code == ErrorCode::Ok {
        return Ok(responses);
    }
    match failed_op_index(code, &responses) {
        Some(failed_op_index) => Err(KeeperError::Multi {
            code,
            failed_op_index,
            requests,
            responses,
        }),
        // Session or connection failure: the batch is entirely
        // unresolved, there is no failing sub-operation to point at.
        None => Err(KeeperError::Api {
            code,
            path: requests.first().map(|r| r.path().to_string()).unwrap_or_default(),
        }),
    }
}
